//! Discovery Deployment builder
//!
//! Builds the single-replica discovery Deployment for a cluster from its
//! variant, base-spec accessor and the operator's [`DiscoveryConfig`].

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector, PodSpec,
    PodTemplateSpec, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::debug;

use fathom_common::kube_utils::{combine_string_maps, container_resources, env_merge};
use fathom_common::labels::COORDINATOR_LABEL_VAL;
use fathom_common::{Error, LAST_APPLIED_POD_TEMPLATE_ANNOTATION};

use crate::cluster::ClusterVariant;
use crate::merge::merge_patch_containers;
use crate::meta::{discovery_member_name, discovery_meta};

/// Image used when the operator isn't configured with one
pub const DEFAULT_DISCOVERY_IMAGE: &str = "ghcr.io/fathom-db/discovery:latest";

/// Name of the discovery container in the pod
pub const DISCOVERY_CONTAINER_NAME: &str = "discovery";

/// Port the discovery service listens on
pub const DISCOVERY_PORT: i32 = 10261;

/// Port of the discovery proxy
pub const PROXY_PORT: i32 = 10262;

/// Named port for [`DISCOVERY_PORT`]
pub const DISCOVERY_PORT_NAME: &str = "discovery";

/// Named port for [`PROXY_PORT`]
pub const PROXY_PORT_NAME: &str = "proxy";

const DISCOVERY_COMMAND: &str = "/usr/local/bin/fathom-discovery";
const COORDINATOR_TLS_VOLUME: &str = "coordinator-tls";
const COORDINATOR_TLS_MOUNT_PATH: &str = "/var/lib/coordinator-tls";
const TLS_ENABLED_ENV: &str = "CLUSTER_TLS_ENABLED";

/// Operator-level settings for discovery workloads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Container image for the discovery process
    pub image: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_DISCOVERY_IMAGE.to_string(),
        }
    }
}

/// Name of the secret holding a member's cluster TLS certificates
pub fn cluster_tls_secret_name(cluster_name: &str, member: &str) -> String {
    format!("{}-{}-cluster-secret", cluster_name, member)
}

/// Builds discovery Deployments
#[derive(Clone, Debug, Default)]
pub struct DeploymentBuilder {
    config: DiscoveryConfig,
}

impl DeploymentBuilder {
    /// Create a builder with the given operator configuration
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Build the desired discovery Deployment for `cluster`.
    ///
    /// Fails if the cluster object lacks a namespace or uid, if the user's
    /// container overrides can't be merged, or if the pod spec can't be
    /// serialized into the fingerprint annotation.
    pub fn build(&self, cluster: &ClusterVariant<'_>) -> Result<Deployment, Error> {
        let (meta, label) = discovery_meta(cluster, discovery_member_name)?;
        let name = meta.name.clone().unwrap_or_default();
        let namespace = meta.namespace.clone().unwrap_or_default();

        let accessor = cluster.base_discovery_spec();
        let base_pod_spec = accessor.build_pod_spec();

        let env = env_merge(&self.base_env(cluster), accessor.env());
        let mounts = accessor.additional_volume_mounts().to_vec();

        let discovery = Container {
            name: DISCOVERY_CONTAINER_NAME.to_string(),
            image: Some(self.config.image.clone()),
            image_pull_policy: accessor.image_pull_policy(),
            command: Some(vec![DISCOVERY_COMMAND.to_string()]),
            resources: container_resources(cluster.discovery_resources()),
            env: Some(env),
            env_from: non_empty(accessor.env_from().to_vec()),
            volume_mounts: non_empty(mounts),
            ports: Some(discovery_ports()),
            ..Default::default()
        };
        let mut containers = base_pod_spec.containers.clone();
        containers.push(discovery);

        let containers = merge_patch_containers(containers, accessor.additional_containers())
            .map_err(|e| {
                Error::internal_with_context(
                    format!("{}/{}", namespace, name),
                    format!("failed to merge-patch discovery containers: {}", e),
                )
            })?;

        let mut volumes = base_pod_spec.volumes.clone().unwrap_or_default();
        volumes.extend_from_slice(accessor.additional_volumes());
        let mut init_containers = base_pod_spec.init_containers.clone().unwrap_or_default();
        init_containers.extend_from_slice(accessor.init_containers());

        let mut pod_spec = PodSpec {
            containers,
            init_containers: non_empty(init_containers),
            volumes: non_empty(volumes),
            service_account_name: Some(name.clone()),
            ..base_pod_spec
        };

        if cluster.coordinator_tls() {
            debug!(cluster = %cluster.name(), "wiring coordinator TLS into discovery");
            pod_spec = with_coordinator_tls(pod_spec, &cluster.name());
        }

        let pod_labels = combine_string_maps(&label.labels(), &accessor.labels());
        let pod_annotations = accessor.annotations();

        let fingerprint = pod_spec_fingerprint(&pod_spec)?;
        let mut annotations = meta.annotations.clone().unwrap_or_default();
        annotations.insert(LAST_APPLIED_POD_TEMPLATE_ANNOTATION.to_string(), fingerprint);

        Ok(Deployment {
            metadata: ObjectMeta {
                annotations: Some(annotations),
                ..meta
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    rolling_update: None,
                }),
                selector: label.label_selector(),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: Some(pod_annotations).filter(|a| !a.is_empty()),
                        ..Default::default()
                    }),
                    spec: Some(pod_spec),
                },
                ..Default::default()
            }),
            status: None,
        })
    }

    /// Fixed environment for the discovery process
    fn base_env(&self, cluster: &ClusterVariant<'_>) -> Vec<EnvVar> {
        vec![
            EnvVar {
                name: "MY_POD_NAMESPACE".to_string(),
                value: None,
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.namespace".to_string(),
                        api_version: None,
                    }),
                    ..Default::default()
                }),
            },
            literal_env("TZ", cluster.timezone()),
            literal_env("CLUSTER_NAME", &cluster.name()),
        ]
    }
}

/// Serialized pod spec used as the Deployment's convergence fingerprint.
///
/// k8s-openapi structs serialize in declaration order with `BTreeMap` maps,
/// so equal specs always produce equal strings.
pub fn pod_spec_fingerprint(pod_spec: &PodSpec) -> Result<String, Error> {
    serde_json::to_string(pod_spec).map_err(|e| Error::serialization_for_kind("PodSpec", e.to_string()))
}

/// Fingerprint stored on a Deployment, if any
pub fn deployment_fingerprint(deployment: &Deployment) -> Option<&str> {
    deployment
        .metadata
        .annotations
        .as_ref()?
        .get(LAST_APPLIED_POD_TEMPLATE_ANNOTATION)
        .map(String::as_str)
}

/// Mount the coordinator's cluster TLS secret into the discovery container
///
/// Replaces any user-supplied volume, mount or env var that collides with the
/// TLS wiring, so the pod carries exactly one of each.
fn with_coordinator_tls(mut pod_spec: PodSpec, cluster_name: &str) -> PodSpec {
    let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    volumes.retain(|v| v.name != COORDINATOR_TLS_VOLUME);
    volumes.push(Volume {
        name: COORDINATOR_TLS_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(cluster_tls_secret_name(cluster_name, COORDINATOR_LABEL_VAL)),
            ..Default::default()
        }),
        ..Default::default()
    });

    if let Some(container) = pod_spec
        .containers
        .iter_mut()
        .find(|c| c.name == DISCOVERY_CONTAINER_NAME)
    {
        let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
        mounts.retain(|m| m.mount_path != COORDINATOR_TLS_MOUNT_PATH);
        mounts.push(VolumeMount {
            name: COORDINATOR_TLS_VOLUME.to_string(),
            mount_path: COORDINATOR_TLS_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
        container.env = Some(env_merge(
            container.env.as_deref().unwrap_or_default(),
            &[literal_env(TLS_ENABLED_ENV, "true")],
        ));
    }
    pod_spec
}

fn discovery_ports() -> Vec<ContainerPort> {
    [(DISCOVERY_PORT_NAME, DISCOVERY_PORT), (PROXY_PORT_NAME, PROXY_PORT)]
        .into_iter()
        .map(|(name, port)| ContainerPort {
            name: Some(name.to_string()),
            container_port: port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect()
}

fn literal_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn non_empty<T>(v: Vec<T>) -> Option<Vec<T>> {
    (!v.is_empty()).then_some(v)
}
