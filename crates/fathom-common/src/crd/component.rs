//! Pod-level settings shared by cluster members
//!
//! Every cluster CRD carries a set of cluster-wide pod defaults, and each
//! member (discovery, coordinator, ...) may override them. The
//! [`ComponentAccessor`] resolves the effective value for one member.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, EnvFromSource, EnvVar, LocalObjectReference, PodSecurityContext,
    PodSpec, ResourceRequirements, Toleration, Volume, VolumeMount,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::kube_utils::combine_string_maps;

/// DNS policy required for pods on the host network to resolve cluster names
const DNS_POLICY_HOST_NETWORK: &str = "ClusterFirstWithHostNet";

// =============================================================================
// Cluster-wide defaults
// =============================================================================

/// Pod settings applied to every member unless the member overrides them
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterPodDefaults {
    /// Image pull policy (Always, IfNotPresent, Never)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_policy: Option<String>,

    /// Secrets used to pull member images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,

    /// Node selector for member pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations for member pods
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,

    /// Affinity rules for member pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,

    /// Priority class for member pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,

    /// Scheduler for member pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,

    /// Pod security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,

    /// Run member pods on the host network
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_network: Option<bool>,

    /// Grace period before member pods are killed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_grace_period_seconds: Option<i64>,

    /// Extra labels for member pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Extra annotations for member pods
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

// =============================================================================
// Per-member overrides
// =============================================================================

/// Pod settings for a single member. Unset fields fall back to the cluster defaults.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Pod-level overrides, same shape as the cluster defaults
    #[serde(flatten)]
    pub pod: ClusterPodDefaults,

    /// Extra environment variables for the member's main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Extra env sources for the member's main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,

    /// Containers merged into the pod by name.
    ///
    /// A container whose name matches a built-in container is deep-merged
    /// into it; any other container is added as a sidecar.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_containers: Vec<Container>,

    /// Init containers appended to the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_containers: Vec<Container>,

    /// Volumes appended to the pod
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_volumes: Vec<Volume>,

    /// Volume mounts added to the member's main container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_volume_mounts: Vec<VolumeMount>,
}

/// Discovery member spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverySpec {
    /// Pod and container overrides for the discovery workload
    #[serde(flatten)]
    pub component: ComponentSpec,

    /// Resource requirements for the discovery container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

// =============================================================================
// ComponentAccessor
// =============================================================================

/// Resolves effective pod settings for one member of a cluster.
///
/// Scalars take the member value when set and the cluster value otherwise.
/// Maps are combined with the member winning on key collision. Lists that
/// only exist on members come from the member alone.
#[derive(Clone, Copy, Debug)]
pub struct ComponentAccessor<'a> {
    cluster: &'a ClusterPodDefaults,
    component: &'a ComponentSpec,
}

impl<'a> ComponentAccessor<'a> {
    /// Create an accessor over cluster defaults and a member spec
    pub fn new(cluster: &'a ClusterPodDefaults, component: &'a ComponentSpec) -> Self {
        Self { cluster, component }
    }

    /// Effective image pull policy
    pub fn image_pull_policy(&self) -> Option<String> {
        self.component
            .pod
            .image_pull_policy
            .clone()
            .or_else(|| self.cluster.image_pull_policy.clone())
    }

    /// Effective image pull secrets
    pub fn image_pull_secrets(&self) -> Vec<LocalObjectReference> {
        prefer_non_empty(
            &self.component.pod.image_pull_secrets,
            &self.cluster.image_pull_secrets,
        )
    }

    /// Effective node selector
    pub fn node_selector(&self) -> BTreeMap<String, String> {
        combine_string_maps(&self.cluster.node_selector, &self.component.pod.node_selector)
    }

    /// Effective tolerations
    pub fn tolerations(&self) -> Vec<Toleration> {
        prefer_non_empty(&self.component.pod.tolerations, &self.cluster.tolerations)
    }

    /// Effective affinity
    pub fn affinity(&self) -> Option<Affinity> {
        self.component
            .pod
            .affinity
            .clone()
            .or_else(|| self.cluster.affinity.clone())
    }

    /// Effective priority class
    pub fn priority_class_name(&self) -> Option<String> {
        self.component
            .pod
            .priority_class_name
            .clone()
            .or_else(|| self.cluster.priority_class_name.clone())
    }

    /// Effective scheduler
    pub fn scheduler_name(&self) -> Option<String> {
        self.component
            .pod
            .scheduler_name
            .clone()
            .or_else(|| self.cluster.scheduler_name.clone())
    }

    /// Effective pod security context
    pub fn pod_security_context(&self) -> Option<PodSecurityContext> {
        self.component
            .pod
            .pod_security_context
            .clone()
            .or_else(|| self.cluster.pod_security_context.clone())
    }

    /// Whether member pods run on the host network
    pub fn host_network(&self) -> bool {
        self.component
            .pod
            .host_network
            .or(self.cluster.host_network)
            .unwrap_or(false)
    }

    /// Effective termination grace period
    pub fn termination_grace_period_seconds(&self) -> Option<i64> {
        self.component
            .pod
            .termination_grace_period_seconds
            .or(self.cluster.termination_grace_period_seconds)
    }

    /// Effective pod labels
    pub fn labels(&self) -> BTreeMap<String, String> {
        combine_string_maps(&self.cluster.labels, &self.component.pod.labels)
    }

    /// Effective pod annotations
    pub fn annotations(&self) -> BTreeMap<String, String> {
        combine_string_maps(&self.cluster.annotations, &self.component.pod.annotations)
    }

    /// Extra environment variables
    pub fn env(&self) -> &'a [EnvVar] {
        &self.component.env
    }

    /// Extra env sources
    pub fn env_from(&self) -> &'a [EnvFromSource] {
        &self.component.env_from
    }

    /// Containers to merge-patch into the pod
    pub fn additional_containers(&self) -> &'a [Container] {
        &self.component.additional_containers
    }

    /// Init containers
    pub fn init_containers(&self) -> &'a [Container] {
        &self.component.init_containers
    }

    /// Extra volumes
    pub fn additional_volumes(&self) -> &'a [Volume] {
        &self.component.additional_volumes
    }

    /// Extra volume mounts for the main container
    pub fn additional_volume_mounts(&self) -> &'a [VolumeMount] {
        &self.component.additional_volume_mounts
    }

    /// Build the baseline pod spec (scheduling and security only, no containers)
    pub fn build_pod_spec(&self) -> PodSpec {
        let host_network = self.host_network();
        PodSpec {
            affinity: self.affinity(),
            node_selector: non_empty_map(self.node_selector()),
            tolerations: non_empty_vec(self.tolerations()),
            priority_class_name: self.priority_class_name(),
            scheduler_name: self.scheduler_name(),
            security_context: self.pod_security_context(),
            image_pull_secrets: non_empty_vec(self.image_pull_secrets()),
            termination_grace_period_seconds: self.termination_grace_period_seconds(),
            host_network: host_network.then_some(true),
            dns_policy: host_network.then(|| DNS_POLICY_HOST_NETWORK.to_string()),
            ..Default::default()
        }
    }
}

fn prefer_non_empty<T: Clone>(preferred: &[T], fallback: &[T]) -> Vec<T> {
    if preferred.is_empty() {
        fallback.to_vec()
    } else {
        preferred.to_vec()
    }
}

fn non_empty_vec<T>(v: Vec<T>) -> Option<Vec<T>> {
    (!v.is_empty()).then_some(v)
}

fn non_empty_map(m: BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    (!m.is_empty()).then_some(m)
}
