//! DatabaseCluster CRD types
//!
//! A `DatabaseCluster` describes one database cluster: its coordination
//! member, its discovery member and cluster-wide pod defaults.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::component::{ClusterPodDefaults, ComponentAccessor, DiscoverySpec};
use crate::labels::INSTANCE_LABEL_KEY;

/// Plural resource name of the DatabaseCluster CRD (used in RBAC rules)
pub const DATABASE_CLUSTER_PLURAL: &str = "databaseclusters";

/// Timezone used when a cluster does not set one
pub const DEFAULT_TIMEZONE: &str = "UTC";

// =============================================================================
// Member specs
// =============================================================================

/// Coordination member (placement and membership metadata store)
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorSpec {
    /// Number of coordinator replicas run by this cluster
    #[serde(default)]
    pub replicas: i32,

    /// Coordinator image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Cluster-internal TLS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsClusterSpec {
    /// Enable mutual TLS between cluster members
    #[serde(default)]
    pub enabled: bool,
}

// =============================================================================
// CRD
// =============================================================================

/// Database cluster specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fathom.dev",
    version = "v1alpha1",
    kind = "DatabaseCluster",
    plural = "databaseclusters",
    shortname = "dbc",
    namespaced,
    printcolumn = r#"{"name":"Coordinators","type":"integer","jsonPath":".spec.coordinator.replicas"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseClusterSpec {
    /// Coordination member. `None` when the cluster joins coordinators
    /// running elsewhere.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorSpec>,

    /// The cluster spans several Kubernetes clusters
    #[serde(default)]
    pub across_clusters: bool,

    /// Discovery member
    #[serde(default)]
    pub discovery: DiscoverySpec,

    /// Cluster-internal TLS
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_cluster: Option<TlsClusterSpec>,

    /// Prefer IPv6 for cluster services
    #[serde(default, rename = "preferIPv6")]
    pub prefer_ipv6: bool,

    /// Timezone for member processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Pod defaults for every member
    #[serde(flatten)]
    pub pod_defaults: ClusterPodDefaults,
}

impl DatabaseCluster {
    /// Discovery is needed when coordinators run locally or the cluster
    /// spans several Kubernetes clusters.
    pub fn needs_discovery(&self) -> bool {
        self.spec.coordinator.is_some() || self.spec.across_clusters
    }

    /// Whether cluster-internal TLS is enabled
    pub fn is_tls_cluster_enabled(&self) -> bool {
        self.spec
            .tls_cluster
            .as_ref()
            .map(|tls| tls.enabled)
            .unwrap_or(false)
    }

    /// True when no coordinator replicas run in this cluster object
    pub fn without_local_coordinator(&self) -> bool {
        self.spec
            .coordinator
            .as_ref()
            .map(|c| c.replicas == 0)
            .unwrap_or(true)
    }

    /// Effective timezone
    pub fn timezone(&self) -> &str {
        self.spec.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
    }

    /// Instance name used for labels; the `instance` label wins over the object name
    pub fn instance_name(&self) -> String {
        self.labels()
            .get(INSTANCE_LABEL_KEY)
            .cloned()
            .unwrap_or_else(|| self.name_any())
    }

    /// Accessor for discovery pod settings
    pub fn base_discovery_spec(&self) -> ComponentAccessor<'_> {
        ComponentAccessor::new(&self.spec.pod_defaults, &self.spec.discovery.component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(spec: DatabaseClusterSpec) -> DatabaseCluster {
        DatabaseCluster::new("basic", spec)
    }

    #[test]
    fn discovery_needed_with_local_coordinator() {
        let c = cluster(DatabaseClusterSpec {
            coordinator: Some(CoordinatorSpec {
                replicas: 3,
                image: None,
            }),
            ..Default::default()
        });
        assert!(c.needs_discovery());
        assert!(!c.without_local_coordinator());
    }

    #[test]
    fn discovery_needed_across_clusters_without_coordinator() {
        let c = cluster(DatabaseClusterSpec {
            across_clusters: true,
            ..Default::default()
        });
        assert!(c.needs_discovery());
        assert!(c.without_local_coordinator());
    }

    #[test]
    fn discovery_not_needed_for_bare_cluster() {
        let c = cluster(DatabaseClusterSpec::default());
        assert!(!c.needs_discovery());
    }

    #[test]
    fn zero_replica_coordinator_is_not_local() {
        let c = cluster(DatabaseClusterSpec {
            coordinator: Some(CoordinatorSpec::default()),
            ..Default::default()
        });
        assert!(c.needs_discovery());
        assert!(c.without_local_coordinator());
    }

    #[test]
    fn tls_and_timezone_defaults() {
        let mut c = cluster(DatabaseClusterSpec::default());
        assert!(!c.is_tls_cluster_enabled());
        assert_eq!(c.timezone(), "UTC");

        c.spec.tls_cluster = Some(TlsClusterSpec { enabled: true });
        c.spec.timezone = Some("Asia/Shanghai".to_string());
        assert!(c.is_tls_cluster_enabled());
        assert_eq!(c.timezone(), "Asia/Shanghai");
    }

    #[test]
    fn instance_label_overrides_name() {
        let mut c = cluster(DatabaseClusterSpec::default());
        assert_eq!(c.instance_name(), "basic");

        c.labels_mut()
            .insert(INSTANCE_LABEL_KEY.to_string(), "shared".to_string());
        assert_eq!(c.instance_name(), "shared");
    }

    #[test]
    fn spec_round_trips_camel_case_fields() {
        let json = serde_json::json!({
            "acrossClusters": true,
            "preferIPv6": true,
            "tlsCluster": {"enabled": true},
            "imagePullPolicy": "Always",
            "discovery": {"labels": {"x": "y"}}
        });
        let spec: DatabaseClusterSpec = serde_json::from_value(json).unwrap();
        assert!(spec.across_clusters);
        assert!(spec.prefer_ipv6);
        assert_eq!(spec.pod_defaults.image_pull_policy.as_deref(), Some("Always"));
        assert_eq!(spec.discovery.component.pod.labels.len(), 1);
    }
}
