//! MigrationCluster CRD types
//!
//! A `MigrationCluster` runs data-migration tooling next to a database
//! cluster. It shares the discovery member shape with `DatabaseCluster` but
//! has no coordinator, TLS or IPv6 settings of its own.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::component::{ClusterPodDefaults, ComponentAccessor, DiscoverySpec};
use super::database_cluster::DEFAULT_TIMEZONE;
use crate::labels::INSTANCE_LABEL_KEY;

/// Plural resource name of the MigrationCluster CRD (used in RBAC rules)
pub const MIGRATION_CLUSTER_PLURAL: &str = "migrationclusters";

/// Migration cluster specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "fathom.dev",
    version = "v1alpha1",
    kind = "MigrationCluster",
    plural = "migrationclusters",
    shortname = "mgc",
    namespaced,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MigrationClusterSpec {
    /// Discovery member
    #[serde(default)]
    pub discovery: DiscoverySpec,

    /// Timezone for member processes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,

    /// Pod defaults for every member
    #[serde(flatten)]
    pub pod_defaults: ClusterPodDefaults,
}

impl MigrationCluster {
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

    #[test]
    fn defaults() {
        let c = MigrationCluster::new("basic", MigrationClusterSpec::default());
        assert_eq!(c.timezone(), "UTC");
        assert_eq!(c.instance_name(), "basic");
    }

    #[test]
    fn accessor_reads_cluster_defaults() {
        let mut c = MigrationCluster::new("basic", MigrationClusterSpec::default());
        c.spec.pod_defaults.image_pull_policy = Some("Always".to_string());
        assert_eq!(
            c.base_discovery_spec().image_pull_policy().as_deref(),
            Some("Always")
        );
    }
}
