//! Cluster variants served by the discovery reconciler
//!
//! Both CRDs are folded into one flat sum type. Every policy decision that
//! differs between variants (naming suffix, RBAC resource, TLS wiring,
//! IPv6) is answered by a `match` here, so builders never inspect the
//! concrete CRD themselves.

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::ResourceExt;

use fathom_common::crd::{
    ComponentAccessor, DatabaseCluster, MigrationCluster, API_VERSION, DATABASE_CLUSTER_PLURAL,
    MIGRATION_CLUSTER_PLURAL,
};
use fathom_common::kube_utils::owner_reference;
use fathom_common::labels::Label;
use fathom_common::Error;

/// Kind of the primary database cluster CRD
pub const DATABASE_CLUSTER_KIND: &str = "DatabaseCluster";

/// Kind of the migration cluster CRD
pub const MIGRATION_CLUSTER_KIND: &str = "MigrationCluster";

/// A borrowed cluster object of one of the supported variants
#[derive(Clone, Copy, Debug)]
pub enum ClusterVariant<'a> {
    /// Primary database cluster
    Primary(&'a DatabaseCluster),
    /// Data-migration cluster
    Migration(&'a MigrationCluster),
}

impl<'a> ClusterVariant<'a> {
    /// Object name
    pub fn name(&self) -> String {
        match self {
            Self::Primary(c) => c.name_any(),
            Self::Migration(c) => c.name_any(),
        }
    }

    /// Object namespace; cluster CRDs are namespaced so a missing one is invalid
    pub fn namespace(&self) -> Result<String, Error> {
        let ns = match self {
            Self::Primary(c) => c.namespace(),
            Self::Migration(c) => c.namespace(),
        };
        ns.ok_or_else(|| Error::validation_for(self.name(), "cluster object has no namespace"))
    }

    /// CRD kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primary(_) => DATABASE_CLUSTER_KIND,
            Self::Migration(_) => MIGRATION_CLUSTER_KIND,
        }
    }

    /// Instance name (before any variant suffix)
    pub fn instance_name(&self) -> String {
        match self {
            Self::Primary(c) => c.instance_name(),
            Self::Migration(c) => c.instance_name(),
        }
    }

    /// Base label set for this variant
    pub fn base_label(&self) -> Label {
        match self {
            Self::Primary(_) => Label::database(),
            Self::Migration(_) => Label::migration(),
        }
    }

    /// Controller owner reference to the cluster object
    pub fn owner_reference(&self) -> Result<OwnerReference, Error> {
        match self {
            Self::Primary(c) => owner_reference(*c),
            Self::Migration(c) => owner_reference(*c),
        }
    }

    /// Resource requirements for the discovery container
    pub fn discovery_resources(&self) -> Option<&'a ResourceRequirements> {
        match *self {
            Self::Primary(c) => c.spec.discovery.resources.as_ref(),
            Self::Migration(c) => c.spec.discovery.resources.as_ref(),
        }
    }

    /// Timezone for the discovery process
    pub fn timezone(&self) -> &'a str {
        match *self {
            Self::Primary(c) => c.timezone(),
            Self::Migration(c) => c.timezone(),
        }
    }

    /// Accessor for the discovery member's pod settings
    pub fn base_discovery_spec(&self) -> ComponentAccessor<'a> {
        match *self {
            Self::Primary(c) => c.base_discovery_spec(),
            Self::Migration(c) => c.base_discovery_spec(),
        }
    }

    /// Plural of the cluster CRD, used to scope the discovery Role
    pub fn cluster_resource_plural(&self) -> &'static str {
        match self {
            Self::Primary(_) => DATABASE_CLUSTER_PLURAL,
            Self::Migration(_) => MIGRATION_CLUSTER_PLURAL,
        }
    }

    /// Whether this cluster runs a discovery workload at all
    pub fn needs_discovery(&self) -> bool {
        match self {
            Self::Primary(c) => c.needs_discovery(),
            Self::Migration(_) => true,
        }
    }

    /// Whether the discovery Service should prefer IPv6
    pub fn prefer_ipv6(&self) -> bool {
        match self {
            Self::Primary(c) => c.spec.prefer_ipv6,
            Self::Migration(_) => false,
        }
    }

    /// Whether the discovery container must mount the coordinator TLS secret
    pub fn coordinator_tls(&self) -> bool {
        match self {
            Self::Primary(c) => c.is_tls_cluster_enabled() && !c.without_local_coordinator(),
            Self::Migration(_) => false,
        }
    }
}

/// An owned cluster object decoded from an untyped API object
#[derive(Clone, Debug)]
pub enum ClusterObject {
    /// Primary database cluster
    Primary(DatabaseCluster),
    /// Data-migration cluster
    Migration(MigrationCluster),
}

impl ClusterObject {
    /// Decode a dynamic object into a supported cluster variant.
    ///
    /// Returns `Ok(None)` for objects of any other type.
    pub fn from_dynamic(obj: &DynamicObject) -> Result<Option<Self>, Error> {
        let Some(types) = obj.types.as_ref() else {
            return Ok(None);
        };
        if types.api_version != API_VERSION {
            return Ok(None);
        }

        let decode = |kind: &str| {
            serde_json::to_value(obj)
                .map_err(|e| Error::serialization_for_kind(kind, e.to_string()))
        };
        match types.kind.as_str() {
            DATABASE_CLUSTER_KIND => {
                let value = decode(DATABASE_CLUSTER_KIND)?;
                serde_json::from_value(value)
                    .map(|c| Some(Self::Primary(c)))
                    .map_err(|e| Error::serialization_for_kind(DATABASE_CLUSTER_KIND, e.to_string()))
            }
            MIGRATION_CLUSTER_KIND => {
                let value = decode(MIGRATION_CLUSTER_KIND)?;
                serde_json::from_value(value)
                    .map(|c| Some(Self::Migration(c)))
                    .map_err(|e| {
                        Error::serialization_for_kind(MIGRATION_CLUSTER_KIND, e.to_string())
                    })
            }
            _ => Ok(None),
        }
    }

    /// Borrow as a variant
    pub fn as_variant(&self) -> ClusterVariant<'_> {
        match self {
            Self::Primary(c) => ClusterVariant::Primary(c),
            Self::Migration(c) => ClusterVariant::Migration(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_common::crd::{
        CoordinatorSpec, DatabaseClusterSpec, MigrationClusterSpec, TlsClusterSpec,
    };
    use kube::api::{ApiResource, GroupVersionKind};

    fn primary(spec: DatabaseClusterSpec) -> DatabaseCluster {
        let mut c = DatabaseCluster::new("basic", spec);
        c.metadata.namespace = Some("db".to_string());
        c.metadata.uid = Some("uid-primary".to_string());
        c
    }

    fn dynamic(api_version: &str, kind: &str, spec: serde_json::Value) -> DynamicObject {
        let (group, version) = api_version.split_once('/').unwrap_or(("", api_version));
        let ar = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, kind));
        let mut obj = DynamicObject::new("basic", &ar).within("db");
        obj.data = serde_json::json!({ "spec": spec });
        obj
    }

    #[test]
    fn tls_requires_enabled_flag_and_local_coordinator() {
        let mut spec = DatabaseClusterSpec {
            coordinator: Some(CoordinatorSpec {
                replicas: 3,
                image: None,
            }),
            tls_cluster: Some(TlsClusterSpec { enabled: true }),
            ..Default::default()
        };
        assert!(ClusterVariant::Primary(&primary(spec.clone())).coordinator_tls());

        spec.coordinator = None;
        spec.across_clusters = true;
        assert!(!ClusterVariant::Primary(&primary(spec.clone())).coordinator_tls());

        spec.tls_cluster = None;
        assert!(!ClusterVariant::Primary(&primary(spec)).coordinator_tls());
    }

    #[test]
    fn migration_always_needs_discovery_and_never_tls() {
        let m = MigrationCluster::new("basic", MigrationClusterSpec::default());
        let v = ClusterVariant::Migration(&m);
        assert!(v.needs_discovery());
        assert!(!v.coordinator_tls());
        assert!(!v.prefer_ipv6());
        assert_eq!(v.cluster_resource_plural(), "migrationclusters");
        assert_eq!(v.kind(), "MigrationCluster");
    }

    #[test]
    fn missing_namespace_is_a_validation_error() {
        let m = MigrationCluster::new("basic", MigrationClusterSpec::default());
        let err = ClusterVariant::Migration(&m).namespace().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn decodes_database_cluster_from_dynamic() {
        let obj = dynamic(
            "fathom.dev/v1alpha1",
            "DatabaseCluster",
            serde_json::json!({ "coordinator": { "replicas": 1 }, "preferIPv6": true }),
        );
        let decoded = ClusterObject::from_dynamic(&obj).unwrap().unwrap();
        let v = decoded.as_variant();
        assert_eq!(v.kind(), "DatabaseCluster");
        assert_eq!(v.namespace().unwrap(), "db");
        assert!(v.prefer_ipv6());
    }

    #[test]
    fn decodes_migration_cluster_from_dynamic() {
        let obj = dynamic(
            "fathom.dev/v1alpha1",
            "MigrationCluster",
            serde_json::json!({ "timezone": "Europe/Paris" }),
        );
        let decoded = ClusterObject::from_dynamic(&obj).unwrap().unwrap();
        assert_eq!(decoded.as_variant().timezone(), "Europe/Paris");
    }

    #[test]
    fn unknown_kinds_are_not_decoded() {
        let obj = dynamic("apps/v1", "Deployment", serde_json::json!({}));
        assert!(ClusterObject::from_dynamic(&obj).unwrap().is_none());

        let obj = dynamic("fathom.dev/v1alpha1", "BackupSchedule", serde_json::json!({}));
        assert!(ClusterObject::from_dynamic(&obj).unwrap().is_none());
    }

    #[test]
    fn malformed_known_kind_is_a_serialization_error() {
        let obj = dynamic(
            "fathom.dev/v1alpha1",
            "DatabaseCluster",
            serde_json::json!({ "coordinator": { "replicas": "three" } }),
        );
        let err = ClusterObject::from_dynamic(&obj).unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
