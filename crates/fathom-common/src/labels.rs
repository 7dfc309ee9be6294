//! Label scheme shared by every resource the operator manages
//!
//! Labels follow the Kubernetes recommended label set. The `instance` label
//! ties a resource to its owning cluster object and `component` names the
//! member it belongs to, so selectors built from a [`Label`] only ever match
//! one member of one cluster.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

/// Standard label for the name of the application
pub const NAME_LABEL_KEY: &str = "app.kubernetes.io/name";

/// Standard label for the tool managing the resource
pub const MANAGED_BY_LABEL_KEY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the instance (owning cluster) of the application
pub const INSTANCE_LABEL_KEY: &str = "app.kubernetes.io/instance";

/// Standard label for the component within the cluster
pub const COMPONENT_LABEL_KEY: &str = "app.kubernetes.io/component";

/// `app.kubernetes.io/name` value for database cluster resources
pub const DATABASE_CLUSTER_NAME_VAL: &str = "database-cluster";

/// `app.kubernetes.io/name` value for migration cluster resources
pub const MIGRATION_CLUSTER_NAME_VAL: &str = "migration-cluster";

/// `app.kubernetes.io/managed-by` value for everything this operator creates
pub const MANAGED_BY_VAL: &str = "fathom-operator";

/// Component value for the discovery member
pub const DISCOVERY_LABEL_VAL: &str = "discovery";

/// Component value for the coordination member
pub const COORDINATOR_LABEL_VAL: &str = "coordinator";

/// An ordered label set with builder-style setters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Label(BTreeMap<String, String>);

impl Label {
    /// Base labels for resources belonging to a database cluster
    pub fn database() -> Self {
        Self::base(DATABASE_CLUSTER_NAME_VAL)
    }

    /// Base labels for resources belonging to a migration cluster
    pub fn migration() -> Self {
        Self::base(MIGRATION_CLUSTER_NAME_VAL)
    }

    fn base(name: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(NAME_LABEL_KEY.to_string(), name.to_string());
        labels.insert(MANAGED_BY_LABEL_KEY.to_string(), MANAGED_BY_VAL.to_string());
        Self(labels)
    }

    /// Set the instance label
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.0.insert(INSTANCE_LABEL_KEY.to_string(), instance.into());
        self
    }

    /// Set the component label
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.0.insert(COMPONENT_LABEL_KEY.to_string(), component.into());
        self
    }

    /// Mark as the discovery component
    pub fn discovery(self) -> Self {
        self.component(DISCOVERY_LABEL_VAL)
    }

    /// Borrow the label map
    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Owned copy of the label map
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.0.clone()
    }

    /// Selector matching exactly this label set
    pub fn label_selector(&self) -> LabelSelector {
        LabelSelector {
            match_labels: Some(self.labels()),
            ..Default::default()
        }
    }
}
