//! RBAC for the discovery workload
//!
//! The discovery process reads its own cluster object (to poll status) and
//! the namespace's secrets (for certificate material). Nothing broader.

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use fathom_common::crd::GROUP_NAME;

use crate::cluster::ClusterVariant;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// `get` on exactly the owning cluster object
pub fn cluster_policy_rule(cluster: &ClusterVariant<'_>) -> PolicyRule {
    PolicyRule {
        api_groups: Some(vec![GROUP_NAME.to_string()]),
        resources: Some(vec![cluster.cluster_resource_plural().to_string()]),
        resource_names: Some(vec![cluster.name()]),
        verbs: vec!["get".to_string()],
        ..Default::default()
    }
}

/// Role granting `cluster_rule` plus read access to secrets
pub fn build_role(meta: &ObjectMeta, cluster_rule: PolicyRule) -> Role {
    Role {
        metadata: meta.clone(),
        rules: Some(vec![
            cluster_rule,
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec!["secrets".to_string()]),
                verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                ..Default::default()
            },
        ]),
    }
}

pub fn build_service_account(meta: &ObjectMeta) -> ServiceAccount {
    ServiceAccount {
        metadata: meta.clone(),
        ..Default::default()
    }
}

/// Bind the same-named ServiceAccount to the same-named Role
pub fn build_role_binding(meta: &ObjectMeta) -> RoleBinding {
    let name = meta.name.clone().unwrap_or_default();
    RoleBinding {
        metadata: meta.clone(),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "Role".to_string(),
            name: name.clone(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name,
            namespace: meta.namespace.clone(),
            api_group: None,
        }]),
    }
}
