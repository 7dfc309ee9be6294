//! Applying discovery resources to the cluster
//!
//! All writes are server-side applies with a forced field manager, so each
//! call is idempotent and converges regardless of the object's prior state.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use fathom_common::kube_utils::with_owner_reference;
use fathom_common::{Error, FIELD_MANAGER};

use crate::deployment::deployment_fingerprint;

/// Create-or-update for each resource in the discovery bundle.
///
/// Every method makes sure `owner` is set on the object and returns the
/// object as stored by the API server.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DiscoveryApplier: Send + Sync {
    /// Apply the discovery Role
    async fn apply_role(&self, owner: &OwnerReference, role: Role) -> Result<Role, Error>;

    /// Apply the discovery ServiceAccount
    async fn apply_service_account(
        &self,
        owner: &OwnerReference,
        account: ServiceAccount,
    ) -> Result<ServiceAccount, Error>;

    /// Apply the discovery RoleBinding
    async fn apply_role_binding(
        &self,
        owner: &OwnerReference,
        binding: RoleBinding,
    ) -> Result<RoleBinding, Error>;

    /// Apply the discovery Deployment, keeping the live pod template when
    /// its fingerprint is unchanged
    async fn apply_deployment(
        &self,
        owner: &OwnerReference,
        deployment: Deployment,
    ) -> Result<Deployment, Error>;

    /// Apply the discovery Service
    async fn apply_service(
        &self,
        owner: &OwnerReference,
        service: Service,
    ) -> Result<Service, Error>;
}

/// Real Kubernetes implementation of [`DiscoveryApplier`]
pub struct KubeDiscoveryApplier {
    client: Client,
}

impl KubeDiscoveryApplier {
    /// Create a new applier wrapping the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn server_side_apply<K>(&self, owner: &OwnerReference, mut obj: K) -> Result<K, Error>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Debug
            + Serialize
            + DeserializeOwned,
    {
        let name = obj.name_any();
        let namespace = obj.namespace().ok_or_else(|| {
            Error::validation_for(
                owner.name.clone(),
                format!("{} {} has no namespace", K::kind(&()), name),
            )
        })?;

        let meta = std::mem::take(obj.meta_mut());
        *obj.meta_mut() = with_owner_reference(meta, owner);

        let applied = self
            .api::<K>(&namespace)
            .patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(&obj))
            .await?;

        debug!(kind = %K::kind(&()), name = %name, namespace = %namespace, "applied resource");
        Ok(applied)
    }
}

/// Keep the live pod template when the desired one has the same fingerprint.
///
/// The API server fills defaults into the live template, so re-submitting
/// the freshly built one would look like a change and restart the pod.
pub fn preserve_unchanged_template(mut desired: Deployment, live: Option<&Deployment>) -> Deployment {
    let Some(live) = live else {
        return desired;
    };
    let unchanged = matches!(
        (deployment_fingerprint(&desired), deployment_fingerprint(live)),
        (Some(d), Some(l)) if d == l
    );
    if !unchanged {
        return desired;
    }
    if let (Some(spec), Some(live_spec)) = (desired.spec.as_mut(), live.spec.as_ref()) {
        spec.template = live_spec.template.clone();
    }
    desired
}

#[async_trait]
impl DiscoveryApplier for KubeDiscoveryApplier {
    async fn apply_role(&self, owner: &OwnerReference, role: Role) -> Result<Role, Error> {
        self.server_side_apply(owner, role).await
    }

    async fn apply_service_account(
        &self,
        owner: &OwnerReference,
        account: ServiceAccount,
    ) -> Result<ServiceAccount, Error> {
        self.server_side_apply(owner, account).await
    }

    async fn apply_role_binding(
        &self,
        owner: &OwnerReference,
        binding: RoleBinding,
    ) -> Result<RoleBinding, Error> {
        self.server_side_apply(owner, binding).await
    }

    async fn apply_deployment(
        &self,
        owner: &OwnerReference,
        deployment: Deployment,
    ) -> Result<Deployment, Error> {
        let live = match deployment.namespace() {
            Some(ns) => {
                self.api::<Deployment>(&ns)
                    .get_opt(&deployment.name_any())
                    .await?
            }
            None => None,
        };
        let desired = preserve_unchanged_template(deployment, live.as_ref());
        self.server_side_apply(owner, desired).await
    }

    async fn apply_service(
        &self,
        owner: &OwnerReference,
        service: Service,
    ) -> Result<Service, Error> {
        self.server_side_apply(owner, service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_common::LAST_APPLIED_POD_TEMPLATE_ANNOTATION;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn deployment(fingerprint: &str, image: &str, restart_policy: Option<&str>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("basic-discovery".to_string()),
                namespace: Some("db".to_string()),
                annotations: Some(BTreeMap::from([(
                    LAST_APPLIED_POD_TEMPLATE_ANNOTATION.to_string(),
                    fingerprint.to_string(),
                )])),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "discovery".to_string(),
                            image: Some(image.to_string()),
                            ..Default::default()
                        }],
                        restart_policy: restart_policy.map(str::to_string),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn first_apply_submits_desired_template() {
        let desired = deployment("fp-1", "v1", None);
        assert_eq!(preserve_unchanged_template(desired.clone(), None), desired);
    }

    /// Story: the server defaulted fields into the live template; with an
    /// unchanged fingerprint the live template is kept so the pod isn't restarted
    #[test]
    fn story_unchanged_fingerprint_keeps_live_template() {
        let desired = deployment("fp-1", "v1", None);
        let live = deployment("fp-1", "v1", Some("Always"));
        let result = preserve_unchanged_template(desired, Some(&live));
        assert_eq!(result.spec.unwrap().template, live.spec.unwrap().template);
    }

    #[test]
    fn changed_fingerprint_submits_desired_template() {
        let desired = deployment("fp-2", "v2", None);
        let live = deployment("fp-1", "v1", Some("Always"));
        let result = preserve_unchanged_template(desired.clone(), Some(&live));
        assert_eq!(result, desired);
    }

    #[test]
    fn live_without_fingerprint_submits_desired_template() {
        let desired = deployment("fp-1", "v1", None);
        let mut live = deployment("fp-1", "v0", None);
        live.metadata.annotations = None;
        let result = preserve_unchanged_template(desired.clone(), Some(&live));
        assert_eq!(result, desired);
    }
}
