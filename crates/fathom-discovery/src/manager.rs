//! Discovery reconciler
//!
//! Builds the discovery bundle for a cluster and applies it in dependency
//! order: Role, ServiceAccount, RoleBinding, Deployment, then the Service
//! built from the Deployment as it was actually stored.

use std::sync::Arc;

use kube::api::DynamicObject;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use fathom_common::Error;

use crate::applier::DiscoveryApplier;
use crate::cluster::{ClusterObject, ClusterVariant};
use crate::deployment::DeploymentBuilder;
use crate::meta::{discovery_member_name, discovery_meta};
use crate::rbac::{build_role, build_role_binding, build_service_account, cluster_policy_rule};
use crate::service::build_service;

/// Reconciles the discovery bundle of database and migration clusters
pub struct DiscoveryManager {
    applier: Arc<dyn DiscoveryApplier>,
    builder: DeploymentBuilder,
}

impl DiscoveryManager {
    /// Create a manager applying through `applier`
    pub fn new(applier: Arc<dyn DiscoveryApplier>, builder: DeploymentBuilder) -> Self {
        Self { applier, builder }
    }

    /// Reconcile an untyped object; objects of other kinds are skipped
    pub async fn reconcile_dynamic(&self, obj: &DynamicObject) -> Result<(), Error> {
        match ClusterObject::from_dynamic(obj).map_err(|e| requeue("cluster object", e))? {
            Some(cluster) => self.reconcile(&cluster.as_variant()).await,
            None => {
                let kind = obj.types.as_ref().map(|t| t.kind.as_str()).unwrap_or("<none>");
                warn!(kind = %kind, name = %obj.name_any(), "skipping unsupported cluster type");
                Ok(())
            }
        }
    }

    /// Converge the discovery resources of `cluster`.
    ///
    /// Every failure is returned as a retryable requeue error; resources
    /// applied before the failure stay in place.
    pub async fn reconcile(&self, cluster: &ClusterVariant<'_>) -> Result<(), Error> {
        if !cluster.needs_discovery() {
            debug!(cluster = %cluster.name(), "discovery not needed");
            return Ok(());
        }

        let namespace = cluster.namespace().map_err(|e| requeue("namespace", e))?;
        info!(
            cluster = %cluster.name(),
            namespace = %namespace,
            kind = cluster.kind(),
            "reconciling discovery"
        );

        let (meta, _) = discovery_meta(cluster, discovery_member_name)
            .map_err(|e| requeue("meta", e))?;
        let owner = cluster.owner_reference().map_err(|e| requeue("owner reference", e))?;

        let role = build_role(&meta, cluster_policy_rule(cluster));
        self.applier
            .apply_role(&owner, role)
            .await
            .map_err(|e| create_or_update("role", e))?;

        self.applier
            .apply_service_account(&owner, build_service_account(&meta))
            .await
            .map_err(|e| create_or_update("serviceaccount", e))?;

        self.applier
            .apply_role_binding(&owner, build_role_binding(&meta))
            .await
            .map_err(|e| create_or_update("rolebinding", e))?;
        debug!(cluster = %cluster.name(), "discovery rbac applied");

        let desired = self
            .builder
            .build(cluster)
            .map_err(|e| requeue("deployment spec", e))?;
        let applied = self
            .applier
            .apply_deployment(&owner, desired)
            .await
            .map_err(|e| create_or_update("deployment", e))?;

        let service = build_service(cluster, &applied, cluster.prefer_ipv6())
            .map_err(|e| requeue("service spec", e))?;
        self.applier
            .apply_service(&owner, service)
            .await
            .map_err(|e| create_or_update("service", e))?;

        info!(cluster = %cluster.name(), namespace = %namespace, "discovery reconciled");
        Ok(())
    }
}

fn create_or_update(kind: &str, err: Error) -> Error {
    Error::requeue(format!("error creating or updating discovery {}: {}", kind, err))
}

fn requeue(what: &str, err: Error) -> Error {
    Error::requeue(format!("error building discovery {}: {}", what, err))
}
