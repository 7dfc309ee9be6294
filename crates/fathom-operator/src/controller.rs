//! Controllers wiring the cluster CRDs to the discovery reconciler

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, ResourceExt};
use tracing::{error, info};

use fathom_common::crd::{DatabaseCluster, MigrationCluster};
use fathom_common::Error;
use fathom_discovery::{ClusterVariant, DiscoveryManager};

/// Watcher timeout (seconds), kept below the client's 30s read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Periodic resync for clusters that reconciled successfully
const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Delay before retrying a retryable failure
const RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Shared context for both cluster controllers
pub struct Context {
    /// Discovery reconciler
    pub manager: DiscoveryManager,
}

impl Context {
    /// Create a new context around a discovery manager
    pub fn new(manager: DiscoveryManager) -> Self {
        Self { manager }
    }
}

/// Reconcile discovery for a DatabaseCluster
pub async fn reconcile_database_cluster(
    cluster: Arc<DatabaseCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    ctx.manager
        .reconcile(&ClusterVariant::Primary(&cluster))
        .await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Reconcile discovery for a MigrationCluster
pub async fn reconcile_migration_cluster(
    cluster: Arc<MigrationCluster>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    ctx.manager
        .reconcile(&ClusterVariant::Migration(&cluster))
        .await?;
    Ok(Action::requeue(RESYNC_INTERVAL))
}

/// Error policy shared by both controllers
pub fn error_policy<K: ResourceExt>(cluster: Arc<K>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        cluster = %cluster.name_any(),
        namespace = %cluster.namespace().unwrap_or_default(),
        context = error.context().or(error.cluster()).unwrap_or_default(),
        retryable = error.is_retryable(),
        "discovery reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(RETRY_INTERVAL)
    } else {
        Action::await_change()
    }
}

fn cluster_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Build the DatabaseCluster and MigrationCluster controller futures
pub fn build_controllers(
    client: Client,
    ctx: Arc<Context>,
    watch_namespace: Option<&str>,
) -> Vec<Pin<Box<dyn Future<Output = ()> + Send>>> {
    let watcher = || WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    info!("- DatabaseCluster controller");
    let databases = Controller::new(
        cluster_api::<DatabaseCluster>(client.clone(), watch_namespace),
        watcher(),
    )
    .shutdown_on_signal()
    .run(
        reconcile_database_cluster,
        error_policy::<DatabaseCluster>,
        ctx.clone(),
    )
    .for_each(log_reconcile_result("DatabaseCluster"));

    info!("- MigrationCluster controller");
    let migrations = Controller::new(
        cluster_api::<MigrationCluster>(client, watch_namespace),
        watcher(),
    )
    .shutdown_on_signal()
    .run(
        reconcile_migration_cluster,
        error_policy::<MigrationCluster>,
        ctx,
    )
    .for_each(log_reconcile_result("MigrationCluster"));

    vec![Box::pin(databases), Box::pin(migrations)]
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
