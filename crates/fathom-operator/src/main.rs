//! Fathom operator - runs the discovery controllers for database and
//! migration clusters

mod controller;

use std::sync::Arc;

use clap::Parser;
use kube::{Client, CustomResourceExt};

use fathom_common::crd::{DatabaseCluster, MigrationCluster};
use fathom_common::telemetry::{init_telemetry, TelemetryConfig};
use fathom_discovery::{
    DeploymentBuilder, DiscoveryConfig, DiscoveryManager, KubeDiscoveryApplier,
    DEFAULT_DISCOVERY_IMAGE,
};

use crate::controller::{build_controllers, Context};

/// Fathom - discovery service operator for database clusters
#[derive(Parser, Debug)]
#[command(name = "fathom-operator", version, about, long_about = None)]
struct Cli {
    /// Generate CRD manifests and exit
    #[arg(long)]
    crd: bool,

    /// Image for discovery workloads
    #[arg(long, env = "DISCOVERY_IMAGE", default_value = DEFAULT_DISCOVERY_IMAGE)]
    discovery_image: String,

    /// Only watch clusters in this namespace (all namespaces when unset)
    #[arg(long, env = "WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        for crd in [DatabaseCluster::crd(), MigrationCluster::crd()] {
            let yaml = serde_yaml::to_string(&crd)
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("---\n{yaml}");
        }
        return Ok(());
    }

    init_telemetry(&TelemetryConfig {
        service_name: "fathom-operator".to_string(),
        json: cli.log_json,
    })?;

    run_controllers(cli).await
}

async fn run_controllers(cli: Cli) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let config = DiscoveryConfig {
        image: cli.discovery_image,
    };
    tracing::info!(
        image = %config.image,
        namespace = cli.watch_namespace.as_deref().unwrap_or("<all>"),
        "Starting Fathom discovery controllers"
    );

    let manager = DiscoveryManager::new(
        Arc::new(KubeDiscoveryApplier::new(client.clone())),
        DeploymentBuilder::new(config),
    );
    let ctx = Arc::new(Context::new(manager));

    let controllers = build_controllers(client, ctx, cli.watch_namespace.as_deref());
    // The first controller to end, normally on the shutdown signal, ends the process
    let (_, index, _) = futures::future::select_all(controllers).await;
    tracing::info!(controller = index, "Controller completed");

    tracing::info!("Fathom operator shutting down");
    Ok(())
}
