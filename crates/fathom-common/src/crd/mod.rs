//! Custom Resource Definitions for Fathom
//!
//! This module contains the cluster CRDs consumed by the discovery reconciler.

mod component;
mod database_cluster;
mod migration_cluster;

pub use component::{ClusterPodDefaults, ComponentAccessor, ComponentSpec, DiscoverySpec};
pub use database_cluster::{
    CoordinatorSpec, DatabaseCluster, DatabaseClusterSpec, TlsClusterSpec,
    DATABASE_CLUSTER_PLURAL, DEFAULT_TIMEZONE,
};
pub use migration_cluster::{MigrationCluster, MigrationClusterSpec, MIGRATION_CLUSTER_PLURAL};

/// API group of every Fathom CRD
pub const GROUP_NAME: &str = "fathom.dev";

/// API version of every Fathom CRD
pub const API_VERSION: &str = "fathom.dev/v1alpha1";
