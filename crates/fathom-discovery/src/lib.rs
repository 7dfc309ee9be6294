//! Discovery service reconciler for Fathom clusters
//!
//! Every database cluster that runs coordinators (or spans several
//! Kubernetes clusters), and every migration cluster, gets a discovery
//! workload: a Role, ServiceAccount and RoleBinding, a single-replica
//! Deployment, and a Service in front of it. [`DiscoveryManager`] builds
//! those objects and applies them through a [`DiscoveryApplier`].
//!
//! Typed controllers call [`DiscoveryManager::reconcile`] with a
//! [`ClusterVariant`]. Callers that watch untyped objects (a
//! `DynamicObject` watcher over several cluster kinds, for instance) hand
//! them to [`DiscoveryManager::reconcile_dynamic`] instead. It decodes the
//! object through [`ClusterObject::from_dynamic`] and skips kinds it does
//! not know.

pub mod applier;
pub mod cluster;
pub mod deployment;
pub mod merge;
pub mod meta;
pub mod rbac;
pub mod service;

mod manager;

pub use applier::{DiscoveryApplier, KubeDiscoveryApplier};
pub use cluster::{ClusterObject, ClusterVariant};
pub use deployment::{DeploymentBuilder, DiscoveryConfig, DEFAULT_DISCOVERY_IMAGE};
pub use manager::DiscoveryManager;
