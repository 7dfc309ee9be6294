//! Common types for Fathom: CRDs, errors, labels and Kubernetes helpers

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod labels;
pub mod telemetry;

pub use error::Error;

/// Annotation holding the serialized pod spec a Deployment was last built from
pub const LAST_APPLIED_POD_TEMPLATE_ANNOTATION: &str = "fathom.dev/last-applied-podtemplate";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "fathom-discovery-controller";
