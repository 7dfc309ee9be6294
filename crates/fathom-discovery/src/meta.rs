//! Discovery resource metadata
//!
//! Name, namespace, labels and owner reference shared by every resource in
//! the discovery bundle.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use fathom_common::labels::Label;
use fathom_common::Error;

use crate::cluster::ClusterVariant;

/// Suffix added to migration cluster names so their discovery resources
/// never collide with a same-named database cluster in the namespace
const MIGRATION_NAME_SUFFIX: &str = "dm";

/// Name of the discovery member for a cluster base name
pub fn discovery_member_name(cluster_name: &str) -> String {
    format!("{}-discovery", cluster_name)
}

/// Derive metadata and the label set for discovery resources.
///
/// `name_fn` maps the (variant-suffixed) cluster name to a resource name.
pub fn discovery_meta(
    cluster: &ClusterVariant<'_>,
    name_fn: impl Fn(&str) -> String,
) -> Result<(ObjectMeta, Label), Error> {
    let (name, instance) = match cluster {
        ClusterVariant::Primary(_) => (cluster.name(), cluster.instance_name()),
        ClusterVariant::Migration(_) => (
            format!("{}-{}", cluster.name(), MIGRATION_NAME_SUFFIX),
            format!("{}-{}", cluster.instance_name(), MIGRATION_NAME_SUFFIX),
        ),
    };
    let label = cluster.base_label().instance(instance).discovery();

    let meta = ObjectMeta {
        name: Some(name_fn(&name)),
        namespace: Some(cluster.namespace()?),
        labels: Some(label.labels()),
        owner_references: Some(vec![cluster.owner_reference()?]),
        ..Default::default()
    };
    Ok((meta, label))
}
