//! Discovery Service builder

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use fathom_common::Error;

use crate::cluster::ClusterVariant;
use crate::deployment::{DISCOVERY_PORT, DISCOVERY_PORT_NAME, PROXY_PORT, PROXY_PORT_NAME};
use crate::meta::{discovery_member_name, discovery_meta};

/// Build the ClusterIP Service in front of the discovery pods.
///
/// The selector is taken from `deployment`'s pod template, which should be
/// the Deployment as returned by the API server rather than the desired one.
pub fn build_service(
    cluster: &ClusterVariant<'_>,
    deployment: &Deployment,
    prefer_ipv6: bool,
) -> Result<Service, Error> {
    let (meta, _) = discovery_meta(cluster, discovery_member_name)?;
    let selector = deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.metadata.as_ref())
        .and_then(|m| m.labels.clone())
        .ok_or_else(|| {
            Error::validation_for(
                cluster.name(),
                "discovery deployment has no pod template labels",
            )
        })?;

    let mut service = Service {
        metadata: meta,
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            ports: Some(vec![
                service_port(DISCOVERY_PORT_NAME, DISCOVERY_PORT),
                service_port(PROXY_PORT_NAME, PROXY_PORT),
            ]),
            selector: Some(selector),
            ..Default::default()
        }),
        status: None,
    };
    if prefer_ipv6 {
        set_service_prefer_ipv6(&mut service);
    }
    Ok(service)
}

/// Ask for a dual-stack Service with IPv6 as the primary family
pub fn set_service_prefer_ipv6(service: &mut Service) {
    let spec = service.spec.get_or_insert_with(Default::default);
    spec.ip_family_policy = Some("PreferDualStack".to_string());
    spec.ip_families = Some(vec!["IPv6".to_string(), "IPv4".to_string()]);
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(port)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}
