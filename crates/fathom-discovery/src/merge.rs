//! Container merge-patch
//!
//! User-supplied containers are merged into the built ones by name. A
//! matching container is deep-merged with strategic-merge semantics for the
//! keyed container lists; everything else follows JSON merge patch
//! (RFC 7386). Containers with new names are appended.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::Container;
use serde_json::Value;

use fathom_common::Error;

/// Container list fields merged element-wise, with the key identifying an element
const KEYED_LISTS: &[(&str, &str)] = &[
    ("env", "name"),
    ("ports", "containerPort"),
    ("volumeMounts", "mountPath"),
    ("volumeDevices", "devicePath"),
];

/// Merge `overrides` into `base` by container name.
///
/// Result order is base order followed by new overrides in their order.
pub fn merge_patch_containers(
    base: Vec<Container>,
    overrides: &[Container],
) -> Result<Vec<Container>, Error> {
    ensure_unique_names(&base, "base")?;
    ensure_unique_names(overrides, "override")?;

    let mut merged = base;
    for patch in overrides {
        match merged.iter_mut().find(|c| c.name == patch.name) {
            Some(existing) => *existing = merge_container(existing, patch)?,
            None => merged.push(patch.clone()),
        }
    }
    Ok(merged)
}

fn ensure_unique_names(containers: &[Container], side: &str) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for c in containers {
        if !seen.insert(c.name.as_str()) {
            return Err(Error::merge_patch(format!(
                "duplicate container name {:?} in {} containers",
                c.name, side
            )));
        }
    }
    Ok(())
}

fn merge_container(base: &Container, patch: &Container) -> Result<Container, Error> {
    let mut target = to_value(base)?;
    let mut patch = to_value(patch)?;

    let mut keyed = Vec::new();
    if let Some(obj) = patch.as_object_mut() {
        for (field, key) in KEYED_LISTS {
            if let Some(items) = obj.remove(*field) {
                keyed.push((*field, *key, items));
            }
        }
    }

    json_patch::merge(&mut target, &patch);
    for (field, key, items) in keyed {
        merge_keyed_list(&mut target, field, key, &items);
    }

    serde_json::from_value(target).map_err(|e| {
        Error::merge_patch(format!("merged container {:?} is invalid: {}", base.name, e))
    })
}

/// Merge `items` into `target[field]` element-wise by `key`.
///
/// A non-array or null patch replaces the field like a plain merge patch.
fn merge_keyed_list(target: &mut Value, field: &str, key: &str, items: &Value) {
    let Some(obj) = target.as_object_mut() else {
        return;
    };
    let Some(patch_items) = items.as_array() else {
        match items {
            Value::Null => obj.remove(field),
            other => obj.insert(field.to_string(), other.clone()),
        };
        return;
    };

    let list = obj
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !list.is_array() {
        *list = Value::Array(Vec::new());
    }
    let Some(list) = list.as_array_mut() else {
        return;
    };

    for item in patch_items {
        let existing = item
            .get(key)
            .and_then(|k| list.iter_mut().find(|e| e.get(key) == Some(k)));
        match existing {
            Some(e) => json_patch::merge(e, item),
            None => list.push(item.clone()),
        }
    }
}

fn to_value(c: &Container) -> Result<Value, Error> {
    serde_json::to_value(c).map_err(|e| Error::serialization_for_kind("Container", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerPort, EnvVar, VolumeMount};

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    fn discovery() -> Container {
        Container {
            name: "discovery".to_string(),
            image: Some("discovery:v1".to_string()),
            command: Some(vec!["/usr/local/bin/fathom-discovery".to_string()]),
            env: Some(vec![env("TZ", "UTC"), env("CLUSTER_NAME", "basic")]),
            ports: Some(vec![ContainerPort {
                name: Some("discovery".to_string()),
                container_port: 10261,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn no_overrides_is_identity() {
        let merged = merge_patch_containers(vec![discovery()], &[]).unwrap();
        assert_eq!(merged, vec![discovery()]);
    }

    /// Story: a user overrides the image and adds an env var to the built
    /// discovery container while keeping everything else it was built with
    #[test]
    fn story_override_deep_merges_matching_container() {
        let patch = Container {
            name: "discovery".to_string(),
            image: Some("discovery:v2".to_string()),
            env: Some(vec![env("TZ", "Asia/Tokyo"), env("EXTRA", "1")]),
            ..Default::default()
        };
        let merged = merge_patch_containers(vec![discovery()], &[patch]).unwrap();

        assert_eq!(merged.len(), 1);
        let c = &merged[0];
        assert_eq!(c.image.as_deref(), Some("discovery:v2"));
        assert_eq!(c.command, discovery().command);
        assert_eq!(
            c.env,
            Some(vec![
                env("TZ", "Asia/Tokyo"),
                env("CLUSTER_NAME", "basic"),
                env("EXTRA", "1")
            ])
        );
        assert_eq!(c.ports, discovery().ports);
    }

    #[test]
    fn ports_merge_by_container_port() {
        let patch = Container {
            name: "discovery".to_string(),
            ports: Some(vec![
                ContainerPort {
                    container_port: 10261,
                    host_port: Some(30261),
                    ..Default::default()
                },
                ContainerPort {
                    name: Some("metrics".to_string()),
                    container_port: 9090,
                    ..Default::default()
                },
            ]),
            ..Default::default()
        };
        let merged = merge_patch_containers(vec![discovery()], &[patch]).unwrap();
        let ports = merged[0].ports.clone().unwrap();

        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].name.as_deref(), Some("discovery"));
        assert_eq!(ports[0].host_port, Some(30261));
        assert_eq!(ports[1].container_port, 9090);
    }

    #[test]
    fn volume_mounts_added_to_container_without_any() {
        let patch = Container {
            name: "discovery".to_string(),
            volume_mounts: Some(vec![VolumeMount {
                name: "extra".to_string(),
                mount_path: "/extra".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };
        let merged = merge_patch_containers(vec![discovery()], &[patch]).unwrap();
        let mounts = merged[0].volume_mounts.clone().unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/extra");
    }

    #[test]
    fn new_containers_are_appended_in_order() {
        let sidecar = |name: &str| Container {
            name: name.to_string(),
            image: Some("busybox".to_string()),
            ..Default::default()
        };
        let merged =
            merge_patch_containers(vec![discovery()], &[sidecar("b"), sidecar("a")]).unwrap();
        let names: Vec<_> = merged.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["discovery", "b", "a"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = merge_patch_containers(vec![discovery(), discovery()], &[]).unwrap_err();
        assert!(matches!(err, Error::MergePatch { .. }));

        let patch = Container {
            name: "x".to_string(),
            ..Default::default()
        };
        let err =
            merge_patch_containers(vec![discovery()], &[patch.clone(), patch]).unwrap_err();
        assert!(matches!(err, Error::MergePatch { .. }));
        assert!(!err.is_retryable());
    }
}
