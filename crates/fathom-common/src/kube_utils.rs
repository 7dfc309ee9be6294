//! Shared Kubernetes object helpers
//!
//! Small value-returning transforms over k8s-openapi types used by every
//! resource builder: map/env merging, owner references and container
//! resource sanitising.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{EnvVar, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::Error;

/// Resource key that only applies to volumes and must not reach a container
const STORAGE_RESOURCE_KEY: &str = "storage";

/// Combine two string maps; entries in `overrides` win on key collision
pub fn combine_string_maps(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut combined = base.clone();
    combined.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    combined
}

/// Merge environment variables by name.
///
/// An override replaces the base entry with the same name in place. Names
/// the base doesn't have are appended in override order; if `overrides`
/// repeats a name the last entry wins.
pub fn env_merge(base: &[EnvVar], overrides: &[EnvVar]) -> Vec<EnvVar> {
    let mut merged = base.to_vec();
    for env in overrides {
        match merged.iter_mut().find(|e| e.name == env.name) {
            Some(existing) => *existing = env.clone(),
            None => merged.push(env.clone()),
        }
    }
    merged
}

/// Controller owner reference pointing at `obj`.
///
/// Fails when the object has not been persisted yet (no uid), since an
/// owner reference without a uid is rejected by the API server.
pub fn owner_reference<K>(obj: &K) -> Result<OwnerReference, Error>
where
    K: Resource<DynamicType = ()>,
{
    obj.controller_owner_ref(&()).ok_or_else(|| {
        Error::validation_for(obj.name_any(), "object has no uid, cannot own resources")
    })
}

/// Return `meta` with `owner` present exactly once in its owner references.
///
/// An existing reference with the same uid is replaced so a stale
/// (renamed or re-versioned) reference gets refreshed.
pub fn with_owner_reference(mut meta: ObjectMeta, owner: &OwnerReference) -> ObjectMeta {
    let mut refs: Vec<OwnerReference> = meta
        .owner_references
        .take()
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.uid != owner.uid)
        .collect();
    refs.push(owner.clone());
    meta.owner_references = Some(refs);
    meta
}

/// Container resource requirements with volume-only keys removed
pub fn container_resources(resources: Option<&ResourceRequirements>) -> Option<ResourceRequirements> {
    resources.map(|r| {
        let strip = |m: &Option<BTreeMap<String, Quantity>>| {
            m.as_ref().map(|m| {
                m.iter()
                    .filter(|(k, _)| k.as_str() != STORAGE_RESOURCE_KEY)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
        };
        ResourceRequirements {
            limits: strip(&r.limits),
            requests: strip(&r.requests),
            claims: r.claims.clone(),
        }
    })
}
