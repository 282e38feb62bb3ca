//! Merge-by-name helpers for Kubernetes object collections
//!
//! Every helper here follows the same rule: an item whose key already exists
//! is updated in place, a new key is appended. Position is stable, so
//! re-applying the same items is a no-op. Updates keep what the API server
//! defaulted on the live item.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, Probe, ServicePort, Volume,
    VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Replace the item sharing `key_of(&item)` or append it.
pub fn upsert_by_name<T, K, F>(items: &mut Vec<T>, item: T, key_of: F)
where
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let key = key_of(&item);
    match items.iter_mut().find(|existing| key_of(existing) == key) {
        Some(existing) => *existing = item,
        None => items.push(item),
    }
}

pub fn upsert_env_vars(env: &mut Vec<EnvVar>, vars: impl IntoIterator<Item = EnvVar>) {
    for var in vars {
        upsert_by_name(env, var, |v| v.name.clone());
    }
}

/// Keep what the API server filled in below the top level of `desired`.
///
/// Every top-level field of `desired` that also exists on `live` as an object
/// is merge-patched over the live value, so nested defaults such as a secret
/// volume's `defaultMode` survive. Top-level fields `desired` leaves unset
/// stay unset, which lets a volume switch its source kind.
pub fn keep_nested_defaults<T>(live: &T, desired: T) -> T
where
    T: Serialize + DeserializeOwned,
{
    let (Ok(live_value), Ok(mut value)) =
        (serde_json::to_value(live), serde_json::to_value(&desired))
    else {
        return desired;
    };
    let (Some(live_fields), Some(fields)) = (live_value.as_object(), value.as_object_mut()) else {
        return desired;
    };

    for (key, field) in fields.iter_mut() {
        if let Some(live_field) = live_fields.get(key).filter(|v| v.is_object()) {
            if field.is_object() {
                let mut merged = live_field.clone();
                json_patch::merge(&mut merged, field);
                *field = merged;
            }
        }
    }
    serde_json::from_value(value).unwrap_or(desired)
}

pub fn upsert_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = keep_nested_defaults(existing, volume),
        None => volumes.push(volume),
    }
}

pub fn upsert_volume_mount(mounts: &mut Vec<VolumeMount>, mount: VolumeMount) {
    upsert_by_name(mounts, mount, |m| m.name.clone());
}

/// Claim templates come back from the server with `volumeMode` and a
/// `status` filled in; both are kept when `claim` leaves them unset.
pub fn upsert_volume_claim(
    claims: &mut Vec<PersistentVolumeClaim>,
    mut claim: PersistentVolumeClaim,
) {
    match claims
        .iter_mut()
        .find(|c| c.metadata.name == claim.metadata.name)
    {
        Some(existing) => {
            if claim.status.is_none() {
                claim.status = existing.status.clone();
            }
            *existing = keep_nested_defaults(existing, claim);
        }
        None => claims.push(claim),
    }
}

/// Merge `desired` into the container of the same name, or append it.
///
/// Fields the operator owns are overwritten when set; env vars and volume
/// mounts are merged by name so entries added by other actors survive.
pub fn upsert_container(containers: &mut Vec<Container>, desired: Container) {
    match containers.iter_mut().find(|c| c.name == desired.name) {
        Some(existing) => merge_container(existing, desired),
        None => containers.push(desired),
    }
}

pub fn upsert_containers(
    containers: &mut Vec<Container>,
    desired: impl IntoIterator<Item = Container>,
) {
    for container in desired {
        upsert_container(containers, container);
    }
}

fn merge_container(existing: &mut Container, desired: Container) {
    existing.image = desired.image;
    existing.ports = desired
        .ports
        .map(|ports| merge_container_ports(existing.ports.as_deref().unwrap_or_default(), ports));
    existing.liveness_probe = merge_probe(existing.liveness_probe.take(), desired.liveness_probe);
    existing.readiness_probe =
        merge_probe(existing.readiness_probe.take(), desired.readiness_probe);
    existing.lifecycle = desired.lifecycle;

    // left alone when unset: the API server defaults some of these
    if desired.image_pull_policy.is_some() {
        existing.image_pull_policy = desired.image_pull_policy;
    }
    if desired.command.is_some() {
        existing.command = desired.command;
    }
    if desired.args.is_some() {
        existing.args = desired.args;
    }
    if desired.resources.is_some() {
        existing.resources = desired.resources;
    }
    if desired.security_context.is_some() {
        existing.security_context = desired.security_context;
    }

    if let Some(env) = desired.env {
        upsert_env_vars(existing.env.get_or_insert_with(Vec::new), env);
    }
    if let Some(mounts) = desired.volume_mounts {
        let existing_mounts = existing.volume_mounts.get_or_insert_with(Vec::new);
        for mount in mounts {
            upsert_volume_mount(existing_mounts, mount);
        }
    }
}

/// Desired ports in order; a port without a protocol keeps the live one.
fn merge_container_ports(
    live: &[ContainerPort],
    desired: Vec<ContainerPort>,
) -> Vec<ContainerPort> {
    desired
        .into_iter()
        .map(|mut port| {
            if port.protocol.is_none() {
                port.protocol = live
                    .iter()
                    .find(|p| p.container_port == port.container_port)
                    .and_then(|p| p.protocol.clone());
            }
            port
        })
        .collect()
}

/// Overlay a desired probe on the live one.
///
/// Removing the probe clears it. Timing and threshold fields left unset keep
/// their live (server-defaulted) values, as does an HTTP probe's scheme.
pub fn merge_probe(live: Option<Probe>, desired: Option<Probe>) -> Option<Probe> {
    let mut desired = desired?;
    let Some(live) = live else {
        return Some(desired);
    };

    desired.timeout_seconds = desired.timeout_seconds.or(live.timeout_seconds);
    desired.period_seconds = desired.period_seconds.or(live.period_seconds);
    desired.success_threshold = desired.success_threshold.or(live.success_threshold);
    desired.failure_threshold = desired.failure_threshold.or(live.failure_threshold);
    if let (Some(http), Some(live_http)) = (desired.http_get.as_mut(), live.http_get.as_ref()) {
        if http.scheme.is_none() {
            http.scheme = live_http.scheme.clone();
        }
    }
    Some(desired)
}

/// Add `owner` to the object's owner references, replacing one with the same uid.
pub fn ensure_owner_reference(meta: &mut ObjectMeta, owner: OwnerReference) {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    upsert_by_name(refs, owner, |r| r.uid.clone());
}

/// Layer `labels` and `annotations` over whatever the object already carries
pub fn upsert_meta(
    meta: &mut ObjectMeta,
    labels: BTreeMap<String, String>,
    annotations: Option<&BTreeMap<String, String>>,
) {
    meta.labels.get_or_insert_with(BTreeMap::new).extend(labels);

    if let Some(annotations) = annotations.filter(|a| !a.is_empty()) {
        meta.annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
    }
}

/// Reconcile the operator's canonical ports with the live ones.
///
/// The result contains exactly the `desired` ports, in order. A port that
/// already exists under the same name keeps its allocated node port, and
/// keeps its protocol when `desired` leaves it unset.
pub fn merge_service_ports(
    current: &[ServicePort],
    desired: Vec<ServicePort>,
) -> Vec<ServicePort> {
    desired
        .into_iter()
        .map(|mut port| {
            if let Some(live) = current.iter().find(|p| p.name == port.name) {
                if port.node_port.is_none() {
                    port.node_port = live.node_port;
                }
                if port.protocol.is_none() {
                    port.protocol = live.protocol.clone();
                }
            }
            port
        })
        .collect()
}

/// Overlay user supplied ports by name. Set fields on the override win,
/// unknown names are appended.
pub fn overlay_service_ports(
    mut ports: Vec<ServicePort>,
    overrides: &[ServicePort],
) -> Vec<ServicePort> {
    for over in overrides {
        match ports.iter_mut().find(|p| p.name == over.name) {
            Some(port) => {
                if over.port != 0 {
                    port.port = over.port;
                }
                if over.node_port.is_some_and(|n| n > 0) {
                    port.node_port = over.node_port;
                }
                if over.protocol.is_some() {
                    port.protocol = over.protocol.clone();
                }
                if over
                    .target_port
                    .as_ref()
                    .is_some_and(|t| !is_zero_target_port(t))
                {
                    port.target_port = over.target_port.clone();
                }
                if over.app_protocol.is_some() {
                    port.app_protocol = over.app_protocol.clone();
                }
            }
            None => ports.push(over.clone()),
        }
    }
    ports
}

fn is_zero_target_port(port: &IntOrString) -> bool {
    match port {
        IntOrString::Int(n) => *n == 0,
        IntOrString::String(s) => s.is_empty(),
    }
}
