//! Generic create-or-patch reconciliation of one object

use std::fmt;

use json_patch::PatchOperation;
use kube::api::ObjectMeta;
use kube::Resource;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{ControlPlane, ManagedResource};
use crate::error::{Error, Result};

/// What a single reconciliation did to its object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReconcileOutcome {
    Unchanged,
    Created,
    Patched,
}

impl ReconcileOutcome {
    /// Fold two outcomes: both created is created, any patch is a patch,
    /// anything else is unchanged.
    pub fn combine(self, other: Self) -> Self {
        use ReconcileOutcome::*;
        match (self, other) {
            (Created, Created) => Created,
            (Patched, _) | (_, Patched) => Patched,
            _ => Unchanged,
        }
    }

    pub fn is_changed(&self) -> bool {
        !matches!(self, ReconcileOutcome::Unchanged)
    }
}

impl fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileOutcome::Unchanged => write!(f, "unchanged"),
            ReconcileOutcome::Created => write!(f, "created"),
            ReconcileOutcome::Patched => write!(f, "patched"),
        }
    }
}

/// Namespace and name of a managed object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectIdentity {
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    fn meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// JSON patch turning `current` into `modified`.
///
/// Fields present on `current` and unset on `modified` become `remove`
/// operations. A non-empty patch starts by replacing `resourceVersion` with
/// the value that was read, which the API server checks as a precondition.
pub fn diff_patch<K: ManagedResource>(current: &K, modified: &K) -> Result<json_patch::Patch> {
    let before = serde_json::to_value(current)?;
    let after = serde_json::to_value(modified)?;
    let mut ops = json_patch::diff(&before, &after).0;

    if ops.is_empty() {
        return Ok(json_patch::Patch(ops));
    }
    if let Some(version) = &current.meta().resource_version {
        let pin: PatchOperation = serde_json::from_value(json!({
            "op": "replace",
            "path": "/metadata/resourceVersion",
            "value": version,
        }))?;
        ops.insert(0, pin);
    }
    Ok(json_patch::Patch(ops))
}

/// Fetch the object, run `mutate` over it, and write the difference back.
///
/// A missing object is synthesized from `id` alone and created. An existing
/// object whose mutation compares equal to what was fetched is left alone
/// and no request is sent. Client errors are returned as-is.
pub async fn create_or_patch<C, K, F>(
    client: &C,
    id: &ObjectIdentity,
    mutate: F,
) -> Result<(K, ReconcileOutcome)>
where
    C: ControlPlane,
    K: ManagedResource + Default,
    F: FnOnce(K) -> K + Send,
{
    match client.get::<K>(&id.namespace, &id.name).await? {
        None => {
            let mut empty = K::default();
            *empty.meta_mut() = id.meta();
            let desired = mutate(empty);
            let created = client.create(&id.namespace, &desired).await?;
            debug!("Created {} {}", K::kind(&()), id);
            Ok((created, ReconcileOutcome::Created))
        }
        Some(current) => {
            let modified = mutate(current.clone());
            if modified == current {
                debug!("{} {} is up to date", K::kind(&()), id);
                return Ok((current, ReconcileOutcome::Unchanged));
            }
            let patch = diff_patch(&current, &modified)?;
            if patch.0.is_empty() {
                debug!("{} {} is up to date", K::kind(&()), id);
                return Ok((current, ReconcileOutcome::Unchanged));
            }
            let patched = client.patch(&id.namespace, &id.name, &patch).await?;
            debug!("Patched {} {}", K::kind(&()), id);
            Ok((patched, ReconcileOutcome::Patched))
        }
    }
}

/// Bail out between steps once the caller has given up
pub fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}
