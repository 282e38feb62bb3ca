//! Control-plane access used by the reconcilers
//!
//! [`ControlPlane`] is the narrow set of calls the reconciliation core needs.
//! [`KubeControlPlane`] implements it over a `kube::Client`; tests swap in an
//! in-memory store.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};

/// Any namespaced object the operator creates and patches
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> ManagedResource for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Fetch an object. A missing object is `Ok(None)`, never an error.
    async fn get<K: ManagedResource>(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn create<K: ManagedResource>(&self, namespace: &str, obj: &K) -> Result<K>;

    /// Apply a JSON patch computed against a previously fetched object
    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<K>;

    /// Block until `count` pods matching `selector` report phase `Running`.
    async fn wait_until_pods_running(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        count: i32,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Render match labels as a label selector query
pub fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// [`ControlPlane`] backed by the Kubernetes API server.
///
/// Patches are RFC 6902 JSON patches from the fetched object to the modified
/// one, so fields the operator clears are removed on the server. Each patch
/// pins the `resourceVersion` that was read; a concurrent write surfaces as
/// a 409 conflict instead of being overwritten.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    post_params: PostParams,
    patch_params: PatchParams,
    poll_interval: Duration,
}

impl KubeControlPlane {
    pub fn new(client: Client, field_manager: &str, poll_interval: Duration) -> Self {
        Self {
            client,
            post_params: PostParams {
                field_manager: Some(field_manager.to_string()),
                ..PostParams::default()
            },
            patch_params: PatchParams {
                field_manager: Some(field_manager.to_string()),
                ..PatchParams::default()
            },
            poll_interval,
        }
    }

    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    async fn count_running_pods(&self, pods: &Api<Pod>, selector: &str) -> Result<i32> {
        let list = pods.list(&ListParams::default().labels(selector)).await?;
        let running = list
            .items
            .iter()
            .filter(|pod| {
                pod.status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .is_some_and(|phase| phase == "Running")
            })
            .count();
        Ok(i32::try_from(running).unwrap_or(i32::MAX))
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn get<K: ManagedResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create<K: ManagedResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.create(&self.post_params, obj).await?)
    }

    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<K> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api
            .patch(name, &self.patch_params, &Patch::<()>::Json(patch.clone()))
            .await?)
    }

    async fn wait_until_pods_running(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        count: i32,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let selector = selector_string(selector);
        let deadline = Instant::now() + timeout;

        loop {
            let running = self.count_running_pods(&pods, &selector).await?;
            if running >= count {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::ReadinessTimeout {
                    namespace: namespace.to_string(),
                    selector,
                    expected: count,
                    running,
                });
            }
            debug!(
                "{}/{} pods running for {} in {}, waiting",
                running, count, selector, namespace
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
