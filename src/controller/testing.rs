//! In-memory doubles for the reconciler seams, plus shared fixtures

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::error::ErrorResponse;
use kube::Resource;
use tokio_util::sync::CancellationToken;

use super::client::{selector_string, ControlPlane, ManagedResource};
use super::context::{Context, OperatorOptions};
use super::events::{EventSink, EventType};
use crate::crd::{Postgres, PostgresSpec, PostgresVersion, PostgresVersionSpec, VersionImage};
use crate::error::{Error, Result};

type ObjectKey = (String, String, String);

fn key<K: ManagedResource>(namespace: &str, name: &str) -> ObjectKey {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

/// Object store keyed by kind, namespace and name.
///
/// Objects are kept as JSON so what comes back has gone through the same
/// serde path as a real API round trip. Patches are applied to the stored
/// JSON with RFC 6902 semantics, so a field the patch removes is gone.
#[derive(Default)]
pub struct FakeControlPlane {
    objects: Mutex<BTreeMap<ObjectKey, serde_json::Value>>,
    creates: AtomicUsize,
    patches: AtomicUsize,
    next_uid: AtomicUsize,
    running_pods: Mutex<Option<i32>>,
    failures: Mutex<BTreeMap<String, u16>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a create
    pub fn insert<K: ManagedResource>(&self, obj: &K) {
        let meta = obj.meta();
        let namespace = meta.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = meta.name.clone().unwrap_or_default();
        let value = serde_json::to_value(obj).expect("serialize seeded object");
        self.objects
            .lock()
            .unwrap()
            .insert(key::<K>(&namespace, &name), value);
    }

    pub fn object<K: ManagedResource>(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .map(|v| serde_json::from_value(v.clone()).expect("deserialize stored object"))
    }

    pub fn count<K: ManagedResource>(&self) -> usize {
        let kind = K::kind(&()).to_string();
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _, _)| *k == kind)
            .count()
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn patches(&self) -> usize {
        self.patches.load(Ordering::SeqCst)
    }

    /// Pretend only `n` pods are ever running. By default every wait succeeds.
    pub fn set_running_pods(&self, n: i32) {
        *self.running_pods.lock().unwrap() = Some(n);
    }

    /// Make every call touching `K` fail with the given HTTP status
    pub fn fail_on<K: ManagedResource>(&self, code: u16) {
        self.failures
            .lock()
            .unwrap()
            .insert(K::kind(&()).to_string(), code);
    }

    fn check_failure<K: ManagedResource>(&self) -> Result<()> {
        let kind = K::kind(&()).to_string();
        match self.failures.lock().unwrap().get(&kind) {
            Some(code) => Err(api_error(
                *code,
                "InternalError",
                format!("injected failure for {kind}"),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn get<K: ManagedResource>(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.check_failure::<K>()?;
        let stored = self
            .objects
            .lock()
            .unwrap()
            .get(&key::<K>(namespace, name))
            .cloned();
        Ok(stored.map(serde_json::from_value).transpose()?)
    }

    async fn create<K: ManagedResource>(&self, namespace: &str, obj: &K) -> Result<K> {
        self.check_failure::<K>()?;
        let name = obj.meta().name.clone().unwrap_or_default();
        let key = key::<K>(namespace, &name);

        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", key.0, name),
            ));
        }

        let mut created = obj.clone();
        let uid = self.next_uid.fetch_add(1, Ordering::SeqCst) + 1;
        let meta = created.meta_mut();
        meta.namespace = Some(namespace.to_string());
        meta.uid.get_or_insert_with(|| format!("uid-{uid}"));
        meta.resource_version = Some("1".to_string());

        objects.insert(key, serde_json::to_value(&created)?);
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(created)
    }

    async fn patch<K: ManagedResource>(
        &self,
        namespace: &str,
        name: &str,
        patch: &json_patch::Patch,
    ) -> Result<K> {
        self.check_failure::<K>()?;
        let key = key::<K>(namespace, name);

        let mut objects = self.objects.lock().unwrap();
        let Some(current) = objects.get(&key) else {
            return Err(api_error(
                404,
                "NotFound",
                format!("{} \"{}\" not found", key.0, name),
            ));
        };
        let stored_version = current["metadata"]["resourceVersion"].clone();

        let mut patched = current.clone();
        if let Err(e) = json_patch::patch(&mut patched, patch) {
            return Err(api_error(422, "Invalid", e.to_string()));
        }
        if patched["metadata"]["resourceVersion"] != stored_version {
            return Err(api_error(
                409,
                "Conflict",
                format!("the object {} \"{}\" has been modified", key.0, name),
            ));
        }

        let version: u64 = stored_version
            .as_str()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        patched["metadata"]["resourceVersion"] = (version + 1).to_string().into();

        let result: K = serde_json::from_value(patched.clone())?;
        objects.insert(key, patched);
        self.patches.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn wait_until_pods_running(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
        count: i32,
        _timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let running = self.running_pods.lock().unwrap().unwrap_or(count);
        if running >= count {
            Ok(())
        } else {
            Err(Error::ReadinessTimeout {
                namespace: namespace.to_string(),
                selector: selector_string(selector),
                expected: count,
                running,
            })
        }
    }
}

/// Event sink that remembers what it was asked to emit
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(EventType, String, String)>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, message)| message.clone())
            .collect()
    }

    pub fn events(&self) -> Vec<(EventType, String, String)> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn emit(&self, _db: &Postgres, event_type: EventType, reason: &str, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((event_type, reason.to_string(), message.to_string()));
    }
}

pub type TestContext = Context<FakeControlPlane, RecordingSink>;

pub fn test_context() -> TestContext {
    Context::new(
        FakeControlPlane::new(),
        RecordingSink::default(),
        OperatorOptions::default(),
    )
}

/// A minimal instance in namespace `demo`
pub fn postgres(name: &str) -> Postgres {
    Postgres {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("demo".to_string()),
            uid: Some(format!("{name}-uid")),
            generation: Some(1),
            ..Default::default()
        },
        spec: PostgresSpec {
            version: "13.2".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn postgres_version() -> PostgresVersion {
    PostgresVersion::new(
        "13.2",
        PostgresVersionSpec {
            version: "13.2".to_string(),
            db: VersionImage {
                image: "kubedb/postgres:13.2".to_string(),
            },
            exporter: VersionImage {
                image: "prometheuscommunity/postgres-exporter:v0.9.0".to_string(),
            },
            deprecated: false,
        },
    )
}
