//! Kubernetes Event emission
//!
//! Events are fire-and-forget: a failed write is logged and otherwise
//! ignored, never turned into a reconcile error.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::{Client, Resource, ResourceExt};
use tracing::warn;

use crate::crd::Postgres;

pub const REASON_SUCCESSFUL: &str = "Successful";
pub const REASON_FAILED: &str = "Failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Normal => "Normal",
            EventType::Warning => "Warning",
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, db: &Postgres, event_type: EventType, reason: &str, message: &str);
}

/// Writes core/v1 Events that reference the Postgres instance
#[derive(Clone)]
pub struct KubeEventRecorder {
    client: Client,
    component: String,
}

impl KubeEventRecorder {
    pub fn new(client: Client, component: impl Into<String>) -> Self {
        Self {
            client,
            component: component.into(),
        }
    }

    fn build_event(
        &self,
        db: &Postgres,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Event {
        let time = chrono::Utc::now();
        Event {
            metadata: ObjectMeta {
                generate_name: Some(format!("{}-", db.name_any())),
                namespace: Some(db.namespace_or_default()),
                ..Default::default()
            },
            type_: Some(event_type.as_str().to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            involved_object: db.object_ref(&()),
            reporting_component: Some(self.component.clone()),
            first_timestamp: Some(Time(time)),
            last_timestamp: Some(Time(time)),
            count: Some(1),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EventSink for KubeEventRecorder {
    async fn emit(&self, db: &Postgres, event_type: EventType, reason: &str, message: &str) {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &db.namespace_or_default());
        let event = self.build_event(db, event_type, reason, message);

        if let Err(e) = events.create(&PostParams::default(), &event).await {
            warn!(
                "Failed to record event {} for {}/{}: {}",
                reason,
                db.namespace_or_default(),
                db.name_any(),
                e
            );
        }
    }
}
