//! Dependencies shared by every reconciliation entry point

use std::time::Duration;

use super::client::ControlPlane;
use super::events::EventSink;

pub const DEFAULT_FIELD_MANAGER: &str = "postgres-operator";
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(600);

/// Operator-wide settings that end up in derived objects or bound waits
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorOptions {
    /// Upper bound for waiting on StatefulSet pods to reach `Running`
    pub readiness_timeout: Duration,
    /// Poll interval while waiting for pods
    pub readiness_poll_interval: Duration,
    pub enable_analytics: bool,
    pub analytics_client_id: String,
    /// Verbosity forwarded to the database container as `--v=<n>`
    pub log_level: u8,
    pub field_manager: String,
}

impl Default for OperatorOptions {
    fn default() -> Self {
        Self {
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            readiness_poll_interval: Duration::from_secs(2),
            enable_analytics: false,
            analytics_client_id: String::new(),
            log_level: 3,
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
        }
    }
}

impl OperatorOptions {
    pub fn logger_flags(&self) -> Vec<String> {
        vec![format!("--v={}", self.log_level)]
    }
}

/// Client, event recorder and options, injected into every call
pub struct Context<C, E> {
    pub client: C,
    pub recorder: E,
    pub options: OperatorOptions,
}

impl<C: ControlPlane, E: EventSink> Context<C, E> {
    pub fn new(client: C, recorder: E, options: OperatorOptions) -> Self {
        Self {
            client,
            recorder,
            options,
        }
    }
}
