//! Error types for the Postgres operator

use thiserror::Error;

/// Errors surfaced by reconciliation.
///
/// Absence of an object is never an error: the control-plane client maps a
/// 404 to `Ok(None)` and the reconciler creates the object instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("intended {kind} \"{namespace}/{name}\" already exists")]
    NamingCollision {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error(
        "timed out waiting for {expected} pod(s) matching {selector} in {namespace} to be running ({running} running)"
    )]
    ReadinessTimeout {
        namespace: String,
        selector: String,
        expected: i32,
        running: i32,
    },

    #[error("reconciliation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("PostgresVersion \"{0}\" not found")]
    MissingVersion(String),
}

impl Error {
    /// Whether a requeue has a reasonable chance of succeeding without
    /// someone touching the cluster first.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(kube::Error::Api(resp)) => {
                resp.code == 409 || resp.code == 429 || resp.code >= 500
            }
            Error::KubeError(_) | Error::ReadinessTimeout { .. } | Error::Cancelled => true,
            Error::NamingCollision { .. }
            | Error::SerializationError(_)
            | Error::ConfigError(_)
            | Error::MissingVersion(_) => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
