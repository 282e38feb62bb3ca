//! Environment for the database container
//!
//! The list is built in a fixed order: identity and credentials first, then
//! replication, leader election, archive and restore settings, and finally
//! the user's own variables, which win any name collision.

use k8s_openapi::api::core::v1::{
    EnvVar, EnvVarSource, ObjectFieldSelector, SecretKeySelector,
};

use crate::controller::upsert::upsert_env_vars;
use crate::crd::{
    Backend, LeaderElectionConfig, Postgres, RecoveryTarget, S3Spec, StorageBackendSpec,
    WalSourceSpec,
};

pub const ENV_NAMESPACE: &str = "NAMESPACE";
pub const ENV_PRIMARY_HOST: &str = "PRIMARY_HOST";
pub const ENV_POSTGRES_USER: &str = "POSTGRES_USER";
pub const ENV_POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";
pub const ENV_STANDBY: &str = "STANDBY";
pub const ENV_STREAMING: &str = "STREAMING";
pub const ENV_LEASE_DURATION: &str = "LEASE_DURATION";
pub const ENV_RENEW_DEADLINE: &str = "RENEW_DEADLINE";
pub const ENV_RETRY_PERIOD: &str = "RETRY_PERIOD";

/// Keys of the basic-auth secret referenced by `spec.authSecret`
pub const AUTH_USERNAME_KEY: &str = "username";
pub const AUTH_PASSWORD_KEY: &str = "password";

const ARCHIVE_TOOL: &str = "wal-g";
const AWS_ENDPOINT_SUFFIX: &str = ".amazonaws.com";

pub(crate) fn plain(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

pub(crate) fn from_secret(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: Some(secret.to_string()),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

/// Complete, de-duplicated environment for the `postgres` container.
pub fn derive_env(db: &Postgres) -> Vec<EnvVar> {
    let mut env = identity_env(db);
    env.extend(replication_env(db));

    if let Some(election) = &db.spec.leader_election {
        env.extend(leader_election_env(election));
    }
    if let Some(storage) = db.spec.archiver.as_ref().and_then(|a| a.storage.as_ref()) {
        env.extend(archive_env(db, storage));
    }
    if let Some(wal) = db.spec.init.as_ref().and_then(|i| i.postgres_wal.as_ref()) {
        env.extend(wal_recovery_env(wal));
    }

    upsert_env_vars(&mut env, db.spec.pod_template.spec.env.iter().cloned());
    env
}

fn identity_env(db: &Postgres) -> Vec<EnvVar> {
    let auth_secret = db.auth_secret_name();
    vec![
        EnvVar {
            name: ENV_NAMESPACE.to_string(),
            value: None,
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.namespace".to_string(),
                    api_version: None,
                }),
                ..Default::default()
            }),
        },
        plain(ENV_PRIMARY_HOST, db.service_name()),
        from_secret(ENV_POSTGRES_USER, &auth_secret, AUTH_USERNAME_KEY),
        from_secret(ENV_POSTGRES_PASSWORD, &auth_secret, AUTH_PASSWORD_KEY),
    ]
}

fn replication_env(db: &Postgres) -> Vec<EnvVar> {
    let standby = db.spec.standby_mode.unwrap_or_default();
    let streaming = db.spec.streaming_mode.unwrap_or_default();
    vec![
        plain(ENV_STANDBY, standby.to_string().to_lowercase()),
        plain(ENV_STREAMING, streaming.to_string().to_lowercase()),
    ]
}

fn leader_election_env(election: &LeaderElectionConfig) -> Vec<EnvVar> {
    vec![
        plain(ENV_LEASE_DURATION, election.lease_duration_seconds.to_string()),
        plain(ENV_RENEW_DEADLINE, election.renew_deadline_seconds.to_string()),
        plain(ENV_RETRY_PERIOD, election.retry_period_seconds.to_string()),
    ]
}

/// Continuous archiving. Remote backends write below the instance's WAL
/// directory; a local backend writes straight into its mount path.
pub fn archive_env(db: &Postgres, storage: &StorageBackendSpec) -> Vec<EnvVar> {
    let mut env = vec![plain("ARCHIVE", ARCHIVE_TOOL)];

    match storage.backend() {
        None => {}
        Some(Backend::Local(local)) => {
            env.push(plain("ARCHIVE_FILE_PREFIX", local.mount_path.as_str()));
        }
        Some(backend) => {
            env.push(remote_prefix("ARCHIVE", backend, &db.wal_data_dir()));
            if let Backend::S3(s3) = backend {
                env.extend(s3_env("ARCHIVE", s3));
            }
        }
    }
    env
}

/// Restore from an existing WAL archive, optionally to a point in time.
pub fn wal_recovery_env(wal: &WalSourceSpec) -> Vec<EnvVar> {
    let mut env = vec![plain("RESTORE", "true")];

    match wal.storage.backend() {
        None => {}
        Some(Backend::Local(local)) => {
            env.push(plain(
                "RESTORE_FILE_PREFIX",
                absolute_path(&[local.mount_path.as_str(), local.sub_path.as_str()]),
            ));
        }
        Some(backend) => {
            env.push(remote_prefix("RESTORE", backend, backend.prefix()));
            if let Backend::S3(s3) = backend {
                env.extend(s3_env("RESTORE", s3));
            }
        }
    }

    if let Some(target) = &wal.pitr {
        env.extend(recovery_target_env(target));
    }
    env
}

fn recovery_target_env(target: &RecoveryTarget) -> Vec<EnvVar> {
    let mut env = vec![
        plain("PITR", "true"),
        plain("TARGET_INCLUSIVE", target.target_inclusive.to_string()),
    ];

    let optional = [
        ("TARGET_TIME", &target.target_time),
        ("TARGET_TIMELINE", &target.target_timeline),
        ("TARGET_XID", &target.target_xid),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            env.push(plain(name, value));
        }
    }
    env
}

fn remote_prefix(kind: &str, backend: Backend<'_>, dir: &str) -> EnvVar {
    let scheme = backend.scheme().unwrap_or_default();
    let location = backend.location().unwrap_or_default();
    plain(
        &format!("{kind}_{}_PREFIX", backend.env_infix()),
        format!("{scheme}://{location}/{dir}"),
    )
}

/// Endpoint is only passed for S3-compatible stores, never for AWS itself
fn s3_env(kind: &str, s3: &S3Spec) -> Vec<EnvVar> {
    let mut env = Vec::new();
    if !s3.endpoint.is_empty() && !s3.endpoint.ends_with(AWS_ENDPOINT_SUFFIX) {
        env.push(plain(&format!("{kind}_S3_ENDPOINT"), s3.endpoint.as_str()));
    }
    if !s3.region.is_empty() {
        env.push(plain(&format!("{kind}_S3_REGION"), s3.region.as_str()));
    }
    env
}

/// Join path segments under `/`, dropping empty and `.` components
fn absolute_path(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}
