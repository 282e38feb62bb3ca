//! Container specs for the database pods

use k8s_openapi::api::core::v1::{Capabilities, Container, ContainerPort, SecurityContext};
use tracing::info;

use super::env::{derive_env, from_secret, plain, AUTH_PASSWORD_KEY, AUTH_USERNAME_KEY};
use super::volumes::DerivedVolumeSet;
use crate::controller::context::OperatorOptions;
use crate::controller::upsert::upsert_env_vars;
use crate::crd::{
    Postgres, PostgresVersion, DATABASE_PORT, DATABASE_PORT_NAME, EXPORTER_PORT_NAME,
    RESOURCE_SINGULAR_POSTGRES, STATS_PATH,
};

pub const DATABASE_CONTAINER_NAME: &str = RESOURCE_SINGULAR_POSTGRES;
pub const EXPORTER_CONTAINER_NAME: &str = "exporter";
pub const ENV_ANALYTICS_CLIENT_ID: &str = "ANALYTICS_CLIENT_ID";

/// The database container, followed by the exporter sidecar when
/// monitoring is handled by the supported vendor.
pub fn derive_containers(
    db: &Postgres,
    version: &PostgresVersion,
    options: &OperatorOptions,
    volumes: &DerivedVolumeSet,
) -> Vec<Container> {
    let mut containers = vec![database_container(db, version, options, volumes)];
    if let Some(exporter) = exporter_container(db, version) {
        containers.push(exporter);
    }
    containers
}

pub fn database_container(
    db: &Postgres,
    version: &PostgresVersion,
    options: &OperatorOptions,
    volumes: &DerivedVolumeSet,
) -> Container {
    let template = &db.spec.pod_template.spec;

    let mut args = vec![
        "leader_election".to_string(),
        format!("--enable-analytics={}", options.enable_analytics),
    ];
    args.extend(options.logger_flags());

    let mut env = vec![plain(
        ENV_ANALYTICS_CLIENT_ID,
        options.analytics_client_id.as_str(),
    )];
    upsert_env_vars(&mut env, derive_env(db));

    Container {
        name: DATABASE_CONTAINER_NAME.to_string(),
        image: Some(version.spec.db.image.clone()),
        args: Some(args),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            name: Some(DATABASE_PORT_NAME.to_string()),
            container_port: DATABASE_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: template.resources.clone(),
        liveness_probe: template.liveness_probe.clone(),
        readiness_probe: template.readiness_probe.clone(),
        lifecycle: template.lifecycle.clone(),
        security_context: Some(SecurityContext {
            privileged: Some(false),
            capabilities: Some(Capabilities {
                add: Some(vec!["IPC_LOCK".to_string(), "SYS_RESOURCE".to_string()]),
                drop: None,
            }),
            ..Default::default()
        }),
        volume_mounts: Some(volumes.mounts()),
        ..Default::default()
    }
}

/// Metrics exporter sidecar. Any vendor other than the supported one is
/// skipped without error.
pub fn exporter_container(db: &Postgres, version: &PostgresVersion) -> Option<Container> {
    let monitor = db.spec.monitor.as_ref()?;
    if !db.exporter_enabled() {
        info!(
            vendor = monitor.vendor(),
            "Monitoring agent of {}/{} is not handled by this operator, skipping exporter",
            db.namespace_or_default(),
            db.offshoot_name()
        );
        return None;
    }

    let exporter = monitor.exporter();
    let auth_secret = db.auth_secret_name();

    let mut args = vec!["--log.level=info".to_string()];
    args.extend(exporter.args.iter().cloned());

    let mut env = exporter.env.clone();
    upsert_env_vars(
        &mut env,
        [
            plain(
                "DATA_SOURCE_URI",
                format!("localhost:{DATABASE_PORT}/?sslmode=disable"),
            ),
            from_secret("DATA_SOURCE_USER", &auth_secret, AUTH_USERNAME_KEY),
            from_secret("DATA_SOURCE_PASS", &auth_secret, AUTH_PASSWORD_KEY),
            plain(
                "PG_EXPORTER_WEB_LISTEN_ADDRESS",
                format!(":{}", exporter.port),
            ),
            plain("PG_EXPORTER_WEB_TELEMETRY_PATH", STATS_PATH),
        ],
    );

    Some(Container {
        name: EXPORTER_CONTAINER_NAME.to_string(),
        image: Some(version.spec.exporter.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        args: Some(args),
        env: Some(env),
        ports: Some(vec![ContainerPort {
            name: Some(EXPORTER_PORT_NAME.to_string()),
            container_port: exporter.port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: exporter.resources.clone(),
        security_context: exporter.security_context.clone(),
        ..Default::default()
    })
}
