//! Services fronting a Postgres instance
//!
//! - governing: headless, owns the pods' DNS records
//! - primary: follows the pod labelled `kubedb.com/role=primary`
//! - standby: follows the replicas, only when more than one member runs
//! - stats: exporter endpoint, only with Prometheus monitoring

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use super::client::ControlPlane;
use super::context::Context;
use super::events::{EventSink, EventType, REASON_SUCCESSFUL};
use super::reconcile::{create_or_patch, ensure_not_cancelled, ObjectIdentity, ReconcileOutcome};
use super::resources::owner_reference;
use super::upsert::{
    ensure_owner_reference, merge_service_ports, overlay_service_ports, upsert_meta,
};
use crate::crd::{
    Postgres, ServiceTemplate, DATABASE_PORT, DATABASE_PORT_NAME, EXPORTER_PORT_NAME, LABEL_ROLE,
    PRIMARY_SERVICE_PORT_NAME, ROLE_PRIMARY, ROLE_STANDBY, STANDBY_SERVICE_PORT_NAME,
};
use crate::error::Result;

/// Which database Service is being shaped
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceRole {
    Primary,
    Standby,
}

impl ServiceRole {
    fn role_label(&self) -> &'static str {
        match self {
            ServiceRole::Primary => ROLE_PRIMARY,
            ServiceRole::Standby => ROLE_STANDBY,
        }
    }

    fn port_name(&self) -> &'static str {
        match self {
            ServiceRole::Primary => PRIMARY_SERVICE_PORT_NAME,
            ServiceRole::Standby => STANDBY_SERVICE_PORT_NAME,
        }
    }

    fn service_name(&self, db: &Postgres) -> String {
        match self {
            ServiceRole::Primary => db.service_name(),
            ServiceRole::Standby => db.standby_service_name(),
        }
    }

    fn template<'a>(&self, db: &'a Postgres) -> &'a ServiceTemplate {
        match self {
            ServiceRole::Primary => &db.spec.service_template,
            ServiceRole::Standby => &db.spec.replica_service_template,
        }
    }
}

fn identity(db: &Postgres, name: String) -> ObjectIdentity {
    ObjectIdentity::new(db.namespace_or_default(), name)
}

async fn record_outcome<E: EventSink>(
    recorder: &E,
    db: &Postgres,
    what: &str,
    outcome: ReconcileOutcome,
) {
    if outcome.is_changed() {
        recorder
            .emit(
                db,
                EventType::Normal,
                REASON_SUCCESSFUL,
                &format!("Successfully {outcome} {what}"),
            )
            .await;
    }
}

// ============================================================================
// Governing Service
// ============================================================================

pub fn mutate_governing_service(db: &Postgres, mut svc: Service) -> Service {
    ensure_owner_reference(&mut svc.metadata, owner_reference(db));
    upsert_meta(&mut svc.metadata, db.offshoot_labels(), None);

    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.type_ = Some("ClusterIP".to_string());
    spec.cluster_ip = Some("None".to_string());
    spec.selector = Some(db.offshoot_selectors());
    spec.publish_not_ready_addresses = Some(true);
    svc
}

#[instrument(skip(ctx, db, cancel), fields(name = %db.name_any(), namespace = db.namespace()))]
pub async fn ensure_governing_service<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_not_cancelled(cancel)?;

    let id = identity(db, db.governing_service_name());
    let (_, outcome) = create_or_patch(&ctx.client, &id, |svc| {
        mutate_governing_service(db, svc)
    })
    .await?;

    record_outcome(&ctx.recorder, db, "governing service", outcome).await;
    Ok(outcome)
}

// ============================================================================
// Primary and standby Services
// ============================================================================

pub fn mutate_database_service(db: &Postgres, role: ServiceRole, mut svc: Service) -> Service {
    let template = role.template(db);

    ensure_owner_reference(&mut svc.metadata, owner_reference(db));
    upsert_meta(
        &mut svc.metadata,
        db.offshoot_labels(),
        template.annotations.as_ref(),
    );

    let mut selector = db.offshoot_selectors();
    selector.insert(LABEL_ROLE.to_string(), role.role_label().to_string());

    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(selector);

    let current = spec.ports.take().unwrap_or_default();
    let canonical = vec![ServicePort {
        name: Some(role.port_name().to_string()),
        port: DATABASE_PORT,
        target_port: Some(IntOrString::String(DATABASE_PORT_NAME.to_string())),
        ..Default::default()
    }];
    spec.ports = Some(overlay_service_ports(
        merge_service_ports(&current, canonical),
        &template.spec.ports,
    ));

    let overrides = &template.spec;
    if let Some(cluster_ip) = overrides.cluster_ip.as_ref().filter(|ip| !ip.is_empty()) {
        spec.cluster_ip = Some(cluster_ip.clone());
    }
    if let Some(type_) = overrides.type_.as_ref().filter(|t| !t.is_empty()) {
        spec.type_ = Some(type_.clone());
    }
    spec.external_ips = overrides.external_ips.clone();
    spec.load_balancer_ip = overrides.load_balancer_ip.clone();
    spec.load_balancer_source_ranges = overrides.load_balancer_source_ranges.clone();
    if overrides.external_traffic_policy.is_some() {
        spec.external_traffic_policy = overrides.external_traffic_policy.clone();
    }
    if let Some(port) = overrides.health_check_node_port.filter(|p| *p > 0) {
        spec.health_check_node_port = Some(port);
    }
    svc
}

async fn ensure_database_service<C: ControlPlane>(
    client: &C,
    db: &Postgres,
    role: ServiceRole,
) -> Result<ReconcileOutcome> {
    let id = identity(db, role.service_name(db));
    let (_, outcome) = create_or_patch(client, &id, |svc| {
        mutate_database_service(db, role, svc)
    })
    .await?;
    Ok(outcome)
}

pub async fn ensure_primary_service<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_not_cancelled(cancel)?;
    let outcome = ensure_database_service(&ctx.client, db, ServiceRole::Primary).await?;
    record_outcome(&ctx.recorder, db, "Service", outcome).await;
    Ok(outcome)
}

pub async fn ensure_standby_service<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_not_cancelled(cancel)?;
    let outcome = ensure_database_service(&ctx.client, db, ServiceRole::Standby).await?;
    record_outcome(&ctx.recorder, db, "standby Service", outcome).await;
    Ok(outcome)
}

/// Primary Service, plus the standby Service when more than one member runs.
///
/// With a single member the primary's outcome is returned unchanged.
#[instrument(skip(ctx, db, cancel), fields(name = %db.name_any(), namespace = db.namespace()))]
pub async fn ensure_service<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    let primary = ensure_primary_service(ctx, db, cancel).await?;

    if db.replicas() <= 1 {
        return Ok(primary);
    }

    let standby = ensure_standby_service(ctx, db, cancel).await?;
    Ok(primary.combine(standby))
}

// ============================================================================
// Stats Service
// ============================================================================

pub fn mutate_stats_service(db: &Postgres, port: i32, mut svc: Service) -> Service {
    ensure_owner_reference(&mut svc.metadata, owner_reference(db));
    upsert_meta(&mut svc.metadata, db.stats_service_labels(), None);

    let spec = svc.spec.get_or_insert_with(ServiceSpec::default);
    spec.selector = Some(db.offshoot_selectors());

    let current = spec.ports.take().unwrap_or_default();
    spec.ports = Some(merge_service_ports(
        &current,
        vec![ServicePort {
            name: Some(EXPORTER_PORT_NAME.to_string()),
            protocol: Some("TCP".to_string()),
            port,
            target_port: Some(IntOrString::String(EXPORTER_PORT_NAME.to_string())),
            ..Default::default()
        }],
    ));
    svc
}

/// Exporter Service. Without Prometheus monitoring this is a logged no-op.
#[instrument(skip(ctx, db, cancel), fields(name = %db.name_any(), namespace = db.namespace()))]
pub async fn ensure_stats_service<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_not_cancelled(cancel)?;

    let Some(monitor) = db.spec.monitor.as_ref().filter(|_| db.exporter_enabled()) else {
        info!("spec.monitor.agent is not provided by prometheus.io, skipping stats service");
        return Ok(ReconcileOutcome::Unchanged);
    };
    let port = monitor.exporter().port;

    let id = identity(db, db.stats_service_name());
    let (_, outcome) = create_or_patch(&ctx.client, &id, |svc| {
        mutate_stats_service(db, port, svc)
    })
    .await?;

    record_outcome(&ctx.recorder, db, "stats service", outcome).await;
    Ok(outcome)
}
