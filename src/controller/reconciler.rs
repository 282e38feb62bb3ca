//! Main reconciler for Postgres resources
//!
//! Implements the controller pattern using kube-rs runtime. The watch loop
//! is thin: it resolves the version catalog entry, hands off to
//! [`reconcile_postgres`], and records the result in the status subresource.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use kube::{
    api::{Api, Patch, PatchParams},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::Config,
    },
    ResourceExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::client::{ControlPlane, KubeControlPlane};
use super::conditions::set_ready;
use super::context::Context;
use super::events::{EventSink, EventType, KubeEventRecorder, REASON_FAILED};
use super::reconcile::ReconcileOutcome;
use super::service::{ensure_governing_service, ensure_service, ensure_stats_service};
use super::statefulset::ensure_combined_node;
use crate::crd::{Postgres, PostgresStatus, PostgresVersion};
use crate::error::{Error, Result};

pub const PHASE_READY: &str = "Ready";
pub const PHASE_FAILED: &str = "Failed";

const REQUEUE_STEADY: Duration = Duration::from_secs(300);
const REQUEUE_RETRIABLE: Duration = Duration::from_secs(15);
const REQUEUE_PERMANENT: Duration = Duration::from_secs(60);

/// Context wired to a live cluster
pub type OperatorContext = Context<KubeControlPlane, KubeEventRecorder>;

/// Main entry point to start the controller
pub async fn run_controller(ctx: Arc<OperatorContext>) -> Result<()> {
    let client = ctx.client.kube_client();
    let databases: Api<Postgres> = Api::all(client.clone());

    info!("Starting Postgres controller");

    match databases.list(&Default::default()).await {
        Ok(_) => info!("Postgres CRD is available"),
        Err(e) => {
            error!(
                "Postgres CRD not found. Please install the CRD first: {:?}",
                e
            );
            return Err(Error::ConfigError("Postgres CRD not installed".to_string()));
        }
    }

    Controller::new(databases, Config::default())
        .owns::<StatefulSet>(Api::all(client.clone()), Config::default())
        .owns::<Service>(Api::all(client.clone()), Config::default())
        .owns::<PodDisruptionBudget>(Api::all(client), Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok(obj) => info!("Reconciled: {:?}", obj),
                Err(e) => error!("Reconcile error: {:?}", e),
            }
        })
        .await;

    Ok(())
}

/// Ensure every object a Postgres instance needs, in dependency order.
///
/// Services come first so the pods resolve their peers as soon as they
/// start; the StatefulSet step blocks until its pods are running. The
/// returned outcome is the StatefulSet's.
pub async fn reconcile_postgres<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    version: &PostgresVersion,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_governing_service(ctx, db, cancel).await?;
    ensure_service(ctx, db, cancel).await?;
    ensure_stats_service(ctx, db, cancel).await?;
    ensure_combined_node(ctx, db, version, cancel).await
}

/// Status after one pass, keeping conditions written by other controllers
pub fn build_status(
    db: &Postgres,
    result: std::result::Result<ReconcileOutcome, &Error>,
) -> PostgresStatus {
    let generation = db.metadata.generation;
    let mut status = db.status.clone().unwrap_or_default();

    match result {
        Ok(outcome) => {
            status.phase = Some(PHASE_READY.to_string());
            status.observed_generation = generation;
            set_ready(
                &mut status.conditions,
                true,
                "Reconciled",
                &format!("Last pass {outcome}"),
                generation,
            );
        }
        Err(e) => {
            status.phase = Some(PHASE_FAILED.to_string());
            set_ready(
                &mut status.conditions,
                false,
                "ReconcileFailed",
                &e.to_string(),
                generation,
            );
        }
    }
    status
}

/// Record a failed pass as a Warning event on the instance
pub(crate) async fn report_failure<E: EventSink>(
    recorder: &E,
    db: &Postgres,
    result: &Result<ReconcileOutcome>,
) {
    if let Err(e) = result {
        recorder
            .emit(db, EventType::Warning, REASON_FAILED, &e.to_string())
            .await;
    }
}

async fn load_version(client: &Client, name: &str) -> Result<PostgresVersion> {
    let versions: Api<PostgresVersion> = Api::all(client.clone());
    versions
        .get_opt(name)
        .await?
        .ok_or_else(|| Error::MissingVersion(name.to_string()))
}

async fn update_status(client: &Client, db: &Postgres, status: &PostgresStatus) -> Result<()> {
    let api: Api<Postgres> = Api::namespaced(client.clone(), &db.namespace_or_default());
    let patch = serde_json::json!({ "status": status });

    api.patch_status(
        &db.name_any(),
        &PatchParams::default(),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}

/// The main reconciliation function
///
/// Called whenever a Postgres or one of its owned objects changes, and when
/// the requeue timer expires.
#[instrument(skip(ctx), fields(name = %obj.name_any(), namespace = obj.namespace()))]
async fn reconcile(obj: Arc<Postgres>, ctx: Arc<OperatorContext>) -> Result<Action> {
    let client = ctx.client.kube_client();
    // Dropping this pass (shutdown, superseded) cancels any readiness wait.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    info!(
        "Reconciling Postgres {}/{} (version: {})",
        obj.namespace_or_default(),
        obj.name_any(),
        obj.spec.version
    );

    let result = match load_version(&client, &obj.spec.version).await {
        Ok(version) => reconcile_postgres(ctx.as_ref(), &obj, &version, &cancel).await,
        Err(e) => Err(e),
    };

    report_failure(&ctx.recorder, &obj, &result).await;

    let status = build_status(&obj, result.as_ref().copied());
    if let Err(e) = update_status(&client, &obj, &status).await {
        warn!("Failed to update status for {}: {}", obj.name_any(), e);
    }

    result.map(|_| Action::requeue(REQUEUE_STEADY))
}

/// Requeue after a failed pass. The Warning event was already recorded by
/// [`reconcile`].
fn error_policy(db: Arc<Postgres>, error: &Error, _ctx: Arc<OperatorContext>) -> Action {
    error!("Reconciliation error for {}: {:?}", db.name_any(), error);

    if error.is_retriable() {
        Action::requeue(REQUEUE_RETRIABLE)
    } else {
        Action::requeue(REQUEUE_PERMANENT)
    }
}
