//! The StatefulSet running the database members
//!
//! Reconciliation is linear: refuse to adopt a foreign StatefulSet, merge the
//! derived pod spec into whatever exists, wait for the pods when something
//! changed, then make sure a disruption budget covers them.

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::client::ControlPlane;
use super::context::{Context, OperatorOptions};
use super::derive::{derive_containers, derive_volumes, DataVolume, VOLUME_DATA};
use super::events::{EventSink, EventType, REASON_SUCCESSFUL};
use super::reconcile::{create_or_patch, ensure_not_cancelled, ObjectIdentity, ReconcileOutcome};
use super::resources::{ensure_disruption_budget, owner_reference};
use super::upsert::{
    ensure_owner_reference, upsert_containers, upsert_meta, upsert_volume, upsert_volume_claim,
};
use crate::crd::{
    Postgres, PostgresVersion, LABEL_DATABASE_KIND, LABEL_DATABASE_NAME, RESOURCE_KIND_POSTGRES,
};
use crate::error::{Error, Result};

const UPDATE_STRATEGY_ON_DELETE: &str = "OnDelete";

/// Fail if a StatefulSet with our name exists but belongs to something else.
pub async fn check_statefulset<C: ControlPlane>(client: &C, db: &Postgres) -> Result<()> {
    let namespace = db.namespace_or_default();
    let name = db.offshoot_name();

    let Some(existing) = client.get::<StatefulSet>(&namespace, &name).await? else {
        return Ok(());
    };

    let labels = existing.labels();
    let owned = labels.get(LABEL_DATABASE_KIND).map(String::as_str) == Some(RESOURCE_KIND_POSTGRES)
        && labels.get(LABEL_DATABASE_NAME) == Some(&name);
    if owned {
        Ok(())
    } else {
        Err(Error::NamingCollision {
            kind: "StatefulSet".to_string(),
            namespace,
            name,
        })
    }
}

/// Merge the derived workload into `sts`.
///
/// Only operator-owned fields are written; env vars, volumes, mounts and
/// containers are merged by name so anything else on the object survives.
pub fn mutate_statefulset(
    db: &Postgres,
    version: &PostgresVersion,
    options: &OperatorOptions,
    mut sts: StatefulSet,
) -> StatefulSet {
    let pod_template = &db.spec.pod_template;
    let overrides = &pod_template.spec;
    let volumes = derive_volumes(db);

    upsert_meta(
        &mut sts.metadata,
        db.offshoot_labels(),
        pod_template.controller.annotations.as_ref(),
    );
    ensure_owner_reference(&mut sts.metadata, owner_reference(db));

    let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);
    spec.replicas = Some(db.replicas());
    spec.service_name = db.governing_service_name();
    spec.selector = LabelSelector {
        match_labels: Some(db.offshoot_selectors()),
        match_expressions: None,
    };
    spec.update_strategy = Some(StatefulSetUpdateStrategy {
        type_: Some(UPDATE_STRATEGY_ON_DELETE.to_string()),
        rolling_update: None,
    });

    let template_meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
    upsert_meta(
        template_meta,
        db.offshoot_selectors(),
        pod_template.annotations.as_ref(),
    );

    let pod = spec.template.spec.get_or_insert_with(PodSpec::default);
    if !overrides.init_containers.is_empty() {
        upsert_containers(
            pod.init_containers.get_or_insert_with(Vec::<Container>::new),
            overrides.init_containers.iter().cloned(),
        );
    }
    upsert_containers(
        &mut pod.containers,
        derive_containers(db, version, options, &volumes),
    );

    pod.node_selector = overrides.node_selector.clone();
    pod.affinity = overrides.affinity.clone();
    if let Some(scheduler) = overrides.scheduler_name.as_ref().filter(|s| !s.is_empty()) {
        pod.scheduler_name = Some(scheduler.clone());
    }
    pod.tolerations = overrides.tolerations.clone();
    pod.image_pull_secrets = overrides.image_pull_secrets.clone();
    pod.priority_class_name = overrides.priority_class_name.clone();
    pod.priority = overrides.priority;
    // the API server stores an unset pod security context as `{}`
    pod.security_context = Some(overrides.security_context.clone().unwrap_or_default());
    pod.service_account_name = overrides.service_account_name.clone();

    let pod_volumes = pod.volumes.get_or_insert_with(Vec::new);
    for volume in volumes.volumes() {
        upsert_volume(pod_volumes, volume);
    }

    match &volumes.data {
        DataVolume::Claim(claim) => {
            pod_volumes.retain(|v| v.name != VOLUME_DATA);
            upsert_volume_claim(
                spec.volume_claim_templates.get_or_insert_with(Vec::new),
                claim.clone(),
            );
        }
        DataVolume::Ephemeral(_) => {
            if let Some(claims) = spec.volume_claim_templates.as_mut() {
                claims.retain(|c| c.metadata.name.as_deref() != Some(VOLUME_DATA));
            }
        }
    }

    sts
}

async fn wait_for_pods<C: ControlPlane>(
    client: &C,
    options: &OperatorOptions,
    sts: &StatefulSet,
    cancel: &CancellationToken,
) -> Result<()> {
    let namespace = sts.namespace().unwrap_or_else(|| "default".to_string());
    let spec = sts.spec.as_ref();
    let selector = spec
        .and_then(|s| s.selector.match_labels.clone())
        .unwrap_or_default();
    let replicas = spec.and_then(|s| s.replicas).unwrap_or(1);

    info!(
        "Waiting up to {:?} for {} pod(s) of StatefulSet {}/{}",
        options.readiness_timeout,
        replicas,
        namespace,
        sts.name_any()
    );
    client
        .wait_until_pods_running(
            &namespace,
            &selector,
            replicas,
            options.readiness_timeout,
            cancel,
        )
        .await
}

#[instrument(skip(ctx, db, version, cancel), fields(name = %db.name_any(), namespace = db.namespace()))]
pub async fn ensure_statefulset<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    version: &PostgresVersion,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    ensure_not_cancelled(cancel)?;
    check_statefulset(&ctx.client, db).await?;

    let id = ObjectIdentity::new(db.namespace_or_default(), db.offshoot_name());
    let (sts, outcome) = create_or_patch(&ctx.client, &id, |sts| {
        mutate_statefulset(db, version, &ctx.options, sts)
    })
    .await?;

    if outcome.is_changed() {
        wait_for_pods(&ctx.client, &ctx.options, &sts, cancel).await?;
        ctx.recorder
            .emit(
                db,
                EventType::Normal,
                REASON_SUCCESSFUL,
                &format!("Successfully {outcome} StatefulSet"),
            )
            .await;
    }

    ensure_not_cancelled(cancel)?;
    ensure_disruption_budget(&ctx.client, &sts).await?;
    Ok(outcome)
}

/// Workload entry point for a single combined primary/standby topology
pub async fn ensure_combined_node<C: ControlPlane, E: EventSink>(
    ctx: &Context<C, E>,
    db: &Postgres,
    version: &PostgresVersion,
    cancel: &CancellationToken,
) -> Result<ReconcileOutcome> {
    debug!(
        standby = %db.spec.standby_mode.unwrap_or_default(),
        streaming = %db.spec.streaming_mode.unwrap_or_default(),
        "Ensuring combined node for {}/{}",
        db.namespace_or_default(),
        db.offshoot_name()
    );
    ensure_statefulset(ctx, db, version, cancel).await
}
