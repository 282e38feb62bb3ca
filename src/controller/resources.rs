//! Owner references and the PodDisruptionBudget for Postgres workloads

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::policy::v1::{PodDisruptionBudget, PodDisruptionBudgetSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument};

use super::client::ControlPlane;
use super::reconcile::{create_or_patch, ObjectIdentity, ReconcileOutcome};
use super::upsert::{ensure_owner_reference, upsert_meta};
use crate::crd::Postgres;
use crate::error::Result;

/// Controller reference so managed objects are collected with the instance
pub fn owner_reference(db: &Postgres) -> OwnerReference {
    OwnerReference {
        api_version: Postgres::api_version(&()).to_string(),
        kind: Postgres::kind(&()).to_string(),
        name: db.name_any(),
        uid: db.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn statefulset_owner_reference(sts: &StatefulSet) -> OwnerReference {
    OwnerReference {
        api_version: StatefulSet::api_version(&()).to_string(),
        kind: StatefulSet::kind(&()).to_string(),
        name: sts.name_any(),
        uid: sts.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Tolerate losing a minority of members, never less than one pod
pub fn max_unavailable(replicas: i32) -> i32 {
    ((replicas - 1) / 2).max(1)
}

/// Point the budget at the StatefulSet's pods
pub fn mutate_disruption_budget(
    sts: &StatefulSet,
    mut pdb: PodDisruptionBudget,
) -> PodDisruptionBudget {
    let replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let selector = sts.spec.as_ref().map(|s| s.selector.clone());

    upsert_meta(&mut pdb.metadata, sts.labels().clone(), None);
    ensure_owner_reference(&mut pdb.metadata, statefulset_owner_reference(sts));

    let spec = pdb.spec.get_or_insert_with(PodDisruptionBudgetSpec::default);
    spec.selector = selector;
    spec.min_available = None;
    spec.max_unavailable = Some(IntOrString::Int(max_unavailable(replicas)));
    pdb
}

/// Ensure a PodDisruptionBudget named after the StatefulSet exists
#[instrument(skip(client, sts), fields(name = %sts.name_any(), namespace = sts.namespace()))]
pub async fn ensure_disruption_budget<C: ControlPlane>(
    client: &C,
    sts: &StatefulSet,
) -> Result<ReconcileOutcome> {
    let id = ObjectIdentity::new(
        sts.namespace().unwrap_or_else(|| "default".to_string()),
        sts.name_any(),
    );

    let (_, outcome) =
        create_or_patch(client, &id, |pdb| mutate_disruption_budget(sts, pdb)).await?;
    if outcome.is_changed() {
        info!("PodDisruptionBudget {} {}", id, outcome);
    }
    Ok(outcome)
}
