//! Controller module for Postgres reconciliation
//!
//! This module contains the pure derivation of pod specs, the upsert
//! primitives and create-or-patch reconciler they feed, the per-object
//! ensurers, and the watch loop driving them.

pub mod client;
pub mod conditions;
pub mod context;
pub mod derive;
pub mod events;
pub mod reconcile;
mod reconciler;
pub mod resources;
pub mod service;
#[cfg(test)]
mod service_test;
pub mod statefulset;
#[cfg(test)]
pub(crate) mod testing;
pub mod upsert;
#[cfg(test)]
mod upsert_test;

pub use client::{ControlPlane, KubeControlPlane, ManagedResource};
pub use context::{Context, OperatorOptions};
pub use events::{EventSink, EventType, KubeEventRecorder};
pub use reconcile::{create_or_patch, ObjectIdentity, ReconcileOutcome};
pub use reconciler::{build_status, reconcile_postgres, run_controller, OperatorContext};
pub use service::{ensure_governing_service, ensure_service, ensure_stats_service};
pub use statefulset::{check_statefulset, ensure_combined_node, ensure_statefulset};
