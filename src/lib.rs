//! postgres-k8s: reconciliation core of a Kubernetes operator for clustered
//! PostgreSQL.
//!
//! The crate derives the desired Services, StatefulSet and
//! PodDisruptionBudget for a [`crd::Postgres`] instance and merges them into
//! whatever currently exists in the cluster.

pub mod controller;
pub mod crd;
pub mod error;

pub use crate::error::{Error, Result};
