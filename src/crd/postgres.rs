//! Postgres Custom Resource Definition
//!
//! A `Postgres` object declares one clustered PostgreSQL instance. The
//! controller derives every managed child object (Services, StatefulSet,
//! PodDisruptionBudget) from it; all child names and selectors are pure
//! functions of the instance identity.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolumeClaimSpec;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{
    ArchiverSpec, Backend, Condition, InitSpec, LeaderElectionConfig, MonitorSpec, PodTemplate,
    SecretReference, ServiceTemplate, StandbyMode, StorageType, StreamingMode, VENDOR_PROMETHEUS,
};

pub const LABEL_DATABASE_KIND: &str = "kubedb.com/kind";
pub const LABEL_DATABASE_NAME: &str = "kubedb.com/name";
pub const LABEL_ROLE: &str = "kubedb.com/role";

pub const ROLE_PRIMARY: &str = "primary";
pub const ROLE_STANDBY: &str = "replica";
pub const ROLE_STATS: &str = "stats";

pub const RESOURCE_KIND_POSTGRES: &str = "Postgres";
pub const RESOURCE_SINGULAR_POSTGRES: &str = "postgres";

pub const DATABASE_PORT: i32 = 5432;
pub const DATABASE_PORT_NAME: &str = "api";
pub const PRIMARY_SERVICE_PORT_NAME: &str = "primary";
pub const STANDBY_SERVICE_PORT_NAME: &str = "standby";
pub const EXPORTER_PORT_NAME: &str = "metrics";
pub const STATS_PATH: &str = "/metrics";

/// Condition set once a WAL restore or init script has completed
pub const CONDITION_DATA_RESTORED: &str = "DataRestored";

const DATABASE_NAME_PREFIX: &str = "kubedb";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "kubedb.com",
    version = "v1alpha2",
    kind = "Postgres",
    plural = "postgreses",
    namespaced,
    status = "PostgresStatus",
    shortname = "pg",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Status","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresSpec {
    /// Name of the PostgresVersion catalog entry to run
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub standby_mode: Option<StandbyMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub streaming_mode: Option<StreamingMode>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub leader_election: Option<LeaderElectionConfig>,

    /// Secret with `username` and `password` keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_secret: Option<SecretReference>,

    #[serde(default)]
    pub storage_type: StorageType,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub storage: Option<PersistentVolumeClaimSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver: Option<ArchiverSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub init: Option<InitSpec>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<MonitorSpec>,

    /// Secret mounted at `/etc/config` with user supplied configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_secret: Option<SecretReference>,

    #[serde(default)]
    pub pod_template: PodTemplate,

    /// Overrides for the primary Service
    #[serde(default)]
    pub service_template: ServiceTemplate,

    /// Overrides for the standby Service
    #[serde(default)]
    pub replica_service_template: ServiceTemplate,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgresStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl Postgres {
    /// Name shared by the primary Service and the StatefulSet
    pub fn offshoot_name(&self) -> String {
        self.name_any()
    }

    pub fn service_name(&self) -> String {
        self.offshoot_name()
    }

    pub fn governing_service_name(&self) -> String {
        format!("{}-pods", self.offshoot_name())
    }

    pub fn standby_service_name(&self) -> String {
        format!("{}-standby", self.offshoot_name())
    }

    pub fn stats_service_name(&self) -> String {
        format!("{}-stats", self.offshoot_name())
    }

    pub fn namespace_or_default(&self) -> String {
        self.namespace().unwrap_or_else(|| "default".to_string())
    }

    /// Labels that uniquely select the pods of this instance
    pub fn offshoot_selectors(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                LABEL_DATABASE_KIND.to_string(),
                RESOURCE_KIND_POSTGRES.to_string(),
            ),
            (LABEL_DATABASE_NAME.to_string(), self.offshoot_name()),
        ])
    }

    /// Instance labels with the selector labels layered on top
    pub fn offshoot_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels().clone();
        labels.extend(self.offshoot_selectors());
        labels
    }

    pub fn stats_service_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.offshoot_labels();
        labels.insert(LABEL_ROLE.to_string(), ROLE_STATS.to_string());
        labels
    }

    pub fn replicas(&self) -> i32 {
        self.spec.replicas.unwrap_or(1)
    }

    pub fn auth_secret_name(&self) -> String {
        self.spec
            .auth_secret
            .as_ref()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| format!("{}-auth", self.offshoot_name()))
    }

    /// Directory inside the archive bucket that holds this instance's WAL
    pub fn wal_data_dir(&self) -> String {
        let prefix = self
            .spec
            .archiver
            .as_ref()
            .and_then(|a| a.storage.as_ref())
            .and_then(|s| s.backend())
            .map(|b| match b {
                Backend::Local(_) => "",
                other => other.prefix(),
            })
            .unwrap_or_default();

        [
            prefix.trim_matches('/'),
            DATABASE_NAME_PREFIX,
            &self.namespace_or_default(),
            &self.offshoot_name(),
            "archive",
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/")
    }

    /// Monitoring is active only for the supported exporter vendor
    pub fn exporter_enabled(&self) -> bool {
        self.spec
            .monitor
            .as_ref()
            .map(|m| m.vendor() == VENDOR_PROMETHEUS)
            .unwrap_or(false)
    }

    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.status
            .as_ref()
            .map(|s| {
                s.conditions
                    .iter()
                    .any(|c| c.type_ == type_ && c.status == "True")
            })
            .unwrap_or(false)
    }
}
