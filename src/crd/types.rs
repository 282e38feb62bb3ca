//! Shared types for Postgres specifications
//!
//! These types describe the optional, deeply nested parts of a [`PostgresSpec`]:
//! storage, WAL archival and restore backends, point-in-time recovery,
//! monitoring, and the pod/service template overrides users may supply.
//!
//! # Type Hierarchy
//!
//! - [`StorageType`] - Durable (claim-backed) or ephemeral data directory
//! - [`StorageBackendSpec`] - Wire form of an archive/restore target, resolved into [`Backend`]
//! - [`ArchiverSpec`] / [`InitSpec`] - Continuous archiving and initialization sources
//! - [`MonitorSpec`] - Metrics exporter configuration
//! - [`PodTemplate`] / [`ServiceTemplate`] - User overrides merged into managed objects
//!
//! [`PostgresSpec`]: crate::crd::PostgresSpec

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, CSIVolumeSource, ConfigMapVolumeSource, Container, DownwardAPIVolumeSource,
    EmptyDirVolumeSource, EnvVar, HostPathVolumeSource, Lifecycle, LocalObjectReference,
    NFSVolumeSource, PersistentVolumeClaimVolumeSource, PodSecurityContext, Probe,
    ProjectedVolumeSource, ResourceRequirements, SecretVolumeSource, SecurityContext, ServicePort,
    Toleration, Volume,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Monitoring vendor for which an exporter sidecar is injected
pub const VENDOR_PROMETHEUS: &str = "prometheus.io";

/// Default port the exporter sidecar listens on
pub const DEFAULT_EXPORTER_PORT: i32 = 56790;

/// Where the database keeps its data directory
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StorageType {
    /// Backed by a PersistentVolumeClaim per pod
    #[default]
    Durable,
    /// Backed by an emptyDir that dies with the pod
    Ephemeral,
}

/// How standbys serve reads
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StandbyMode {
    /// Standbys accept read-only queries
    Hot,
    /// Standbys only replay WAL
    #[default]
    Warm,
}

impl std::fmt::Display for StandbyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StandbyMode::Hot => write!(f, "Hot"),
            StandbyMode::Warm => write!(f, "Warm"),
        }
    }
}

/// Replication mode between primary and standbys
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StreamingMode {
    Synchronous,
    #[default]
    Asynchronous,
}

impl std::fmt::Display for StreamingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamingMode::Synchronous => write!(f, "Synchronous"),
            StreamingMode::Asynchronous => write!(f, "Asynchronous"),
        }
    }
}

/// Timing knobs for the leader-election sidecar, in seconds
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionConfig {
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: i32,
    #[serde(default = "default_renew_deadline")]
    pub renew_deadline_seconds: i32,
    #[serde(default = "default_retry_period")]
    pub retry_period_seconds: i32,
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            lease_duration_seconds: default_lease_duration(),
            renew_deadline_seconds: default_renew_deadline(),
            retry_period_seconds: default_retry_period(),
        }
    }
}

fn default_lease_duration() -> i32 {
    15
}

fn default_renew_deadline() -> i32 {
    10
}

fn default_retry_period() -> i32 {
    2
}

/// Reference to a Secret in the instance's namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
}

// ============================================================================
// Archive / restore backends
// ============================================================================

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct S3Spec {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    /// Custom endpoint for S3-compatible services (MinIO, Ceph RGW, ...)
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GcsSpec {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AzureSpec {
    pub container: String,
    #[serde(default)]
    pub prefix: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SwiftSpec {
    pub container: String,
    #[serde(default)]
    pub prefix: String,
}

/// Source of a user supplied volume
///
/// Mirrors the source fields of a core/v1 `Volume` without its name. Only
/// one source is expected to be set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub host_path: Option<HostPathVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub nfs: Option<NFSVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub config_map: Option<ConfigMapVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub secret: Option<SecretVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub downward_api: Option<DownwardAPIVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub projected: Option<ProjectedVolumeSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub csi: Option<CSIVolumeSource>,
}

impl VolumeSource {
    pub fn to_volume(&self, name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            persistent_volume_claim: self.persistent_volume_claim.clone(),
            host_path: self.host_path.clone(),
            nfs: self.nfs.clone(),
            config_map: self.config_map.clone(),
            secret: self.secret.clone(),
            empty_dir: self.empty_dir.clone(),
            downward_api: self.downward_api.clone(),
            projected: self.projected.clone(),
            csi: self.csi.clone(),
            ..Volume::default()
        }
    }
}

/// A volume mounted straight into the database container
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalSpec {
    pub mount_path: String,
    /// Location of an existing archive below `mount_path` (restore only)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sub_path: String,
    pub volume_source: VolumeSource,
}

/// Wire form of an archive or restore target.
///
/// Exactly one backend is expected to be set. Use [`StorageBackendSpec::backend`]
/// to resolve it; when several are populated the first one in the order
/// S3, GCS, Azure, Swift, Local wins.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageBackendSpec {
    /// Secret holding the cloud credentials (ignored for `local`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_secret_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Spec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swift: Option<SwiftSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalSpec>,
}

/// Resolved storage backend
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Backend<'a> {
    S3(&'a S3Spec),
    Gcs(&'a GcsSpec),
    Azure(&'a AzureSpec),
    Swift(&'a SwiftSpec),
    Local(&'a LocalSpec),
}

impl StorageBackendSpec {
    /// Resolve the union into a single backend, first match wins.
    pub fn backend(&self) -> Option<Backend<'_>> {
        if let Some(s3) = &self.s3 {
            Some(Backend::S3(s3))
        } else if let Some(gcs) = &self.gcs {
            Some(Backend::Gcs(gcs))
        } else if let Some(azure) = &self.azure {
            Some(Backend::Azure(azure))
        } else if let Some(swift) = &self.swift {
            Some(Backend::Swift(swift))
        } else {
            self.local.as_ref().map(Backend::Local)
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.backend(), Some(Backend::Local(_)))
    }

    pub fn secret_name(&self) -> String {
        self.storage_secret_name.clone().unwrap_or_default()
    }
}

impl<'a> Backend<'a> {
    /// Infix used in the `<ARCHIVE|RESTORE>_<infix>_PREFIX` variable names
    pub fn env_infix(&self) -> &'static str {
        match self {
            Backend::S3(_) => "S3",
            Backend::Gcs(_) => "GS",
            Backend::Azure(_) => "AZ",
            Backend::Swift(_) => "SWIFT",
            Backend::Local(_) => "FILE",
        }
    }

    /// URI scheme understood by wal-g; `None` for local paths
    pub fn scheme(&self) -> Option<&'static str> {
        match self {
            Backend::S3(_) => Some("s3"),
            Backend::Gcs(_) => Some("gs"),
            Backend::Azure(_) => Some("azure"),
            Backend::Swift(_) => Some("swift"),
            Backend::Local(_) => None,
        }
    }

    /// Bucket or container name; `None` for local paths
    pub fn location(&self) -> Option<&'a str> {
        match *self {
            Backend::S3(s3) => Some(s3.bucket.as_str()),
            Backend::Gcs(gcs) => Some(gcs.bucket.as_str()),
            Backend::Azure(azure) => Some(azure.container.as_str()),
            Backend::Swift(swift) => Some(swift.container.as_str()),
            Backend::Local(_) => None,
        }
    }

    /// User supplied prefix within the bucket or container
    pub fn prefix(&self) -> &'a str {
        match *self {
            Backend::S3(s3) => &s3.prefix,
            Backend::Gcs(gcs) => &gcs.prefix,
            Backend::Azure(azure) => &azure.prefix,
            Backend::Swift(swift) => &swift.prefix,
            Backend::Local(local) => &local.sub_path,
        }
    }
}

/// Continuous WAL archival
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiverSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageBackendSpec>,
}

/// Point-in-time recovery target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryTarget {
    /// Stop just after (true) or just before (false) the recovery target
    pub target_inclusive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_timeline: Option<String>,
    #[serde(rename = "targetXID", skip_serializing_if = "Option::is_none")]
    pub target_xid: Option<String>,
}

/// Restore the data directory from an existing WAL archive
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WalSourceSpec {
    #[serde(flatten)]
    pub storage: StorageBackendSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitr: Option<RecoveryTarget>,
}

/// Scripts executed once on a fresh data directory
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScriptSourceSpec {
    pub volume_source: VolumeSource,
}

/// How a fresh instance is initialized
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InitSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptSourceSpec>,
    #[serde(rename = "postgresWAL", skip_serializing_if = "Option::is_none")]
    pub postgres_wal: Option<WalSourceSpec>,
}

// ============================================================================
// Monitoring
// ============================================================================

/// Monitoring agent configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorSpec {
    /// Agent identifier such as `prometheus.io/operator` or `prometheus.io/builtin`
    pub agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusSpec>,
}

impl MonitorSpec {
    /// Vendor part of the agent identifier
    pub fn vendor(&self) -> &str {
        self.agent.split('/').next().unwrap_or_default()
    }

    pub fn exporter(&self) -> PrometheusExporterSpec {
        self.prometheus
            .as_ref()
            .map(|p| p.exporter.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusSpec {
    #[serde(default)]
    pub exporter: PrometheusExporterSpec,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusExporterSpec {
    #[serde(default = "default_exporter_port")]
    pub port: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub security_context: Option<SecurityContext>,
}

impl Default for PrometheusExporterSpec {
    fn default() -> Self {
        Self {
            port: DEFAULT_EXPORTER_PORT,
            args: Vec::new(),
            env: Vec::new(),
            resources: None,
            security_context: None,
        }
    }
}

fn default_exporter_port() -> i32 {
    DEFAULT_EXPORTER_PORT
}

// ============================================================================
// Templates
// ============================================================================

/// Metadata applied to the StatefulSet itself
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControllerTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// User overrides for the database pods
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplate {
    /// Annotations on the pod template
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub controller: ControllerTemplate,
    #[serde(default)]
    pub spec: PodTemplateOverrides,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub affinity: Option<Affinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<serde_json::Value>>")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub liveness_probe: Option<Probe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub readiness_probe: Option<Probe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub lifecycle: Option<Lifecycle>,
    /// Extra environment for the database container; wins over derived values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub env: Vec<EnvVar>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<serde_json::Value>")]
    pub security_context: Option<PodSecurityContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<Vec<serde_json::Value>>")]
    pub image_pull_secrets: Option<Vec<LocalObjectReference>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub init_containers: Vec<Container>,
}

/// User overrides for the primary or standby Service
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub spec: ServiceTemplateSpec,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTemplateSpec {
    #[serde(rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(rename = "externalIPs", skip_serializing_if = "Option::is_none")]
    pub external_ips: Option<Vec<String>>,
    #[serde(rename = "loadBalancerIP", skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_source_ranges: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_traffic_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_node_port: Option<i32>,
    /// Ports merged by name with the canonical database port
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(with = "Vec<serde_json::Value>")]
    pub ports: Vec<ServicePort>,
}

// ============================================================================
// Status
// ============================================================================

/// Condition for status reporting (Kubernetes convention)
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition (e.g., "Ready", "DataRestored")
    #[serde(rename = "type")]
    pub type_: String,
    /// Status of the condition: "True", "False", or "Unknown"
    pub status: String,
    pub last_transition_time: String,
    pub reason: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

