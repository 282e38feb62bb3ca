//! PostgresVersion catalog entry
//!
//! Cluster-scoped resource naming the images that make up one supported
//! PostgreSQL release. A `Postgres` instance refers to it by name.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "catalog.kubedb.com",
    version = "v1alpha1",
    kind = "PostgresVersion",
    plural = "postgresversions",
    shortname = "pgversion",
    derive = "Default",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"DB_Image","type":"string","jsonPath":".spec.db.image"}"#,
    printcolumn = r#"{"name":"Deprecated","type":"boolean","jsonPath":".spec.deprecated"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresVersionSpec {
    /// Upstream PostgreSQL version string, e.g. `13.2`
    pub version: String,
    pub db: VersionImage,
    pub exporter: VersionImage,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct VersionImage {
    pub image: String,
}
