//! Custom Resource Definitions for the Postgres operator
//!
//! `Postgres` is the user-facing instance; `PostgresVersion` is the
//! cluster-wide image catalog it points at.

mod postgres;
pub mod types;
mod version;


pub use postgres::*;
pub use types::*;
pub use version::{PostgresVersion, PostgresVersionSpec, VersionImage};
