//! Pure derivation of pod-level specs from a [`Postgres`](crate::crd::Postgres)
//!
//! Nothing in here talks to the API server. Every function is a function of
//! the instance (and, for containers, the version catalog and operator
//! options) so the reconcilers can call them on every pass.

mod containers;
mod env;
mod volumes;

pub use containers::{
    database_container, derive_containers, exporter_container, DATABASE_CONTAINER_NAME,
    ENV_ANALYTICS_CLIENT_ID, EXPORTER_CONTAINER_NAME,
};
pub use env::{archive_env, derive_env, wal_recovery_env, AUTH_PASSWORD_KEY, AUTH_USERNAME_KEY};
pub use volumes::{
    derive_volumes, DataVolume, DerivedVolumeSet, MountedVolume, DATA_MOUNT_PATH, VOLUME_DATA,
};
pub use volumes::{
    ARCHIVE_SECRET_MOUNT_PATH, CUSTOM_CONFIG_MOUNT_PATH, INIT_SCRIPT_MOUNT_PATH,
    RESTORE_SECRET_MOUNT_PATH, SHARED_MEMORY_MOUNT_PATH, VOLUME_ARCHIVE_SECRET,
    VOLUME_CUSTOM_CONFIG, VOLUME_INIT_SCRIPT, VOLUME_LOCAL_ARCHIVE, VOLUME_LOCAL_INIT,
    VOLUME_RESTORE_SECRET, VOLUME_SHARED_MEMORY,
};
