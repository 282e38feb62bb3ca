//! Volumes and mounts for the database pods

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, PersistentVolumeClaim, PersistentVolumeClaimSpec, SecretVolumeSource,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use crate::crd::{Backend, Postgres, StorageType, CONDITION_DATA_RESTORED};

pub const VOLUME_DATA: &str = "data";
pub const VOLUME_SHARED_MEMORY: &str = "shared-memory";
pub const VOLUME_CUSTOM_CONFIG: &str = "custom-config";
pub const VOLUME_ARCHIVE_SECRET: &str = "wal-g-archive";
pub const VOLUME_RESTORE_SECRET: &str = "wal-g-restore";
pub const VOLUME_INIT_SCRIPT: &str = "initial-script";
pub const VOLUME_LOCAL_ARCHIVE: &str = "local-archive";
pub const VOLUME_LOCAL_INIT: &str = "local-init";

pub const DATA_MOUNT_PATH: &str = "/var/pv";
pub const SHARED_MEMORY_MOUNT_PATH: &str = "/dev/shm";
pub const CUSTOM_CONFIG_MOUNT_PATH: &str = "/etc/config";
pub const ARCHIVE_SECRET_MOUNT_PATH: &str = "/srv/wal-g/archive/secrets";
pub const RESTORE_SECRET_MOUNT_PATH: &str = "/srv/wal-g/restore/secrets";
pub const INIT_SCRIPT_MOUNT_PATH: &str = "/var/initdb";

const STORAGE_CLASS_ANNOTATION: &str = "volume.beta.kubernetes.io/storage-class";
const ACCESS_MODE_RWO: &str = "ReadWriteOnce";

/// A pod volume together with where the database container mounts it
#[derive(Clone, Debug, PartialEq)]
pub struct MountedVolume {
    pub volume: Volume,
    pub mount: VolumeMount,
}

impl MountedVolume {
    fn new(volume: Volume, mount_path: &str) -> Self {
        let mount = VolumeMount {
            name: volume.name.clone(),
            mount_path: mount_path.to_string(),
            ..Default::default()
        };
        Self { volume, mount }
    }
}

/// Backing store of the data directory. Exactly one form exists per instance.
#[derive(Clone, Debug, PartialEq)]
pub enum DataVolume {
    /// Pod-local `emptyDir`
    Ephemeral(Volume),
    /// StatefulSet volume claim template
    Claim(PersistentVolumeClaim),
}

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedVolumeSet {
    pub mounted: Vec<MountedVolume>,
    pub data: DataVolume,
}

impl DerivedVolumeSet {
    /// Pod volumes, including the data volume when it is ephemeral
    pub fn volumes(&self) -> Vec<Volume> {
        let mut volumes: Vec<Volume> = self.mounted.iter().map(|m| m.volume.clone()).collect();
        if let DataVolume::Ephemeral(volume) = &self.data {
            volumes.push(volume.clone());
        }
        volumes
    }

    /// Mounts for the database container, data directory last
    pub fn mounts(&self) -> Vec<VolumeMount> {
        let mut mounts: Vec<VolumeMount> = self.mounted.iter().map(|m| m.mount.clone()).collect();
        mounts.push(VolumeMount {
            name: VOLUME_DATA.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        });
        mounts
    }

    pub fn claim_template(&self) -> Option<&PersistentVolumeClaim> {
        match &self.data {
            DataVolume::Claim(claim) => Some(claim),
            DataVolume::Ephemeral(_) => None,
        }
    }
}

/// Compute every volume the database pods need.
///
/// Restore credentials and init scripts are only mounted until the instance
/// reports `DataRestored`.
pub fn derive_volumes(db: &Postgres) -> DerivedVolumeSet {
    let restored = db.is_condition_true(CONDITION_DATA_RESTORED);
    let archive = db.spec.archiver.as_ref().and_then(|a| a.storage.as_ref());
    let init = db.spec.init.as_ref();
    let wal = init.and_then(|i| i.postgres_wal.as_ref());

    let mut mounted = Vec::new();

    if let Some(storage) = archive.filter(|s| s.backend().is_some() && !s.is_local()) {
        mounted.push(MountedVolume::new(
            secret_volume(VOLUME_ARCHIVE_SECRET, &storage.secret_name()),
            ARCHIVE_SECRET_MOUNT_PATH,
        ));
    }

    if !restored {
        if let Some(wal) = wal.filter(|w| w.storage.backend().is_some() && !w.storage.is_local()) {
            mounted.push(MountedVolume::new(
                secret_volume(VOLUME_RESTORE_SECRET, &wal.storage.secret_name()),
                RESTORE_SECRET_MOUNT_PATH,
            ));
        }
        if let Some(script) = init.and_then(|i| i.script.as_ref()) {
            mounted.push(MountedVolume::new(
                script.volume_source.to_volume(VOLUME_INIT_SCRIPT),
                INIT_SCRIPT_MOUNT_PATH,
            ));
        }
    }

    mounted.push(MountedVolume::new(
        Volume {
            name: VOLUME_SHARED_MEMORY.to_string(),
            empty_dir: Some(EmptyDirVolumeSource {
                medium: Some("Memory".to_string()),
                size_limit: None,
            }),
            ..Default::default()
        },
        SHARED_MEMORY_MOUNT_PATH,
    ));

    // sub_path locates an existing archive for restore; it is never mounted
    if let Some(Backend::Local(local)) = archive.and_then(|s| s.backend()) {
        mounted.push(MountedVolume::new(
            local.volume_source.to_volume(VOLUME_LOCAL_ARCHIVE),
            &local.mount_path,
        ));
    }
    if let Some(Backend::Local(local)) = wal.and_then(|w| w.storage.backend()) {
        mounted.push(MountedVolume::new(
            local.volume_source.to_volume(VOLUME_LOCAL_INIT),
            &local.mount_path,
        ));
    }

    if let Some(config) = &db.spec.config_secret {
        mounted.push(MountedVolume::new(
            secret_volume(VOLUME_CUSTOM_CONFIG, &config.name),
            CUSTOM_CONFIG_MOUNT_PATH,
        ));
    }

    DerivedVolumeSet {
        mounted,
        data: data_volume(db),
    }
}

fn data_volume(db: &Postgres) -> DataVolume {
    let storage = db.spec.storage.clone();

    match db.spec.storage_type {
        StorageType::Ephemeral => {
            let size_limit = storage
                .as_ref()
                .and_then(|s| s.resources.as_ref())
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("storage"))
                .cloned();
            DataVolume::Ephemeral(Volume {
                name: VOLUME_DATA.to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: None,
                    size_limit,
                }),
                ..Default::default()
            })
        }
        StorageType::Durable => {
            let mut spec: PersistentVolumeClaimSpec = storage.unwrap_or_default();
            if spec.access_modes.as_ref().map_or(true, Vec::is_empty) {
                info!(
                    "Using \"{}\" as access mode for {}/{} storage",
                    ACCESS_MODE_RWO,
                    db.namespace_or_default(),
                    db.offshoot_name()
                );
                spec.access_modes = Some(vec![ACCESS_MODE_RWO.to_string()]);
            }

            let annotations = spec.storage_class_name.as_ref().map(|class| {
                BTreeMap::from([(STORAGE_CLASS_ANNOTATION.to_string(), class.clone())])
            });

            DataVolume::Claim(PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(VOLUME_DATA.to_string()),
                    annotations,
                    ..Default::default()
                },
                spec: Some(spec),
                status: None,
            })
        }
    }
}

fn secret_volume(name: &str, secret_name: &str) -> Volume {
    Volume {
        name: name.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}
