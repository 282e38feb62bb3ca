//! Unit tests for the merge-by-name helpers.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{
        ConfigMapVolumeSource, Container, ContainerPort, EnvVar, ExecAction,
        PersistentVolumeClaim, PersistentVolumeClaimSpec, PersistentVolumeClaimStatus, Probe,
        SecretVolumeSource, ServicePort, Volume, VolumeMount,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

    use crate::controller::upsert::*;

    fn env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    fn port(name: &str, number: i32) -> ServicePort {
        ServicePort {
            name: Some(name.to_string()),
            port: number,
            ..Default::default()
        }
    }

    // -----------------------------------------------------------------------
    // Generic upsert
    // -----------------------------------------------------------------------

    #[test]
    fn test_upsert_env_replaces_in_place_and_appends() {
        let mut vars = vec![env("A", "1"), env("B", "2")];
        upsert_env_vars(&mut vars, [env("A", "changed"), env("C", "3")]);

        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"], "position of A must be stable");
        assert_eq!(vars[0].value.as_deref(), Some("changed"));
    }

    #[test]
    fn test_upsert_env_twice_is_noop() {
        let mut vars = vec![env("A", "1")];
        upsert_env_vars(&mut vars, [env("B", "2")]);
        let once = vars.clone();
        upsert_env_vars(&mut vars, [env("B", "2")]);
        assert_eq!(vars, once);
    }

    #[test]
    fn test_upsert_volume_mount_by_name() {
        let mut mounts = vec![VolumeMount {
            name: "data".to_string(),
            mount_path: "/old".to_string(),
            ..Default::default()
        }];
        upsert_volume_mount(
            &mut mounts,
            VolumeMount {
                name: "data".to_string(),
                mount_path: "/var/pv".to_string(),
                ..Default::default()
            },
        );
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].mount_path, "/var/pv");
    }

    // -----------------------------------------------------------------------
    // Containers
    // -----------------------------------------------------------------------

    #[test]
    fn test_upsert_container_keeps_foreign_env_and_mounts() {
        let mut containers = vec![Container {
            name: "postgres".to_string(),
            image: Some("old:1".to_string()),
            env: Some(vec![env("INJECTED", "by-webhook"), env("A", "1")]),
            volume_mounts: Some(vec![VolumeMount {
                name: "istio".to_string(),
                mount_path: "/etc/istio".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }];

        upsert_container(
            &mut containers,
            Container {
                name: "postgres".to_string(),
                image: Some("new:2".to_string()),
                env: Some(vec![env("A", "2")]),
                volume_mounts: Some(vec![VolumeMount {
                    name: "data".to_string(),
                    mount_path: "/var/pv".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        );

        let c = &containers[0];
        assert_eq!(c.image.as_deref(), Some("new:2"));
        let env = c.env.as_ref().unwrap();
        assert_eq!(env.len(), 2);
        assert_eq!(env[0].name, "INJECTED");
        assert_eq!(env[1].value.as_deref(), Some("2"));
        assert_eq!(c.volume_mounts.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_containers_appends_unknown() {
        let mut containers = vec![Container {
            name: "postgres".to_string(),
            ..Default::default()
        }];
        upsert_containers(
            &mut containers,
            [Container {
                name: "exporter".to_string(),
                ..Default::default()
            }],
        );
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[1].name, "exporter");
    }

    #[test]
    fn test_upsert_container_keeps_server_defaults() {
        let live_probe = Probe {
            exec: Some(ExecAction {
                command: Some(vec!["pg_isready".to_string()]),
            }),
            timeout_seconds: Some(1),
            period_seconds: Some(10),
            success_threshold: Some(1),
            failure_threshold: Some(3),
            ..Default::default()
        };
        let mut containers = vec![Container {
            name: "postgres".to_string(),
            image: Some("pg:1".to_string()),
            image_pull_policy: Some("IfNotPresent".to_string()),
            ports: Some(vec![ContainerPort {
                container_port: 5432,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            readiness_probe: Some(live_probe.clone()),
            ..Default::default()
        }];

        upsert_container(
            &mut containers,
            Container {
                name: "postgres".to_string(),
                image: Some("pg:1".to_string()),
                ports: Some(vec![ContainerPort {
                    container_port: 5432,
                    ..Default::default()
                }]),
                readiness_probe: Some(Probe {
                    exec: live_probe.exec.clone(),
                    period_seconds: Some(5),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let c = &containers[0];
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));
        assert_eq!(c.ports.as_ref().unwrap()[0].protocol.as_deref(), Some("TCP"));
        let probe = c.readiness_probe.as_ref().unwrap();
        assert_eq!(probe.period_seconds, Some(5));
        assert_eq!(probe.timeout_seconds, Some(1));
        assert_eq!(probe.failure_threshold, Some(3));
    }

    #[test]
    fn test_merge_probe_removal_clears() {
        let live = Probe {
            timeout_seconds: Some(1),
            ..Default::default()
        };
        assert_eq!(merge_probe(Some(live), None), None);
    }

    #[test]
    fn test_upsert_volume_keeps_default_mode() {
        let mut volumes = vec![Volume {
            name: "custom-config".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some("old".to_string()),
                default_mode: Some(420),
                ..Default::default()
            }),
            ..Default::default()
        }];

        upsert_volume(
            &mut volumes,
            Volume {
                name: "custom-config".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some("new".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        let secret = volumes[0].secret.as_ref().unwrap();
        assert_eq!(secret.secret_name.as_deref(), Some("new"));
        assert_eq!(secret.default_mode, Some(420));
    }

    #[test]
    fn test_upsert_volume_can_switch_source_kind() {
        let mut volumes = vec![Volume {
            name: "initial-script".to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some("scripts".to_string()),
                default_mode: Some(420),
                ..Default::default()
            }),
            ..Default::default()
        }];

        upsert_volume(
            &mut volumes,
            Volume {
                name: "initial-script".to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: Some("scripts".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );

        assert!(volumes[0].secret.is_none());
        assert!(volumes[0].config_map.is_some());
    }

    #[test]
    fn test_upsert_volume_claim_keeps_volume_mode_and_status() {
        let claim = |mode: Option<&str>| PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some("data".to_string()),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                volume_mode: mode.map(str::to_string),
                ..Default::default()
            }),
            status: None,
        };
        let mut live = claim(Some("Filesystem"));
        live.status = Some(PersistentVolumeClaimStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        let mut claims = vec![live.clone()];

        upsert_volume_claim(&mut claims, claim(None));

        assert_eq!(claims, vec![live]);
    }

    // -----------------------------------------------------------------------
    // Metadata
    // -----------------------------------------------------------------------

    #[test]
    fn test_upsert_meta_extends_labels_and_skips_empty_annotations() {
        let mut meta = ObjectMeta {
            labels: Some(BTreeMap::from([("keep".to_string(), "me".to_string())])),
            ..Default::default()
        };
        upsert_meta(
            &mut meta,
            BTreeMap::from([("kubedb.com/kind".to_string(), "Postgres".to_string())]),
            Some(&BTreeMap::new()),
        );

        let labels = meta.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert!(meta.annotations.is_none(), "empty annotations must not create the map");
    }

    #[test]
    fn test_ensure_owner_reference_dedupes_by_uid() {
        let owner = OwnerReference {
            api_version: "kubedb.com/v1alpha2".to_string(),
            kind: "Postgres".to_string(),
            name: "pg".to_string(),
            uid: "abc".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        };
        let mut meta = ObjectMeta::default();
        ensure_owner_reference(&mut meta, owner.clone());
        ensure_owner_reference(&mut meta, owner);
        assert_eq!(meta.owner_references.unwrap().len(), 1);
    }

    // -----------------------------------------------------------------------
    // Service ports
    // -----------------------------------------------------------------------

    #[test]
    fn test_merge_service_ports_preserves_node_port_and_protocol() {
        let live = vec![ServicePort {
            node_port: Some(30432),
            protocol: Some("TCP".to_string()),
            ..port("primary", 5432)
        }];
        let merged = merge_service_ports(&live, vec![port("primary", 5432)]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].node_port, Some(30432));
        assert_eq!(merged[0].protocol.as_deref(), Some("TCP"));
    }

    #[test]
    fn test_merge_service_ports_drops_stale_ports() {
        let live = vec![port("primary", 5432), port("legacy", 9999)];
        let merged = merge_service_ports(&live, vec![port("primary", 5432)]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn test_overlay_service_ports_by_name() {
        let canonical = vec![ServicePort {
            target_port: Some(IntOrString::String("api".to_string())),
            ..port("primary", 5432)
        }];
        let overrides = vec![
            ServicePort {
                node_port: Some(31000),
                ..port("primary", 0)
            },
            port("extra", 8008),
        ];

        let ports = overlay_service_ports(canonical, &overrides);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 5432, "zero port in override must not win");
        assert_eq!(ports[0].node_port, Some(31000));
        assert_eq!(
            ports[0].target_port,
            Some(IntOrString::String("api".to_string()))
        );
        assert_eq!(ports[1].name.as_deref(), Some("extra"));
    }
}
