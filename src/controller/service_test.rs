//! Tests for the Service ensurers, run against the in-memory control plane.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
    use kube::api::ObjectMeta;
    use tokio_util::sync::CancellationToken;

    use crate::controller::reconcile::ReconcileOutcome;
    use crate::controller::service::*;
    use crate::controller::testing::{postgres, test_context};
    use crate::crd::{MonitorSpec, Postgres, LABEL_ROLE};
    use crate::error::Error;

    fn replicated(name: &str, replicas: i32) -> Postgres {
        let mut db = postgres(name);
        db.spec.replicas = Some(replicas);
        db
    }

    fn monitored(name: &str, agent: &str) -> Postgres {
        let mut db = postgres(name);
        db.spec.monitor = Some(MonitorSpec {
            agent: agent.to_string(),
            prometheus: None,
        });
        db
    }

    // -----------------------------------------------------------------------
    // Governing service
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_governing_service_is_headless() {
        let ctx = test_context();
        let db = postgres("pg");

        let outcome = ensure_governing_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);

        let svc: Service = ctx.client.object("demo", "pg-pods").unwrap();
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        assert_eq!(spec.selector, Some(db.offshoot_selectors()));

        let owners = svc.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "Postgres");
        assert_eq!(owners[0].uid, "pg-uid");

        assert_eq!(
            ctx.recorder.messages(),
            vec!["Successfully created governing service".to_string()]
        );
    }

    // -----------------------------------------------------------------------
    // Primary / standby
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_single_member_gets_primary_only() {
        let ctx = test_context();
        let db = replicated("pg", 1);

        let outcome = ensure_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Created);
        assert!(ctx.client.object::<Service>("demo", "pg").is_some());
        assert!(ctx.client.object::<Service>("demo", "pg-standby").is_none());
        assert_eq!(ctx.client.count::<Service>(), 1);
    }

    #[tokio::test]
    async fn test_three_members_get_standby_service() {
        let ctx = test_context();
        let db = replicated("pg", 3);

        let outcome = ensure_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);

        let primary: Service = ctx.client.object("demo", "pg").unwrap();
        let standby: Service = ctx.client.object("demo", "pg-standby").unwrap();

        let primary_spec = primary.spec.unwrap();
        assert_eq!(
            primary_spec.selector.unwrap().get(LABEL_ROLE).map(String::as_str),
            Some("primary")
        );
        assert_eq!(primary_spec.ports.unwrap()[0].name.as_deref(), Some("primary"));

        let standby_spec = standby.spec.unwrap();
        assert_eq!(
            standby_spec.selector.unwrap().get(LABEL_ROLE).map(String::as_str),
            Some("replica")
        );
        let ports = standby_spec.ports.unwrap();
        assert_eq!(ports[0].name.as_deref(), Some("standby"));
        assert_eq!(ports[0].port, 5432);

        assert_eq!(ctx.recorder.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_second_pass_is_unchanged() {
        let ctx = test_context();
        let db = replicated("pg", 3);
        let cancel = CancellationToken::new();

        ensure_service(&ctx, &db, &cancel).await.unwrap();
        let outcome = ensure_service(&ctx, &db, &cancel).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(ctx.client.patches(), 0);
        assert_eq!(ctx.recorder.messages().len(), 2, "no events for no-ops");
    }

    #[tokio::test]
    async fn test_allocated_node_port_survives() {
        let ctx = test_context();
        let db = postgres("pg");
        ctx.client.insert(&Service {
            metadata: ObjectMeta {
                name: Some("pg".to_string()),
                namespace: Some("demo".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("NodePort".to_string()),
                ports: Some(vec![ServicePort {
                    name: Some("primary".to_string()),
                    port: 5432,
                    node_port: Some(30432),
                    protocol: Some("TCP".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            status: None,
        });

        let outcome = ensure_primary_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Patched);

        let spec = ctx.client.object::<Service>("demo", "pg").unwrap().spec.unwrap();
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.node_port, Some(30432));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
        assert_eq!(spec.type_.as_deref(), Some("NodePort"));
        assert_eq!(
            ctx.recorder.messages(),
            vec!["Successfully patched Service".to_string()]
        );
    }

    #[tokio::test]
    async fn test_service_template_overrides() {
        let ctx = test_context();
        let mut db = postgres("pg");
        db.spec.service_template.annotations = Some(BTreeMap::from([(
            "service.beta.kubernetes.io/aws-load-balancer-internal".to_string(),
            "true".to_string(),
        )]));
        db.spec.service_template.spec.type_ = Some("LoadBalancer".to_string());
        db.spec.service_template.spec.load_balancer_source_ranges =
            Some(vec!["10.0.0.0/8".to_string()]);

        ensure_primary_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();

        let svc: Service = ctx.client.object("demo", "pg").unwrap();
        assert!(svc
            .metadata
            .annotations
            .unwrap()
            .contains_key("service.beta.kubernetes.io/aws-load-balancer-internal"));
        let spec = svc.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(
            spec.load_balancer_source_ranges,
            Some(vec!["10.0.0.0/8".to_string()])
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = test_context();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = ensure_service(&ctx, &postgres("pg"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(ctx.client.creates(), 0);
    }

    // -----------------------------------------------------------------------
    // Stats service
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_stats_service_skipped_without_monitor() {
        let ctx = test_context();
        let outcome = ensure_stats_service(&ctx, &postgres("pg"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(ctx.client.creates(), 0);
        assert!(ctx.recorder.messages().is_empty());
    }

    #[tokio::test]
    async fn test_stats_service_skipped_for_other_vendor() {
        let ctx = test_context();
        let db = monitored("pg", "coreos.com/operator");
        let outcome = ensure_stats_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert!(ctx.client.object::<Service>("demo", "pg-stats").is_none());
    }

    #[tokio::test]
    async fn test_stats_service_for_prometheus() {
        let ctx = test_context();
        let db = monitored("pg", "prometheus.io/operator");

        let outcome = ensure_stats_service(&ctx, &db, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Created);

        let svc: Service = ctx.client.object("demo", "pg-stats").unwrap();
        assert_eq!(
            svc.metadata.labels.unwrap().get(LABEL_ROLE).map(String::as_str),
            Some("stats")
        );
        let spec = svc.spec.unwrap();
        assert_eq!(spec.selector, Some(db.offshoot_selectors()));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.name.as_deref(), Some("metrics"));
        assert_eq!(port.port, 56790);
        assert_eq!(
            ctx.recorder.messages(),
            vec!["Successfully created stats service".to_string()]
        );
    }
}
