//! Tests for the routing orchestrator
//!
//! These tests route requests end to end through fake handles: strategy
//! selection, fallbacks, breaker protection and script cleanup.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    use crate::analysis::Strategy;
    use crate::core::{Arg, DirectCall, FeatureDescriptor};
    use crate::error::{ErrorKind, RouterError};
    use crate::operation::OperationRequest;
    use crate::resilience::{BreakerScope, CircuitBreakerConfig, CircuitState};
    use crate::router::{Command, FallbackCommand, HealthStatus, RoutingOrchestrator};
    use crate::script::ScriptConfig;
    use crate::tests::support::{fast_retry, simple_extrude, sweep, wide_extrude, FakeFactory, FakeHandle, MockBridge};

    fn script_dir() -> (TempDir, ScriptConfig) {
        let dir = tempfile::tempdir().unwrap();
        let config = ScriptConfig {
            directory: Some(dir.path().to_path_buf()),
            ..ScriptConfig::default()
        };
        (dir, config)
    }

    fn single(handle: &Arc<FakeHandle>, script: ScriptConfig) -> RoutingOrchestrator {
        RoutingOrchestrator::builder()
            .single_handle(handle.clone())
            .retry(fast_retry(0))
            .script(script)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_simple_request_goes_direct() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        let router = single(&handle, script);

        let routed = assert_ok!(router.execute(&simple_extrude(), FallbackCommand::None).await);

        assert_eq!(routed.value.name, "FeatureExtrusion1");
        assert_eq!(routed.metadata.planned, Strategy::Direct);
        assert_eq!(routed.metadata.used, Strategy::Direct);
        assert_eq!(routed.metadata.handle_id, "cad-1");
        assert_eq!(routed.metadata.attempts, 1);
        assert!(!routed.metadata.fallback_used);

        let calls = handle.calls.lock().unwrap();
        assert_eq!(calls[0].method, "FeatureExtrusion");
        assert_eq!(calls[0].arity() as u32, routed.metadata.report.effective_count);
        assert_eq!(handle.script_count(), 0);

        let metrics = router.metrics().snapshot();
        assert_eq!(metrics.requests, 1);
        assert_eq!(metrics.successes, 1);
        assert_eq!(metrics.direct_attempts, 1);
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_script() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Ok(None));
        let router = single(&handle, script);

        let routed = assert_ok!(router.execute(&wide_extrude(), FallbackCommand::None).await);

        assert_eq!(routed.metadata.planned, Strategy::Hybrid);
        assert_eq!(routed.metadata.used, Strategy::Script);
        assert!(routed.metadata.fallback_used);
        assert_eq!(routed.metadata.attempts, 2);
        assert_eq!(routed.value, FeatureDescriptor::new("Script-Feature1", "Script"));

        let runs = handle.scripts.lock().unwrap();
        assert_eq!(runs.len(), 1);
        let text = runs[0].text.as_deref().unwrap_or_default();
        assert!(text.contains("FeatureExtrusionThin2("));
        assert!(!runs[0].path.exists());

        let metrics = router.metrics().snapshot();
        assert_eq!(metrics.fallbacks, 1);
        assert_eq!(metrics.script_attempts, 1);
    }

    #[tokio::test]
    async fn test_hybrid_double_failure_is_combined() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Ok(None));
        handle.push_script(Ok(false));
        let router = single(&handle, script);

        let err = assert_err!(router.execute(&wide_extrude(), FallbackCommand::None).await);

        match err.root() {
            RouterError::Combined { primary, fallback } => {
                assert_eq!(primary.kind(), ErrorKind::ExternalCall);
                assert!(fallback.to_string().contains("reported failure"));
            }
            other => panic!("expected combined error, got {:?}", other),
        }
        assert_eq!(err.strategy(), Some(Strategy::Hybrid));
        let context = err.context().unwrap();
        assert_eq!(context.attempts, Some(2));
        assert_eq!(context.data.get("handle").map(String::as_str), Some("cad-1"));
        assert!(!handle.scripts.lock().unwrap()[0].path.exists());
        assert_eq!(router.metrics().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_script_only_request_skips_direct_call() {
        let (dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        let router = single(&handle, script);

        let routed = assert_ok!(router.execute(&sweep(), FallbackCommand::None).await);

        assert_eq!(routed.metadata.planned, Strategy::Script);
        assert_eq!(routed.metadata.used, Strategy::Script);
        assert_eq!(handle.call_count(), 0);

        let runs = handle.scripts.lock().unwrap();
        assert_eq!(runs[0].module, "CadRouter");
        assert_eq!(runs[0].procedure, "main");
        assert_eq!(runs[0].path.parent(), Some(dir.path()));
        assert!(runs[0].text.as_deref().unwrap_or_default().contains("InsertProtrusionSwept4("));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_script_without_new_feature_fails() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.set_last_feature(None);
        let router = single(&handle, script);

        let err = assert_err!(router.execute(&sweep(), FallbackCommand::None).await);
        assert_eq!(err.kind(), ErrorKind::ExternalCall);
        assert!(err.to_string().contains("last_feature"));
    }

    #[tokio::test]
    async fn test_invalid_request_never_reaches_handle() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        let router = single(&handle, script);

        let request = OperationRequest::new("extrude").with("depth", -5.0);
        let err = assert_err!(router.execute(&request, FallbackCommand::Strategy).await);

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.context().and_then(|c| c.request_id.as_ref()).is_some());
        assert_eq!(handle.call_count(), 0);
        assert_eq!(handle.script_count(), 0);
        assert_eq!(router.metrics().snapshot().failures, 1);
    }

    #[tokio::test]
    async fn test_direct_failure_without_fallback_is_terminal() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Err(RouterError::external_call("rebuild error")));
        let router = single(&handle, script);

        let err = assert_err!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(err.kind(), ErrorKind::ExternalCall);
        assert_eq!(handle.script_count(), 0);
    }

    #[tokio::test]
    async fn test_strategy_fallback_runs_script() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Err(RouterError::external_call("rebuild error")));
        let router = single(&handle, script);

        let routed = assert_ok!(router.execute(&simple_extrude(), FallbackCommand::Strategy).await);
        assert_eq!(routed.metadata.planned, Strategy::Direct);
        assert_eq!(routed.metadata.used, Strategy::Script);
        assert!(routed.metadata.fallback_used);
        assert_eq!(handle.script_count(), 1);
    }

    #[tokio::test]
    async fn test_fixed_fallback_call() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Ok(None));
        let router = single(&handle, script);

        let fallback = FallbackCommand::Fixed(Command::Call(DirectCall::new(
            "FeatureFillet",
            vec![Arg::Double(0.001)],
        )));
        let routed = assert_ok!(router.execute(&simple_extrude(), fallback).await);

        assert_eq!(routed.value.name, "FeatureFillet2");
        assert_eq!(routed.metadata.used, Strategy::Direct);
        assert!(routed.metadata.fallback_used);
        assert_eq!(routed.metadata.attempts, 2);
    }

    #[tokio::test]
    async fn test_fixed_fallback_script_double_failure() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Ok(None));
        handle.push_script(Err(RouterError::external_call("macro crashed")));
        let router = single(&handle, script);

        let fallback = FallbackCommand::Fixed(Command::Script(sweep()));
        let err = assert_err!(router.execute(&simple_extrude(), fallback).await);

        assert!(matches!(err.root(), RouterError::Combined { .. }));
        assert_eq!(handle.script_count(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_rejects_without_calling() {
        let (_dir, script) = script_dir();
        let mut bridge = MockBridge::new();
        bridge
            .expect_invoke()
            .times(3)
            .returning(|_, _| Err(RouterError::connection("automation server unavailable")));
        let handle = Arc::new(FakeHandle::new("cad-1").with_bridge(bridge));

        let router = RoutingOrchestrator::builder()
            .single_handle(handle.clone())
            .retry(fast_retry(0))
            .circuit_breaker(CircuitBreakerConfig {
                failure_threshold: 3,
                open_duration: Duration::from_secs(60),
            })
            .script(script)
            .build()
            .unwrap();

        for _ in 0..3 {
            let err = assert_err!(router.execute(&simple_extrude(), FallbackCommand::None).await);
            assert_eq!(err.kind(), ErrorKind::Connection);
        }
        assert_eq!(router.breakers().snapshots()[0].status, CircuitState::Open);

        let err = assert_err!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(err.kind(), ErrorKind::CircuitOpen);

        let health = router.health();
        assert_eq!(health.status, HealthStatus::Unavailable);
        assert_eq!(health.metrics.breaker_rejections, 1);
        assert!(health.to_json().unwrap().contains("\"unavailable\""));
    }

    #[tokio::test]
    async fn test_connection_errors_are_retried() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        handle.push_invoke(Err(RouterError::connection("busy")));
        handle.push_invoke(Err(RouterError::connection("busy")));

        let router = RoutingOrchestrator::builder()
            .single_handle(handle.clone())
            .retry(fast_retry(3))
            .script(script)
            .build()
            .unwrap();

        let routed = assert_ok!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(routed.metadata.attempts, 3);
        assert_eq!(router.metrics().snapshot().retries, 2);
        assert_eq!(router.breakers().snapshots()[0].status, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_handle_creation_is_retried() {
        let (_dir, script) = script_dir();
        let factory = Arc::new(FakeFactory::failing(1));
        let router = RoutingOrchestrator::builder()
            .handle_factory(factory.clone())
            .retry(fast_retry(3))
            .script(script)
            .build()
            .unwrap();

        let routed = assert_ok!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(routed.metadata.handle_id, "handle-1");
        assert_eq!(routed.metadata.attempts, 2);
        assert_eq!(factory.created_count(), 1);
        assert_eq!(router.metrics().snapshot().retries, 1);
    }

    #[tokio::test]
    async fn test_handle_creation_gives_up_after_budget() {
        let (_dir, script) = script_dir();
        let factory = Arc::new(FakeFactory::failing(5));
        let router = RoutingOrchestrator::builder()
            .handle_factory(factory.clone())
            .retry(fast_retry(2))
            .script(script)
            .build()
            .unwrap();

        let err = assert_err!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.context().and_then(|c| c.attempts), Some(3));
        assert_eq!(factory.created_count(), 0);
        assert_eq!(router.health().pool.unwrap().creating, 0);
    }

    #[tokio::test]
    async fn test_pooled_handles_with_per_handle_breakers() {
        let (_dir, script) = script_dir();
        let factory = Arc::new(FakeFactory::new());
        let router = RoutingOrchestrator::builder()
            .handle_factory(factory.clone())
            .max_handles(2)
            .breaker_scope(BreakerScope::PerHandle)
            .retry(fast_retry(0))
            .script(script)
            .build()
            .unwrap();

        let routed = assert_ok!(router.execute(&simple_extrude(), FallbackCommand::None).await);
        assert_eq!(routed.metadata.handle_id, "handle-1");
        assert_ok!(router.execute(&sweep(), FallbackCommand::None).await);

        let health = router.health();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.breaker_scope, BreakerScope::PerHandle);
        let names: Vec<_> = health.breakers.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["handle-1"]);
        let pool = health.pool.unwrap();
        assert_eq!(pool.size, 1);
        assert_eq!(pool.idle, 1);

        assert_ok!(router.shutdown().await);
        assert_eq!(factory.created()[0].disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_the_pool() {
        let (_dir, script) = script_dir();
        let factory = Arc::new(FakeFactory::new());
        let router = Arc::new(
            RoutingOrchestrator::builder()
                .handle_factory(factory.clone())
                .max_handles(2)
                .retry(fast_retry(0))
                .script(script)
                .build()
                .unwrap(),
        );

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    router
                        .execute(&simple_extrude(), FallbackCommand::None)
                        .await
                        .map(|routed| routed.metadata.handle_id)
                })
            })
            .collect();

        for task in tasks {
            assert_ok!(assert_ok!(task.await));
        }
        assert!(factory.created_count() <= 2);
        assert_eq!(router.metrics().snapshot().successes, 6);
    }

    #[tokio::test]
    async fn test_unknown_operation_passes_through() {
        let (_dir, script) = script_dir();
        let handle = Arc::new(FakeHandle::new("cad-1"));
        let router = single(&handle, script);

        let request = OperationRequest::new("FeatureManager.InsertFillet")
            .with("radius", 0.5)
            .with("count", 2i64);

        let report = router.analyze(&request);
        assert_eq!(report.strategy, Strategy::Direct);
        assert_eq!(report.confidence, 0.5);

        assert_ok!(router.execute(&request, FallbackCommand::None).await);
        let calls = handle.calls.lock().unwrap();
        assert_eq!(calls[0].method, "FeatureManager.InsertFillet");
        assert_eq!(calls[0].args, vec![Arg::Int(2), Arg::Double(0.5)]);
    }
}
