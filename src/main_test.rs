use super::*;
use kulta_analysis::crd::analysis_run::AnalysisRunSpec;
use std::time::Duration;

#[allow(clippy::unwrap_used)] // Test helper - panicking is acceptable
fn mock_context(config: ControllerConfig) -> Context {
    let _ = rustls::crypto::ring::default_provider().install_default();

    // The client is never used: error_policy only reads config and metrics
    let mut kube_config = kube::Config::new("https://localhost:8080".parse().unwrap());
    kube_config.default_namespace = "default".to_string();
    kube_config.accept_invalid_certs = true;
    let client = Client::try_from(kube_config).unwrap();

    Context::new(client, config, Some(create_metrics().unwrap()))
}

#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn test_error_policy_requeues_after_configured_backoff() {
    let config = ControllerConfig {
        error_requeue: Duration::from_secs(42),
        ..ControllerConfig::default()
    };
    let ctx = Arc::new(mock_context(config));
    let run = Arc::new(AnalysisRun::new(
        "canary-analysis",
        AnalysisRunSpec {
            metrics: vec![],
            terminate: false,
        },
    ));

    let action = error_policy(run, &ReconcileError::MissingNamespace, ctx.clone());

    assert_eq!(action, Action::requeue(Duration::from_secs(42)));
    let text = ctx.metrics.as_ref().unwrap().encode().unwrap();
    assert!(text.contains(r#"kulta_analysis_reconciliations_total{result="error"} 1"#));
}
