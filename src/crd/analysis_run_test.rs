#![allow(clippy::unwrap_used)] // Tests can use unwrap for brevity
#![allow(clippy::expect_used)] // Tests can use expect for better error messages

use super::*;
use kube::CustomResourceExt;

#[test]
fn test_analysis_run_deserialize_from_yaml() {
    let yaml = r#"
apiVersion: kulta.io/v1alpha1
kind: AnalysisRun
metadata:
  name: my-app-canary-1
  namespace: default
spec:
  metrics:
  - name: error-rate
    interval: 30s
    count: 10
    maxFailures: 2
    successCondition: result < 0.05
    provider:
      prometheus:
        address: http://prometheus:9090
        query: sum(rate(http_requests_total{status=~"5.."}[2m]))
  - name: smoke
    provider:
      web:
        url: http://my-app-canary/healthz
        jsonPath: $.ok
        headers:
        - key: Authorization
          value: Bearer abc
"#;

    let run: AnalysisRun = serde_yaml::from_str(yaml).expect("Failed to deserialize AnalysisRun");

    assert_eq!(run.metadata.name.as_deref(), Some("my-app-canary-1"));
    assert!(!run.spec.terminate);
    assert_eq!(run.spec.metrics.len(), 2);

    let error_rate = &run.spec.metrics[0];
    assert_eq!(error_rate.interval.as_deref(), Some("30s"));
    assert_eq!(error_rate.count(), 10);
    assert_eq!(error_rate.max_failures(), 2);
    assert_eq!(
        error_rate.max_consecutive_errors(),
        DEFAULT_MAX_CONSECUTIVE_ERRORS
    );
    assert_eq!(error_rate.provider.kind(), Some(ProviderKind::Prometheus));

    let smoke = &run.spec.metrics[1];
    assert_eq!(smoke.interval, None);
    assert_eq!(smoke.count(), 0);
    let web = smoke.provider.web.as_ref().unwrap();
    assert_eq!(web.json_path.as_deref(), Some("$.ok"));
    assert_eq!(web.headers[0].key, "Authorization");
}

#[test]
fn test_job_metric_deserialize_from_yaml() {
    let yaml = r#"
apiVersion: kulta.io/v1alpha1
kind: AnalysisRun
metadata:
  name: integration-tests
spec:
  terminate: true
  metrics:
  - name: integration
    provider:
      job:
        backoffLimit: 1
        template:
          spec:
            containers:
            - name: test
              image: my-tests:1.0
"#;

    let run: AnalysisRun = serde_yaml::from_str(yaml).unwrap();

    assert!(run.spec.terminate);
    let job = run.spec.metrics[0].provider.job.as_ref().unwrap();
    assert_eq!(job.backoff_limit, Some(1));
    let containers = &job.template.spec.as_ref().unwrap().containers;
    assert_eq!(containers[0].image.as_deref(), Some("my-tests:1.0"));
}

#[test]
fn test_status_deserialize_with_metric_results() {
    let yaml = r#"
apiVersion: kulta.io/v1alpha1
kind: AnalysisRun
metadata:
  name: run
spec:
  metrics: []
status:
  phase: Running
  startedAt: "2026-01-01T00:00:00Z"
  metricResults:
    latency:
      measurements:
      - status: Successful
        value: "0.2"
        startedAt: "2026-01-01T00:00:00Z"
        finishedAt: "2026-01-01T00:00:01Z"
      - status: Running
        startedAt: "2026-01-01T00:01:00Z"
      count: 1
      successful: 1
"#;

    let run: AnalysisRun = serde_yaml::from_str(yaml).unwrap();
    let status = run.status.as_ref().unwrap();

    assert_eq!(status.phase, Some(AnalysisStatus::Running));
    let latency = run.metric_result("latency").unwrap();
    assert_eq!(latency.status, None);
    assert_eq!(latency.measurements.len(), 2);
    assert!(latency.last_measurement().unwrap().is_in_flight());
    assert_eq!(latency.successful, 1);
    assert_eq!(latency.failed, 0);
    assert!(run.metric_result("missing").is_none());
}

#[test]
fn test_provider_kind_and_configured_count() {
    let empty = MetricProvider::default();
    assert_eq!(empty.kind(), None);
    assert_eq!(empty.configured_count(), 0);

    let both = MetricProvider {
        prometheus: Some(PrometheusMetric {
            address: "http://prometheus:9090".to_string(),
            query: "up".to_string(),
        }),
        web: Some(WebMetric {
            url: "http://example".to_string(),
            headers: vec![],
            json_path: None,
            timeout_seconds: None,
        }),
        job: None,
    };
    assert_eq!(both.kind(), Some(ProviderKind::Prometheus));
    assert_eq!(both.configured_count(), 2);
}

#[test]
fn test_worseness_order_is_total_over_terminal_statuses() {
    let ordered = [
        AnalysisStatus::Successful,
        AnalysisStatus::Inconclusive,
        AnalysisStatus::Error,
        AnalysisStatus::Failed,
    ];
    for pair in ordered.windows(2) {
        assert!(pair[0].worseness().unwrap() < pair[1].worseness().unwrap());
    }
    assert_eq!(AnalysisStatus::Running.worseness(), None);
    assert_eq!(AnalysisStatus::Pending.worseness(), None);
    assert!(!AnalysisStatus::Running.is_completed());
    assert!(AnalysisStatus::Inconclusive.is_completed());
}

#[test]
fn test_metric_result_record_keeps_count_invariant() {
    let mut result = MetricResult::default();
    result.record(AnalysisStatus::Successful);
    result.record(AnalysisStatus::Failed);
    result.record(AnalysisStatus::Inconclusive);
    result.record(AnalysisStatus::Error);
    result.record(AnalysisStatus::Running);

    assert_eq!(result.count, 3);
    assert_eq!(
        result.count,
        result.successful + result.failed + result.inconclusive
    );
    assert_eq!(result.error, 1);
}

#[test]
fn test_crd_generation() {
    let crd = AnalysisRun::crd();
    assert_eq!(crd.spec.group, "kulta.io");
    assert_eq!(crd.spec.names.kind, "AnalysisRun");
    assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    assert!(crd.spec.versions[0].subresources.is_some());
}
