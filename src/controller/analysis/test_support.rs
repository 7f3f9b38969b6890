//! Fixtures shared by the analysis unit tests

use crate::crd::analysis_run::{
    AnalysisRun, AnalysisRunSpec, AnalysisRunStatus, AnalysisStatus, Measurement, Metric,
    MetricProvider, MetricResult, WebMetric,
};
use chrono::{DateTime, TimeZone, Utc};

/// A fixed instant so timestamps in assertions are stable
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

fn web_provider() -> MetricProvider {
    MetricProvider {
        web: Some(WebMetric {
            url: "http://metrics.example/health".to_string(),
            headers: vec![],
            json_path: Some("$.value".to_string()),
            timeout_seconds: None,
        }),
        ..Default::default()
    }
}

/// Metric measured every `interval`, indefinitely
pub fn interval_metric(name: &str, interval: &str) -> Metric {
    Metric {
        name: name.to_string(),
        interval: Some(interval.to_string()),
        count: None,
        max_failures: None,
        max_consecutive_errors: None,
        success_condition: None,
        failure_condition: None,
        provider: web_provider(),
    }
}

/// Metric measured exactly once
pub fn once_metric(name: &str) -> Metric {
    Metric {
        name: name.to_string(),
        interval: None,
        count: None,
        max_failures: None,
        max_consecutive_errors: None,
        success_condition: None,
        failure_condition: None,
        provider: web_provider(),
    }
}

/// Run in the default namespace carrying the given results
///
/// Status stays None when no results are given, like a freshly created run.
pub fn run_with_results(metrics: Vec<Metric>, results: Vec<(&str, MetricResult)>) -> AnalysisRun {
    let mut run = AnalysisRun::new(
        "canary-analysis",
        AnalysisRunSpec {
            metrics,
            terminate: false,
        },
    );
    run.metadata.namespace = Some("default".to_string());
    run.metadata.uid = Some("3f1c2b9a-0000-4000-8000-000000000001".to_string());

    if !results.is_empty() {
        run.status = Some(AnalysisRunStatus {
            phase: Some(AnalysisStatus::Running),
            message: None,
            started_at: Some(fixed_now().to_rfc3339()),
            metric_results: results
                .into_iter()
                .map(|(name, result)| (name.to_string(), result))
                .collect(),
        });
    }

    run
}

/// Result holding the given measurements with counters derived from them
pub fn result_with(measurements: Vec<Measurement>) -> MetricResult {
    let mut result = MetricResult::default();
    for m in &measurements {
        if !m.is_in_flight() {
            result.record(m.status);
        }
    }
    result.measurements = measurements;
    result
}

/// Completed measurement that finished at `at`
pub fn finished(status: AnalysisStatus, at: DateTime<Utc>) -> Measurement {
    Measurement {
        value: Some("1".to_string()),
        started_at: Some(at.to_rfc3339()),
        finished_at: Some(at.to_rfc3339()),
        ..Measurement::new(status)
    }
}

/// Running measurement started at `started`
pub fn in_flight(started: DateTime<Utc>) -> Measurement {
    Measurement {
        started_at: Some(started.to_rfc3339()),
        ..Measurement::new(AnalysisStatus::Running)
    }
}
