use crate::controller::provider::Condition;
use crate::crd::analysis_run::{AnalysisRun, Metric};
use std::collections::HashSet;
use std::time::Duration;

/// Validate an AnalysisRun specification
///
/// Checked once, the first time the controller sees the run. A run that fails
/// here is marked Error and no provider is ever called for it.
///
/// # Validation Rules
/// - At least one metric
/// - Metric names are non-empty and unique
/// - Exactly one provider per metric, with its required fields set
/// - `web.timeoutSeconds` > 0
/// - Job metric names are DNS-1123 labels (they become part of the Job name)
/// - `interval` parses (e.g., "30s", "5m")
/// - `count`, `maxFailures`, `maxConsecutiveErrors` are >= 0
/// - `count` > 1 requires an `interval`
/// - `successCondition` / `failureCondition` parse
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_analysis_run(run: &AnalysisRun) -> Result<(), String> {
    if run.spec.metrics.is_empty() {
        return Err("spec.metrics must have at least one metric".to_string());
    }

    let mut seen = HashSet::new();
    for (i, metric) in run.spec.metrics.iter().enumerate() {
        if metric.name.is_empty() {
            return Err(format!("metrics[{}].name cannot be empty", i));
        }
        if !seen.insert(metric.name.as_str()) {
            return Err(format!(
                "metrics[{}].name '{}' is not unique",
                i, metric.name
            ));
        }
        validate_metric(i, metric)?;
    }

    Ok(())
}

fn validate_metric(i: usize, metric: &Metric) -> Result<(), String> {
    if let Some(interval) = &metric.interval {
        if parse_duration(interval).is_none() {
            return Err(format!("metrics[{}].interval invalid: {}", i, interval));
        }
    }

    for (field, value) in [
        ("count", metric.count),
        ("maxFailures", metric.max_failures),
        ("maxConsecutiveErrors", metric.max_consecutive_errors),
    ] {
        if let Some(v) = value {
            if v < 0 {
                return Err(format!("metrics[{}].{} must be >= 0, got {}", i, field, v));
            }
        }
    }

    if metric.count() > 1 && metric.interval.is_none() {
        return Err(format!(
            "metrics[{}].interval must be set when count > 1",
            i
        ));
    }

    for (field, condition) in [
        ("successCondition", &metric.success_condition),
        ("failureCondition", &metric.failure_condition),
    ] {
        if let Some(expr) = condition {
            if let Err(e) = Condition::parse(expr) {
                return Err(format!("metrics[{}].{} invalid: {}", i, field, e));
            }
        }
    }

    validate_provider(i, metric)
}

/// Lowercase alphanumerics and '-', starting and ending alphanumeric, max 63
fn is_dns1123_label(value: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    value.len() <= 63
        && value.starts_with(alnum)
        && value.ends_with(alnum)
        && value.chars().all(|c| alnum(c) || c == '-')
}

fn validate_provider(i: usize, metric: &Metric) -> Result<(), String> {
    let provider = &metric.provider;
    match provider.configured_count() {
        0 => return Err(format!("metrics[{}].provider must be set", i)),
        1 => {}
        _ => {
            return Err(format!(
                "metrics[{}].provider must set exactly one of prometheus, web, job",
                i
            ))
        }
    }

    if let Some(prometheus) = &provider.prometheus {
        if prometheus.address.is_empty() {
            return Err(format!(
                "metrics[{}].provider.prometheus.address cannot be empty",
                i
            ));
        }
        if prometheus.query.is_empty() {
            return Err(format!(
                "metrics[{}].provider.prometheus.query cannot be empty",
                i
            ));
        }
    }

    if let Some(web) = &provider.web {
        if web.url.is_empty() {
            return Err(format!("metrics[{}].provider.web.url cannot be empty", i));
        }
        if web.timeout_seconds == Some(0) {
            return Err(format!(
                "metrics[{}].provider.web.timeoutSeconds must be > 0",
                i
            ));
        }
    }

    if let Some(job) = &provider.job {
        if !is_dns1123_label(&metric.name) {
            return Err(format!(
                "metrics[{}].name '{}' must be a DNS-1123 label for job metrics",
                i, metric.name
            ));
        }
        let has_containers = job
            .template
            .spec
            .as_ref()
            .map(|spec| !spec.containers.is_empty())
            .unwrap_or(false);
        if !has_containers {
            return Err(format!(
                "metrics[{}].provider.job.template must have at least one container",
                i
            ));
        }
    }

    Ok(())
}

/// Parse a duration string like "5m", "30s", "1h" into std::time::Duration
///
/// Supported formats:
/// - "30s" → 30 seconds (max 24h = 86400s)
/// - "5m" → 5 minutes (max 24h = 1440m)
/// - "2h" → 2 hours (max 1 week = 168h)
///
/// Zero durations are rejected.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let duration_str = duration_str.trim();

    let unit = duration_str.chars().last()?;
    let number: u64 = duration_str[..duration_str.len() - unit.len_utf8()]
        .parse()
        .ok()?;

    if number == 0 {
        return None;
    }

    match unit {
        's' if number <= 86400 => Some(Duration::from_secs(number)),
        'm' if number <= 1440 => number.checked_mul(60).map(Duration::from_secs),
        'h' if number <= 168 => number.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::crd::analysis_run::{AnalysisRunSpec, MetricProvider, PrometheusMetric, WebMetric};

    fn prometheus_metric(name: &str) -> Metric {
        Metric {
            name: name.to_string(),
            interval: Some("1m".to_string()),
            count: Some(5),
            max_failures: Some(1),
            max_consecutive_errors: None,
            success_condition: Some("result < 0.05".to_string()),
            failure_condition: None,
            provider: MetricProvider {
                prometheus: Some(PrometheusMetric {
                    address: "http://prometheus:9090".to_string(),
                    query: "up".to_string(),
                }),
                ..Default::default()
            },
        }
    }

    fn run_with(metrics: Vec<Metric>) -> AnalysisRun {
        AnalysisRun::new(
            "run",
            AnalysisRunSpec {
                metrics,
                terminate: false,
            },
        )
    }

    #[test]
    fn test_valid_run_passes() {
        let run = run_with(vec![prometheus_metric("error-rate"), prometheus_metric("latency")]);
        assert_eq!(validate_analysis_run(&run), Ok(()));
    }

    #[test]
    fn test_empty_metrics_rejected() {
        let err = validate_analysis_run(&run_with(vec![])).unwrap_err();
        assert!(err.contains("at least one metric"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let run = run_with(vec![prometheus_metric("latency"), prometheus_metric("latency")]);
        let err = validate_analysis_run(&run).unwrap_err();
        assert!(err.contains("not unique"), "{}", err);
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let mut metric = prometheus_metric("latency");
        metric.interval = Some("soon".to_string());
        let err = validate_analysis_run(&run_with(vec![metric])).unwrap_err();
        assert!(err.contains("interval invalid"), "{}", err);
    }

    #[test]
    fn test_negative_thresholds_rejected() {
        let mut metric = prometheus_metric("latency");
        metric.max_failures = Some(-1);
        let err = validate_analysis_run(&run_with(vec![metric])).unwrap_err();
        assert!(err.contains("maxFailures must be >= 0"), "{}", err);
    }

    #[test]
    fn test_count_without_interval_rejected() {
        let mut metric = prometheus_metric("latency");
        metric.interval = None;
        let err = validate_analysis_run(&run_with(vec![metric])).unwrap_err();
        assert!(err.contains("count > 1"), "{}", err);

        let mut once = prometheus_metric("once");
        once.interval = None;
        once.count = Some(1);
        assert_eq!(validate_analysis_run(&run_with(vec![once])), Ok(()));
    }

    #[test]
    fn test_bad_condition_rejected() {
        let mut metric = prometheus_metric("latency");
        metric.failure_condition = Some("result >> 3".to_string());
        let err = validate_analysis_run(&run_with(vec![metric])).unwrap_err();
        assert!(err.contains("failureCondition invalid"), "{}", err);
    }

    #[test]
    fn test_provider_must_be_exactly_one() {
        let mut none = prometheus_metric("none");
        none.provider = MetricProvider::default();
        let err = validate_analysis_run(&run_with(vec![none])).unwrap_err();
        assert!(err.contains("provider must be set"), "{}", err);

        let mut two = prometheus_metric("two");
        two.provider.web = Some(WebMetric {
            url: "http://example".to_string(),
            headers: vec![],
            json_path: None,
            timeout_seconds: None,
        });
        let err = validate_analysis_run(&run_with(vec![two])).unwrap_err();
        assert!(err.contains("exactly one"), "{}", err);
    }

    #[test]
    fn test_job_without_containers_rejected() {
        let mut metric = prometheus_metric("job");
        metric.provider = MetricProvider {
            job: Some(crate::crd::analysis_run::JobMetric {
                template: Default::default(),
                backoff_limit: None,
            }),
            ..Default::default()
        };
        let err = validate_analysis_run(&run_with(vec![metric])).unwrap_err();
        assert!(err.contains("at least one container"), "{}", err);
    }

    #[test]
    fn test_parse_duration_units_and_limits() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration(" 10s "), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("0s"), None);
        assert_eq!(parse_duration("169h"), None);
        assert_eq!(parse_duration("10d"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("s"), None);
    }

    #[test]
    fn test_zero_web_timeout_rejected() {
        let mut metric = prometheus_metric("health");
        metric.provider = MetricProvider {
            web: Some(WebMetric {
                url: "http://example/health".to_string(),
                headers: vec![],
                json_path: None,
                timeout_seconds: Some(0),
            }),
            ..Default::default()
        };
        let err = validate_analysis_run(&run_with(vec![metric.clone()])).unwrap_err();
        assert!(err.contains("timeoutSeconds must be > 0"), "{}", err);

        if let Some(web) = metric.provider.web.as_mut() {
            web.timeout_seconds = Some(5);
        }
        assert_eq!(validate_analysis_run(&run_with(vec![metric])), Ok(()));
    }

    #[test]
    fn test_job_metric_name_must_be_dns_label() {
        let job_metric = |name: &str| {
            let mut metric = prometheus_metric(name);
            metric.provider = MetricProvider {
                job: Some(crate::crd::analysis_run::JobMetric {
                    template: k8s_openapi::api::core::v1::PodTemplateSpec {
                        metadata: None,
                        spec: Some(k8s_openapi::api::core::v1::PodSpec {
                            containers: vec![k8s_openapi::api::core::v1::Container {
                                name: "check".to_string(),
                                image: Some("busybox".to_string()),
                                ..Default::default()
                            }],
                            ..Default::default()
                        }),
                    },
                    backoff_limit: None,
                }),
                ..Default::default()
            };
            metric
        };

        let err = validate_analysis_run(&run_with(vec![job_metric("Error_Rate")])).unwrap_err();
        assert!(err.contains("DNS-1123"), "{}", err);
        assert!(validate_analysis_run(&run_with(vec![job_metric("-smoke")])).is_err());
        assert_eq!(
            validate_analysis_run(&run_with(vec![job_metric("smoke-test-2")])),
            Ok(())
        );

        // Other providers only use the name as a status key
        assert_eq!(
            validate_analysis_run(&run_with(vec![prometheus_metric("Error_Rate")])),
            Ok(())
        );
    }
}
