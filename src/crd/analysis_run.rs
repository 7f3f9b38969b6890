use k8s_openapi::api::core::v1::PodTemplateSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// AnalysisRun is a single evaluation gating a progressive delivery decision
///
/// Created by a Rollout, an Experiment or an operator. The controller only ever
/// writes the status subresource; the spec is immutable after creation.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "kulta.io",
    version = "v1alpha1",
    kind = "AnalysisRun",
    namespaced,
    status = "AnalysisRunStatus",
    shortname = "ar",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.message"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct AnalysisRunSpec {
    /// Metrics to measure, evaluated in order
    pub metrics: Vec<Metric>,

    /// Stop starting new measurements (abort requested by the owner)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminate: bool,
}

/// A named measurement specification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Metric {
    /// Unique name of the metric within the run
    pub name: String,

    /// Time between measurements (e.g., "30s", "5m"). Unset means measure once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Number of non-error measurements to take. Zero or unset runs indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,

    /// Failed measurements tolerated before the metric is Failed
    #[serde(rename = "maxFailures", skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<i32>,

    /// Consecutive errored measurements tolerated before the metric is Error
    #[serde(
        rename = "maxConsecutiveErrors",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_consecutive_errors: Option<i32>,

    /// Condition a measured value must satisfy to be Successful (e.g., "result < 0.05")
    #[serde(rename = "successCondition", skip_serializing_if = "Option::is_none")]
    pub success_condition: Option<String>,

    /// Condition under which a measured value is Failed (e.g., "result >= 0.1")
    #[serde(rename = "failureCondition", skip_serializing_if = "Option::is_none")]
    pub failure_condition: Option<String>,

    /// Where the measurement comes from
    pub provider: MetricProvider,
}

/// Default number of consecutive errors tolerated when unset
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: i32 = 4;

impl Metric {
    pub fn max_failures(&self) -> i32 {
        self.max_failures.unwrap_or(0)
    }

    pub fn max_consecutive_errors(&self) -> i32 {
        self.max_consecutive_errors
            .unwrap_or(DEFAULT_MAX_CONSECUTIVE_ERRORS)
    }

    /// Requested measurement count, zero meaning indefinite
    pub fn count(&self) -> i32 {
        self.count.unwrap_or(0)
    }
}

/// Metric provider configuration. Exactly one field must be set.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MetricProvider {
    /// Prometheus instant query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusMetric>,

    /// HTTP endpoint returning JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebMetric>,

    /// Kubernetes Job whose exit status is the measurement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobMetric>,
}

impl MetricProvider {
    /// Kind of the configured provider, or None if none is set
    ///
    /// When more than one is set (rejected by validation) the first in
    /// declaration order wins.
    pub fn kind(&self) -> Option<ProviderKind> {
        if self.prometheus.is_some() {
            Some(ProviderKind::Prometheus)
        } else if self.web.is_some() {
            Some(ProviderKind::Web)
        } else if self.job.is_some() {
            Some(ProviderKind::Job)
        } else {
            None
        }
    }

    /// Number of providers configured
    pub fn configured_count(&self) -> usize {
        [
            self.prometheus.is_some(),
            self.web.is_some(),
            self.job.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Type tag used to select a provider implementation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Prometheus,
    Web,
    Job,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Prometheus => "prometheus",
            ProviderKind::Web => "web",
            ProviderKind::Job => "job",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct PrometheusMetric {
    /// Prometheus server address (e.g., "http://prometheus:9090")
    pub address: String,

    /// PromQL instant query
    pub query: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct WebMetric {
    /// URL to GET
    pub url: String,

    /// Extra request headers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<WebHeader>,

    /// Path to the value inside the JSON body (e.g., "$.data.errorRate")
    #[serde(rename = "jsonPath", skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,

    /// Request timeout in seconds
    #[serde(rename = "timeoutSeconds", skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct WebHeader {
    pub key: String,
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct JobMetric {
    /// Pod template for the Job. restartPolicy defaults to Never.
    pub template: PodTemplateSpec,

    /// Retries before the Job is marked failed (default: 0)
    #[serde(rename = "backoffLimit", skip_serializing_if = "Option::is_none")]
    pub backoff_limit: Option<i32>,
}

/// Status of a run, a metric, or a single measurement
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, JsonSchema)]
pub enum AnalysisStatus {
    Pending,
    Running,
    Successful,
    Failed,
    Error,
    Inconclusive,
}

impl AnalysisStatus {
    /// Successful, Failed, Error and Inconclusive are terminal
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Successful
                | AnalysisStatus::Failed
                | AnalysisStatus::Error
                | AnalysisStatus::Inconclusive
        )
    }

    /// Rank of a terminal status: Successful < Inconclusive < Error < Failed
    ///
    /// None for Pending and Running, which are never compared.
    pub fn worseness(&self) -> Option<u8> {
        match self {
            AnalysisStatus::Successful => Some(0),
            AnalysisStatus::Inconclusive => Some(1),
            AnalysisStatus::Error => Some(2),
            AnalysisStatus::Failed => Some(3),
            AnalysisStatus::Pending | AnalysisStatus::Running => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Pending => "Pending",
            AnalysisStatus::Running => "Running",
            AnalysisStatus::Successful => "Successful",
            AnalysisStatus::Failed => "Failed",
            AnalysisStatus::Error => "Error",
            AnalysisStatus::Inconclusive => "Inconclusive",
        }
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sample taken for a metric
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
pub struct Measurement {
    pub status: AnalysisStatus,

    /// Measured value, as reported by the provider
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Human-readable detail, set for errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the measurement started (RFC3339)
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    /// When the measurement finished (RFC3339). Unset while in flight.
    #[serde(rename = "finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,

    /// Provider-specific bookkeeping (e.g., the name of a Job)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Measurement {
    /// Empty measurement with the given status
    pub fn new(status: AnalysisStatus) -> Self {
        Measurement {
            status,
            value: None,
            message: None,
            started_at: None,
            finished_at: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Errored measurement carrying a message
    pub fn error(message: impl Into<String>) -> Self {
        Measurement {
            message: Some(message.into()),
            ..Measurement::new(AnalysisStatus::Error)
        }
    }

    /// In flight until finishedAt is recorded
    pub fn is_in_flight(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// Accumulated measurements and counters for one metric
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct MetricResult {
    /// Terminal status, set once when the metric concludes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AnalysisStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub measurements: Vec<Measurement>,

    /// successful + failed + inconclusive
    #[serde(default)]
    pub count: i32,

    #[serde(default)]
    pub successful: i32,

    #[serde(default)]
    pub failed: i32,

    #[serde(default)]
    pub inconclusive: i32,

    /// Errored measurements, not part of count
    #[serde(default)]
    pub error: i32,
}

impl MetricResult {
    pub fn is_completed(&self) -> bool {
        self.status.map(|s| s.is_completed()).unwrap_or(false)
    }

    pub fn last_measurement(&self) -> Option<&Measurement> {
        self.measurements.last()
    }

    /// Bump the counter matching a terminal measurement status
    ///
    /// Pending and Running leave the counters untouched.
    pub fn record(&mut self, status: AnalysisStatus) {
        match status {
            AnalysisStatus::Successful => {
                self.successful += 1;
                self.count += 1;
            }
            AnalysisStatus::Failed => {
                self.failed += 1;
                self.count += 1;
            }
            AnalysisStatus::Inconclusive => {
                self.inconclusive += 1;
                self.count += 1;
            }
            AnalysisStatus::Error => self.error += 1,
            AnalysisStatus::Pending | AnalysisStatus::Running => {}
        }
    }
}

/// Status of the AnalysisRun
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct AnalysisRunStatus {
    /// Overall status of the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<AnalysisStatus>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the run was first picked up (RFC3339)
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,

    /// Per-metric results keyed by metric name
    #[serde(
        rename = "metricResults",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub metric_results: BTreeMap<String, MetricResult>,
}

impl AnalysisRunStatus {
    pub fn is_completed(&self) -> bool {
        self.phase.map(|p| p.is_completed()).unwrap_or(false)
    }
}

impl AnalysisRun {
    /// Result recorded for a metric, if any
    pub fn metric_result(&self, metric_name: &str) -> Option<&MetricResult> {
        self.status
            .as_ref()
            .and_then(|s| s.metric_results.get(metric_name))
    }

    /// Copy of the recorded results (empty when the run has no status yet)
    pub fn metric_results(&self) -> BTreeMap<String, MetricResult> {
        self.status
            .as_ref()
            .map(|s| s.metric_results.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "analysis_run_test.rs"]
mod tests;
