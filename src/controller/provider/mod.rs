//! Metric providers
//!
//! A provider performs one measurement for one metric type:
//! - `PrometheusProvider`: instant PromQL query
//! - `WebProvider`: HTTP GET returning JSON
//! - `JobProvider`: Kubernetes Job whose outcome is the measurement
//!
//! The executor never matches on metric types itself. It asks a
//! `ProviderFactory` for the implementation registered for the metric's
//! provider tag, so adding a metric type only touches this module.

pub mod condition;
pub mod job;
pub mod prometheus;
pub mod web;

use crate::crd::analysis_run::{AnalysisRun, Measurement, Metric, ProviderKind};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use condition::{evaluate_conditions, Condition, ConditionError};

/// Errors a provider can report instead of a measurement
///
/// The executor never propagates these. Each one becomes an Error measurement
/// on the metric that produced it.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No data returned")]
    NoData,

    #[error("Invalid condition: {0}")]
    Condition(#[from] ConditionError),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Metric '{0}' has no provider configured")]
    NotConfigured(String),

    #[error("Measurement is missing metadata '{0}'")]
    MissingMetadata(&'static str),
}

/// Identity of the AnalysisRun a measurement is taken for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunScope {
    pub name: String,
    pub namespace: String,
    pub uid: Option<String>,
}

impl RunScope {
    pub fn from_run(run: &AnalysisRun) -> Self {
        RunScope {
            name: run.name_any(),
            namespace: run.namespace().unwrap_or_else(|| "default".to_string()),
            uid: run.uid(),
        }
    }
}

/// Capability implemented once per metric type
///
/// Implementations must not throw for ordinary measurement failures: a value
/// outside the conditions is a Failed measurement, not an `Err`. `Err` is for
/// the measurement itself being impossible (endpoint down, bad response).
///
/// Providers do not stamp timestamps; the executor does.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start a new measurement
    async fn run(&self, scope: &RunScope, metric: &Metric) -> Result<Measurement, ProviderError>;

    /// Check on an in-flight measurement, returning it updated (or unchanged)
    async fn resume(
        &self,
        scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError>;

    /// Stop an in-flight measurement early
    async fn terminate(
        &self,
        scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError>;
}

/// Selects the provider for a metric by its provider tag
pub trait ProviderFactory: Send + Sync {
    fn provider_for(&self, metric: &Metric) -> Result<Arc<dyn Provider>, ProviderError>;
}

/// Production factory holding one shared instance per provider kind
///
/// Instances are built once so HTTP connection pools are reused across
/// reconcile cycles.
pub struct DefaultProviderFactory {
    prometheus: Arc<prometheus::PrometheusProvider>,
    web: Arc<web::WebProvider>,
    job: Arc<job::JobProvider>,
}

impl DefaultProviderFactory {
    pub fn new(client: kube::Client, http_timeout: Duration) -> Self {
        let http = match reqwest::Client::builder().timeout(http_timeout).build() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build provider HTTP client, using default");
                reqwest::Client::new()
            }
        };

        DefaultProviderFactory {
            prometheus: Arc::new(prometheus::PrometheusProvider::new(http.clone())),
            web: Arc::new(web::WebProvider::new(http)),
            job: Arc::new(job::JobProvider::new(client)),
        }
    }
}

impl ProviderFactory for DefaultProviderFactory {
    fn provider_for(&self, metric: &Metric) -> Result<Arc<dyn Provider>, ProviderError> {
        match metric.provider.kind() {
            Some(ProviderKind::Prometheus) => Ok(self.prometheus.clone()),
            Some(ProviderKind::Web) => Ok(self.web.clone()),
            Some(ProviderKind::Job) => Ok(self.job.clone()),
            None => Err(ProviderError::NotConfigured(metric.name.clone())),
        }
    }
}

/// Build a completed measurement from a numeric value
///
/// Shared by the synchronous providers: the value is judged against the
/// metric's success/failure conditions.
pub(crate) fn measurement_from_value(
    metric: &Metric,
    value: f64,
) -> Result<Measurement, ProviderError> {
    let status = evaluate_conditions(metric, value)?;
    Ok(Measurement {
        value: Some(value.to_string()),
        ..Measurement::new(status)
    })
}

/// Scripted reply for `MockProvider`
#[cfg(test)]
#[derive(Debug, Clone)]
pub enum MockReply {
    Measure(Measurement),
    Fail(String),
    Panic,
}

/// Provider call recorded by `MockProvider`
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Run(String),
    Resume(String),
    Terminate(String),
}

/// Mock provider for testing - replies from a per-metric script
///
/// Metrics without a scripted reply get a Successful measurement.
#[cfg(test)]
#[derive(Default)]
pub struct MockProvider {
    replies: std::sync::Mutex<
        std::collections::HashMap<String, std::collections::VecDeque<MockReply>>,
    >,
    calls: std::sync::Mutex<Vec<MockCall>>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, metric: &str, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(metric.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    fn reply(&self, metric: &str) -> Result<Measurement, ProviderError> {
        let next = self
            .replies
            .lock()
            .unwrap()
            .get_mut(metric)
            .and_then(|queue| queue.pop_front());
        match next {
            Some(MockReply::Measure(m)) => Ok(m),
            Some(MockReply::Fail(msg)) => Err(ProviderError::Http(msg)),
            Some(MockReply::Panic) => panic!("mock provider panicked for {}", metric),
            None => Ok(Measurement {
                value: Some("1".to_string()),
                ..Measurement::new(crate::crd::analysis_run::AnalysisStatus::Successful)
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl Provider for MockProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Web
    }

    async fn run(&self, _scope: &RunScope, metric: &Metric) -> Result<Measurement, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::Run(metric.name.clone()));
        self.reply(&metric.name)
    }

    async fn resume(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        _measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::Resume(metric.name.clone()));
        self.reply(&metric.name)
    }

    async fn terminate(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push(MockCall::Terminate(metric.name.clone()));
        Ok(measurement)
    }
}

/// Factory handing out one shared `MockProvider` for every metric
#[cfg(test)]
pub struct MockProviderFactory {
    pub provider: Arc<MockProvider>,
}

#[cfg(test)]
impl MockProviderFactory {
    pub fn new() -> Self {
        MockProviderFactory {
            provider: Arc::new(MockProvider::new()),
        }
    }
}

#[cfg(test)]
impl ProviderFactory for MockProviderFactory {
    fn provider_for(&self, _metric: &Metric) -> Result<Arc<dyn Provider>, ProviderError> {
        Ok(self.provider.clone())
    }
}
