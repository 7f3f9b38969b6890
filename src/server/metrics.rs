//! Prometheus metrics for the AnalysisRun controller
//!
//! Exposed on `/metrics` by the health server.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Controller metrics registered on a private registry
pub struct ControllerMetrics {
    registry: Registry,
    reconciliations: IntCounterVec,
    reconcile_duration: Histogram,
    measurements: IntCounterVec,
    runs_completed: IntCounterVec,
}

/// Metrics handle shared between the controller and the health server
pub type SharedMetrics = Arc<ControllerMetrics>;

impl ControllerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations = IntCounterVec::new(
            Opts::new(
                "kulta_analysis_reconciliations_total",
                "AnalysisRun reconciliations by result",
            ),
            &["result"],
        )?;
        let reconcile_duration = Histogram::with_opts(
            HistogramOpts::new(
                "kulta_analysis_reconcile_duration_seconds",
                "Time spent reconciling one AnalysisRun",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        let measurements = IntCounterVec::new(
            Opts::new(
                "kulta_analysis_measurements_total",
                "Completed measurements by provider and status",
            ),
            &["provider", "status"],
        )?;
        let runs_completed = IntCounterVec::new(
            Opts::new(
                "kulta_analysis_runs_completed_total",
                "AnalysisRuns that reached a terminal phase",
            ),
            &["phase"],
        )?;

        registry.register(Box::new(reconciliations.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(measurements.clone()))?;
        registry.register(Box::new(runs_completed.clone()))?;

        Ok(ControllerMetrics {
            registry,
            reconciliations,
            reconcile_duration,
            measurements,
            runs_completed,
        })
    }

    pub fn record_reconciliation_success(&self, duration_secs: f64) {
        self.reconciliations.with_label_values(&["success"]).inc();
        self.reconcile_duration.observe(duration_secs);
    }

    pub fn record_reconciliation_error(&self, duration_secs: f64) {
        self.reconciliations.with_label_values(&["error"]).inc();
        self.reconcile_duration.observe(duration_secs);
    }

    pub fn record_measurement(&self, provider: &str, status: &str) {
        self.measurements
            .with_label_values(&[provider, status])
            .inc();
    }

    pub fn record_run_completed(&self, phase: &str) {
        self.runs_completed.with_label_values(&[phase]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Create the shared metrics handle
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}
