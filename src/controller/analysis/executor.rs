use crate::controller::clock::Clock;
use crate::controller::provider::{Provider, ProviderError, ProviderFactory, RunScope};
use crate::crd::analysis_run::{AnalysisRun, Measurement, MetricResult};
use crate::server::SharedMetrics;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, warn, Instrument};

use super::tasks::MetricTask;

/// What the fold needs to know about a task after it was moved into its unit
struct Dispatched {
    metric: String,
    provider: &'static str,
    incomplete: Option<Measurement>,
}

/// Take every measurement for this cycle concurrently and fold the outcomes
/// into a copy of the run's metric results
///
/// Each task is spawned as its own tokio task and all are joined before
/// returning, so a slow provider delays the cycle but not its siblings.
/// Provider errors and panics never escape: they are recorded as Error
/// measurements on the metric that produced them.
///
/// Tasks are generated one per metric, so every unit writes a distinct key.
pub async fn run_measurements(
    run: &AnalysisRun,
    tasks: Vec<MetricTask>,
    providers: &dyn ProviderFactory,
    clock: &dyn Clock,
    metrics: Option<&SharedMetrics>,
) -> BTreeMap<String, MetricResult> {
    let mut results = run.metric_results();
    if tasks.is_empty() {
        return results;
    }

    let scope = RunScope::from_run(run);
    let dispatched_at = clock.now().to_rfc3339();
    let mut units = Vec::with_capacity(tasks.len());

    for task in tasks {
        let provider = providers.provider_for(&task.metric);
        let dispatched = Dispatched {
            metric: task.metric.name.clone(),
            provider: provider
                .as_ref()
                .map(|p| p.kind().as_str())
                .unwrap_or("none"),
            incomplete: task.incomplete_measurement.clone(),
        };
        let scope = scope.clone();

        debug!(
            metric = %dispatched.metric,
            resume = task.is_resume(),
            "Dispatching measurement"
        );
        let handle = tokio::spawn(
            take_measurement(provider, scope, task).instrument(tracing::Span::current()),
        );
        units.push(async move { (dispatched, handle.await) });
    }

    let outcomes = join_all(units).await;
    let joined_at = clock.now().to_rfc3339();

    for (dispatched, joined) in outcomes {
        let measurement = match joined {
            Ok(Ok(measurement)) => measurement,
            Ok(Err(e)) => {
                warn!(metric = %dispatched.metric, error = %e, "Measurement failed");
                errored(dispatched.incomplete.clone(), e.to_string())
            }
            Err(e) => {
                error!(metric = %dispatched.metric, error = %e, "Measurement task panicked");
                errored(
                    dispatched.incomplete.clone(),
                    format!("measurement task aborted: {}", e),
                )
            }
        };
        let measurement = stamp(measurement, &dispatched_at, &joined_at);

        if let Some(metrics) = metrics {
            if measurement.status.is_completed() {
                metrics.record_measurement(dispatched.provider, measurement.status.as_str());
            }
        }

        let result = results.entry(dispatched.metric).or_default();
        apply_measurement(result, measurement, dispatched.incomplete.is_some());
    }

    results
}

async fn take_measurement(
    provider: Result<Arc<dyn Provider>, ProviderError>,
    scope: RunScope,
    task: MetricTask,
) -> Result<Measurement, ProviderError> {
    let provider = provider?;
    match task.incomplete_measurement {
        Some(measurement) => provider.resume(&scope, &task.metric, measurement).await,
        None => provider.run(&scope, &task.metric).await,
    }
}

/// Error measurement for a failed unit
///
/// A failed resume keeps the in-flight measurement's start time and metadata.
fn errored(incomplete: Option<Measurement>, message: String) -> Measurement {
    match incomplete {
        Some(measurement) => Measurement {
            status: crate::crd::analysis_run::AnalysisStatus::Error,
            message: Some(message),
            ..measurement
        },
        None => Measurement::error(message),
    }
}

/// Fill in timestamps the provider left unset
///
/// `startedAt` is the dispatch instant, `finishedAt` the instant the cycle's
/// units were joined.
fn stamp(mut measurement: Measurement, dispatched_at: &str, joined_at: &str) -> Measurement {
    if measurement.started_at.is_none() {
        measurement.started_at = Some(dispatched_at.to_string());
    }
    if measurement.status.is_completed() && measurement.finished_at.is_none() {
        measurement.finished_at = Some(joined_at.to_string());
    }
    measurement
}

/// Append (or, for a resume, replace the last) measurement and bump counters
///
/// Counters move only when the measurement reaches a terminal status.
fn apply_measurement(result: &mut MetricResult, measurement: Measurement, resumed: bool) {
    let status = measurement.status;

    let replaces_last = resumed
        && result
            .last_measurement()
            .map(|m| m.is_in_flight())
            .unwrap_or(false);

    if replaces_last {
        if let Some(last) = result.measurements.last_mut() {
            *last = measurement;
        }
    } else {
        result.measurements.push(measurement);
    }

    if status.is_completed() {
        result.record(status);
    }
}
