use crate::config::ControllerConfig;
use crate::controller::clock::{Clock, SystemClock};
use crate::controller::provider::{DefaultProviderFactory, ProviderFactory};
use crate::crd::analysis_run::{AnalysisRun, AnalysisRunStatus, AnalysisStatus};
use crate::server::SharedMetrics;
use chrono::{DateTime, Utc};
use kube::api::Api;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};

use super::assess::assess_run_status;
use super::executor::run_measurements;
use super::persist::persist_status;
use super::schedule::{calculate_next_reconcile_time, has_in_flight_measurement, requeue_after};
use super::tasks::{generate_metric_tasks, is_terminating};
use super::validation::validate_analysis_run;

/// Message set when a run is stopped by its owner
pub const TERMINATED_MESSAGE: &str = "Run terminated";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("AnalysisRun missing namespace")]
    MissingNamespace,

    #[error("Failed to serialize AnalysisRun status: {0}")]
    SerializationError(String),
}

pub struct Context {
    pub client: kube::Client,
    pub providers: Arc<dyn ProviderFactory>,
    pub clock: Arc<dyn Clock>,
    /// Optional controller metrics for Prometheus
    /// When Some, records reconciliations, measurements and completed runs
    pub metrics: Option<SharedMetrics>,
    pub config: ControllerConfig,
}

impl Context {
    /// Production context: real providers and the wall clock
    pub fn new(
        client: kube::Client,
        config: ControllerConfig,
        metrics: Option<SharedMetrics>,
    ) -> Self {
        let providers = DefaultProviderFactory::new(client.clone(), config.provider_timeout);
        Context {
            client,
            providers: Arc::new(providers),
            clock: Arc::new(SystemClock),
            metrics,
            config,
        }
    }
}

/// Result of one reconcile cycle, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub status: AnalysisRunStatus,

    /// Earliest time an interval metric becomes due, None if nothing is scheduled
    pub next_reconcile: Option<DateTime<Utc>>,
}

/// Run one reconcile cycle for an AnalysisRun
///
/// 1. Completed runs are left untouched
/// 2. A run seen for the first time is validated and marked Pending
/// 3. Due metrics are measured concurrently and folded into the results
/// 4. Metrics and the run are assessed
/// 5. The next wake-up is computed from the interval metrics
///
/// Never fails: provider problems end up as Error measurements and an invalid
/// spec ends the run with phase Error.
pub async fn reconcile_analysis_run(
    run: &AnalysisRun,
    providers: &dyn ProviderFactory,
    clock: &dyn Clock,
    metrics: Option<&SharedMetrics>,
) -> ReconcileOutcome {
    let now = clock.now();
    let mut status = run.status.clone().unwrap_or_default();

    if status.is_completed() {
        return ReconcileOutcome {
            status,
            next_reconcile: None,
        };
    }

    if status.phase.is_none() {
        if let Err(e) = validate_analysis_run(run) {
            warn!(error = %e, "AnalysisRun spec validation failed");
            status.phase = Some(AnalysisStatus::Error);
            status.message = Some(format!("Invalid AnalysisRun spec: {}", e));
            return ReconcileOutcome {
                status,
                next_reconcile: None,
            };
        }
        status.phase = Some(AnalysisStatus::Pending);
        status.started_at = Some(now.to_rfc3339());
    }

    let terminating = is_terminating(run);

    // Nothing was ever measured, so there is nothing to drain
    if run.spec.terminate && status.metric_results.is_empty() {
        info!("Terminated before any measurement");
        status.phase = Some(AnalysisStatus::Successful);
        status.message = Some(TERMINATED_MESSAGE.to_string());
        return ReconcileOutcome {
            status,
            next_reconcile: None,
        };
    }

    let tasks = generate_metric_tasks(run, terminating, now);
    debug!(tasks = tasks.len(), terminating, "Generated metric tasks");

    let mut results = run_measurements(run, tasks, providers, clock, metrics).await;
    let assessment = assess_run_status(&run.spec.metrics, &mut results, terminating);
    status.metric_results = results;

    if let Some(phase) = assessment.phase {
        status.phase = Some(phase);
        status.message = assessment.message;
        if phase == AnalysisStatus::Successful && run.spec.terminate {
            status.message = Some(TERMINATED_MESSAGE.to_string());
        }
    }

    if status.is_completed() {
        return ReconcileOutcome {
            status,
            next_reconcile: None,
        };
    }

    // A metric that failed this cycle stops its siblings on the next one
    let failed_this_cycle = !terminating
        && status
            .metric_results
            .values()
            .any(|r| r.status == Some(AnalysisStatus::Failed));
    let next_reconcile = if failed_this_cycle {
        Some(now)
    } else {
        calculate_next_reconcile_time(&run.spec.metrics, &status.metric_results)
    };

    ReconcileOutcome {
        status,
        next_reconcile,
    }
}

/// How long to wait before the next cycle, or None to wait for a change
///
/// The earlier of the next scheduled metric and, while a measurement is in
/// flight, the poll interval.
pub fn requeue_delay(
    outcome: &ReconcileOutcome,
    now: DateTime<Utc>,
    in_flight_poll: Duration,
) -> Option<Duration> {
    if outcome.status.is_completed() {
        return None;
    }
    let scheduled = outcome.next_reconcile.map(|next| requeue_after(next, now));
    let poll = has_in_flight_measurement(&outcome.status.metric_results).then_some(in_flight_poll);
    match (scheduled, poll) {
        (Some(scheduled), Some(poll)) => Some(scheduled.min(poll)),
        (scheduled, poll) => scheduled.or(poll),
    }
}

/// Reconcile an AnalysisRun resource
///
/// Runs one cycle, writes the status subresource when it changed and
/// schedules the next cycle.
///
/// # Returns
/// * `Ok(Action)` - Requeue at the next due time, or wait for a change
/// * `Err(ReconcileError)` - Status could not be persisted
pub async fn reconcile(run: Arc<AnalysisRun>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = run.namespace().ok_or(ReconcileError::MissingNamespace)?;
    let name = run.name_any();
    let span = info_span!("reconcile", run = %name, namespace = %namespace);

    reconcile_in_namespace(run, ctx, namespace, name)
        .instrument(span)
        .await
}

async fn reconcile_in_namespace(
    run: Arc<AnalysisRun>,
    ctx: Arc<Context>,
    namespace: String,
    name: String,
) -> Result<Action, ReconcileError> {
    let start_time = std::time::Instant::now();

    if run.status.as_ref().map(|s| s.is_completed()).unwrap_or(false) {
        debug!("AnalysisRun already completed");
        return Ok(Action::await_change());
    }

    info!("Reconciling AnalysisRun");

    let outcome = reconcile_analysis_run(
        &run,
        ctx.providers.as_ref(),
        ctx.clock.as_ref(),
        ctx.metrics.as_ref(),
    )
    .await;

    let api: Api<AnalysisRun> = Api::namespaced(ctx.client.clone(), &namespace);
    persist_status(&api, &run, &name, &outcome.status).await?;

    if outcome.status.is_completed() {
        if let Some(phase) = outcome.status.phase {
            info!(
                phase = %phase,
                message = ?outcome.status.message,
                "AnalysisRun completed"
            );
            if let Some(ref metrics) = ctx.metrics {
                metrics.record_run_completed(phase.as_str());
            }
        }
    }

    if let Some(ref metrics) = ctx.metrics {
        metrics.record_reconciliation_success(start_time.elapsed().as_secs_f64());
    }

    let action = match requeue_delay(&outcome, ctx.clock.now(), ctx.config.in_flight_poll) {
        Some(delay) => {
            debug!(requeue_secs = delay.as_secs(), "Requeueing");
            Action::requeue(delay)
        }
        None => Action::await_change(),
    };
    Ok(action)
}
