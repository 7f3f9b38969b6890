use crate::controller::clock::parse_timestamp;
use crate::crd::analysis_run::{AnalysisRun, AnalysisStatus, Measurement, Metric};
use chrono::{DateTime, Utc};
use tracing::warn;

use super::validation::parse_duration;

/// One unit of measurement work for this cycle
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTask {
    pub metric: Metric,

    /// Set when an in-flight measurement must be resumed instead of starting
    /// a new one
    pub incomplete_measurement: Option<Measurement>,
}

impl MetricTask {
    pub fn is_resume(&self) -> bool {
        self.incomplete_measurement.is_some()
    }
}

/// Whether new measurements must not be started this cycle
///
/// True when the owner asked the run to stop, or when any metric has already
/// Failed (the run's outcome is decided).
pub fn is_terminating(run: &AnalysisRun) -> bool {
    if run.spec.terminate {
        return true;
    }
    run.status
        .as_ref()
        .map(|status| {
            status
                .metric_results
                .values()
                .any(|result| result.status == Some(AnalysisStatus::Failed))
        })
        .unwrap_or(false)
}

/// Decide which metrics need a measurement this cycle
///
/// For each metric, in spec order:
/// 1. Completed metric → nothing
/// 2. In-flight last measurement → resume it (even when terminating)
/// 3. Terminating → nothing new
/// 4. Never measured → new measurement
/// 5. No interval → nothing (measure-once metric already measured)
/// 6. Last measurement finished more than `interval` ago → new measurement
/// 7. Otherwise not yet due
pub fn generate_metric_tasks(
    run: &AnalysisRun,
    terminating: bool,
    now: DateTime<Utc>,
) -> Vec<MetricTask> {
    let mut tasks = Vec::new();

    for metric in &run.spec.metrics {
        let result = run.metric_result(&metric.name);

        if result.map(|r| r.is_completed()).unwrap_or(false) {
            continue;
        }

        let last = result.and_then(|r| r.last_measurement());

        if let Some(last) = last.filter(|m| m.is_in_flight()) {
            tasks.push(MetricTask {
                metric: metric.clone(),
                incomplete_measurement: Some(last.clone()),
            });
            continue;
        }

        if terminating {
            continue;
        }

        let Some(last) = last else {
            tasks.push(MetricTask {
                metric: metric.clone(),
                incomplete_measurement: None,
            });
            continue;
        };

        let Some(interval_str) = &metric.interval else {
            continue;
        };

        let Some(interval) = parse_duration(interval_str)
            .and_then(|d| chrono::Duration::from_std(d).ok())
        else {
            warn!(metric = %metric.name, interval = %interval_str, "Unparsable interval, skipping metric");
            continue;
        };

        let finished_at = last.finished_at.as_deref().and_then(parse_timestamp);
        match finished_at {
            Some(finished_at) if now <= finished_at + interval => {}
            Some(_) => tasks.push(MetricTask {
                metric: metric.clone(),
                incomplete_measurement: None,
            }),
            None => {
                warn!(
                    metric = %metric.name,
                    finished_at = ?last.finished_at,
                    "Unparsable finishedAt on last measurement, treating metric as due"
                );
                tasks.push(MetricTask {
                    metric: metric.clone(),
                    incomplete_measurement: None,
                });
            }
        }
    }

    tasks
}
