use crate::controller::clock::parse_timestamp;
use crate::crd::analysis_run::{Metric, MetricResult};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::warn;

use super::validation::parse_duration;

/// Earliest instant at which an interval metric becomes due again
///
/// Metrics are skipped when completed, never measured, in flight (the caller
/// decides how to poll those), or without an interval. Returns None when no
/// metric needs a time-based wake-up.
pub fn calculate_next_reconcile_time(
    metrics: &[Metric],
    results: &BTreeMap<String, MetricResult>,
) -> Option<DateTime<Utc>> {
    let mut earliest: Option<DateTime<Utc>> = None;

    for metric in metrics {
        let Some(result) = results.get(&metric.name) else {
            continue;
        };
        if result.is_completed() {
            continue;
        }
        let Some(last) = result.last_measurement() else {
            continue;
        };
        let Some(finished_at) = &last.finished_at else {
            continue;
        };
        let Some(interval) = metric
            .interval
            .as_deref()
            .and_then(parse_duration)
            .and_then(|d| chrono::Duration::from_std(d).ok())
        else {
            continue;
        };

        let Some(finished_at) = parse_timestamp(finished_at) else {
            warn!(metric = %metric.name, finished_at = %finished_at, "Unparsable finishedAt, not scheduling");
            continue;
        };

        let candidate = finished_at + interval;
        earliest = Some(match earliest {
            Some(current) if current <= candidate => current,
            _ => candidate,
        });
    }

    earliest
}

/// Whether any open metric has a measurement still in flight
pub fn has_in_flight_measurement(results: &BTreeMap<String, MetricResult>) -> bool {
    results.values().any(|result| {
        !result.is_completed()
            && result
                .last_measurement()
                .map(|m| m.is_in_flight())
                .unwrap_or(false)
    })
}

/// Delay until `next`, never less than one second
///
/// A due time already in the past still waits a second so a clock skew
/// between cycles cannot spin the controller.
pub fn requeue_after(next: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    const MIN_REQUEUE: Duration = Duration::from_secs(1);

    (next - now)
        .to_std()
        .map(|d| d.max(MIN_REQUEUE))
        .unwrap_or(MIN_REQUEUE)
}
