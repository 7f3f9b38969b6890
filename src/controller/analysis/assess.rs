use crate::crd::analysis_run::{AnalysisStatus, Metric, MetricResult};
use std::collections::BTreeMap;
use tracing::info;

/// Number of trailing Error measurements, newest first, up to the first
/// measurement that is not an Error
pub fn consecutive_errors(result: &MetricResult) -> i32 {
    result
        .measurements
        .iter()
        .rev()
        .take_while(|m| m.status == AnalysisStatus::Error)
        .count() as i32
}

/// Status of one metric given its accumulated result
///
/// Pure and idempotent: a result that already carries a terminal status is
/// returned unchanged.
///
/// 1. Already completed → that status
/// 2. No measurements → Successful when terminating, else Pending
/// 3. Last measurement in flight → Running
/// 4. `failed > maxFailures` → Failed
/// 5. Trailing errors > `maxConsecutiveErrors` (default 4) → Error
/// 6. `count` reached → Successful if successful > inconclusive, else Inconclusive
/// 7. Otherwise → Successful when terminating, else Running
pub fn assess_metric_status(
    metric: &Metric,
    result: &MetricResult,
    terminating: bool,
) -> AnalysisStatus {
    if let Some(status) = result.status.filter(|s| s.is_completed()) {
        return status;
    }

    let Some(last) = result.last_measurement() else {
        return if terminating {
            AnalysisStatus::Successful
        } else {
            AnalysisStatus::Pending
        };
    };

    if last.is_in_flight() {
        return AnalysisStatus::Running;
    }

    if result.failed > metric.max_failures() {
        return AnalysisStatus::Failed;
    }

    if consecutive_errors(result) > metric.max_consecutive_errors() {
        return AnalysisStatus::Error;
    }

    let count = metric.count();
    if count > 0 && result.count >= count {
        // Ties go to Inconclusive
        return if result.successful > result.inconclusive {
            AnalysisStatus::Successful
        } else {
            AnalysisStatus::Inconclusive
        };
    }

    if terminating {
        AnalysisStatus::Successful
    } else {
        AnalysisStatus::Running
    }
}

/// Overall outcome of assessing every metric
#[derive(Debug, Clone, PartialEq)]
pub struct RunAssessment {
    /// None when no metric has a recorded result yet
    pub phase: Option<AnalysisStatus>,
    pub message: Option<String>,
}

/// Assess every metric with a recorded result and combine them
///
/// Metrics that became terminal this cycle get their status (and, for Failed
/// and Error, a message) written into `results`. Any metric still open makes
/// the run Running; once all are completed the run takes the worst status,
/// ordered Successful < Inconclusive < Error < Failed.
pub fn assess_run_status(
    metrics: &[Metric],
    results: &mut BTreeMap<String, MetricResult>,
    terminating: bool,
) -> RunAssessment {
    let mut assessed_any = false;
    let mut everything_completed = true;
    let mut worst: Option<(AnalysisStatus, &str)> = None;

    for metric in metrics {
        let Some(result) = results.get_mut(&metric.name) else {
            continue;
        };
        assessed_any = true;

        let status = assess_metric_status(metric, result, terminating);

        if !status.is_completed() {
            everything_completed = false;
            continue;
        }

        if result.status.is_none() {
            info!(
                metric = %metric.name,
                status = %status,
                successful = result.successful,
                failed = result.failed,
                inconclusive = result.inconclusive,
                error = result.error,
                "Metric completed"
            );
            result.status = Some(status);
            result.message = completion_message(metric, result, status);
        }

        let is_worse = match worst {
            None => true,
            Some((current, _)) => status.worseness() > current.worseness(),
        };
        if is_worse {
            worst = Some((status, metric.name.as_str()));
        }
    }

    if !assessed_any {
        return RunAssessment {
            phase: None,
            message: None,
        };
    }

    if !everything_completed {
        return RunAssessment {
            phase: Some(AnalysisStatus::Running),
            message: None,
        };
    }

    match worst {
        Some((AnalysisStatus::Successful, _)) | None => RunAssessment {
            phase: Some(AnalysisStatus::Successful),
            message: None,
        },
        Some((status, name)) => {
            let detail = results.get(name).and_then(|r| r.message.clone());
            let message = match detail {
                Some(detail) => format!("Metric \"{}\" assessed {}: {}", name, status, detail),
                None => format!("Metric \"{}\" assessed {}", name, status),
            };
            RunAssessment {
                phase: Some(status),
                message: Some(message),
            }
        }
    }
}

fn completion_message(
    metric: &Metric,
    result: &MetricResult,
    status: AnalysisStatus,
) -> Option<String> {
    match status {
        AnalysisStatus::Failed => Some(format!(
            "{} failed measurements exceeded maxFailures ({})",
            result.failed,
            metric.max_failures()
        )),
        AnalysisStatus::Error => Some(format!(
            "{} consecutive errors exceeded maxConsecutiveErrors ({})",
            consecutive_errors(result),
            metric.max_consecutive_errors()
        )),
        _ => None,
    }
}
