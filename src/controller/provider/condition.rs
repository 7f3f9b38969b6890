//! Success and failure conditions for measured values
//!
//! A condition compares the measured value against a constant:
//! `result < 0.05`, `result >= 99.5`, `result == 1`.

use crate::crd::analysis_run::{AnalysisStatus, Metric};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConditionError {
    #[error("condition must have the form 'result <op> <number>', got '{0}'")]
    Malformed(String),

    #[error("unsupported operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid threshold '{0}'")]
    InvalidThreshold(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

/// A parsed `result <op> <number>` comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    op: Operator,
    threshold: f64,
}

impl Condition {
    pub fn parse(expr: &str) -> Result<Self, ConditionError> {
        let mut parts = expr.split_whitespace();
        let (Some(lhs), Some(op), Some(rhs), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ConditionError::Malformed(expr.to_string()));
        };

        if lhs != "result" {
            return Err(ConditionError::Malformed(expr.to_string()));
        }

        let op = match op {
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            ">" => Operator::Gt,
            ">=" => Operator::Ge,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            other => return Err(ConditionError::UnsupportedOperator(other.to_string())),
        };

        let threshold = rhs
            .parse::<f64>()
            .map_err(|_| ConditionError::InvalidThreshold(rhs.to_string()))?;

        Ok(Condition { op, threshold })
    }

    pub fn matches(&self, value: f64) -> bool {
        match self.op {
            Operator::Lt => value < self.threshold,
            Operator::Le => value <= self.threshold,
            Operator::Gt => value > self.threshold,
            Operator::Ge => value >= self.threshold,
            Operator::Eq => value == self.threshold,
            Operator::Ne => value != self.threshold,
        }
    }
}

/// Judge a measured value against a metric's conditions
///
/// | success | failure | outcome                                      |
/// |---------|---------|----------------------------------------------|
/// | set     | set     | Successful / Failed / Inconclusive if neither |
/// | set     | -       | Successful or Failed                         |
/// | -       | set     | Failed or Successful                         |
/// | -       | -       | Successful                                   |
///
/// A failure match wins over a success match when both hold.
pub fn evaluate_conditions(metric: &Metric, value: f64) -> Result<AnalysisStatus, ConditionError> {
    let success = metric
        .success_condition
        .as_deref()
        .map(Condition::parse)
        .transpose()?;
    let failure = metric
        .failure_condition
        .as_deref()
        .map(Condition::parse)
        .transpose()?;

    let status = match (success, failure) {
        (Some(success), Some(failure)) => {
            if failure.matches(value) {
                AnalysisStatus::Failed
            } else if success.matches(value) {
                AnalysisStatus::Successful
            } else {
                AnalysisStatus::Inconclusive
            }
        }
        (Some(success), None) => {
            if success.matches(value) {
                AnalysisStatus::Successful
            } else {
                AnalysisStatus::Failed
            }
        }
        (None, Some(failure)) => {
            if failure.matches(value) {
                AnalysisStatus::Failed
            } else {
                AnalysisStatus::Successful
            }
        }
        (None, None) => AnalysisStatus::Successful,
    };

    Ok(status)
}
