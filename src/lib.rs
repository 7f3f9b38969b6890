//! KULTA AnalysisRun controller
//!
//! Executes and assesses AnalysisRun resources: decides which metrics are due,
//! takes measurements through pluggable providers, judges each metric against
//! its thresholds and schedules the next evaluation.

pub mod config;
pub mod controller;
pub mod crd;
pub mod server;
