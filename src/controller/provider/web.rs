//! Web metric provider
//!
//! GETs a URL, reads a JSON value (optionally at `jsonPath`) and judges it
//! against the metric's conditions.

use super::{measurement_from_value, Provider, ProviderError, RunScope};
use crate::crd::analysis_run::{Measurement, Metric, ProviderKind};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

pub struct WebProvider {
    http: reqwest::Client,
}

impl WebProvider {
    pub fn new(http: reqwest::Client) -> Self {
        WebProvider { http }
    }
}

#[async_trait]
impl Provider for WebProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Web
    }

    async fn run(&self, _scope: &RunScope, metric: &Metric) -> Result<Measurement, ProviderError> {
        let config = metric
            .provider
            .web
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(metric.name.clone()))?;

        let mut request = self.http.get(&config.url);
        for header in &config.headers {
            request = request.header(header.key.as_str(), header.value.as_str());
        }
        if let Some(seconds) = config.timeout_seconds {
            request = request.timeout(Duration::from_secs(seconds));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Http(format!(
                "{} returned HTTP {}",
                config.url, status
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        let selected = match &config.json_path {
            Some(path) => select_json_path(&body, path)?,
            None => &body,
        };
        let value = json_value_as_f64(selected)?;
        debug!(metric = %metric.name, url = %config.url, value = value, "Web metric returned");

        measurement_from_value(metric, value)
    }

    async fn resume(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        warn!(metric = %metric.name, "Web measurements complete synchronously, nothing to resume");
        Ok(measurement)
    }

    async fn terminate(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        warn!(metric = %metric.name, "Web measurements complete synchronously, nothing to terminate");
        Ok(measurement)
    }
}

/// Walk a `$.a.b[0].c` style path through a JSON document
fn select_json_path<'a>(body: &'a Value, path: &str) -> Result<&'a Value, ProviderError> {
    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);
    let normalized = trimmed.replace('[', ".").replace(']', "");

    let mut current = body;
    for segment in normalized.split('.').filter(|s| !s.is_empty()) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "jsonPath '{}' not found (missing '{}')",
                path, segment
            ))
        })?;
    }

    Ok(current)
}

/// Numbers as-is, booleans as 1/0, numeric strings parsed
fn json_value_as_f64(value: &Value) -> Result<f64, ProviderError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ProviderError::InvalidResponse(format!("unrepresentable number {}", n))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ProviderError::InvalidResponse(format!("non-numeric value '{}'", s))),
        other => Err(ProviderError::InvalidResponse(format!(
            "expected a number, got {}",
            other
        ))),
    }
}
