//! Prometheus metric provider
//!
//! Runs an instant query against `/api/v1/query` and judges the first sample
//! against the metric's conditions. Measurements complete within `run`, so
//! resume and terminate have nothing to do.

use super::{measurement_from_value, Provider, ProviderError, RunScope};
use crate::crd::analysis_run::{Measurement, Metric, ProviderKind};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

pub struct PrometheusProvider {
    http: reqwest::Client,
}

impl PrometheusProvider {
    pub fn new(http: reqwest::Client) -> Self {
        PrometheusProvider { http }
    }

    async fn query(&self, address: &str, query: &str) -> Result<f64, ProviderError> {
        let url = format!("{}/api/v1/query", address.trim_end_matches('/'));

        let response = self
            .http
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(ProviderError::Http(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        parse_prometheus_instant_query(&body)
    }
}

#[async_trait]
impl Provider for PrometheusProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Prometheus
    }

    async fn run(&self, _scope: &RunScope, metric: &Metric) -> Result<Measurement, ProviderError> {
        let config = metric
            .provider
            .prometheus
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(metric.name.clone()))?;

        let value = self.query(&config.address, &config.query).await?;
        debug!(metric = %metric.name, value = value, "Prometheus query returned");

        measurement_from_value(metric, value)
    }

    async fn resume(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        warn!(metric = %metric.name, "Prometheus measurements complete synchronously, nothing to resume");
        Ok(measurement)
    }

    async fn terminate(
        &self,
        _scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        warn!(metric = %metric.name, "Prometheus measurements complete synchronously, nothing to terminate");
        Ok(measurement)
    }
}

/// Prometheus instant query response format
#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    data: PrometheusData,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    value: (f64, String), // [timestamp, value_as_string]
}

/// Parse an instant query response and return the first sample value
fn parse_prometheus_instant_query(json_response: &str) -> Result<f64, ProviderError> {
    let response: PrometheusResponse = serde_json::from_str(json_response)
        .map_err(|e| ProviderError::InvalidResponse(format!("Invalid JSON: {}", e)))?;

    if response.status != "success" {
        return Err(ProviderError::InvalidResponse(format!(
            "Prometheus query failed with status: {}",
            response.status
        )));
    }

    let result = response
        .data
        .result
        .first()
        .ok_or(ProviderError::NoData)?;

    let value = result
        .value
        .1
        .parse::<f64>()
        .map_err(|e| ProviderError::InvalidResponse(format!("Invalid value: {}", e)))?;

    if value.is_nan() {
        return Err(ProviderError::NoData);
    }

    Ok(value)
}
