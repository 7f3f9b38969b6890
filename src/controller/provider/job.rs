//! Job metric provider
//!
//! Each measurement is a `batch/v1` Job created from the metric's pod
//! template and owned by the AnalysisRun. The measurement stays Running until
//! the Job completes; the controller watches labelled Jobs so a Job finishing
//! re-enqueues its run and `resume` picks up the outcome.

use super::{Provider, ProviderError, RunScope};
use crate::crd::analysis_run::{AnalysisStatus, JobMetric, Measurement, Metric, ProviderKind};
use async_trait::async_trait;
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Label carrying the owning AnalysisRun name
pub const ANALYSIS_RUN_LABEL: &str = "kulta.io/analysis-run";

/// Label carrying the metric name
pub const METRIC_LABEL: &str = "kulta.io/metric";

/// Measurement metadata key holding the Job name
pub const JOB_NAME_METADATA: &str = "job-name";

const MAX_NAME_LEN: usize = 63;

pub struct JobProvider {
    client: kube::Client,
}

impl JobProvider {
    pub fn new(client: kube::Client) -> Self {
        JobProvider { client }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Provider for JobProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Job
    }

    async fn run(&self, scope: &RunScope, metric: &Metric) -> Result<Measurement, ProviderError> {
        let config = metric
            .provider
            .job
            .as_ref()
            .ok_or_else(|| ProviderError::NotConfigured(metric.name.clone()))?;

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let job = build_job(scope, metric, config, &suffix[..8]);
        let job_name = job.metadata.name.clone().unwrap_or_default();

        self.jobs(&scope.namespace)
            .create(&PostParams::default(), &job)
            .await?;

        info!(
            run = %scope.name,
            metric = %metric.name,
            job = %job_name,
            "Created measurement Job"
        );

        let mut measurement = Measurement::new(AnalysisStatus::Running);
        measurement
            .metadata
            .insert(JOB_NAME_METADATA.to_string(), job_name);
        Ok(measurement)
    }

    async fn resume(
        &self,
        scope: &RunScope,
        metric: &Metric,
        mut measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        let job_name = measurement
            .metadata
            .get(JOB_NAME_METADATA)
            .cloned()
            .ok_or(ProviderError::MissingMetadata(JOB_NAME_METADATA))?;

        let job = self.jobs(&scope.namespace).get(&job_name).await?;

        match job_outcome(&job) {
            Some(status) => {
                info!(
                    run = %scope.name,
                    metric = %metric.name,
                    job = %job_name,
                    status = %status,
                    "Measurement Job finished"
                );
                measurement.status = status;
                if status == AnalysisStatus::Failed {
                    measurement.message = Some(format!("Job {} failed", job_name));
                }
                Ok(measurement)
            }
            None => Ok(measurement),
        }
    }

    async fn terminate(
        &self,
        scope: &RunScope,
        metric: &Metric,
        measurement: Measurement,
    ) -> Result<Measurement, ProviderError> {
        if let Some(job_name) = measurement.metadata.get(JOB_NAME_METADATA) {
            match self
                .jobs(&scope.namespace)
                .delete(job_name, &DeleteParams::background())
                .await
            {
                Ok(_) => {
                    info!(run = %scope.name, metric = %metric.name, job = %job_name, "Deleted measurement Job")
                }
                Err(kube::Error::Api(err)) if err.code == 404 => {
                    warn!(run = %scope.name, job = %job_name, "Measurement Job already gone");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(terminated_measurement(measurement))
    }
}

/// Mark an in-flight measurement as stopped on request
fn terminated_measurement(measurement: Measurement) -> Measurement {
    Measurement {
        status: AnalysisStatus::Successful,
        message: Some("Metric terminated".to_string()),
        ..measurement
    }
}

/// Job name `<run>-<metric>-<suffix>`, clipped to the 63-character label limit
fn job_name(scope: &RunScope, metric: &Metric, suffix: &str) -> String {
    let prefix = format!("{}-{}", scope.name, metric.name);
    let room = MAX_NAME_LEN.saturating_sub(suffix.len() + 1);
    let prefix: String = prefix.chars().take(room).collect();
    format!("{}-{}", prefix.trim_end_matches('-'), suffix)
}

/// Build the Job for one measurement
pub(crate) fn build_job(scope: &RunScope, metric: &Metric, config: &JobMetric, suffix: &str) -> Job {
    let mut labels = BTreeMap::new();
    labels.insert(ANALYSIS_RUN_LABEL.to_string(), scope.name.clone());
    labels.insert(METRIC_LABEL.to_string(), metric.name.clone());

    let owner_references = scope.uid.as_ref().map(|uid| {
        vec![OwnerReference {
            api_version: "kulta.io/v1alpha1".to_string(),
            kind: "AnalysisRun".to_string(),
            name: scope.name.clone(),
            uid: uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }]
    });

    let mut template = config.template.clone();
    if let Some(spec) = template.spec.as_mut() {
        if spec.restart_policy.is_none() {
            spec.restart_policy = Some("Never".to_string());
        }
    }

    Job {
        metadata: ObjectMeta {
            name: Some(job_name(scope, metric, suffix)),
            namespace: Some(scope.namespace.clone()),
            labels: Some(labels),
            owner_references,
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(config.backoff_limit.unwrap_or(0)),
            template,
            ..Default::default()
        }),
        status: None,
    }
}

/// Terminal outcome of a Job, None while it is still running
pub(crate) fn job_outcome(job: &Job) -> Option<AnalysisStatus> {
    let status = job.status.as_ref()?;

    for condition in status.conditions.iter().flatten() {
        if condition.status != "True" {
            continue;
        }
        match condition.type_.as_str() {
            "Complete" => return Some(AnalysisStatus::Successful),
            "Failed" => return Some(AnalysisStatus::Failed),
            _ => {}
        }
    }

    None
}
