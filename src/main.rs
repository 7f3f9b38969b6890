use futures::StreamExt;
use k8s_openapi::api::batch::v1::Job;
use kube::runtime::controller::Action;
use kube::runtime::{watcher, Controller};
use kube::{Api, Client, ResourceExt};
use kulta_analysis::config::ControllerConfig;
use kulta_analysis::controller::provider::job::ANALYSIS_RUN_LABEL;
use kulta_analysis::controller::{reconcile, Context, ReconcileError};
use kulta_analysis::crd::analysis_run::AnalysisRun;
use kulta_analysis::server::{create_metrics, run_health_server, wait_for_signal, ReadinessState};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Error policy for the controller
///
/// Reconciliation errors are transient (API server unavailable, conflicts),
/// so the run is requeued after the configured backoff.
pub fn error_policy(run: Arc<AnalysisRun>, error: &ReconcileError, ctx: Arc<Context>) -> Action {
    warn!(run = %run.name_any(), error = %error, "Reconcile error (will retry)");

    if let Some(ref metrics) = ctx.metrics {
        // Duration unknown for errors (didn't complete), use 0
        metrics.record_reconciliation_error(0.0);
    }

    Action::requeue(ctx.config.error_requeue)
}

/// API handle scoped to the watched namespace, or cluster-wide
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <K as kube::Resource>::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // reqwest and kube both use rustls; pick the ring provider once for the process
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting KULTA AnalysisRun controller");

    let config = ControllerConfig::from_env();
    info!(
        health_port = config.health_port,
        watch_namespace = ?config.watch_namespace,
        provider_timeout_secs = config.provider_timeout.as_secs(),
        "Configuration loaded"
    );

    let readiness = ReadinessState::new();

    let metrics = create_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to create metrics registry: {}", e))?;
    info!("Prometheus metrics registry initialized");

    let client = match Client::try_default().await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e.into());
        }
    };
    info!("Connected to Kubernetes cluster");

    let health_port = config.health_port;
    let health_readiness = readiness.clone();
    let health_metrics = metrics.clone();
    let health_handle = tokio::spawn(async move {
        if let Err(e) = run_health_server(health_port, health_readiness, health_metrics).await {
            warn!(error = %e, "Health server failed");
        }
    });

    let namespace = config.watch_namespace.clone();
    let runs: Api<AnalysisRun> = scoped_api(client.clone(), namespace.as_deref());
    let jobs: Api<Job> = scoped_api(client.clone(), namespace.as_deref());

    let ctx = Arc::new(Context::new(client, config, Some(metrics)));

    readiness.set_ready();
    info!("Controller ready, starting reconciliation loop");

    // Jobs created by the job provider re-enqueue their owning run when they finish
    // error_policy already logs errors, so only successes are logged here
    let controller = Controller::new(runs, watcher::Config::default())
        .owns(jobs, watcher::Config::default().labels(ANALYSIS_RUN_LABEL))
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            if let Ok(o) = res {
                info!("Reconciled: {:?}", o);
            }
        });

    tokio::select! {
        _ = controller => {
            info!("Controller stream ended");
        }
        signal = wait_for_signal() => {
            match signal {
                Ok(name) => info!(signal = name, "Initiating graceful shutdown"),
                Err(e) => error!(error = %e, "Failed to listen for termination signals, shutting down"),
            }
            // Mark not ready so K8s stops sending traffic during shutdown
            readiness.set_not_ready();
        }
    }

    health_handle.abort();

    info!("KULTA AnalysisRun controller shut down");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[path = "main_test.rs"]
mod tests;
