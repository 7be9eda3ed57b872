//! Deployment worker draining the queue

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info};

use crate::deploy::pipeline::DeploymentPipeline;
use crate::errors::RunnerError;
use crate::models::deployment::Deployment;

/// Deployer worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Wait when the queue is empty
    pub interval: Duration,

    /// Pause after each processed deployment
    pub iteration_pause: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            iteration_pause: Duration::from_secs(1),
        }
    }
}

/// Claim and process at most one queued deployment.
///
/// Returns whether a deployment was claimed. Faults raised while processing
/// are recorded on the deployment and never escape.
pub async fn run_once(pipeline: &DeploymentPipeline) -> Result<bool, RunnerError> {
    let Some(deployment) = pipeline.store().claim_next_queued(Utc::now()).await? else {
        return Ok(false);
    };
    process(pipeline, deployment).await;
    Ok(true)
}

async fn process(pipeline: &DeploymentPipeline, deployment: Deployment) {
    let id = deployment.id;
    let attempt = AssertUnwindSafe(pipeline.execute(deployment.clone()))
        .catch_unwind()
        .await;

    let detail = match attempt {
        Ok(Ok(finished)) => {
            info!(deployment_id = id, status = %finished.status, "Deployment finished");
            return;
        }
        Ok(Err(e)) => e.to_string(),
        Err(panic) => panic_message(panic),
    };

    error!(deployment_id = id, "Unhandled deployment error: {}", detail);
    if let Err(e) = pipeline.record_fault(&deployment, &detail).await {
        error!(deployment_id = id, "Failed to record deployment fault: {}", e);
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic".to_string()
    }
}

/// Run the deployer worker.
///
/// Shutdown is only observed between iterations, so a claimed deployment
/// always reaches a terminal state first.
pub async fn run<S, F>(
    options: &Options,
    pipeline: &DeploymentPipeline,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Deployer worker starting...");

    loop {
        let wait = match run_once(pipeline).await {
            Ok(true) => options.iteration_pause,
            Ok(false) => {
                debug!("No queued deployments");
                options.interval
            }
            Err(e) => {
                error!("Failed to claim deployment: {}", e);
                options.interval
            }
        };

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Deployer worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }
    }
}
