//! Deployment pipeline
//!
//! Runs one claimed deployment through tool check, port lease, fetch and
//! build (or rollback image), container replacement and health probe, then
//! writes the terminal outcome. Expected failures end as a `failed` record;
//! only faults outside that taxonomy come back as `Err` for the worker's
//! backstop.

use std::fmt;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::command::{CommandOutput, CommandRunner};
use crate::deploy::docker::{image_tag, ContainerRuntime};
use crate::deploy::fsm::{DeploymentEvent, DeploymentFsm};
use crate::deploy::git::{FetchAction, SourceFetcher};
use crate::deploy::health::{HealthProber, ProbeResult, ProbeTimeout};
use crate::deploy::log::{DeploymentLog, LogSection};
use crate::deploy::ports::PortRange;
use crate::errors::RunnerError;
use crate::models::app::{App, AppStatus};
use crate::models::deployment::{Deployment, DeploymentOutcome, DeploymentStatus, DeploymentType};
use crate::storage::layout::RuntimeLayout;
use crate::store::DeploymentStore;
use crate::utils::{truncate_summary, SUMMARY_MAX_CHARS};

/// An expected, reportable pipeline failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageFailure {
    ToolUnavailable(String),
    PortsExhausted { start: u16, end: u16 },
    Fetch { action: FetchAction, detail: String },
    Build { image: String, detail: String },
    Run { image: String, detail: String },
    HealthCheck(ProbeTimeout),
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageFailure::ToolUnavailable(detail) => {
                write!(f, "Container tool unavailable: {}", detail)
            }
            StageFailure::PortsExhausted { start, end } => {
                write!(f, "No ports available in range {}-{}", start, end)
            }
            StageFailure::Fetch { action, detail } => {
                write!(f, "Git {} failed: {}", action.as_str(), detail)
            }
            StageFailure::Build { image, detail } => {
                write!(f, "Image build failed for {}: {}", image, detail)
            }
            StageFailure::Run { image, detail } => {
                write!(f, "Container start failed for {}: {}", image, detail)
            }
            StageFailure::HealthCheck(timeout) => write!(f, "Health check failed: {}", timeout),
        }
    }
}

enum StageError {
    Failure(StageFailure),
    Fault(RunnerError),
}

impl From<StageFailure> for StageError {
    fn from(failure: StageFailure) -> Self {
        StageError::Failure(failure)
    }
}

impl From<RunnerError> for StageError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::ToolUnavailable(detail) => {
                StageError::Failure(StageFailure::ToolUnavailable(detail))
            }
            RunnerError::PortsExhausted { start, end } => {
                StageError::Failure(StageFailure::PortsExhausted { start, end })
            }
            other => StageError::Fault(other),
        }
    }
}

/// Collaborators one pipeline run needs
pub struct DeploymentPipeline {
    store: Arc<dyn DeploymentStore>,
    runner: Arc<dyn CommandRunner>,
    runtime: ContainerRuntime,
    fetcher: SourceFetcher,
    prober: HealthProber,
    layout: RuntimeLayout,
    port_range: PortRange,
}

impl DeploymentPipeline {
    pub fn new(
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn CommandRunner>,
        runtime: ContainerRuntime,
        fetcher: SourceFetcher,
        prober: HealthProber,
        layout: RuntimeLayout,
        port_range: PortRange,
    ) -> Self {
        Self {
            store,
            runner,
            runtime,
            fetcher,
            prober,
            layout,
            port_range,
        }
    }

    pub fn store(&self) -> &Arc<dyn DeploymentStore> {
        &self.store
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    /// Run a deployment already claimed into `deploying` to a terminal state
    pub async fn execute(&self, deployment: Deployment) -> Result<Deployment, RunnerError> {
        let mut fsm = DeploymentFsm::from_status(deployment.status);
        if fsm.state() != DeploymentStatus::Deploying {
            return Err(RunnerError::InvalidTransition(format!(
                "deployment {} must be deploying to run, found {}",
                deployment.id, deployment.status
            )));
        }

        let app = self
            .store
            .app(deployment.app_id)
            .await?
            .ok_or_else(|| RunnerError::NotFound(format!("app {}", deployment.app_id)))?;
        self.store
            .set_app_status(app.id, AppStatus::Deploying)
            .await?;

        info!(
            deployment_id = deployment.id,
            app = %app.name,
            kind = %deployment.deployment_type,
            "Starting deployment"
        );

        let mut log = DeploymentLog::new(self.layout.deployment_log(deployment.id).path());
        // a reused id must not inherit an earlier run's log
        self.flush_log(&log).await;
        let result = self.run_stages(&deployment, &app, &mut log).await;

        let outcome = match result {
            Ok(image) => {
                fsm.process(DeploymentEvent::Succeed)?;
                info!(deployment_id = deployment.id, image = %image, "Deployment succeeded");
                DeploymentOutcome::success(image, None)
            }
            Err(StageError::Failure(failure)) => {
                let summary = failure.to_string();
                warn!(deployment_id = deployment.id, "Deployment failed: {}", summary);
                log.section(LogSection::Error, summary.clone());
                fsm.process(DeploymentEvent::Fail(summary.clone()))?;
                DeploymentOutcome::failed(truncate_summary(&summary, SUMMARY_MAX_CHARS), None)
            }
            Err(StageError::Fault(err)) => {
                // keep whatever was captured; the backstop records the fault
                self.flush_log(&log).await;
                return Err(err);
            }
        };

        let outcome = DeploymentOutcome {
            log_path: self.flush_log(&log).await,
            ..outcome
        };
        self.store.finish_deployment(deployment.id, outcome).await
    }

    async fn run_stages(
        &self,
        deployment: &Deployment,
        app: &App,
        log: &mut DeploymentLog,
    ) -> Result<String, StageError> {
        // checked before anything touches the working directory
        self.runtime.tool()?;

        let port = self.store.lease_port(app.id, self.port_range).await?;
        self.store.attach_port(deployment.id, port).await?;
        info!(deployment_id = deployment.id, port, "Port leased");

        let runner = self.runner.as_ref();
        let image = if deployment.deployment_type == DeploymentType::Rollback {
            let image = deployment.image_ref.clone().ok_or_else(|| {
                RunnerError::ValidationError(format!(
                    "rollback deployment {} has no image reference",
                    deployment.id
                ))
            })?;
            log.section(LogSection::Rollback, format!("Rolling back to {}", image));

            let (removed, started) = self
                .runtime
                .replace_container(runner, app, &image, port)
                .await?;
            log.command(LogSection::Rollback, &removed);
            log.command(LogSection::Rollback, &started);
            check_run(&image, &started)?;
            image
        } else {
            let repo = self
                .store
                .repository(app.repo_id)
                .await?
                .ok_or_else(|| RunnerError::NotFound(format!("repository {}", app.repo_id)))?;
            let workdir = self.layout.app_workdir(app);

            let fetched = self
                .fetcher
                .sync_repository(runner, &repo, workdir.path())
                .await?;
            log.command(LogSection::Fetch, &fetched.output);
            if !fetched.output.success() {
                return Err(StageFailure::Fetch {
                    action: fetched.action,
                    detail: fetched.output.error_text(),
                }
                .into());
            }

            let image = image_tag(self.runtime.namespace(), app, deployment.id);
            let built = self
                .runtime
                .build_image(runner, workdir.path(), &image)
                .await?;
            log.command(LogSection::Build, &built);
            if !built.success() {
                return Err(StageFailure::Build {
                    image,
                    detail: built.error_text(),
                }
                .into());
            }

            let (removed, started) = self
                .runtime
                .replace_container(runner, app, &image, port)
                .await?;
            log.command(LogSection::Run, &removed);
            log.command(LogSection::Run, &started);
            check_run(&image, &started)?;
            image
        };

        match self
            .prober
            .probe(port, app.health_check_path.as_deref())
            .await
        {
            ProbeResult::Skipped => {}
            ProbeResult::Healthy { url, attempts } => {
                log.section(
                    LogSection::Health,
                    format!("{} healthy after {} attempt(s)", url, attempts),
                );
            }
            ProbeResult::TimedOut(timeout) => {
                return Err(StageFailure::HealthCheck(timeout).into());
            }
        }

        Ok(image)
    }

    /// Fail a deployment after a fault the stages did not classify.
    ///
    /// The App is marked failed along with it when it still exists.
    pub async fn record_fault(
        &self,
        deployment: &Deployment,
        detail: &str,
    ) -> Result<Deployment, RunnerError> {
        let mut log = DeploymentLog::new(self.layout.deployment_log(deployment.id).path());
        log.section(LogSection::Exception, detail);
        let log_path = match log.append().await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(path = %log.path().display(), "Failed to write deployment log: {}", e);
                None
            }
        };

        let summary = truncate_summary(&format!("Unhandled error: {}", detail), SUMMARY_MAX_CHARS);
        self.store
            .finish_deployment(deployment.id, DeploymentOutcome::failed(summary, log_path))
            .await
    }

    async fn flush_log(&self, log: &DeploymentLog) -> Option<std::path::PathBuf> {
        match log.flush().await {
            Ok(path) => Some(path),
            Err(e) => {
                error!(path = %log.path().display(), "Failed to write deployment log: {}", e);
                None
            }
        }
    }
}

fn check_run(image: &str, started: &CommandOutput) -> Result<(), StageFailure> {
    if started.success() {
        Ok(())
    } else {
        Err(StageFailure::Run {
            image: image.to_string(),
            detail: started.error_text(),
        })
    }
}
