//! Operator actions on a deployed App outside the queue

use tracing::info;

use crate::deploy::command::CommandRunner;
use crate::deploy::docker::ContainerRuntime;
use crate::errors::RunnerError;
use crate::models::app::{App, AppStatus};
use crate::store::DeploymentStore;

/// Lines of container output returned when no tail is given
pub const DEFAULT_LOG_TAIL: usize = 100;

async fn existing_app(store: &dyn DeploymentStore, app_id: i64) -> Result<App, RunnerError> {
    store
        .app(app_id)
        .await?
        .ok_or_else(|| RunnerError::NotFound(format!("app {}", app_id)))
}

/// Stop the App's container and mark the App `stopped`.
///
/// The status is left alone when the tool reports a failure. Apps with a
/// deployment in flight are refused.
pub async fn stop_app(
    store: &dyn DeploymentStore,
    runtime: &ContainerRuntime,
    runner: &dyn CommandRunner,
    app_id: i64,
) -> Result<App, RunnerError> {
    let mut app = existing_app(store, app_id).await?;
    if app.status == AppStatus::Deploying {
        return Err(RunnerError::Conflict(format!(
            "app {} cannot be stopped while deploying",
            app.name
        )));
    }

    let output = runtime.stop_container(runner, &app).await?;
    if !output.success() {
        return Err(RunnerError::CommandFailed(output.error_text()));
    }

    store.set_app_status(app.id, AppStatus::Stopped).await?;
    app.status = AppStatus::Stopped;
    info!(app = %app.name, "App stopped");
    Ok(app)
}

/// Last `tail` lines the App's container wrote
pub async fn app_logs(
    store: &dyn DeploymentStore,
    runtime: &ContainerRuntime,
    runner: &dyn CommandRunner,
    app_id: i64,
    tail: usize,
) -> Result<String, RunnerError> {
    let app = existing_app(store, app_id).await?;
    runtime.container_logs(runner, &app, tail).await
}
