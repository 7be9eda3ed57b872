//! Request boundary: queueing deployments
//!
//! Preconditions are checked here, before any record is created, so the
//! pipeline only ever sees deployments it can attempt.

use tracing::info;

use crate::deploy::rollback::resolve_rollback_image;
use crate::errors::RunnerError;
use crate::models::app::App;
use crate::models::deployment::{Deployment, DeploymentType, NewDeployment};
use crate::store::DeploymentStore;

async fn deployable_app(store: &dyn DeploymentStore, app_id: i64) -> Result<App, RunnerError> {
    let app = store
        .app(app_id)
        .await?
        .ok_or_else(|| RunnerError::NotFound(format!("app {}", app_id)))?;
    if !app.status.accepts_deploy() {
        return Err(RunnerError::Conflict(format!(
            "app {} cannot be deployed while {}",
            app.name, app.status
        )));
    }
    Ok(app)
}

/// Queue a build-and-run deployment: `initial` for an App never deployed
/// before, `update` otherwise
pub async fn request_deploy(
    store: &dyn DeploymentStore,
    app_id: i64,
) -> Result<Deployment, RunnerError> {
    let app = deployable_app(store, app_id).await?;
    let deployment_type = if store.deployments_for_app(app.id).await?.is_empty() {
        DeploymentType::Initial
    } else {
        DeploymentType::Update
    };

    let deployment = store
        .create_deployment(NewDeployment {
            app_id: app.id,
            deployment_type,
            image_ref: None,
        })
        .await?;
    info!(deployment_id = deployment.id, app = %app.name, kind = %deployment_type, "Deployment queued");
    Ok(deployment)
}

/// Queue a rollback to the previous successful image.
///
/// Rejected without creating anything when fewer than two successful
/// deployments exist.
pub async fn request_rollback(
    store: &dyn DeploymentStore,
    app_id: i64,
) -> Result<Deployment, RunnerError> {
    let app = deployable_app(store, app_id).await?;
    let image = resolve_rollback_image(store, app.id).await?;

    let deployment = store
        .create_deployment(NewDeployment {
            app_id: app.id,
            deployment_type: DeploymentType::Rollback,
            image_ref: Some(image),
        })
        .await?;
    info!(deployment_id = deployment.id, app = %app.name, "Rollback queued");
    Ok(deployment)
}
