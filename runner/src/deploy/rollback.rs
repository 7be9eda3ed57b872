//! Rollback target resolution

use tracing::info;

use crate::errors::RunnerError;
use crate::store::DeploymentStore;

/// Image a rollback should run, given successful images newest first.
///
/// Index 0 is what runs now, so the target is always index 1.
pub fn previous_image(images_newest_first: &[String]) -> Result<&str, RunnerError> {
    match images_newest_first.get(1) {
        Some(image) => Ok(image.as_str()),
        None => Err(RunnerError::ValidationError(format!(
            "rollback needs at least two successful deployments, found {}",
            images_newest_first.len()
        ))),
    }
}

/// Resolve the rollback image for `app_id` from its deployment history
pub async fn resolve_rollback_image(
    store: &dyn DeploymentStore,
    app_id: i64,
) -> Result<String, RunnerError> {
    let images = store.successful_images(app_id).await?;
    let image = previous_image(&images)?.to_string();
    info!(app_id, image = %image, "Resolved rollback target");
    Ok(image)
}
