//! Runner startup against a store left behind by a previous run

use std::sync::Arc;

use keystone_runner::app::state::AppState;
use keystone_runner::deploy::command::CommandRunner;
use keystone_runner::models::app::AppStatus;
use keystone_runner::models::deployment::{Deployment, DeploymentStatus};
use keystone_runner::storage::settings::Settings;
use keystone_runner::store::memory::MemoryStore;
use keystone_runner::store::{DeploymentStore, INTERRUPTED_SUMMARY};

use crate::common::{at, succeeded, HarnessBuilder, ScriptedRunner, DOCKER};

fn in_flight(id: i64, app_id: i64) -> Deployment {
    Deployment {
        status: DeploymentStatus::Deploying,
        image_ref: None,
        ended_at: None,
        started_at: Some(at(1)),
        ..succeeded(id, app_id, "unused", 0)
    }
}

#[tokio::test]
async fn test_startup_fails_deployments_left_deploying() {
    // seeds repository and app through the shared fixtures
    let seeded = HarnessBuilder::new(ScriptedRunner::new()).build();
    seeded.seed_app().await;
    let store: Arc<MemoryStore> = seeded.store.clone();
    store.set_app_status(1, AppStatus::Deploying).await.unwrap();
    store.insert_deployment(succeeded(1, 1, "keystone/web_shop:1", 2)).await;
    store.insert_deployment(in_flight(2, 1)).await;

    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        runtime_dir: dir.path().to_path_buf(),
        container_tool: Some(DOCKER.to_string()),
        ..Default::default()
    };
    AppState::with_store(
        &settings,
        store.clone() as Arc<dyn DeploymentStore>,
        Arc::new(ScriptedRunner::new()) as Arc<dyn CommandRunner>,
    )
    .await
    .unwrap();

    let interrupted = store.deployment(2).await.unwrap().unwrap();
    assert_eq!(interrupted.status, DeploymentStatus::Failed);
    assert_eq!(interrupted.error_summary.as_deref(), Some(INTERRUPTED_SUMMARY));
    assert!(interrupted.ended_at.is_some());
    assert_eq!(store.app(1).await.unwrap().unwrap().status, AppStatus::Failed);

    let earlier = store.deployment(1).await.unwrap().unwrap();
    assert_eq!(earlier.status, DeploymentStatus::Success);
}
