//! Request boundary and rollback resolution tests

use keystone_runner::deploy::requests::{request_deploy, request_rollback};
use keystone_runner::deploy::rollback::resolve_rollback_image;
use keystone_runner::errors::RunnerError;
use keystone_runner::models::app::{App, AppStatus};
use keystone_runner::models::deployment::{DeploymentStatus, DeploymentType};
use keystone_runner::store::memory::MemoryStore;
use keystone_runner::store::DeploymentStore;

use tokio_test::{assert_err, assert_ok};

use crate::common::succeeded;

async fn store_with_app(status: AppStatus) -> MemoryStore {
    let store = MemoryStore::new();
    let mut app = App::new(1, 1, "api");
    app.status = status;
    store.insert_app(app).await;
    store
}

#[tokio::test]
async fn test_rollback_rejected_with_single_success() {
    let store = store_with_app(AppStatus::Running).await;
    store.insert_deployment(succeeded(1, 1, "keystone/api:1", 5)).await;

    let err = request_rollback(&store, 1).await.unwrap_err();
    assert!(matches!(err, RunnerError::ValidationError(_)));
    // nothing was created
    assert_eq!(store.deployments().await.len(), 1);
}

#[tokio::test]
async fn test_rollback_picks_second_most_recent_by_end_time() {
    let store = store_with_app(AppStatus::Running).await;
    // ids deliberately out of order with end times
    store.insert_deployment(succeeded(1, 1, "keystone/api:1", 30)).await;
    store.insert_deployment(succeeded(2, 1, "keystone/api:2", 10)).await;
    store.insert_deployment(succeeded(3, 1, "keystone/api:3", 20)).await;

    assert_eq!(
        resolve_rollback_image(&store, 1).await.unwrap(),
        "keystone/api:3"
    );

    let queued = request_rollback(&store, 1).await.unwrap();
    assert_eq!(queued.deployment_type, DeploymentType::Rollback);
    assert_eq!(queued.status, DeploymentStatus::Queued);
    assert_eq!(queued.image_ref.as_deref(), Some("keystone/api:3"));
}

#[tokio::test]
async fn test_failed_deployments_do_not_count_for_rollback() {
    let store = store_with_app(AppStatus::Failed).await;
    store.insert_deployment(succeeded(1, 1, "keystone/api:1", 5)).await;
    let mut failed = succeeded(2, 1, "keystone/api:2", 6);
    failed.status = DeploymentStatus::Failed;
    store.insert_deployment(failed).await;

    assert!(request_rollback(&store, 1).await.is_err());
}

#[tokio::test]
async fn test_deploy_gate_by_app_status() {
    for status in [AppStatus::Draft, AppStatus::Preparing, AppStatus::Deploying] {
        let store = store_with_app(status).await;
        let err = assert_err!(request_deploy(&store, 1).await);
        assert!(matches!(err, RunnerError::Conflict(_)), "{}", status);
        assert!(store.deployments().await.is_empty());
    }

    for status in [
        AppStatus::Prepared,
        AppStatus::Running,
        AppStatus::Stopped,
        AppStatus::Failed,
    ] {
        let store = store_with_app(status).await;
        let queued = assert_ok!(request_deploy(&store, 1).await, "{}", status);
        assert_eq!(queued.deployment_type, DeploymentType::Initial);
    }
}

#[tokio::test]
async fn test_deploy_unknown_app() {
    let store = MemoryStore::new();
    assert!(matches!(
        request_deploy(&store, 7).await,
        Err(RunnerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_queued_records_get_increasing_ids() {
    let store = store_with_app(AppStatus::Prepared).await;
    let first = assert_ok!(request_deploy(&store, 1).await);
    let second = assert_ok!(request_deploy(&store, 1).await);
    assert!(second.id > first.id);
    assert_eq!(first.deployment_type, DeploymentType::Initial);
    assert_eq!(second.deployment_type, DeploymentType::Update);
    assert!(store.deployment(second.id).await.unwrap().is_some());
}
