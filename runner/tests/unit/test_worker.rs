//! Worker loop tests

use std::time::Duration;

use keystone_runner::deploy::requests::request_deploy;
use keystone_runner::models::app::App;
use keystone_runner::models::deployment::DeploymentStatus;
use keystone_runner::models::repository::Repository;
use keystone_runner::store::DeploymentStore;
use keystone_runner::workers::deployer::{run, run_once, Options};

use crate::common::{HarnessBuilder, ScriptedRunner};

fn container_of(args: &[String]) -> Option<String> {
    args.iter()
        .position(|arg| arg == "--name")
        .and_then(|i| args.get(i + 1))
        .cloned()
}

#[tokio::test]
async fn test_empty_queue() {
    let h = HarnessBuilder::new(ScriptedRunner::new()).build();
    assert!(!run_once(&h.pipeline).await.unwrap());
}

#[tokio::test]
async fn test_fifo_across_apps() {
    let h = HarnessBuilder::new(ScriptedRunner::new()).build();
    h.store
        .insert_repository(Repository::new(1, "mono", "https://github.com/acme/mono.git"))
        .await;
    h.store.insert_app(App::new(1, 1, "alpha")).await;
    h.store.insert_app(App::new(2, 1, "beta")).await;

    request_deploy(h.store.as_ref(), 1).await.unwrap();
    request_deploy(h.store.as_ref(), 2).await.unwrap();
    request_deploy(h.store.as_ref(), 1).await.unwrap();

    while run_once(&h.pipeline).await.unwrap() {}

    let started: Vec<String> = h
        .runner
        .calls()
        .iter()
        .filter(|spec| spec.args.first().map(String::as_str) == Some("run"))
        .filter_map(|spec| container_of(&spec.args))
        .collect();
    assert_eq!(started, vec!["app_alpha", "app_beta", "app_alpha"]);

    let deployments = h.store.deployments().await;
    assert_eq!(deployments.len(), 3);
    assert!(deployments
        .iter()
        .all(|d| d.status == DeploymentStatus::Success));
    // distinct Apps hold distinct ports
    assert_eq!(deployments[0].assigned_port, Some(9000));
    assert_eq!(deployments[1].assigned_port, Some(9001));
    assert_eq!(deployments[2].assigned_port, Some(9000));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_deployment() {
    let h = HarnessBuilder::new(ScriptedRunner::new()).build();
    h.seed_app().await;
    let queued = request_deploy(h.store.as_ref(), 1).await.unwrap();

    let options = Options {
        interval: Duration::from_millis(10),
        iteration_pause: Duration::from_millis(10),
    };
    // shutdown is already requested when the worker starts
    tokio::time::timeout(
        Duration::from_secs(5),
        run(
            &options,
            &h.pipeline,
            |_| futures::future::pending::<()>(),
            Box::pin(async {}),
        ),
    )
    .await
    .unwrap();

    let done = h.store.deployment(queued.id).await.unwrap().unwrap();
    assert_eq!(done.status, DeploymentStatus::Success);
}
