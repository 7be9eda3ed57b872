//! Stopping an App and reading its container output

use std::path::PathBuf;

use keystone_runner::deploy::command::CommandOutput;
use keystone_runner::deploy::control::{app_logs, stop_app};
use keystone_runner::deploy::docker::{ContainerRuntime, RuntimeTimeouts};
use keystone_runner::errors::RunnerError;
use keystone_runner::models::app::AppStatus;
use keystone_runner::store::DeploymentStore;

use crate::common::{failed_output, Harness, HarnessBuilder, ScriptedRunner, DOCKER};

fn runtime() -> ContainerRuntime {
    ContainerRuntime::new(Some(PathBuf::from(DOCKER)), "keystone", RuntimeTimeouts::default())
}

async fn running(runner: ScriptedRunner) -> Harness {
    let h = HarnessBuilder::new(runner).build();
    h.seed_app().await;
    h.store.set_app_status(1, AppStatus::Running).await.unwrap();
    h
}

#[tokio::test]
async fn test_stop_marks_app_stopped() {
    let h = running(ScriptedRunner::new()).await;

    let app = stop_app(h.store.as_ref(), &runtime(), h.runner.as_ref(), 1)
        .await
        .unwrap();
    assert_eq!(app.status, AppStatus::Stopped);
    assert_eq!(h.store.app(1).await.unwrap().unwrap().status, AppStatus::Stopped);

    let calls = h.runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].program_name(), "docker");
    assert_eq!(calls[0].args, vec!["stop", "app_web_shop"]);
}

#[tokio::test]
async fn test_failed_stop_keeps_status() {
    let h = running(
        ScriptedRunner::new().on("docker", "stop", failed_output(1, "No such container: app_web_shop")),
    )
    .await;

    let err = stop_app(h.store.as_ref(), &runtime(), h.runner.as_ref(), 1)
        .await
        .unwrap_err();
    match err {
        RunnerError::CommandFailed(detail) => assert!(detail.contains("No such container")),
        other => panic!("expected command failure, got {:?}", other),
    }
    assert_eq!(h.store.app(1).await.unwrap().unwrap().status, AppStatus::Running);
}

#[tokio::test]
async fn test_stop_refused_while_deploying() {
    let h = running(ScriptedRunner::new()).await;
    h.store.set_app_status(1, AppStatus::Deploying).await.unwrap();

    let err = stop_app(h.store.as_ref(), &runtime(), h.runner.as_ref(), 1)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Conflict(_)));
    assert!(h.runner.calls().is_empty());
}

#[tokio::test]
async fn test_stop_unknown_app() {
    let h = running(ScriptedRunner::new()).await;
    let err = stop_app(h.store.as_ref(), &runtime(), h.runner.as_ref(), 42)
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::NotFound(_)));
}

#[tokio::test]
async fn test_logs_tail_the_app_container() {
    let h = running(ScriptedRunner::new().on(
        "docker",
        "logs",
        CommandOutput {
            code: 0,
            stdout: "GET / 200\n".to_string(),
            stderr: String::new(),
        },
    ))
    .await;

    let logs = app_logs(h.store.as_ref(), &runtime(), h.runner.as_ref(), 1, 25)
        .await
        .unwrap();
    assert_eq!(logs, "GET / 200\n");
    assert_eq!(
        h.runner.calls()[0].args,
        vec!["logs", "--tail", "25", "app_web_shop"]
    );
}

#[tokio::test]
async fn test_logs_fall_back_to_stderr() {
    let h = running(ScriptedRunner::new().on(
        "docker",
        "logs",
        CommandOutput {
            code: 0,
            stdout: "  \n".to_string(),
            stderr: "listening on :8080\n".to_string(),
        },
    ))
    .await;

    let logs = app_logs(h.store.as_ref(), &runtime(), h.runner.as_ref(), 1, 10)
        .await
        .unwrap();
    assert_eq!(logs, "listening on :8080\n");
}
