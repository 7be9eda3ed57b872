//! FSM unit tests

use keystone_runner::deploy::fsm::{app_status_for, check_transition, DeploymentEvent, DeploymentFsm};
use keystone_runner::errors::RunnerError;
use keystone_runner::models::app::AppStatus;
use keystone_runner::models::deployment::DeploymentStatus;

#[test]
fn test_fsm_initial_state() {
    let fsm = DeploymentFsm::new();
    assert_eq!(fsm.state(), DeploymentStatus::Queued);
    assert!(fsm.error().is_none());
    assert!(!fsm.is_terminal());
}

#[test]
fn test_fsm_deploy_success_flow() {
    let mut fsm = DeploymentFsm::new();

    // Queued -> Deploying
    fsm.process(DeploymentEvent::Start).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Deploying);

    // Deploying -> Success
    fsm.process(DeploymentEvent::Succeed).unwrap();
    assert_eq!(fsm.state(), DeploymentStatus::Success);
    assert_eq!(fsm.app_status(), Some(AppStatus::Running));
}

#[test]
fn test_fsm_deploy_failure_flow() {
    let mut fsm = DeploymentFsm::new();

    fsm.process(DeploymentEvent::Start).unwrap();
    fsm.process(DeploymentEvent::Fail("test error".to_string()))
        .unwrap();

    assert_eq!(fsm.state(), DeploymentStatus::Failed);
    assert_eq!(fsm.error(), Some("test error"));
    assert_eq!(fsm.app_status(), Some(AppStatus::Failed));
}

#[test]
fn test_fsm_terminal_states_are_final() {
    for terminal in [DeploymentStatus::Success, DeploymentStatus::Failed] {
        let mut fsm = DeploymentFsm::from_status(terminal);
        assert!(fsm.is_terminal());
        assert!(fsm.process(DeploymentEvent::Start).is_err());
        assert!(fsm.process(DeploymentEvent::Succeed).is_err());
        assert!(fsm.process(DeploymentEvent::Fail("again".into())).is_err());
        assert_eq!(fsm.state(), terminal);
    }
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = DeploymentFsm::new();

    // Cannot finish before starting
    let result = fsm.process(DeploymentEvent::Succeed);
    assert!(matches!(result, Err(RunnerError::InvalidTransition(_))));
    assert_eq!(fsm.state(), DeploymentStatus::Queued);

    // Cannot start twice
    fsm.process(DeploymentEvent::Start).unwrap();
    assert!(fsm.process(DeploymentEvent::Start).is_err());
}

#[test]
fn test_transition_table() {
    use DeploymentStatus::*;

    assert!(check_transition(Queued, Deploying).is_ok());
    assert!(check_transition(Deploying, Success).is_ok());
    assert!(check_transition(Deploying, Failed).is_ok());

    assert!(check_transition(Queued, Success).is_err());
    assert!(check_transition(Queued, Failed).is_err());
    assert!(check_transition(Success, Deploying).is_err());
    assert!(check_transition(Failed, Queued).is_err());
}

#[test]
fn test_app_shadow_status() {
    assert_eq!(app_status_for(DeploymentStatus::Queued), None);
    assert_eq!(
        app_status_for(DeploymentStatus::Deploying),
        Some(AppStatus::Deploying)
    );
    assert_eq!(
        app_status_for(DeploymentStatus::Success),
        Some(AppStatus::Running)
    );
    assert_eq!(
        app_status_for(DeploymentStatus::Failed),
        Some(AppStatus::Failed)
    );
}
