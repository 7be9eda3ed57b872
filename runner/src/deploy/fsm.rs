//! Finite State Machine for deployment records

use crate::errors::RunnerError;
use crate::models::app::AppStatus;
use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentEvent {
    /// Pipeline picked the deployment up
    Start,

    /// Container is up and verified
    Succeed,

    /// Any stage failed
    Fail(String),
}

/// Status the owning App shadows for a deployment status.
///
/// Queued deployments leave the App untouched.
pub fn app_status_for(status: DeploymentStatus) -> Option<AppStatus> {
    match status {
        DeploymentStatus::Queued => None,
        DeploymentStatus::Deploying => Some(AppStatus::Deploying),
        DeploymentStatus::Success => Some(AppStatus::Running),
        DeploymentStatus::Failed => Some(AppStatus::Failed),
    }
}

/// Check a status write against the legal transitions
pub fn check_transition(from: DeploymentStatus, to: DeploymentStatus) -> Result<(), RunnerError> {
    let legal = matches!(
        (from, to),
        (DeploymentStatus::Queued, DeploymentStatus::Deploying)
            | (DeploymentStatus::Deploying, DeploymentStatus::Success)
            | (DeploymentStatus::Deploying, DeploymentStatus::Failed)
    );
    if legal {
        Ok(())
    } else {
        Err(RunnerError::InvalidTransition(format!("{} -> {}", from, to)))
    }
}

/// Deployment FSM: `queued -> deploying -> {success | failed}`
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in queued state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Queued)
    }

    /// Resume from a stored status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Status the owning App should show right now
    pub fn app_status(&self) -> Option<AppStatus> {
        app_status_for(self.state)
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, RunnerError> {
        let next = match &event {
            DeploymentEvent::Start => DeploymentStatus::Deploying,
            DeploymentEvent::Succeed => DeploymentStatus::Success,
            DeploymentEvent::Fail(_) => DeploymentStatus::Failed,
        };
        check_transition(self.state, next)?;

        if let DeploymentEvent::Fail(err) = event {
            self.error = Some(err);
        }
        self.state = next;
        Ok(next)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
