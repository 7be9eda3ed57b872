//! Persistence seam for repository, app and deployment records
//!
//! The runner never talks to a database directly; everything goes through
//! [`DeploymentStore`]. [`memory::MemoryStore`] backs tests and single-process
//! setups, [`postgres::PostgresStore`] shares state with the panel's request
//! layer.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::deploy::ports::PortRange;
use crate::errors::RunnerError;
use crate::models::app::{App, AppStatus};
use crate::models::deployment::{Deployment, DeploymentOutcome, NewDeployment};
use crate::models::repository::Repository;

/// Summary written onto deployments a previous runner left in `deploying`
pub const INTERRUPTED_SUMMARY: &str = "Interrupted: runner stopped before the deployment finished";

#[async_trait]
pub trait DeploymentStore: Send + Sync {
    /// Move the queued deployment with the smallest id to `deploying`
    async fn claim_next_queued(&self, now: DateTime<Utc>)
        -> Result<Option<Deployment>, RunnerError>;

    async fn deployment(&self, id: i64) -> Result<Option<Deployment>, RunnerError>;

    async fn app(&self, id: i64) -> Result<Option<App>, RunnerError>;

    async fn repository(&self, id: i64) -> Result<Option<Repository>, RunnerError>;

    /// Lease a host port for the App under an exclusive lock.
    ///
    /// An existing in-range lease is returned unchanged.
    async fn lease_port(&self, app_id: i64, range: PortRange) -> Result<u16, RunnerError>;

    /// Copy the App's lease onto the deployment record
    async fn attach_port(&self, deployment_id: i64, port: u16) -> Result<(), RunnerError>;

    async fn set_app_status(&self, app_id: i64, status: AppStatus) -> Result<(), RunnerError>;

    /// Write a terminal outcome and shadow it onto the App when it exists.
    ///
    /// Fails with `InvalidTransition` if the deployment is already terminal.
    async fn finish_deployment(
        &self,
        id: i64,
        outcome: DeploymentOutcome,
    ) -> Result<Deployment, RunnerError>;

    /// Fail every `deploying` record started before `started_before`.
    ///
    /// Run at startup: nothing else moves such a record once its runner is
    /// gone. Owning Apps are marked failed as well.
    async fn fail_orphaned(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Deployment>, RunnerError>;

    /// Image references of successful deployments, most recently finished first
    async fn successful_images(&self, app_id: i64) -> Result<Vec<String>, RunnerError>;

    async fn deployments_for_app(&self, app_id: i64) -> Result<Vec<Deployment>, RunnerError>;

    /// Insert a queued deployment
    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, RunnerError>;
}
