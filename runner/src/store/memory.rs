//! In-memory store

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::deploy::fsm::{app_status_for, check_transition, DeploymentEvent, DeploymentFsm};
use crate::deploy::ports::{resolve_lease, PortRange};
use crate::errors::RunnerError;
use crate::models::app::{App, AppStatus};
use crate::models::deployment::{
    Deployment, DeploymentOutcome, DeploymentStatus, NewDeployment,
};
use crate::models::repository::Repository;
use crate::store::{DeploymentStore, INTERRUPTED_SUMMARY};

#[derive(Debug, Default)]
struct Tables {
    repositories: BTreeMap<i64, Repository>,
    apps: BTreeMap<i64, App>,
    deployments: BTreeMap<i64, Deployment>,
}

impl Tables {
    fn next_deployment_id(&self) -> i64 {
        self.deployments.keys().next_back().map_or(1, |id| id + 1)
    }

    fn deployment_mut(&mut self, id: i64) -> Result<&mut Deployment, RunnerError> {
        self.deployments
            .get_mut(&id)
            .ok_or_else(|| RunnerError::NotFound(format!("deployment {}", id)))
    }
}

/// Store keeping every table behind one mutex.
///
/// Holding the mutex is the exclusive lock: port leases and claims are
/// serialised against every other writer.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_repository(&self, repo: Repository) {
        self.tables.lock().await.repositories.insert(repo.id, repo);
    }

    pub async fn insert_app(&self, app: App) {
        self.tables.lock().await.apps.insert(app.id, app);
    }

    /// Insert a deployment as-is, keeping its id and timestamps
    pub async fn insert_deployment(&self, deployment: Deployment) {
        self.tables
            .lock()
            .await
            .deployments
            .insert(deployment.id, deployment);
    }

    pub async fn apps(&self) -> Vec<App> {
        self.tables.lock().await.apps.values().cloned().collect()
    }

    pub async fn deployments(&self) -> Vec<Deployment> {
        self.tables.lock().await.deployments.values().cloned().collect()
    }
}

#[async_trait]
impl DeploymentStore for MemoryStore {
    async fn claim_next_queued(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Deployment>, RunnerError> {
        let mut tables = self.tables.lock().await;
        // BTreeMap iterates in id order
        let Some(deployment) = tables
            .deployments
            .values_mut()
            .find(|d| d.status == DeploymentStatus::Queued)
        else {
            return Ok(None);
        };
        deployment.status =
            DeploymentFsm::from_status(deployment.status).process(DeploymentEvent::Start)?;
        deployment.started_at = Some(now);
        Ok(Some(deployment.clone()))
    }

    async fn deployment(&self, id: i64) -> Result<Option<Deployment>, RunnerError> {
        Ok(self.tables.lock().await.deployments.get(&id).cloned())
    }

    async fn app(&self, id: i64) -> Result<Option<App>, RunnerError> {
        Ok(self.tables.lock().await.apps.get(&id).cloned())
    }

    async fn repository(&self, id: i64) -> Result<Option<Repository>, RunnerError> {
        Ok(self.tables.lock().await.repositories.get(&id).cloned())
    }

    async fn lease_port(&self, app_id: i64, range: PortRange) -> Result<u16, RunnerError> {
        let mut tables = self.tables.lock().await;
        let current = tables
            .apps
            .get(&app_id)
            .ok_or_else(|| RunnerError::NotFound(format!("app {}", app_id)))?
            .current_port;

        let leased_by_others: HashSet<u16> = tables
            .apps
            .values()
            .filter(|app| app.id != app_id)
            .filter_map(|app| app.current_port)
            .collect();

        let port = resolve_lease(current, range, &leased_by_others)?;
        if let Some(app) = tables.apps.get_mut(&app_id) {
            app.current_port = Some(port);
        }
        Ok(port)
    }

    async fn attach_port(&self, deployment_id: i64, port: u16) -> Result<(), RunnerError> {
        let mut tables = self.tables.lock().await;
        let deployment = tables.deployment_mut(deployment_id)?;
        if deployment.status.is_terminal() {
            return Err(RunnerError::InvalidTransition(format!(
                "deployment {} is already {}",
                deployment_id, deployment.status
            )));
        }
        deployment.assigned_port = Some(port);
        Ok(())
    }

    async fn set_app_status(&self, app_id: i64, status: AppStatus) -> Result<(), RunnerError> {
        let mut tables = self.tables.lock().await;
        let app = tables
            .apps
            .get_mut(&app_id)
            .ok_or_else(|| RunnerError::NotFound(format!("app {}", app_id)))?;
        app.status = status;
        Ok(())
    }

    async fn finish_deployment(
        &self,
        id: i64,
        outcome: DeploymentOutcome,
    ) -> Result<Deployment, RunnerError> {
        let mut tables = self.tables.lock().await;
        let deployment = tables.deployment_mut(id)?;
        check_transition(deployment.status, outcome.status)?;

        deployment.status = outcome.status;
        deployment.ended_at = Some(outcome.ended_at);
        if outcome.image_ref.is_some() {
            deployment.image_ref = outcome.image_ref;
        }
        deployment.error_summary = outcome.error_summary;
        if outcome.log_path.is_some() {
            deployment.log_path = outcome.log_path;
        }
        let finished = deployment.clone();

        if let (Some(status), Some(app)) = (
            app_status_for(finished.status),
            tables.apps.get_mut(&finished.app_id),
        ) {
            app.status = status;
        }
        Ok(finished)
    }

    async fn fail_orphaned(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Deployment>, RunnerError> {
        let mut tables = self.tables.lock().await;
        let mut orphaned = Vec::new();
        for deployment in tables.deployments.values_mut() {
            let stale = deployment.started_at.map_or(true, |at| at < started_before);
            if deployment.status != DeploymentStatus::Deploying || !stale {
                continue;
            }
            deployment.status = DeploymentStatus::Failed;
            deployment.ended_at = Some(now);
            deployment.error_summary = Some(INTERRUPTED_SUMMARY.to_string());
            orphaned.push(deployment.clone());
        }

        for deployment in &orphaned {
            if let Some(app) = tables.apps.get_mut(&deployment.app_id) {
                app.status = AppStatus::Failed;
            }
        }
        Ok(orphaned)
    }

    async fn successful_images(&self, app_id: i64) -> Result<Vec<String>, RunnerError> {
        let tables = self.tables.lock().await;
        let mut successes: Vec<&Deployment> = tables
            .deployments
            .values()
            .filter(|d| d.app_id == app_id && d.status == DeploymentStatus::Success)
            .collect();
        // None sorts before Some, so reversing puts unfinished records last
        successes.sort_by_key(|d| (d.ended_at, d.id));
        successes.reverse();
        Ok(successes
            .into_iter()
            .filter_map(|d| d.image_ref.clone())
            .collect())
    }

    async fn deployments_for_app(&self, app_id: i64) -> Result<Vec<Deployment>, RunnerError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .deployments
            .values()
            .filter(|d| d.app_id == app_id)
            .cloned()
            .collect())
    }

    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, RunnerError> {
        let mut tables = self.tables.lock().await;
        if !tables.apps.contains_key(&new.app_id) {
            return Err(RunnerError::NotFound(format!("app {}", new.app_id)));
        }
        let deployment = Deployment {
            id: tables.next_deployment_id(),
            app_id: new.app_id,
            deployment_type: new.deployment_type,
            status: DeploymentStatus::Queued,
            image_ref: new.image_ref,
            assigned_port: None,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            error_summary: None,
            log_path: None,
        };
        tables.deployments.insert(deployment.id, deployment.clone());
        Ok(deployment)
    }
}
