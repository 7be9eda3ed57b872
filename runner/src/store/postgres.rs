//! PostgreSQL store shared with the panel's request layer

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use crate::deploy::fsm::app_status_for;
use crate::deploy::ports::{resolve_lease, PortRange};
use crate::errors::RunnerError;
use crate::models::app::{App, AppStatus};
use crate::models::deployment::{Deployment, DeploymentOutcome, NewDeployment};
use crate::models::repository::Repository;
use crate::store::{DeploymentStore, INTERRUPTED_SUMMARY};

/// Advisory lock key serialising port allocation across connections
const PORT_LEASE_LOCK_KEY: i64 = 0x6b73_706f_7274;

const DEPLOYMENT_COLUMNS: &str = "id, app_id, deployment_type, status, image_ref, assigned_port, \
     created_at, started_at, ended_at, error_summary, log_path";

/// PostgreSQL-backed [`DeploymentStore`].
///
/// Port leases run in one transaction that takes a transaction-scoped
/// advisory lock, then `SELECT ... FOR UPDATE` on the App row, then reads the
/// leased set and writes the new port. A partial unique index on
/// `apps.current_port` backs this up against writers that skip the lock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(url: &str) -> Result<Self, RunnerError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Connected to PostgreSQL store");
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create tables and indexes when missing
    pub async fn ensure_schema(&self) -> Result<(), RunnerError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS repositories (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                git_url TEXT NOT NULL,
                default_branch TEXT NOT NULL DEFAULT 'main',
                access_token TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS apps (
                id BIGSERIAL PRIMARY KEY,
                repo_id BIGINT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
                name TEXT NOT NULL UNIQUE,
                container_port INT NOT NULL DEFAULT 8000,
                health_check_path TEXT,
                env_vars JSONB NOT NULL DEFAULT '{}'::jsonb,
                current_port INT,
                status TEXT NOT NULL DEFAULT 'draft'
            )
            "#,
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_apps_current_port
            ON apps (current_port)
            WHERE current_port IS NOT NULL
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id BIGSERIAL PRIMARY KEY,
                app_id BIGINT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                deployment_type TEXT NOT NULL DEFAULT 'update',
                status TEXT NOT NULL DEFAULT 'queued',
                image_ref TEXT,
                assigned_port INT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                started_at TIMESTAMPTZ,
                ended_at TIMESTAMPTZ,
                error_summary TEXT,
                log_path TEXT
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_deployments_queued
            ON deployments (id)
            WHERE status = 'queued'
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn port_from_db(value: Option<i32>) -> Result<Option<u16>, RunnerError> {
    value
        .map(|port| {
            u16::try_from(port)
                .map_err(|_| RunnerError::DatabaseError(format!("port {} out of range", port)))
        })
        .transpose()
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T, RunnerError>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(RunnerError::DatabaseError)
}

fn deployment_from_row(row: &PgRow) -> Result<Deployment, RunnerError> {
    let log_path: Option<String> = row.try_get("log_path")?;
    Ok(Deployment {
        id: row.try_get("id")?,
        app_id: row.try_get("app_id")?,
        deployment_type: parse_column(row, "deployment_type")?,
        status: parse_column(row, "status")?,
        image_ref: row.try_get("image_ref")?,
        assigned_port: port_from_db(row.try_get("assigned_port")?)?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
        error_summary: row.try_get("error_summary")?,
        log_path: log_path.filter(|p| !p.is_empty()).map(PathBuf::from),
    })
}

fn app_from_row(row: &PgRow) -> Result<App, RunnerError> {
    let container_port: i32 = row.try_get("container_port")?;
    let env_vars: Json<BTreeMap<String, String>> = row.try_get("env_vars")?;
    Ok(App {
        id: row.try_get("id")?,
        repo_id: row.try_get("repo_id")?,
        name: row.try_get("name")?,
        container_port: port_from_db(Some(container_port))?.unwrap_or_default(),
        health_check_path: row.try_get("health_check_path")?,
        env_vars: env_vars.0,
        current_port: port_from_db(row.try_get("current_port")?)?,
        status: parse_column(row, "status")?,
    })
}

#[async_trait]
impl DeploymentStore for PostgresStore {
    async fn claim_next_queued(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<Deployment>, RunnerError> {
        let query = format!(
            r#"
            UPDATE deployments
            SET status = 'deploying', started_at = $1
            WHERE id = (
                SELECT id FROM deployments
                WHERE status = 'queued'
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            DEPLOYMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn deployment(&self, id: i64) -> Result<Option<Deployment>, RunnerError> {
        let query = format!("SELECT {} FROM deployments WHERE id = $1", DEPLOYMENT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn app(&self, id: i64) -> Result<Option<App>, RunnerError> {
        let row = sqlx::query(
            "SELECT id, repo_id, name, container_port, health_check_path, env_vars, \
             current_port, status FROM apps WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(app_from_row).transpose()
    }

    async fn repository(&self, id: i64) -> Result<Option<Repository>, RunnerError> {
        let row = sqlx::query(
            "SELECT id, name, git_url, default_branch, access_token FROM repositories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let access_token: Option<String> = row.try_get("access_token")?;
        Ok(Some(Repository {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            git_url: row.try_get("git_url")?,
            default_branch: row.try_get("default_branch")?,
            access_token: access_token
                .filter(|t| !t.is_empty())
                .map(SecretString::from),
        }))
    }

    async fn lease_port(&self, app_id: i64, range: PortRange) -> Result<u16, RunnerError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(PORT_LEASE_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query("SELECT current_port FROM apps WHERE id = $1 FOR UPDATE")
            .bind(app_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| RunnerError::NotFound(format!("app {}", app_id)))?;
        let current = port_from_db(row.try_get("current_port")?)?;

        let others: Vec<i32> = sqlx::query_scalar(
            "SELECT current_port FROM apps WHERE id <> $1 AND current_port IS NOT NULL",
        )
        .bind(app_id)
        .fetch_all(&mut *tx)
        .await?;
        let leased_by_others: HashSet<u16> = others
            .into_iter()
            .filter_map(|port| u16::try_from(port).ok())
            .collect();

        let port = resolve_lease(current, range, &leased_by_others)?;
        if current != Some(port) {
            sqlx::query("UPDATE apps SET current_port = $2 WHERE id = $1")
                .bind(app_id)
                .bind(i32::from(port))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(port)
    }

    async fn attach_port(&self, deployment_id: i64, port: u16) -> Result<(), RunnerError> {
        let result = sqlx::query(
            "UPDATE deployments SET assigned_port = $2 \
             WHERE id = $1 AND status NOT IN ('success', 'failed')",
        )
        .bind(deployment_id)
        .bind(i32::from(port))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RunnerError::InvalidTransition(format!(
                "deployment {} is missing or already terminal",
                deployment_id
            )));
        }
        Ok(())
    }

    async fn set_app_status(&self, app_id: i64, status: AppStatus) -> Result<(), RunnerError> {
        let result = sqlx::query("UPDATE apps SET status = $2 WHERE id = $1")
            .bind(app_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RunnerError::NotFound(format!("app {}", app_id)));
        }
        Ok(())
    }

    async fn finish_deployment(
        &self,
        id: i64,
        outcome: DeploymentOutcome,
    ) -> Result<Deployment, RunnerError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE deployments
            SET status = $2,
                image_ref = COALESCE($3, image_ref),
                error_summary = $4,
                log_path = COALESCE($5, log_path),
                ended_at = $6
            WHERE id = $1 AND status = 'deploying'
            RETURNING {}
            "#,
            DEPLOYMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(outcome.status.as_str())
            .bind(outcome.image_ref.as_deref())
            .bind(outcome.error_summary.as_deref())
            .bind(outcome.log_path.as_ref().map(|p| p.display().to_string()))
            .bind(outcome.ended_at)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let current: Option<String> =
                sqlx::query_scalar("SELECT status FROM deployments WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match current {
                Some(status) => RunnerError::InvalidTransition(format!(
                    "{} -> {}",
                    status, outcome.status
                )),
                None => RunnerError::NotFound(format!("deployment {}", id)),
            });
        };
        let finished = deployment_from_row(&row)?;

        if let Some(status) = app_status_for(finished.status) {
            // a missing app simply matches no row
            sqlx::query("UPDATE apps SET status = $2 WHERE id = $1")
                .bind(finished.app_id)
                .bind(status.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(finished)
    }

    async fn fail_orphaned(
        &self,
        started_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Deployment>, RunnerError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            UPDATE deployments
            SET status = 'failed', error_summary = $2, ended_at = $3
            WHERE status = 'deploying'
              AND (started_at IS NULL OR started_at < $1)
            RETURNING {}
            "#,
            DEPLOYMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(started_before)
            .bind(INTERRUPTED_SUMMARY)
            .bind(now)
            .fetch_all(&mut *tx)
            .await?;
        let orphaned = rows
            .iter()
            .map(deployment_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let app_ids: Vec<i64> = orphaned.iter().map(|d| d.app_id).collect();
        if !app_ids.is_empty() {
            sqlx::query("UPDATE apps SET status = $2 WHERE id = ANY($1)")
                .bind(&app_ids)
                .bind(AppStatus::Failed.as_str())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(orphaned)
    }

    async fn successful_images(&self, app_id: i64) -> Result<Vec<String>, RunnerError> {
        let images: Vec<String> = sqlx::query_scalar(
            "SELECT image_ref FROM deployments \
             WHERE app_id = $1 AND status = 'success' AND image_ref IS NOT NULL \
             ORDER BY ended_at DESC NULLS LAST, id DESC",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }

    async fn deployments_for_app(&self, app_id: i64) -> Result<Vec<Deployment>, RunnerError> {
        let query = format!(
            "SELECT {} FROM deployments WHERE app_id = $1 ORDER BY id",
            DEPLOYMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(app_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(deployment_from_row).collect()
    }

    async fn create_deployment(&self, new: NewDeployment) -> Result<Deployment, RunnerError> {
        let query = format!(
            r#"
            INSERT INTO deployments (app_id, deployment_type, status, image_ref)
            VALUES ($1, $2, 'queued', $3)
            RETURNING {}
            "#,
            DEPLOYMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(new.app_id)
            .bind(new.deployment_type.as_str())
            .bind(new.image_ref.as_deref())
            .fetch_one(&self.pool)
            .await?;
        deployment_from_row(&row)
    }
}
