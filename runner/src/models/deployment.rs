//! Deployment models

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a deployment was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    Initial,
    Update,
    Rollback,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Initial => "initial",
            DeploymentType::Update => "update",
            DeploymentType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(DeploymentType::Initial),
            "update" => Ok(DeploymentType::Update),
            "rollback" => Ok(DeploymentType::Rollback),
            _ => Err(format!("Invalid deployment type: {}", s)),
        }
    }
}

/// Status of a single deployment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Queued,
    Deploying,
    Success,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "queued",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are never revisited
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Success | DeploymentStatus::Failed)
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DeploymentStatus::Queued),
            "deploying" => Ok(DeploymentStatus::Deploying),
            "success" => Ok(DeploymentStatus::Success),
            "failed" => Ok(DeploymentStatus::Failed),
            _ => Err(format!("Invalid deployment status: {}", s)),
        }
    }
}

/// A deployment record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique, monotonically assigned ID
    pub id: i64,

    /// App this deployment targets
    pub app_id: i64,

    pub deployment_type: DeploymentType,

    pub status: DeploymentStatus,

    /// Image reference; set on success, or up front for rollbacks
    pub image_ref: Option<String>,

    /// Host port copied from the App when the pipeline starts
    pub assigned_port: Option<u16>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    /// Truncated, human-readable failure reason
    pub error_summary: Option<String>,

    /// Captured process output for this attempt
    pub log_path: Option<PathBuf>,
}

/// Fields supplied by the request layer when queueing a deployment
#[derive(Debug, Clone)]
pub struct NewDeployment {
    pub app_id: i64,
    pub deployment_type: DeploymentType,
    pub image_ref: Option<String>,
}

/// Terminal write produced by the pipeline
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    pub status: DeploymentStatus,
    pub image_ref: Option<String>,
    pub error_summary: Option<String>,
    pub log_path: Option<PathBuf>,
    pub ended_at: DateTime<Utc>,
}

impl DeploymentOutcome {
    pub fn success(image_ref: String, log_path: Option<PathBuf>) -> Self {
        Self {
            status: DeploymentStatus::Success,
            image_ref: Some(image_ref),
            error_summary: None,
            log_path,
            ended_at: Utc::now(),
        }
    }

    pub fn failed(error_summary: String, log_path: Option<PathBuf>) -> Self {
        Self {
            status: DeploymentStatus::Failed,
            image_ref: None,
            error_summary: Some(error_summary),
            log_path,
            ended_at: Utc::now(),
        }
    }
}
