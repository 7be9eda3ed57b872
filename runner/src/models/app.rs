//! App model

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an App
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Draft,
    Preparing,
    Prepared,
    Deploying,
    Running,
    Stopped,
    Failed,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::Draft => "draft",
            AppStatus::Preparing => "preparing",
            AppStatus::Prepared => "prepared",
            AppStatus::Deploying => "deploying",
            AppStatus::Running => "running",
            AppStatus::Stopped => "stopped",
            AppStatus::Failed => "failed",
        }
    }

    /// Whether a new deployment may be requested for an App in this status
    pub fn accepts_deploy(&self) -> bool {
        matches!(
            self,
            AppStatus::Prepared | AppStatus::Running | AppStatus::Stopped | AppStatus::Failed
        )
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AppStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(AppStatus::Draft),
            "preparing" => Ok(AppStatus::Preparing),
            "prepared" => Ok(AppStatus::Prepared),
            "deploying" => Ok(AppStatus::Deploying),
            "running" => Ok(AppStatus::Running),
            "stopped" => Ok(AppStatus::Stopped),
            "failed" => Ok(AppStatus::Failed),
            _ => Err(format!("Invalid app status: {}", s)),
        }
    }
}

/// A deployable application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct App {
    /// Unique app ID
    pub id: i64,

    /// Owning repository
    pub repo_id: i64,

    /// Display name, also the source of container and image names
    pub name: String,

    /// Port the container listens on
    pub container_port: u16,

    /// HTTP path probed after start; `None` or empty skips the probe
    pub health_check_path: Option<String>,

    /// Environment injected into the container
    pub env_vars: BTreeMap<String, String>,

    /// Leased host port, sticky across redeploys
    pub current_port: Option<u16>,

    /// Lifecycle status, shadowing the latest deployment
    pub status: AppStatus,
}

impl App {
    pub fn new(id: i64, repo_id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            repo_id,
            name: name.into(),
            container_port: 8000,
            health_check_path: None,
            env_vars: BTreeMap::new(),
            current_port: None,
            status: AppStatus::Prepared,
        }
    }
}
