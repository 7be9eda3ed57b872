//! Runtime directory layout

use std::path::PathBuf;

use crate::deploy::docker::sanitize_name;
use crate::errors::RunnerError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::models::app::App;

/// Where working copies and deployment logs live
#[derive(Debug, Clone)]
pub struct RuntimeLayout {
    /// Base directory for all runtime state
    pub base_dir: PathBuf,
}

impl RuntimeLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root of per-app working copies
    pub fn repos_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("repos"))
    }

    /// Root of per-deployment log files
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Working copy of one App, named after its sanitized name
    pub fn app_workdir(&self, app: &App) -> Dir {
        self.repos_dir().subdir(&sanitize_name(&app.name))
    }

    /// Log artifact of one deployment
    pub fn deployment_log(&self, deployment_id: i64) -> File {
        self.logs_dir()
            .file(&format!("deploy_{}.log", deployment_id))
    }

    /// Create the directories
    pub async fn setup(&self) -> Result<(), RunnerError> {
        self.repos_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for RuntimeLayout {
    fn default() -> Self {
        Self::new("/runtime")
    }
}
