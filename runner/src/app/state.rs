//! Runner state built from settings

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::deploy::command::{CommandRunner, SystemCommandRunner};
use crate::deploy::discovery::ToolDiscovery;
use crate::deploy::docker::ContainerRuntime;
use crate::deploy::git::SourceFetcher;
use crate::deploy::health::HealthProber;
use crate::deploy::pipeline::DeploymentPipeline;
use crate::errors::RunnerError;
use crate::storage::layout::RuntimeLayout;
use crate::storage::settings::Settings;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PostgresStore;
use crate::store::DeploymentStore;

/// Open the store the settings point at
pub async fn open_store(settings: &Settings) -> Result<Arc<dyn DeploymentStore>, RunnerError> {
    match &settings.database_url {
        Some(url) => {
            info!("Connecting to PostgreSQL store...");
            Ok(Arc::new(PostgresStore::connect(url).await?))
        }
        None => {
            warn!("No database_url configured, using an in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Container runtime over the discovered tool.
///
/// Discovery runs once per process; installing a tool needs a restart.
pub fn container_runtime(settings: &Settings) -> ContainerRuntime {
    let tool = ToolDiscovery::from_env(settings.container_tool.clone()).resolve();
    match &tool {
        Some(path) => info!(tool = %path.display(), "Container tool found"),
        None => warn!("No container tool found, deployments will fail until restart"),
    }
    ContainerRuntime::new(tool, settings.image_namespace.clone(), settings.runtime_timeouts())
}

/// Shared state of a running runner
pub struct AppState {
    pub store: Arc<dyn DeploymentStore>,
    pub pipeline: Arc<DeploymentPipeline>,
    pub layout: RuntimeLayout,
}

impl AppState {
    pub async fn init(settings: &Settings) -> Result<Self, RunnerError> {
        let store = open_store(settings).await?;
        Self::with_store(settings, store, Arc::new(SystemCommandRunner)).await
    }

    /// Build the pipeline around an already opened store and command runner
    pub async fn with_store(
        settings: &Settings,
        store: Arc<dyn DeploymentStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, RunnerError> {
        let layout = RuntimeLayout::new(&settings.runtime_dir);
        layout.setup().await?;

        let now = Utc::now();
        for orphan in store.fail_orphaned(now, now).await? {
            warn!(
                deployment_id = orphan.id,
                app_id = orphan.app_id,
                "Failed deployment left in deploying by a previous run"
            );
        }

        let pipeline = DeploymentPipeline::new(
            store.clone(),
            runner,
            container_runtime(settings),
            SourceFetcher::new(settings.command_timeout()),
            HealthProber::new(settings.health())?,
            layout.clone(),
            settings.port_range()?,
        );

        Ok(Self {
            store,
            pipeline: Arc::new(pipeline),
            layout,
        })
    }
}
