//! Application configuration options

use std::time::Duration;

use crate::storage::settings::Settings;
use crate::workers::deployer;

/// Main application options
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Deployer worker options
    pub deployer: deployer::Options,
}

impl AppOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            lifecycle: LifecycleOptions {
                max_shutdown_delay: settings.max_pipeline_duration() + SHUTDOWN_MARGIN,
            },
            deployer: deployer::Options {
                interval: settings.poll_interval(),
                iteration_pause: settings.iteration_pause(),
            },
        }
    }
}

/// Slack on top of the pipeline bound for store writes and log flushes
const SHUTDOWN_MARGIN: Duration = Duration::from_secs(30);

/// Lifecycle options for the runner
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown.
    ///
    /// Must cover an in-flight deployment, whose stages are only interrupted
    /// by their own timeouts.
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(900),
        }
    }
}
