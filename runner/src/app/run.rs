//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::RunnerError;
use crate::storage::settings::Settings;
use crate::workers::deployer;

/// Run the Keystone runner until `shutdown_signal` resolves
pub async fn run(
    settings: &Settings,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RunnerError> {
    info!("Initializing Keystone runner...");

    let state = AppState::init(settings).await?;
    run_with_state(state, options, shutdown_signal).await
}

/// Run the workers over prepared state
pub async fn run_with_state(
    state: AppState,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), RunnerError> {
    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init_deployer_worker(
        options.deployer.clone(),
        &state,
        &mut shutdown_manager,
        shutdown_tx.subscribe(),
    ) {
        error!("Failed to start runner: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

fn init_deployer_worker(
    options: deployer::Options,
    state: &AppState,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), RunnerError> {
    info!("Initializing deployer worker...");

    let pipeline = Arc::clone(&state.pipeline);

    let deployer_handle = tokio::spawn(async move {
        deployer::run(
            &options,
            pipeline.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_deployer_worker_handle(deployer_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    deployer_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            deployer_worker_handle: None,
        }
    }

    pub fn with_deployer_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), RunnerError> {
        if self.deployer_worker_handle.is_some() {
            return Err(RunnerError::ShutdownError("deployer_handle already set".to_string()));
        }
        self.deployer_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), RunnerError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), RunnerError> {
        info!("Shutting down Keystone runner...");

        // the worker finishes its current deployment before observing shutdown
        if let Some(handle) = self.deployer_worker_handle.take() {
            handle
                .await
                .map_err(|e| RunnerError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
