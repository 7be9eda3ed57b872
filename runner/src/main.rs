//! Keystone Runner - Entry Point
//!
//! Background deployment runner for the Keystone panel. Drains the queue of
//! deployment records one at a time and turns each into a running container.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use keystone_runner::app::options::AppOptions;
use keystone_runner::app::run::run;
use keystone_runner::app::state::{container_runtime, open_store};
use keystone_runner::deploy::command::SystemCommandRunner;
use keystone_runner::deploy::control::{app_logs, stop_app, DEFAULT_LOG_TAIL};
use keystone_runner::deploy::requests::{request_deploy, request_rollback};
use keystone_runner::filesys::file::File;
use keystone_runner::logs::{init_logging, LogOptions};
use keystone_runner::storage::layout::RuntimeLayout;
use keystone_runner::storage::settings::{Settings, DEFAULT_SETTINGS_PATH};
use keystone_runner::utils::{run_diagnostic, version_info};

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    // Retrieve the settings file
    let settings_path = cli_args
        .get("config")
        .cloned()
        .unwrap_or_else(|| DEFAULT_SETTINGS_PATH.to_string());
    let settings = match Settings::load(&File::new(&settings_path)).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to load settings from {}: {}", settings_path, e);
            return ExitCode::FAILURE;
        }
    };

    // Run diagnostics
    if cli_args.contains_key("diagnostic") || cli_args.contains_key("diag") {
        run_diagnostic(&settings);
        return ExitCode::SUCCESS;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: settings
            .log_to_file
            .then(|| RuntimeLayout::new(&settings.runtime_dir).logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    // Queue requests against the configured store and exit
    if let Some(app_id) = cli_args.get("enqueue") {
        return enqueue(&settings, app_id, false).await;
    }
    if let Some(app_id) = cli_args.get("rollback") {
        return enqueue(&settings, app_id, true).await;
    }

    // Act on a deployed App and exit
    if let Some(app_id) = cli_args.get("stop") {
        return control(&settings, app_id, None).await;
    }
    if let Some(app_id) = cli_args.get("logs") {
        let tail = match cli_args.get("tail").map(|t| t.parse::<usize>()) {
            None => DEFAULT_LOG_TAIL,
            Some(Ok(tail)) => tail,
            Some(Err(_)) => {
                error!("Invalid --tail value");
                return ExitCode::FAILURE;
            }
        };
        return control(&settings, app_id, Some(tail)).await;
    }

    // Run the worker starting here
    let options = AppOptions::from_settings(&settings);
    info!(
        version = %version.version,
        ports = %format!("{}-{}", settings.port_range_start, settings.port_range_end),
        runtime_dir = %settings.runtime_dir.display(),
        "Running Keystone runner with options: {:?}",
        options
    );
    match run(&settings, options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the runner: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn enqueue(settings: &Settings, app_id: &str, rollback: bool) -> ExitCode {
    let app_id: i64 = match app_id.parse() {
        Ok(id) => id,
        Err(_) => {
            error!("Invalid app id: {}", app_id);
            return ExitCode::FAILURE;
        }
    };
    let store = match open_store(settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("Unable to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = if rollback {
        request_rollback(store.as_ref(), app_id).await
    } else {
        request_deploy(store.as_ref(), app_id).await
    };
    match result {
        Ok(deployment) => {
            println!(
                "Queued {} deployment {} for app {}",
                deployment.deployment_type, deployment.id, deployment.app_id
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Request rejected: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Stop the App's container, or print its logs when `logs_tail` is set
async fn control(settings: &Settings, app_id: &str, logs_tail: Option<usize>) -> ExitCode {
    let app_id: i64 = match app_id.parse() {
        Ok(id) => id,
        Err(_) => {
            error!("Invalid app id: {}", app_id);
            return ExitCode::FAILURE;
        }
    };
    let store = match open_store(settings).await {
        Ok(store) => store,
        Err(e) => {
            error!("Unable to open store: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let runtime = container_runtime(settings);

    let result = match logs_tail {
        Some(tail) => app_logs(store.as_ref(), &runtime, &SystemCommandRunner, app_id, tail)
            .await
            .map(|logs| print!("{}", logs)),
        None => stop_app(store.as_ref(), &runtime, &SystemCommandRunner, app_id)
            .await
            .map(|app| println!("Stopped app {} ({})", app.id, app.name)),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Request rejected: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                _ => {
                    error!("Unable to install signal handlers, falling back to Ctrl+C");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
