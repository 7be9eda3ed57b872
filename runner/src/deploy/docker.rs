//! Image build and container lifecycle

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::deploy::command::{CommandOutput, CommandRunner, CommandSpec};
use crate::errors::RunnerError;
use crate::models::app::App;

/// Lowercased app name safe for paths and container names.
///
/// Anything outside ASCII letters, digits, `-`, `_` and `.` becomes `_`, so
/// the result is always a single path component.
pub fn sanitize_name(name: &str) -> String {
    let safe: String = name
        .trim()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect();
    if safe.chars().all(|c| c == '.') {
        "_".repeat(safe.len().max(1))
    } else {
        safe
    }
}

/// Deterministic container name, stable across redeploys of one App
pub fn container_name(app: &App) -> String {
    format!("app_{}", sanitize_name(&app.name))
}

/// Image reference for the build made by one deployment
pub fn image_tag(namespace: &str, app: &App, deployment_id: i64) -> String {
    format!("{}/{}:{}", namespace, sanitize_name(&app.name), deployment_id)
}

/// Timeouts applied to container tool calls
#[derive(Debug, Clone)]
pub struct RuntimeTimeouts {
    pub build: Duration,
    pub command: Duration,
}

impl Default for RuntimeTimeouts {
    fn default() -> Self {
        Self {
            build: Duration::from_secs(600),
            command: Duration::from_secs(300),
        }
    }
}

/// Drives the container CLI (docker or a compatible tool)
#[derive(Debug, Clone)]
pub struct ContainerRuntime {
    tool: Option<PathBuf>,
    namespace: String,
    timeouts: RuntimeTimeouts,
}

impl ContainerRuntime {
    /// `tool` is the discovered CLI path; `None` means the runtime is unavailable
    pub fn new(tool: Option<PathBuf>, namespace: impl Into<String>, timeouts: RuntimeTimeouts) -> Self {
        Self {
            tool,
            namespace: namespace.into(),
            timeouts,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Resolved tool path, or `ToolUnavailable`
    pub fn tool(&self) -> Result<&Path, RunnerError> {
        self.tool.as_deref().ok_or_else(|| {
            RunnerError::ToolUnavailable(
                "no container tool (docker/podman) found on this host".to_string(),
            )
        })
    }

    /// `build -t <tag> .` inside the working directory
    pub async fn build_image(
        &self,
        runner: &dyn CommandRunner,
        workdir: &Path,
        tag: &str,
    ) -> Result<CommandOutput, RunnerError> {
        info!(image = %tag, "Building image");
        let spec = CommandSpec::new(self.tool()?)
            .args(["build", "-t", tag, "."])
            .current_dir(workdir)
            .timeout(self.timeouts.build);
        Ok(runner.run(&spec).await?)
    }

    /// Force-remove the App's container; a missing container is not an error
    pub async fn remove_container(
        &self,
        runner: &dyn CommandRunner,
        app: &App,
    ) -> Result<CommandOutput, RunnerError> {
        let name = container_name(app);
        debug!(container = %name, "Removing existing container");
        let spec = CommandSpec::new(self.tool()?)
            .args(["rm", "-f", name.as_str()])
            .timeout(self.timeouts.command);
        Ok(runner.run(&spec).await?)
    }

    /// Start the App's container from `image` with its port and environment
    pub async fn run_container(
        &self,
        runner: &dyn CommandRunner,
        app: &App,
        image: &str,
        host_port: u16,
    ) -> Result<CommandOutput, RunnerError> {
        let name = container_name(app);
        info!(container = %name, image = %image, port = host_port, "Starting container");
        let spec = CommandSpec::new(self.tool()?)
            .args(run_args(app, image, host_port))
            .timeout(self.timeouts.command);
        Ok(runner.run(&spec).await?)
    }

    /// Remove whatever runs under the App's name, then start `image`
    pub async fn replace_container(
        &self,
        runner: &dyn CommandRunner,
        app: &App,
        image: &str,
        host_port: u16,
    ) -> Result<(CommandOutput, CommandOutput), RunnerError> {
        let removed = self.remove_container(runner, app).await?;
        let started = self.run_container(runner, app, image, host_port).await?;
        Ok((removed, started))
    }

    /// Stop the App's container without removing it
    pub async fn stop_container(
        &self,
        runner: &dyn CommandRunner,
        app: &App,
    ) -> Result<CommandOutput, RunnerError> {
        let name = container_name(app);
        info!(container = %name, "Stopping container");
        let spec = CommandSpec::new(self.tool()?)
            .args(["stop", name.as_str()])
            .timeout(self.timeouts.command);
        Ok(runner.run(&spec).await?)
    }

    /// Last `tail` lines of the App's container output
    pub async fn container_logs(
        &self,
        runner: &dyn CommandRunner,
        app: &App,
        tail: usize,
    ) -> Result<String, RunnerError> {
        let name = container_name(app);
        let spec = CommandSpec::new(self.tool()?)
            .args(["logs", "--tail"])
            .arg(tail.to_string())
            .arg(name)
            .timeout(self.timeouts.command);
        let output = runner.run(&spec).await?;
        // containers commonly log to stderr
        if output.stdout.trim().is_empty() {
            Ok(output.stderr)
        } else {
            Ok(output.stdout)
        }
    }
}

fn run_args(app: &App, image: &str, host_port: u16) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        container_name(app),
        "-p".to_string(),
        format!("{}:{}", host_port, app.container_port),
        "--restart".to_string(),
        "unless-stopped".to_string(),
    ];
    for (key, value) in &app.env_vars {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push(image.to_string());
    args
}
