//! Source fetching (clone or fast-forward pull)

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, info};
use url::Url;

use crate::deploy::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::errors::RunnerError;
use crate::models::repository::Repository;
use crate::utils::redact;

/// What the fetcher did to the working directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchAction {
    Clone,
    Pull,
}

impl FetchAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchAction::Clone => "clone",
            FetchAction::Pull => "pull",
        }
    }
}

/// Result of one fetch, with credentials already scrubbed from the output
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub action: FetchAction,
    pub output: CommandOutput,
}

/// Build the URL handed to git for one call.
///
/// With a token the URL carries it as (percent-encoded) user info. The value
/// only ever lives in the argument list of a single git invocation.
pub fn authenticated_url(repo: &Repository) -> Result<String, RunnerError> {
    let Some(token) = &repo.access_token else {
        return Ok(repo.git_url.clone());
    };

    let mut url = Url::parse(&repo.git_url).map_err(|e| {
        RunnerError::ValidationError(format!("repository URL is not a valid URL: {}", e))
    })?;
    url.set_username(token.expose_secret()).map_err(|_| {
        RunnerError::ValidationError(format!(
            "repository URL scheme {} cannot carry credentials",
            url.scheme()
        ))
    })?;
    Ok(url.to_string())
}

/// Clones or updates per-app working directories
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    git: PathBuf,
    timeout: Duration,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            git: PathBuf::from("git"),
            timeout,
        }
    }

    /// Shallow-clone `repo` into `workdir`, or fast-forward it when it exists.
    ///
    /// A non-zero exit is returned in the report, not as an error.
    pub async fn sync_repository(
        &self,
        runner: &dyn CommandRunner,
        repo: &Repository,
        workdir: &Path,
    ) -> Result<FetchReport, RunnerError> {
        let fetch_url = authenticated_url(repo)?;
        let secrets = secrets_for(repo, &fetch_url);
        let secret_refs: Vec<&str> = secrets.iter().map(String::as_str).collect();

        info!(
            repo = %repo.name,
            branch = %repo.default_branch,
            workdir = %workdir.display(),
            "Syncing git repository"
        );

        let report = if tokio::fs::metadata(workdir).await.is_ok() {
            debug!("Working directory exists, pulling updates...");
            let remote = if repo.access_token.is_some() {
                fetch_url.as_str()
            } else {
                "origin"
            };
            let spec = CommandSpec::new(&self.git)
                .args(["pull", "--ff-only", remote, repo.default_branch.as_str()])
                .current_dir(workdir)
                .timeout(self.timeout);
            FetchReport {
                action: FetchAction::Pull,
                output: self.run(runner, &spec).await?,
            }
        } else {
            debug!("Cloning repository...");
            if let Some(parent) = workdir.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let spec = CommandSpec::new(&self.git)
                .args(["clone", "--depth", "1", "-b", repo.default_branch.as_str()])
                .arg(fetch_url.as_str())
                .arg(workdir.to_string_lossy())
                .timeout(self.timeout);
            let mut output = self.run(runner, &spec).await?;

            // clone records the URL it was given; put the plain one back
            if output.success() && repo.access_token.is_some() {
                let reset = CommandSpec::new(&self.git)
                    .args(["remote", "set-url", "origin", repo.git_url.as_str()])
                    .current_dir(workdir)
                    .timeout(self.timeout);
                let reset_output = self.run(runner, &reset).await?;
                output.stdout.push_str(&reset_output.stdout);
                output.stderr.push_str(&reset_output.stderr);
                output.code = reset_output.code;
            }
            FetchReport {
                action: FetchAction::Clone,
                output,
            }
        };

        let output = CommandOutput {
            code: report.output.code,
            stdout: redact(&report.output.stdout, &secret_refs),
            stderr: redact(&report.output.stderr, &secret_refs),
        };
        Ok(FetchReport {
            action: report.action,
            output,
        })
    }

    async fn run(
        &self,
        runner: &dyn CommandRunner,
        spec: &CommandSpec,
    ) -> Result<CommandOutput, RunnerError> {
        match runner.run(spec).await {
            Ok(output) => Ok(output),
            // a missing git is a fetch failure, not a runner fault
            Err(CommandError::NotFound { program }) => Ok(CommandOutput {
                code: 127,
                stdout: String::new(),
                stderr: format!("{} not found on the execution path", program),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

fn secrets_for(repo: &Repository, fetch_url: &str) -> Vec<String> {
    let Some(token) = &repo.access_token else {
        return Vec::new();
    };
    let mut secrets = vec![token.expose_secret().to_string()];
    if let Ok(url) = Url::parse(fetch_url) {
        if !url.username().is_empty() {
            secrets.push(url.username().to_string());
        }
    }
    secrets
}
