//! Post-start health probing

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::RunnerError;

/// Probe timing
#[derive(Debug, Clone)]
pub struct HealthSettings {
    /// Overall wall-clock bound, measured from the first attempt
    pub deadline: Duration,

    /// Pause between attempts
    pub interval: Duration,

    /// Timeout of a single HTTP request
    pub attempt_timeout: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            interval: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

/// Why a probe did not pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTimeout {
    pub url: String,
    pub deadline: Duration,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl std::fmt::Display for ProbeTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "health check {} did not return 2xx within {}s ({} attempts)",
            self.url,
            self.deadline.as_secs_f64(),
            self.attempts
        )?;
        if let Some(err) = &self.last_error {
            write!(f, "; last error: {}", err)?;
        }
        Ok(())
    }
}

/// Result of a probe run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// No path configured, nothing was checked
    Skipped,
    Healthy { url: String, attempts: u32 },
    TimedOut(ProbeTimeout),
}

/// Normalise a configured path; `None` when probing is not requested
pub fn normalize_path(path: Option<&str>) -> Option<String> {
    let path = path?.trim();
    if path.is_empty() {
        return None;
    }
    if path.starts_with('/') {
        Some(path.to_string())
    } else {
        Some(format!("/{}", path))
    }
}

/// Loopback URL probed for `port` and an already normalised `path`
pub fn probe_url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", port, path)
}

/// Polls a freshly started container until it answers 2xx
#[derive(Debug, Clone)]
pub struct HealthProber {
    client: reqwest::Client,
    settings: HealthSettings,
}

impl HealthProber {
    pub fn new(settings: HealthSettings) -> Result<Self, RunnerError> {
        let client = reqwest::Client::builder()
            .timeout(settings.attempt_timeout)
            .no_proxy()
            .build()?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Probe `path` on `port`, blocking the caller until success or deadline.
    ///
    /// Connection errors and non-2xx answers are retried inside one fixed
    /// window; errors never extend it.
    pub async fn probe(&self, port: u16, path: Option<&str>) -> ProbeResult {
        let Some(path) = normalize_path(path) else {
            debug!("No health check path configured, skipping probe");
            return ProbeResult::Skipped;
        };
        let url = probe_url(port, &path);
        info!(url = %url, "Probing health endpoint");

        let started = Instant::now();
        let deadline = started + self.settings.deadline;
        let mut attempts = 0u32;
        let mut last_error = None;

        loop {
            attempts += 1;
            // no attempt may outlive the overall deadline
            let budget = self
                .settings
                .attempt_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            match self.client.get(&url).timeout(budget).send().await {
                Ok(response) if response.status().is_success() => {
                    info!(url = %url, attempts, elapsed = ?started.elapsed(), "Health check passed");
                    return ProbeResult::Healthy { url, attempts };
                }
                Ok(response) => {
                    debug!(url = %url, status = %response.status(), "Health check not ready");
                    last_error = Some(format!("HTTP {}", response.status()));
                }
                Err(e) => {
                    debug!(url = %url, "Health check attempt failed: {}", e);
                    last_error = Some(e.to_string());
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.settings.interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        let timeout = ProbeTimeout {
            url,
            deadline: self.settings.deadline,
            attempts,
            last_error,
        };
        warn!("{}", timeout);
        ProbeResult::TimedOut(timeout)
    }
}
