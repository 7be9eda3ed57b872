//! Error types for the Keystone runner

use thiserror::Error;

use crate::deploy::command::CommandError;

/// Main error type for the Keystone runner
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("No ports available in range {start}-{end}")]
    PortsExhausted { start: u16, end: u16 },

    #[error("Container tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RunnerError {
    fn from(err: anyhow::Error) -> Self {
        RunnerError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for RunnerError {
    fn from(err: sqlx::Error) -> Self {
        RunnerError::DatabaseError(err.to_string())
    }
}

impl From<CommandError> for RunnerError {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::NotFound { program } => RunnerError::ToolUnavailable(program),
            CommandError::Spawn { program, source } => {
                RunnerError::Internal(format!("failed to spawn {}: {}", program, source))
            }
        }
    }
}
