//! CLI error types.

use thiserror::Error;
use wsconnect_core::TracingError;
use wsconnect_google::SyncError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("failed to initialize logging: {0}")]
    Tracing(#[from] TracingError),

    #[error("failed to write output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
