//! CLI error type.

use fds_core::StoreError;
use fds_flash::FlashError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The image could not be read or written.
    #[error("flash image: {0}")]
    Flash(#[from] FlashError),

    /// The store rejected a call or a command failed.
    #[error("store: {0}")]
    Store(#[from] StoreError),

    /// Output could not be serialized.
    #[error("json output: {0}")]
    Json(#[from] serde_json::Error),

    /// No image exists at the given path.
    #[error("no flash image at {}", .0.display())]
    MissingImage(PathBuf),

    /// The image exists and `--force` was not given.
    #[error("{} already exists (use --force to replace it)", .0.display())]
    ImageExists(PathBuf),

    /// A command line value could not be used.
    #[error("invalid input: {0}")]
    Input(String),

    /// Verification found problems.
    #[error("verification found {0} problem(s)")]
    VerifyFailed(usize),
}
