use anyhow::Error;
use thiserror::Error;

/// Application-level error types for s3mig-rs.
///
/// Per-object errors (`Resolve`, `Store`) never leave a worker: they are
/// turned into a failure count and a ledger line. The remaining variants
/// describe conditions that stop the whole run.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Non-error conditions (Cancelled)
/// - 1: Fatal errors (Ledger, Pipeline, and per-object errors that escape)
/// - 2: Configuration errors (InvalidConfig, InvalidUri)
/// - 3: Partial failure (some objects migrated, some failed)
#[derive(Error, Debug, PartialEq)]
pub enum S3migError {
    /// The source could not resolve the object (missing, denied, network).
    #[error("Failed to resolve source object {key}: {message}")]
    Resolve { key: String, message: String },

    /// The destination rejected or failed the write.
    #[error("Failed to store object {key}: {message}")]
    Store { key: String, message: String },

    /// The failure ledger could not be created or written.
    #[error("Failure ledger error: {0}")]
    Ledger(String),

    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid S3 URI format.
    #[error("Invalid S3 URI: {0}")]
    InvalidUri(String),

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Some objects failed to migrate.
    #[error("Partial failure: {migrated} migrated, {failed} failed")]
    PartialFailure { migrated: u64, failed: u64 },

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl S3migError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            S3migError::Cancelled => 0,
            S3migError::InvalidConfig(_) | S3migError::InvalidUri(_) => 2,
            S3migError::PartialFailure { .. } => 3,
            _ => 1,
        }
    }
}

/// Check if an anyhow::Error wraps a cancellation error.
pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3migError>() {
        return *err == S3migError::Cancelled;
    }
    false
}

/// Check if an anyhow::Error wraps a failure ledger error.
pub fn is_ledger_error(e: &Error) -> bool {
    matches!(e.downcast_ref::<S3migError>(), Some(S3migError::Ledger(_)))
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3migError>() {
        return err.exit_code();
    }
    1
}
