use anyhow::Error;
use thiserror::Error;

/// Errors raised by the deletion pipeline.
///
/// Only [`S3PurgeError::Listing`] is fatal to a run. Batch and per-key
/// failures are absorbed into the [`DeletionResult`](crate::types::DeletionResult)
/// of the batch they belong to.
///
/// ## Exit Codes
///
/// - 0: Cancelled
/// - 1: Listing and any other error
/// - 2: InvalidConfig
#[derive(Error, Debug, PartialEq)]
pub enum S3PurgeError {
    /// Listing the prefix failed. No further batches are submitted.
    #[error("Listing failed: {0}")]
    Listing(String),

    /// A whole DeleteObjects request failed.
    #[error("Batch deletion failed: {0}")]
    BatchDeletion(String),

    /// The service rejected a single key inside an otherwise successful request.
    #[error("Failed to delete key {key}: {code} {message}")]
    PartialKey {
        key: String,
        code: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Operation cancelled by user")]
    Cancelled,
}

impl S3PurgeError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3PurgeError::Cancelled => 0,
            S3PurgeError::InvalidConfig(_) => 2,
            _ => 1,
        }
    }
}

pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3PurgeError>() {
        return *err == S3PurgeError::Cancelled;
    }
    false
}

pub fn is_listing_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<S3PurgeError>(),
        Some(S3PurgeError::Listing(_))
    )
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3PurgeError>() {
        return err.exit_code();
    }
    1
}
