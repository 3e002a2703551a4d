//! Batch deletion using the S3 DeleteObjects API.

use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::storage::{BatchDeleteOutput, Storage};
use crate::types::error::S3PurgeError;
use crate::types::{Batch, DeletionResult, FailedKey};

use super::Deleter;

/// Maximum objects per batch DeleteObjects API call (S3 limit).
pub const MAX_BATCH_SIZE: usize = 1000;

/// Error code of keys whose whole DeleteObjects request failed.
pub const BATCH_REQUEST_FAILED_ERROR_CODE: &str = "BatchRequestFailed";
/// Error code of keys the service reported neither as deleted nor as failed.
pub const NOT_REPORTED_ERROR_CODE: &str = "NotReported";

/// Deletes one batch with a single DeleteObjects call.
///
/// A failed request marks every key of the batch failed. Keys the service
/// refuses individually are kept as per-key failures.
pub struct BatchDeleter {
    target: Storage,
}

impl BatchDeleter {
    pub fn new(target: Storage) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Deleter for BatchDeleter {
    async fn delete(&self, batch: &Batch) -> DeletionResult {
        debug!(
            batch_index = batch.index,
            batch_size = batch.len(),
            "sending DeleteObjects batch request."
        );

        match self.target.delete_objects(&batch.keys).await {
            Ok(output) => reconcile(batch, output),
            Err(e) => {
                let message = S3PurgeError::BatchDeletion(format!("{e:#}")).to_string();
                warn!(
                    batch_index = batch.index,
                    batch_size = batch.len(),
                    error = message,
                    "DeleteObjects request failed, every key of the batch is marked failed."
                );
                DeletionResult::all_failed(batch, BATCH_REQUEST_FAILED_ERROR_CODE, &message)
            }
        }
    }
}

/// Turn the service response into a well-formed result for `batch`.
///
/// Errors for keys outside the batch and repeated errors are ignored. A key
/// missing from both lists counts as failed.
fn reconcile(batch: &Batch, output: BatchDeleteOutput) -> DeletionResult {
    let batch_keys: HashSet<&str> = batch.keys.iter().map(String::as_str).collect();
    let deleted: HashSet<&str> = output.deleted.iter().map(String::as_str).collect();

    let mut failed_keys: HashSet<String> = HashSet::new();
    let mut failed: Vec<FailedKey> = Vec::new();
    for error in output.errors.iter() {
        if !batch_keys.contains(error.key.as_str()) || !failed_keys.insert(error.key.clone()) {
            continue;
        }

        let partial = S3PurgeError::PartialKey {
            key: error.key.clone(),
            code: error.error_code.clone(),
            message: error.error_message.clone(),
        };
        debug!(batch_index = batch.index, "{partial}");
        failed.push(error.clone());
    }

    let mut succeeded = 0;
    for key in &batch.keys {
        if failed_keys.contains(key) {
            continue;
        }
        if deleted.contains(key.as_str()) {
            succeeded += 1;
        } else {
            failed_keys.insert(key.clone());
            failed.push(FailedKey {
                key: key.clone(),
                error_code: NOT_REPORTED_ERROR_CODE.to_string(),
                error_message: "key missing from the DeleteObjects response".to_string(),
            });
        }
    }

    DeletionResult {
        batch_index: batch.index,
        batch_size: batch.len(),
        succeeded,
        failed,
    }
}
