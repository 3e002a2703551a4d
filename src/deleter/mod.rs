//! Deletion components for the s3purge pipeline.
//!
//! [`ObjectDeleter`] is the body of one worker task spawned by the
//! [`ConcurrentDispatcher`](crate::dispatcher::ConcurrentDispatcher). It runs a
//! [`Deleter`] over exactly one batch and forwards the outcome to the
//! aggregator.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::stage::{SendResult, Stage};
use crate::types::error::S3PurgeError;
use crate::types::{Batch, DeletionResult};

pub mod batch;

pub use batch::{BatchDeleter, MAX_BATCH_SIZE};

/// Error code of keys whose batch was never sent because the run was cancelled.
pub const CANCELLED_ERROR_CODE: &str = "Cancelled";
/// Error code of keys whose worker task panicked.
pub const WORKER_PANIC_ERROR_CODE: &str = "WorkerPanic";

/// A deletion backend.
///
/// Implementations never fail: every problem is reported inside the
/// returned [`DeletionResult`], which always accounts for every key of the batch.
#[async_trait]
pub trait Deleter: Send + Sync {
    async fn delete(&self, batch: &Batch) -> DeletionResult;
}

pub struct ObjectDeleter {
    base: Stage<DeletionResult>,
    deleter: Box<dyn Deleter>,
}

impl ObjectDeleter {
    pub fn new(base: Stage<DeletionResult>) -> Self {
        let deleter = Box::new(BatchDeleter::new(base.target.clone()));
        Self::with_deleter(base, deleter)
    }

    pub fn with_deleter(base: Stage<DeletionResult>, deleter: Box<dyn Deleter>) -> Self {
        Self { base, deleter }
    }

    /// Delete one batch and send its result downstream.
    ///
    /// If the run was cancelled before the request is issued, the whole batch
    /// is reported as failed with [`CANCELLED_ERROR_CODE`] so it is still
    /// accounted for.
    pub async fn execute(&self, batch: &Batch) -> Result<()> {
        debug!(
            batch_index = batch.index,
            batch_size = batch.len(),
            first_key = batch.first_key(),
            "delete worker started."
        );

        let result = if self.base.cancellation_token.is_cancelled() {
            info!(
                batch_index = batch.index,
                "delete worker has been cancelled before sending the request."
            );
            DeletionResult::all_failed(
                batch,
                CANCELLED_ERROR_CODE,
                &S3PurgeError::Cancelled.to_string(),
            )
        } else {
            self.deleter.delete(batch).await
        };

        debug!(
            batch_index = result.batch_index,
            deleted = result.succeeded,
            failed = result.failed.len(),
            "delete worker has been completed."
        );

        if self.base.send(result).await? == SendResult::Closed {
            warn!(
                batch_index = batch.index,
                "result channel closed, deletion result dropped."
            );
        }

        Ok(())
    }
}
