use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_channel::Receiver;
use tracing::{debug, info, warn};

use crate::types::{DeletionResult, FailedKey, RunSummary};

/// Error code recorded for keys of a result whose counts do not add up.
pub const MALFORMED_RESULT_ERROR_CODE: &str = "MalformedResult";

/// Single consumer of the result channel.
///
/// It is the only writer of the [`RunSummary`]; results may arrive in any
/// order.
pub struct ResultAggregator {
    verbose: bool,
    has_warning: Arc<AtomicBool>,
    summary: RunSummary,
}

impl ResultAggregator {
    pub fn new(verbose: bool, has_warning: Arc<AtomicBool>) -> Self {
        Self {
            verbose,
            has_warning,
            summary: RunSummary::default(),
        }
    }

    /// Consume results until every sender has been dropped, then return the
    /// final summary.
    pub async fn aggregate(mut self, receiver: Receiver<DeletionResult>) -> RunSummary {
        debug!("result aggregator has started.");

        while let Ok(result) = receiver.recv().await {
            self.observe(result);
        }

        self.finish()
    }

    pub fn observe(&mut self, result: DeletionResult) {
        let result = if result.is_well_formed() {
            result
        } else {
            warn!(
                batch_index = result.batch_index,
                batch_size = result.batch_size,
                succeeded = result.succeeded,
                failed = result.failed.len(),
                "malformed deletion result, every key of the batch is counted as failed."
            );
            DeletionResult {
                succeeded: 0,
                failed: normalize_malformed(&result),
                ..result
            }
        };
        let failed_count = result.failed.len();

        self.summary.batches += 1;
        self.summary.total += result.batch_size as u64;
        self.summary.succeeded += result.succeeded as u64;
        self.summary.failed += failed_count as u64;

        info!(
            batch_index = result.batch_index,
            deleted = result.succeeded,
            failed = failed_count,
            "Deleted {} keys",
            result.succeeded
        );

        if let Some(first) = result.first_error() {
            self.has_warning.store(true, Ordering::SeqCst);
            warn!(
                batch_index = result.batch_index,
                key = first.key,
                s3_error_code = first.error_code,
                s3_error_message = first.error_message,
                "{} keys failed to delete",
                failed_count
            );

            if self.verbose {
                for failed_key in &result.failed {
                    warn!(
                        batch_index = result.batch_index,
                        key = failed_key.key,
                        s3_error_code = failed_key.error_code,
                        s3_error_message = failed_key.error_message,
                        "failed to delete key."
                    );
                }
            }
        }

        self.summary.errors.extend(result.failed);
    }

    pub fn finish(self) -> RunSummary {
        info!(
            total = self.summary.total,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            batches = self.summary.batches,
            "Deleted {} of {} keys in {} batches.",
            self.summary.succeeded,
            self.summary.total,
            self.summary.batches
        );

        self.summary
    }
}

/// Account for every key of a malformed result as failed, keeping the
/// reported error when there is one.
fn normalize_malformed(result: &DeletionResult) -> Vec<FailedKey> {
    let template = result.failed.first();
    let mut failed: Vec<FailedKey> = Vec::with_capacity(result.batch_size);

    for i in 0..result.batch_size {
        let reported = result.failed.get(i);
        failed.push(FailedKey {
            key: reported
                .map(|f| f.key.clone())
                .unwrap_or_else(|| format!("<batch {} key {}>", result.batch_index, i)),
            error_code: MALFORMED_RESULT_ERROR_CODE.to_string(),
            error_message: template
                .map(|f| format!("{}: {}", f.error_code, f.error_message))
                .unwrap_or_else(|| "deletion result counts are inconsistent".to_string()),
        });
    }

    failed
}
