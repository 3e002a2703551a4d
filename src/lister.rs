use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::stage::{SendResult, Stage};
use crate::types::error::S3PurgeError;

/// Streams every key under the target prefix into the key channel.
///
/// ```text
/// KeyLister → Batcher → ConcurrentDispatcher → DeletionWorker → ResultAggregator
/// ```
///
/// The channel is bounded, so the lister is suspended whenever the batcher
/// lags behind. The next page is requested only after every key of the
/// previous page has been accepted.
pub struct KeyLister {
    stage: Stage<String>,
    listing_aborted: CancellationToken,
}

impl KeyLister {
    pub fn new(stage: Stage<String>, listing_aborted: CancellationToken) -> Self {
        Self {
            stage,
            listing_aborted,
        }
    }

    /// List the target prefix page by page.
    ///
    /// On failure `listing_aborted` is cancelled before this returns, i.e.
    /// while the key channel is still open, so the consumer never mistakes a
    /// failed listing for an exhausted one.
    pub async fn list_target(&self, max_keys: i32) -> Result<()> {
        debug!("list target objects has started.");

        let mut continuation_token: Option<String> = None;
        let mut listed_keys: u64 = 0;

        loop {
            if self.stage.cancellation_token.is_cancelled() {
                info!("listing cancelled.");
                break;
            }

            let page = match self
                .stage
                .target
                .list_objects_page(continuation_token.take(), max_keys)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    let message = format!("{e:#}");
                    error!(
                        listed_keys = listed_keys,
                        error = message,
                        "listing failed, no more batches will be submitted."
                    );
                    self.listing_aborted.cancel();
                    return Err(e).context(S3PurgeError::Listing(message));
                }
            };

            for key in page.keys {
                if self.stage.send(key).await? == SendResult::Closed {
                    debug!("key channel closed, listing stopped.");
                    return Ok(());
                }
                listed_keys += 1;
            }

            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        debug!(listed_keys = listed_keys, "list target objects has been completed.");
        Ok(())
    }
}
