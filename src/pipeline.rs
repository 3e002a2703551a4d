//! Deletion pipeline supervisor.
//!
//! Wires the stages together and owns the run:
//!
//! ```text
//! KeyLister -(bounded)-> Batcher -> ConcurrentDispatcher -> ObjectDeleter x C -(unbounded)-> ResultAggregator
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_channel::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::aggregator::ResultAggregator;
use crate::batcher::Batcher;
use crate::config::Config;
use crate::dispatcher::{ConcurrentDispatcher, ErrorRecorder};
use crate::lister::KeyLister;
use crate::stage::Stage;
use crate::storage::{self, Storage};
use crate::types::error::S3PurgeError;
use crate::types::token::PipelineCancellationToken;
use crate::types::{RunState, RunStateTracker, RunSummary};

/// Deletes every object under one S3 prefix.
///
/// Partial deletion failures never stop the run; they are reported in the
/// [`RunSummary`] and through [`has_warning`](Self::has_warning). A listing
/// failure stops further submissions, lets in-flight batches finish and is
/// returned by [`get_errors_and_consume`](Self::get_errors_and_consume).
///
/// # Example
///
/// ```no_run
/// use s3purge_rs::{Config, DeletionPipeline, create_pipeline_cancellation_token};
///
/// # async fn example() {
/// let config = Config::for_target("my-bucket", "logs/2023/");
/// let token = create_pipeline_cancellation_token();
///
/// let mut pipeline = DeletionPipeline::new(config, token).await;
/// pipeline.run().await;
///
/// let summary = pipeline.summary();
/// println!("deleted {} of {} keys", summary.succeeded, summary.total);
///
/// if pipeline.has_error() {
///     eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
/// }
/// # }
/// ```
pub struct DeletionPipeline {
    config: Config,
    target: Storage,
    cancellation_token: PipelineCancellationToken,
    listing_aborted: CancellationToken,
    recorder: ErrorRecorder,
    has_warning: Arc<AtomicBool>,
    run_state: RunStateTracker,
    summary: RunSummary,
    ready: bool,
}

impl DeletionPipeline {
    /// Create a pipeline over the S3 target described by `config`.
    pub async fn new(config: Config, cancellation_token: PipelineCancellationToken) -> Self {
        let target = storage::create_storage(&config).await;
        Self::with_storage(config, target, cancellation_token)
    }

    /// Create a pipeline over an already constructed storage.
    pub fn with_storage(
        config: Config,
        target: Storage,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            config,
            target,
            cancellation_token,
            listing_aborted: CancellationToken::new(),
            recorder: ErrorRecorder::default(),
            has_warning: Arc::new(AtomicBool::new(false)),
            run_state: RunStateTracker::new(),
            summary: RunSummary::default(),
            ready: true,
        }
    }

    /// Run the deletion pipeline to completion.
    ///
    /// Returns once every dispatched batch has been reported and the final
    /// summary has been logged.
    pub async fn run(&mut self) {
        assert!(self.ready, "DeletionPipeline::run() called more than once");
        self.ready = false;

        info!(
            bucket = self.config.bucket(),
            prefix = self.config.prefix(),
            concurrency = self.config.concurrency,
            batch_size = self.config.batch_size,
            "deletion pipeline has started."
        );
        self.run_state.advance(RunState::Listing);

        let (key_sender, key_receiver) =
            async_channel::bounded::<String>(self.config.object_listing_queue_size.max(1) as usize);
        let (result_sender, result_receiver) = async_channel::unbounded();

        let batcher = match Batcher::new(key_receiver, self.config.batch_size as usize) {
            Ok(batcher) => batcher,
            Err(e) => {
                self.abort_before_start(e);
                return;
            }
        };

        let dispatcher = match ConcurrentDispatcher::new(
            self.create_stage(Some(result_sender)),
            self.listing_aborted.clone(),
            self.run_state.clone(),
            self.recorder.clone(),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                self.abort_before_start(e.context(S3PurgeError::InvalidConfig(
                    "concurrency must be at least 1.".to_string(),
                )));
                return;
            }
        };

        let lister_handle = self.list_target(key_sender);
        let aggregator_handle = tokio::spawn(
            ResultAggregator::new(self.config.verbose, self.has_warning.clone())
                .aggregate(result_receiver),
        );

        match dispatcher.run(batcher).await {
            Ok(outcome) => debug!(
                dispatched_batches = outcome.dispatched_batches,
                dispatched_keys = outcome.dispatched_keys,
                stopped_early = outcome.stopped_early,
                "dispatcher finished."
            ),
            Err(e) => {
                error!("dispatcher failed: {e:#}");
                self.recorder.record_error(e);
            }
        }

        match aggregator_handle.await {
            Ok(summary) => self.summary = summary,
            Err(e) => {
                error!("result aggregator panicked: {e}");
                self.recorder.record_panic();
                self.recorder
                    .record_error(anyhow!("result aggregator panicked: {e}"));
            }
        }

        if let Err(e) = lister_handle.await {
            error!("lister supervisor task failed: {e}");
        }

        self.finish_run_state();
    }

    pub fn has_error(&self) -> bool {
        self.recorder.has_error.load(Ordering::SeqCst)
    }

    /// True when a spawned task panicked. A panicked delete worker is also
    /// reported as a failed batch.
    pub fn has_panic(&self) -> bool {
        self.recorder.has_panic.load(Ordering::SeqCst)
    }

    /// True when at least one key could not be deleted.
    pub fn has_warning(&self) -> bool {
        self.has_warning.load(Ordering::SeqCst)
    }

    /// Consume and return all accumulated errors.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_errors_and_consume(&self) -> Option<Vec<anyhow::Error>> {
        if !self.has_error() {
            return None;
        }
        let mut error_list = self.recorder.errors.lock().unwrap();
        let mut errors = Vec::with_capacity(error_list.len());
        while let Some(e) = error_list.pop_front() {
            errors.push(e);
        }
        Some(errors)
    }

    /// Get error messages without consuming them.
    ///
    /// Returns `None` if no errors occurred.
    pub fn get_error_messages(&self) -> Option<Vec<String>> {
        if !self.has_error() {
            return None;
        }
        let error_list = self.recorder.errors.lock().unwrap();
        Some(error_list.iter().map(|e| e.to_string()).collect())
    }

    pub fn run_state(&self) -> RunState {
        self.run_state.current()
    }

    /// Totals of the finished run. Empty before `run()` has returned.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    fn create_stage<T: Send + Sync + 'static>(&self, sender: Option<Sender<T>>) -> Stage<T> {
        Stage::new(
            self.config.clone(),
            dyn_clone::clone_box(&*self.target),
            sender,
            self.cancellation_token.clone(),
        )
    }

    /// Spawn the KeyLister.
    ///
    /// Uses the double-spawn pattern to catch panics. A panicking lister is
    /// treated like a failed listing.
    fn list_target(&self, key_sender: Sender<String>) -> JoinHandle<()> {
        let stage = self.create_stage(Some(key_sender.clone()));
        let max_keys = self.config.max_keys;
        let listing_aborted = self.listing_aborted.clone();
        let recorder = self.recorder.clone();

        tokio::spawn(async move {
            // Keeps the key channel open until a panic has been turned into an
            // abort, so the batcher never sees a clean end of stream first.
            let key_sender = key_sender;
            let lister = KeyLister::new(stage, listing_aborted.clone());
            let join_result = tokio::spawn(async move { lister.list_target(max_keys).await }).await;

            match join_result {
                Ok(Ok(())) => {
                    debug!("key lister completed successfully.");
                }
                Ok(Err(e)) => {
                    error!("key lister failed: {e:#}");
                    recorder.record_error(e);
                }
                Err(e) => {
                    listing_aborted.cancel();
                    recorder.record_panic();
                    error!("key lister task panicked: {e}");
                    recorder.record_error(
                        anyhow!("key lister task panicked: {e}")
                            .context(S3PurgeError::Listing(e.to_string())),
                    );
                }
            }

            drop(key_sender);
        })
    }

    fn abort_before_start(&mut self, e: anyhow::Error) {
        error!("deletion pipeline could not start: {e:#}");
        self.recorder.record_error(e);
        self.run_state.advance(RunState::Aborted);
    }

    fn finish_run_state(&mut self) {
        let cancelled = self.cancellation_token.is_cancelled();

        if cancelled || self.listing_aborted.is_cancelled() {
            self.run_state.advance(RunState::Aborted);
        } else {
            self.run_state.advance(RunState::Done);
        }

        if cancelled {
            self.recorder.record_error(anyhow!(S3PurgeError::Cancelled));
        }

        info!(
            state = ?self.run_state.current(),
            total = self.summary.total,
            succeeded = self.summary.succeeded,
            failed = self.summary.failed,
            "deletion pipeline has been completed."
        );
    }
}
