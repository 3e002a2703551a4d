use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_channel::Sender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::batcher::Batcher;
use crate::deleter::{ObjectDeleter, WORKER_PANIC_ERROR_CODE};
use crate::stage::Stage;
use crate::types::token::PipelineCancellationToken;
use crate::types::{Batch, DeletionResult, RunState, RunStateTracker};

/// What the dispatcher submitted before it returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub dispatched_batches: u64,
    pub dispatched_keys: u64,
    /// True when listing failed or the run was cancelled before the batch
    /// stream ended.
    pub stopped_early: bool,
}

/// Shared error bookkeeping of a pipeline run.
#[derive(Clone, Default)]
pub struct ErrorRecorder {
    pub has_error: Arc<AtomicBool>,
    pub has_panic: Arc<AtomicBool>,
    pub errors: Arc<Mutex<VecDeque<anyhow::Error>>>,
}

impl ErrorRecorder {
    pub fn record_error(&self, error: anyhow::Error) {
        self.has_error.store(true, Ordering::SeqCst);
        self.errors.lock().unwrap().push_back(error);
    }

    pub fn record_panic(&self) {
        self.has_panic.store(true, Ordering::SeqCst);
    }
}

/// Runs batch deletions with at most `concurrency` requests in flight.
///
/// Each batch needs an owned semaphore permit before its worker task is
/// spawned; the task keeps the permit until its result has been sent. When
/// all permits are taken the dispatcher, and through the bounded key channel
/// the lister, is suspended.
pub struct ConcurrentDispatcher {
    object_deleter: Arc<ObjectDeleter>,
    result_sender: Sender<DeletionResult>,
    concurrency: usize,
    cancellation_token: PipelineCancellationToken,
    listing_aborted: CancellationToken,
    run_state: RunStateTracker,
    recorder: ErrorRecorder,
}

impl ConcurrentDispatcher {
    pub fn new(
        stage: Stage<DeletionResult>,
        listing_aborted: CancellationToken,
        run_state: RunStateTracker,
        recorder: ErrorRecorder,
    ) -> Result<Self> {
        let concurrency = stage.config.concurrency as usize;
        if concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1."));
        }

        let result_sender = stage
            .sender
            .clone()
            .context("dispatcher needs a result channel.")?;
        let cancellation_token = stage.cancellation_token.clone();

        Ok(Self {
            object_deleter: Arc::new(ObjectDeleter::new(stage)),
            result_sender,
            concurrency,
            cancellation_token,
            listing_aborted,
            run_state,
            recorder,
        })
    }

    pub async fn run(self, mut batcher: Batcher) -> Result<DispatchOutcome> {
        debug!(
            concurrency = self.concurrency,
            batch_size = batcher.batch_size(),
            "dispatcher has started."
        );
        self.run_state.advance(RunState::Dispatching);

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut join_set: JoinSet<()> = JoinSet::new();
        let mut outcome = DispatchOutcome::default();

        loop {
            if self.should_stop() {
                outcome.stopped_early = true;
                break;
            }

            let batch = tokio::select! {
                batch = batcher.next_batch() => batch,
                _ = self.stop_requested() => {
                    outcome.stopped_early = true;
                    break;
                }
            };
            let Some(batch) = batch else {
                break;
            };

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => {
                    permit.context("dispatcher semaphore has been closed.")?
                }
                _ = self.stop_requested() => {
                    outcome.stopped_early = true;
                    break;
                }
            };
            if self.should_stop() {
                outcome.stopped_early = true;
                break;
            }

            outcome.dispatched_batches += 1;
            outcome.dispatched_keys += batch.len() as u64;
            self.spawn_worker(&mut join_set, batch, permit);

            while let Some(joined) = join_set.try_join_next() {
                self.check_joined(joined);
            }
        }

        // Unblocks the lister when dispatching stopped early.
        batcher.close();

        if outcome.stopped_early {
            info!(
                dispatched_batches = outcome.dispatched_batches,
                "no more batches will be submitted, waiting for in-flight deletions."
            );
        }

        self.run_state.advance(RunState::Draining);
        while let Some(joined) = join_set.join_next().await {
            self.check_joined(joined);
        }

        debug!(
            dispatched_batches = outcome.dispatched_batches,
            dispatched_keys = outcome.dispatched_keys,
            "dispatcher has been completed."
        );
        Ok(outcome)
    }

    fn should_stop(&self) -> bool {
        self.cancellation_token.is_cancelled() || self.listing_aborted.is_cancelled()
    }

    async fn stop_requested(&self) {
        tokio::select! {
            _ = self.cancellation_token.cancelled() => {},
            _ = self.listing_aborted.cancelled() => {},
        }
    }

    fn spawn_worker(
        &self,
        join_set: &mut JoinSet<()>,
        batch: Batch,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let object_deleter = self.object_deleter.clone();
        let result_sender = self.result_sender.clone();
        let recorder = self.recorder.clone();
        let batch = Arc::new(batch);

        join_set.spawn(async move {
            let task_batch = batch.clone();
            let join_result =
                tokio::spawn(async move { object_deleter.execute(&task_batch).await }).await;

            match join_result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(batch_index = batch.index, "delete worker failed: {e:#}");
                    recorder.record_error(e);
                }
                Err(e) => {
                    error!(batch_index = batch.index, "delete worker task panicked: {e}");
                    recorder.record_panic();
                    let result = DeletionResult::all_failed(
                        &batch,
                        WORKER_PANIC_ERROR_CODE,
                        &format!("delete worker panicked: {e}"),
                    );
                    let _ = result_sender.send(result).await;
                }
            }

            drop(permit);
        });
    }

    fn check_joined(&self, joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            error!("dispatcher task panicked: {e}");
            self.recorder.record_panic();
            self.recorder
                .record_error(anyhow!("dispatcher task panicked: {e}"));
        }
    }
}
