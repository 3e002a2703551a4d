use anyhow::{Context, Result, anyhow};
use async_channel::Sender;

use crate::config::Config;
use crate::storage::Storage;
use crate::types::token::PipelineCancellationToken;

/// Result of sending an item to the next stage.
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    Success,
    Closed,
}

/// Shared context handed to a pipeline stage that produces items of type `T`.
///
/// The key lister produces `String` keys and each deletion task produces one
/// [`DeletionResult`](crate::types::DeletionResult).
pub struct Stage<T> {
    pub config: Config,
    pub target: Storage,
    pub sender: Option<Sender<T>>,
    pub cancellation_token: PipelineCancellationToken,
}

impl<T: Send + Sync + 'static> Stage<T> {
    pub fn new(
        config: Config,
        target: Storage,
        sender: Option<Sender<T>>,
        cancellation_token: PipelineCancellationToken,
    ) -> Self {
        Self {
            config,
            target,
            sender,
            cancellation_token,
        }
    }

    /// Send an item downstream.
    ///
    /// Returns `SendResult::Closed` when the receiver is gone, so the caller
    /// can stop quietly.
    pub async fn send(&self, item: T) -> Result<SendResult> {
        let sender = self
            .sender
            .as_ref()
            .context("stage has no sender channel.")?;

        if let Err(e) = sender.send(item).await {
            return if !sender.is_closed() {
                Err(anyhow!("async_channel::Sender::send() failed: {e}"))
            } else {
                Ok(SendResult::Closed)
            };
        }

        Ok(SendResult::Success)
    }

    pub fn is_channel_closed(&self) -> bool {
        self.sender.as_ref().is_none_or(|sender| sender.is_closed())
    }
}
