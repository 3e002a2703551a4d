use anyhow::Result;
use async_channel::Receiver;

use crate::deleter::MAX_BATCH_SIZE;
use crate::types::Batch;
use crate::types::error::S3PurgeError;

/// Groups the key stream into [`Batch`]es of at most `batch_size` keys.
///
/// Keys are pulled lazily, one batch at a time. The trailing partial batch is
/// emitted when the key channel closes; an empty stream yields no batch.
pub struct Batcher {
    receiver: Receiver<String>,
    batch_size: usize,
    next_index: u64,
}

impl Batcher {
    pub fn new(receiver: Receiver<String>, batch_size: usize) -> Result<Self> {
        if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
            return Err(S3PurgeError::InvalidConfig(format!(
                "batch size must be between 1 and {MAX_BATCH_SIZE}, got {batch_size}."
            ))
            .into());
        }

        Ok(Self {
            receiver,
            batch_size,
            next_index: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub async fn next_batch(&mut self) -> Option<Batch> {
        let mut keys = Vec::with_capacity(self.batch_size);

        while keys.len() < self.batch_size {
            match self.receiver.recv().await {
                Ok(key) => keys.push(key),
                Err(_) => break,
            }
        }

        if keys.is_empty() {
            return None;
        }

        let batch = Batch::new(self.next_index, keys);
        self.next_index += 1;
        Some(batch)
    }

    /// Stop accepting keys. Keys already buffered in the channel are dropped.
    pub fn close(&self) {
        self.receiver.close();
    }
}
