use std::collections::HashSet;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

pub mod error;
pub mod token;

/// An object key as returned by the listing API. Opaque and bucket-scoped.
pub type ObjectKey = String;

/// An ordered group of keys submitted together in one DeleteObjects request.
///
/// Batches are produced by the [`Batcher`](crate::batcher::Batcher) and are
/// never empty. Only the final batch of a run may hold fewer keys than the
/// configured batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: u64,
    pub keys: Vec<ObjectKey>,
}

impl Batch {
    pub fn new(index: u64, keys: Vec<ObjectKey>) -> Self {
        Self { index, keys }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.keys.first().map(String::as_str)
    }
}

/// A key that could not be deleted, with the error reported for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedKey {
    pub key: ObjectKey,
    pub error_code: String,
    pub error_message: String,
}

/// Outcome of one deletion task. Produced exactly once per [`Batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionResult {
    pub batch_index: u64,
    pub batch_size: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedKey>,
}

impl DeletionResult {
    /// Build a result in which every key of `batch` failed with the same error.
    pub fn all_failed(batch: &Batch, error_code: &str, error_message: &str) -> Self {
        Self {
            batch_index: batch.index,
            batch_size: batch.len(),
            succeeded: 0,
            failed: batch
                .keys
                .iter()
                .map(|key| FailedKey {
                    key: key.clone(),
                    error_code: error_code.to_string(),
                    error_message: error_message.to_string(),
                })
                .collect(),
        }
    }

    /// A result is well formed when its counts add up to the batch size and
    /// no key is reported as failed twice.
    pub fn is_well_formed(&self) -> bool {
        if self.succeeded.checked_add(self.failed.len()) != Some(self.batch_size) {
            return false;
        }

        let mut seen = HashSet::with_capacity(self.failed.len());
        self.failed.iter().all(|f| seen.insert(f.key.as_str()))
    }

    pub fn first_error(&self) -> Option<&FailedKey> {
        self.failed.first()
    }
}

/// Run-level totals for one invocation of the deletion pipeline.
///
/// Only the [`ResultAggregator`](crate::aggregator::ResultAggregator) mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub errors: Vec<FailedKey>,
}

/// Lifecycle of a single pipeline run.
///
/// ```text
/// Init -> Listing -> Dispatching -> Draining -> Done
///   \________\___________\______________\-----> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Listing,
    Dispatching,
    Draining,
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        match (self, next) {
            (RunState::Init, RunState::Listing)
            | (RunState::Listing, RunState::Dispatching)
            | (RunState::Dispatching, RunState::Draining)
            | (RunState::Draining, RunState::Done) => true,
            (current, RunState::Aborted) => !current.is_terminal(),
            _ => false,
        }
    }
}

/// Shared, forward-only holder of the current [`RunState`].
#[derive(Debug, Clone)]
pub struct RunStateTracker {
    state: Arc<Mutex<RunState>>,
}

impl Default for RunStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStateTracker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RunState::Init)),
        }
    }

    pub fn current(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Move to `next` if the transition is legal. Returns whether it happened.
    pub fn advance(&self, next: RunState) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.can_transition_to(next) {
            warn!(from = ?*state, to = ?next, "ignored invalid run state transition.");
            return false;
        }

        debug!(from = ?*state, to = ?next, "run state changed.");
        *state = next;
        true
    }
}

/// S3 storage path specification.
#[derive(Debug, Clone)]
pub enum StoragePath {
    S3 { bucket: String, prefix: String },
}

/// AWS configuration file locations.
#[derive(Debug, Clone)]
pub struct ClientConfigLocation {
    pub aws_config_file: Option<PathBuf>,
    pub aws_shared_credentials_file: Option<PathBuf>,
}

/// Where the S3 client takes its credentials from.
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Profile(String),
    Credentials { access_keys: AccessKeys },
    FromEnvironment,
}

/// AWS access key pair.
///
/// The secret and the session token are cleared from memory on drop and are
/// never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessKeys {
    pub access_key: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Debug for AccessKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut keys = f.debug_struct("AccessKeys");
        let session_token = self
            .session_token
            .as_ref()
            .map_or("None", |_| "** redacted **");
        keys.field("access_key", &self.access_key)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &session_token);
        keys.finish()
    }
}
