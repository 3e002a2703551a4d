//! Shared test utilities for the s3purge library crate.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::storage::{BatchDeleteOutput, ObjectPage, StorageTrait};
use crate::types::{FailedKey, ObjectKey, StoragePath};

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// A [`Config`] for unit tests: bucket `test-bucket`, prefix `prefix/`,
/// concurrency 4, batch size 1000.
pub(crate) fn make_test_config() -> Config {
    Config {
        target: StoragePath::S3 {
            bucket: "test-bucket".to_string(),
            prefix: "prefix/".to_string(),
        },
        concurrency: 4,
        object_listing_queue_size: 1000,
        ..Config::default()
    }
}

/// `count` keys under `prefix/`, zero padded so lexical order equals numeric order.
pub(crate) fn make_keys(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("prefix/{i:06}")).collect()
}

/// In-memory object store.
///
/// Listing pages through the keys under `prefix/` in lexical order, using the
/// last returned key as continuation token. Deleting an absent key succeeds.
#[derive(Clone)]
pub(crate) struct MockStorage {
    objects: Arc<Mutex<BTreeSet<String>>>,
    prefix: String,
    fail_listing_after_pages: Option<usize>,
    panic_listing_after_pages: Option<usize>,
    list_delay: Option<Duration>,
    key_errors: Arc<HashMap<String, (String, String)>>,
    failing_batch_keys: Arc<HashSet<String>>,
    panic_keys: Arc<HashSet<String>>,
    delete_delay: Option<Duration>,
    list_calls: Arc<AtomicUsize>,
    delete_calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    request_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MockStorage {
    pub(crate) fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: Arc::new(Mutex::new(keys.into_iter().map(Into::into).collect())),
            prefix: "prefix/".to_string(),
            fail_listing_after_pages: None,
            panic_listing_after_pages: None,
            list_delay: None,
            key_errors: Arc::new(HashMap::new()),
            failing_batch_keys: Arc::new(HashSet::new()),
            panic_keys: Arc::new(HashSet::new()),
            delete_delay: None,
            list_calls: Arc::new(AtomicUsize::new(0)),
            delete_calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            request_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// The listing call after `pages` successful pages returns an error.
    pub(crate) fn fail_listing_after(mut self, pages: usize) -> Self {
        self.fail_listing_after_pages = Some(pages);
        self
    }

    /// The listing call after `pages` successful pages panics.
    pub(crate) fn panic_listing_after(mut self, pages: usize) -> Self {
        self.panic_listing_after_pages = Some(pages);
        self
    }

    /// Every listing call waits `delay` before answering.
    pub(crate) fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// The service refuses to delete `key` with the given error.
    pub(crate) fn with_key_error(mut self, key: &str, code: &str, message: &str) -> Self {
        Arc::make_mut(&mut self.key_errors)
            .insert(key.to_string(), (code.to_string(), message.to_string()));
        self
    }

    /// Any DeleteObjects request containing `key` fails as a whole.
    pub(crate) fn with_failing_batch_key(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.failing_batch_keys).insert(key.to_string());
        self
    }

    /// Any DeleteObjects request containing `key` panics.
    pub(crate) fn with_panic_key(mut self, key: &str) -> Self {
        Arc::make_mut(&mut self.panic_keys).insert(key.to_string());
        self
    }

    pub(crate) fn with_delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub(crate) fn remaining_keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().iter().cloned().collect()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn request_sizes(&self) -> Vec<usize> {
        self.request_sizes.lock().unwrap().clone()
    }
}

struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let page_number = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(pages) = self.panic_listing_after_pages {
            if page_number >= pages {
                panic!("mock ListObjectsV2 panicked");
            }
        }
        if let Some(pages) = self.fail_listing_after_pages {
            if page_number >= pages {
                return Err(anyhow!("mock ListObjectsV2 failed: InternalError"));
            }
        }

        let objects = self.objects.lock().unwrap();
        let lower = match continuation_token {
            Some(ref token) => Bound::Excluded(token.clone()),
            None => Bound::Unbounded,
        };
        let mut matching = objects
            .range((lower, Bound::Unbounded))
            .filter(|key| key.starts_with(&self.prefix));

        let keys: Vec<String> = matching
            .by_ref()
            .take(max_keys.max(1) as usize)
            .cloned()
            .collect();
        let has_more = matching.next().is_some();

        Ok(ObjectPage {
            next_continuation_token: if has_more { keys.last().cloned() } else { None },
            keys,
        })
    }

    async fn delete_objects(&self, keys: &[ObjectKey]) -> Result<BatchDeleteOutput> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.request_sizes.lock().unwrap().push(keys.len());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());

        if let Some(delay) = self.delete_delay {
            tokio::time::sleep(delay).await;
        }

        if keys.iter().any(|key| self.panic_keys.contains(key)) {
            panic!("mock DeleteObjects panicked");
        }
        if keys.iter().any(|key| self.failing_batch_keys.contains(key)) {
            return Err(anyhow!("mock DeleteObjects failed: SlowDown"));
        }

        let mut output = BatchDeleteOutput::default();
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            if let Some((code, message)) = self.key_errors.get(key) {
                output.errors.push(FailedKey {
                    key: key.clone(),
                    error_code: code.clone(),
                    error_message: message.clone(),
                });
            } else {
                objects.remove(key);
                output.deleted.push(key.clone());
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_storage_pages_in_order() {
        let storage = MockStorage::new(make_keys(5));

        let first = storage.list_objects_page(None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["prefix/000000", "prefix/000001"]);

        let second = storage
            .list_objects_page(first.next_continuation_token, 2)
            .await
            .unwrap();
        assert_eq!(second.keys, vec!["prefix/000002", "prefix/000003"]);

        let last = storage
            .list_objects_page(second.next_continuation_token, 2)
            .await
            .unwrap();
        assert_eq!(last.keys, vec!["prefix/000004"]);
        assert!(last.next_continuation_token.is_none());
        assert_eq!(storage.list_calls(), 3);
    }

    #[tokio::test]
    async fn mock_storage_filters_by_prefix() {
        let storage = MockStorage::new(["other/a", "prefix/b", "prefixed/c"]);

        let page = storage.list_objects_page(None, 1000).await.unwrap();
        assert_eq!(page.keys, vec!["prefix/b"]);
    }

    #[tokio::test]
    async fn mock_storage_delete_is_idempotent() {
        let storage = MockStorage::new(make_keys(2));
        let keys = make_keys(2);

        let output = storage.delete_objects(&keys).await.unwrap();
        assert_eq!(output.deleted.len(), 2);
        assert!(storage.remaining_keys().is_empty());

        let output = storage.delete_objects(&keys).await.unwrap();
        assert_eq!(output.deleted.len(), 2);
        assert!(output.errors.is_empty());
    }
}
