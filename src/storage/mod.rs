use anyhow::Result;
use async_trait::async_trait;
use dyn_clone::DynClone;

use crate::config::{ClientConfig, Config};
use crate::types::{FailedKey, ObjectKey, StoragePath};

pub mod s3;

pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// One page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    pub keys: Vec<ObjectKey>,
    /// `None` once the listing is exhausted.
    pub next_continuation_token: Option<String>,
}

/// What the service reported for one DeleteObjects request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutput {
    pub deleted: Vec<ObjectKey>,
    pub errors: Vec<FailedKey>,
}

#[async_trait]
pub trait StorageFactory {
    async fn create(path: StoragePath, client_config: Option<ClientConfig>) -> Storage;
}

/// The two object store capabilities the deletion pipeline consumes.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// Fetch one page of keys under the configured prefix.
    ///
    /// Pass `None` for the first page and the previous page's
    /// `next_continuation_token` afterwards.
    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage>;

    /// Delete up to 1000 keys (full keys, prefix included) in one request.
    ///
    /// An `Err` means the whole request failed. Keys the service refused are
    /// reported in [`BatchDeleteOutput::errors`] instead.
    async fn delete_objects(&self, keys: &[ObjectKey]) -> Result<BatchDeleteOutput>;
}

dyn_clone::clone_trait_object!(StorageTrait);

pub async fn create_storage(config: &Config) -> Storage {
    s3::S3StorageFactory::create(config.target.clone(), config.target_client_config.clone()).await
}
