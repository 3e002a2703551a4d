pub mod client_builder;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::operation::delete_objects::DeleteObjectsOutput;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use std::sync::Arc;

use crate::config::ClientConfig;
use crate::storage::{BatchDeleteOutput, ObjectPage, Storage, StorageFactory, StorageTrait};
use crate::types::{FailedKey, ObjectKey, StoragePath};

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// Service errors carry an S3 error code (e.g. "AccessDenied",
/// "SlowDown"). Anything else (network, timeout, construction failure) is
/// reported as "N/A" with the full error description as the message.
pub(crate) fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

pub struct S3StorageFactory;

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(path: StoragePath, client_config: Option<ClientConfig>) -> Storage {
        let StoragePath::S3 { bucket, prefix } = path;

        let client = if let Some(ref client_config) = client_config {
            client_config.create_client().await
        } else {
            let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
            Client::new(&sdk_config)
        };

        Box::new(S3Storage {
            bucket,
            prefix,
            client: Arc::new(client),
        })
    }
}

#[derive(Clone)]
struct S3Storage {
    bucket: String,
    prefix: String,
    client: Arc<Client>,
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_objects_page(
        &self,
        continuation_token: Option<String>,
        max_keys: i32,
    ) -> Result<ObjectPage> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&self.prefix)
            .set_continuation_token(continuation_token)
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = self.prefix,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    self.bucket,
                    self.prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        Ok(object_page_from_output(&output))
    }

    async fn delete_objects(&self, keys: &[ObjectKey]) -> Result<BatchDeleteOutput> {
        let object_count = keys.len();

        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to build ObjectIdentifier")?;

        // Non-quiet mode so the response lists every deleted key.
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .context("Failed to build Delete request")?;

        let output = self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = self.bucket,
                    prefix = self.prefix,
                    object_count = object_count,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 DeleteObjects API call failed for {} objects in s3://{}/{}: {} ({}).",
                    object_count,
                    self.bucket,
                    self.prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow::anyhow!(e).context("aws_sdk_s3::client::delete_objects() failed.")
            })?;

        Ok(batch_delete_output_from_output(&output))
    }
}

fn object_page_from_output(output: &ListObjectsV2Output) -> ObjectPage {
    let keys = output
        .contents()
        .iter()
        .filter_map(|object| object.key().map(str::to_string))
        .collect();

    // Some S3-compatible services return a token on the last page.
    let next_continuation_token = if output.is_truncated().unwrap_or(false) {
        output.next_continuation_token().map(str::to_string)
    } else {
        None
    };

    ObjectPage {
        keys,
        next_continuation_token,
    }
}

fn batch_delete_output_from_output(output: &DeleteObjectsOutput) -> BatchDeleteOutput {
    let deleted = output
        .deleted()
        .iter()
        .filter_map(|deleted| deleted.key().map(str::to_string))
        .collect();

    let errors = output
        .errors()
        .iter()
        .filter_map(|error| {
            Some(FailedKey {
                key: error.key()?.to_string(),
                error_code: error.code().unwrap_or("unknown").to_string(),
                error_message: error.message().unwrap_or("no message").to_string(),
            })
        })
        .collect();

    BatchDeleteOutput { deleted, errors }
}
