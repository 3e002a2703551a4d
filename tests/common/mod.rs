//! Shared E2E test infrastructure for s3purge-rs.
//!
//! All helpers use the `s3purge-e2e-test` AWS profile.

#![allow(dead_code)]

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectIdentifier};
use s3purge_rs::config::args::build_config_from_args;
use s3purge_rs::{Config, DeletionPipeline, RunState, RunSummary, create_pipeline_cancellation_token};
use tokio::task::JoinSet;
use uuid::Uuid;

const AWS_PROFILE: &str = "s3purge-e2e-test";

const DEFAULT_REGION: &str = "us-east-1";

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineResult {
    pub summary: RunSummary,
    pub run_state: RunState,
    pub has_error: bool,
    pub has_panic: bool,
    pub has_warning: bool,
    pub errors: Vec<String>,
}

/// Deletes every object and the bucket itself when dropped, even if the test
/// panicked.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(async move {
                    helper.delete_bucket_cascade(&bucket).await;
                });
            });
        }));
    }
}

pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Arc::new(Self {
            client: Client::new(&sdk_config),
            region,
        })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
        }
    }

    pub fn generate_bucket_name(&self) -> String {
        format!("s3purge-e2e-{}", Uuid::new_v4())
    }

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        let _ = self.client.delete_bucket_policy().bucket(bucket).send().await;

        let keys = self.list_objects(bucket, "").await;
        for chunk in keys.chunks(1000) {
            let objects: Vec<ObjectIdentifier> = chunk
                .iter()
                .map(|k| ObjectIdentifier::builder().key(k).build().unwrap())
                .collect();
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .unwrap();
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;
        }

        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {bucket}/{key}: {e}"));
    }

    /// Upload `count` small objects named `{prefix}{i:05}.dat`, 32 at a time.
    pub async fn put_objects(self: &Arc<Self>, bucket: &str, prefix: &str, count: usize) {
        let mut join_set = JoinSet::new();
        for i in 0..count {
            let helper = self.clone();
            let bucket = bucket.to_string();
            let key = format!("{prefix}{i:05}.dat");
            join_set.spawn(async move { helper.put_object(&bucket, &key, vec![b'x'; 16]).await });

            if join_set.len() >= 32 {
                join_set.join_next().await.unwrap().unwrap();
            }
        }
        while let Some(joined) = join_set.join_next().await {
            joined.unwrap();
        }
    }

    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let resp = match self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
            {
                Ok(r) => r,
                Err(_) => return keys,
            };

            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        keys
    }

    pub async fn count_objects(&self, bucket: &str, prefix: &str) -> usize {
        self.list_objects(bucket, prefix).await.len()
    }

    /// Deny `s3:DeleteObject` under `prefix`, so those keys come back as
    /// per-key AccessDenied errors.
    pub async fn deny_delete_on_prefix(&self, bucket: &str, prefix: &str) {
        let policy = format!(
            r#"{{
  "Version": "2012-10-17",
  "Statement": [
    {{
      "Sid": "DenyDeleteOnPrefix",
      "Effect": "Deny",
      "Principal": "*",
      "Action": ["s3:DeleteObject"],
      "Resource": "arn:aws:s3:::{bucket}/{prefix}*"
    }}
  ]
}}"#
        );

        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put deny policy on {bucket}/{prefix}: {e}"));
    }

    /// Build a `Config` from CLI-style arguments, adding the e2e profile
    /// unless credentials are given.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec!["s3purge".to_string()];
        full_args.extend(args.iter().map(|s| s.to_string()));

        let has_profile = full_args.iter().any(|a| a.starts_with("--target-profile"));
        let has_access_key = full_args
            .iter()
            .any(|a| a.starts_with("--target-access-key"));
        if !has_profile && !has_access_key {
            full_args.push("--target-profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    pub async fn run_pipeline(config: Config) -> PipelineResult {
        let token = create_pipeline_cancellation_token();
        let mut pipeline = DeletionPipeline::new(config, token).await;

        pipeline.run().await;

        let has_error = pipeline.has_error();
        let errors = pipeline
            .get_errors_and_consume()
            .unwrap_or_default()
            .into_iter()
            .map(|e| format!("{e:?}"))
            .collect();

        PipelineResult {
            summary: pipeline.summary().clone(),
            run_state: pipeline.run_state(),
            has_error,
            has_panic: pipeline.has_panic(),
            has_warning: pipeline.has_warning(),
            errors,
        }
    }
}

pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Wraps an async E2E test body with [`E2E_TIMEOUT`].
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
