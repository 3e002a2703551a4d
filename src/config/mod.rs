pub mod args;

use crate::types::{ClientConfigLocation, S3Credentials, StoragePath};

/// Configuration for one run of the [`DeletionPipeline`](crate::DeletionPipeline).
///
/// # Quick Start
///
/// ```
/// use s3purge_rs::Config;
///
/// let config = Config::for_target("my-bucket", "tiles/2024/");
/// assert_eq!(config.concurrency, 32);
/// assert_eq!(config.batch_size, 1000);
/// ```
///
/// Then customize fields as needed:
///
/// ```
/// use s3purge_rs::Config;
///
/// let mut config = Config::for_target("my-bucket", "tiles/2024/");
/// config.concurrency = 64;
/// config.batch_size = 500;
/// config.verbose = true;
/// ```
///
/// When `target_client_config` is `None` the S3 client is built from the
/// default AWS environment (profile chain, `AWS_REGION`, ...).
#[derive(Debug, Clone)]
pub struct Config {
    pub target: StoragePath,
    pub target_client_config: Option<ClientConfig>,
    pub tracing_config: Option<TracingConfig>,
    /// Maximum number of deletion requests in flight.
    pub concurrency: u16,
    /// Keys per DeleteObjects request, `1..=1000`.
    pub batch_size: u16,
    /// Log every failed key, not only the first one of each batch.
    pub verbose: bool,
    /// Page size of ListObjectsV2.
    pub max_keys: i32,
    pub object_listing_queue_size: u32,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Config {
    /// Create a `Config` with the CLI defaults for the given bucket and prefix.
    pub fn for_target(bucket: &str, prefix: &str) -> Self {
        Config {
            target: StoragePath::S3 {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
            },
            ..Config::default()
        }
    }

    pub fn bucket(&self) -> &str {
        let StoragePath::S3 { bucket, .. } = &self.target;
        bucket
    }

    pub fn prefix(&self) -> &str {
        let StoragePath::S3 { prefix, .. } = &self.target;
        prefix
    }
}

impl Default for Config {
    /// The `target` defaults to an empty bucket/prefix. Set it before running
    /// a pipeline.
    fn default() -> Self {
        Config {
            target: StoragePath::S3 {
                bucket: String::new(),
                prefix: String::new(),
            },
            target_client_config: None,
            tracing_config: None,
            concurrency: 32,
            batch_size: 1000,
            verbose: false,
            max_keys: 1000,
            object_listing_queue_size: 20_000,
            auto_complete_shell: None,
        }
    }
}

/// AWS S3 client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub client_config_location: ClientConfigLocation,
    pub credential: S3Credentials,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub retry_config: RetryConfig,
    pub cli_timeout_config: CLITimeoutConfig,
}

/// SDK-level retry settings. `aws_max_attempts = 1` disables transport retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub aws_max_attempts: u32,
    pub initial_backoff_milliseconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            aws_max_attempts: 1,
            initial_backoff_milliseconds: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CLITimeoutConfig {
    pub operation_timeout_milliseconds: Option<u64>,
    pub operation_attempt_timeout_milliseconds: Option<u64>,
    pub connect_timeout_milliseconds: Option<u64>,
    pub read_timeout_milliseconds: Option<u64>,
}

/// Tracing (logging) configuration used by the binary.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub aws_sdk_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}
