use crate::config::{CLITimeoutConfig, ClientConfig, Config, RetryConfig, TracingConfig};
use crate::types::{AccessKeys, ClientConfigLocation, S3Credentials, StoragePath};
use clap::Parser;
use clap::builder::NonEmptyStringValueParser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::ffi::OsString;
use std::path::PathBuf;


const DEFAULT_CONCURRENCY: u16 = 32;
const DEFAULT_BATCH_SIZE: u16 = 1000;
const DEFAULT_MAX_KEYS: i32 = 1000;
const DEFAULT_OBJECT_LISTING_QUEUE_SIZE: u32 = 20000;
const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 1;
const DEFAULT_INITIAL_BACKOFF_MILLISECONDS: u64 = 100;
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_AWS_SDK_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_FORCE_PATH_STYLE: bool = false;

const MAX_BATCH_SIZE: u16 = 1000;
const MAX_KEYS_LIMIT: i32 = 1000;

const ERROR_MESSAGE_BUCKET_REQUIRED: &str = "Can't do it without a bucket and a bucket folder.";
const ERROR_MESSAGE_CONCURRENCY_ZERO: &str = "Concurrency must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_ZERO: &str = "Batch size must be at least 1.";
const ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE: &str = "Batch size must be at most 1000 (S3 API limit).";
const ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE: &str = "Max keys must be between 1 and 1000.";
const ERROR_MESSAGE_OBJECT_LISTING_QUEUE_SIZE_ZERO: &str =
    "Object listing queue size must be at least 1.";

/// s3purge - delete every object under an Amazon S3 prefix, fast.
///
/// Keys are listed page by page, grouped into DeleteObjects batches and
/// deleted with a bounded number of concurrent requests.
///
/// Example:
///   s3purge my-bucket tiles/2024/
///   s3purge my-bucket tiles/2024/ -c 64 -v
#[derive(Parser, Clone, Debug)]
#[command(name = "s3purge", version, about, long_about = None)]
pub struct CLIArgs {
    /// Bucket to delete from.
    #[arg(
        value_parser = NonEmptyStringValueParser::new(),
        required_unless_present = "auto_complete_shell",
    )]
    pub bucket: Option<String>,

    /// Key prefix ("folder") whose objects are deleted.
    #[arg(
        value_parser = NonEmptyStringValueParser::new(),
        required_unless_present = "auto_complete_shell",
    )]
    pub bucket_folder: Option<String>,

    /// Number of concurrent DeleteObjects requests.
    #[arg(short = 'c', long, env, default_value_t = DEFAULT_CONCURRENCY, help_heading = "Performance")]
    pub concurrency: u16,

    /// Number of keys per DeleteObjects request (1-1000).
    #[arg(long, env, default_value_t = DEFAULT_BATCH_SIZE, help_heading = "Performance")]
    pub batch_size: u16,

    /// Max keys per listing request (1-1000).
    #[arg(long, env, default_value_t = DEFAULT_MAX_KEYS, help_heading = "Performance")]
    pub max_keys: i32,

    /// Number of listed keys buffered ahead of the batcher.
    #[arg(long, env, default_value_t = DEFAULT_OBJECT_LISTING_QUEUE_SIZE, help_heading = "Performance")]
    pub object_listing_queue_size: u32,

    /// -v prints every failed key and debug logs. -q quiets.
    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    #[arg(long, env, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Include AWS SDK internals in the log output.
    #[arg(long, env, default_value_t = DEFAULT_AWS_SDK_TRACING, help_heading = "Logging")]
    pub aws_sdk_tracing: bool,

    #[arg(long, env, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    #[arg(long, env, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    /// Maximum attempts the AWS SDK makes per request. 1 disables SDK retries.
    #[arg(long, env, default_value_t = DEFAULT_AWS_MAX_ATTEMPTS, help_heading = "Retry")]
    pub aws_max_attempts: u32,

    #[arg(long, env, default_value_t = DEFAULT_INITIAL_BACKOFF_MILLISECONDS, help_heading = "Retry")]
    pub initial_backoff_milliseconds: u64,

    #[arg(long, env, help_heading = "Timeout")]
    pub operation_timeout_milliseconds: Option<u64>,

    #[arg(long, env, help_heading = "Timeout")]
    pub operation_attempt_timeout_milliseconds: Option<u64>,

    #[arg(long, env, help_heading = "Timeout")]
    pub connect_timeout_milliseconds: Option<u64>,

    #[arg(long, env, help_heading = "Timeout")]
    pub read_timeout_milliseconds: Option<u64>,

    #[arg(long, env, help_heading = "AWS")]
    pub aws_config_file: Option<PathBuf>,

    #[arg(long, env, help_heading = "AWS")]
    pub aws_shared_credentials_file: Option<PathBuf>,

    /// AWS profile. Takes precedence over access keys.
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_profile: Option<String>,

    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_secret_key", help_heading = "AWS")]
    pub target_access_key: Option<String>,

    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_access_key", help_heading = "AWS")]
    pub target_secret_key: Option<String>,

    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), requires = "target_access_key", help_heading = "AWS")]
    pub target_session_token: Option<String>,

    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_region: Option<String>,

    /// Custom S3-compatible endpoint URL (e.g. MinIO, R2).
    #[arg(long, env, value_parser = NonEmptyStringValueParser::new(), help_heading = "AWS")]
    pub target_endpoint_url: Option<String>,

    /// Force path-style access (required for some S3-compatible services).
    #[arg(long, env, default_value_t = DEFAULT_FORCE_PATH_STYLE, help_heading = "AWS")]
    pub target_force_path_style: bool,

    /// Print shell completions and exit.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use s3purge_rs::config::args::parse_from_args;
///
/// let args = vec!["s3purge", "my-bucket", "tiles/", "-c", "8"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert_eq!(cli_args.concurrency, 8);
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err(ERROR_MESSAGE_CONCURRENCY_ZERO.to_string());
        }
        if self.batch_size == 0 {
            return Err(ERROR_MESSAGE_BATCH_SIZE_ZERO.to_string());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(ERROR_MESSAGE_BATCH_SIZE_TOO_LARGE.to_string());
        }
        if !(1..=MAX_KEYS_LIMIT).contains(&self.max_keys) {
            return Err(ERROR_MESSAGE_MAX_KEYS_OUT_OF_RANGE.to_string());
        }
        if self.object_listing_queue_size == 0 {
            return Err(ERROR_MESSAGE_OBJECT_LISTING_QUEUE_SIZE_ZERO.to_string());
        }
        Ok(())
    }

    fn build_client_config(&self) -> Option<ClientConfig> {
        let credential = if let Some(ref profile) = self.target_profile {
            S3Credentials::Profile(profile.clone())
        } else if let Some(ref access_key) = self.target_access_key {
            S3Credentials::Credentials {
                access_keys: AccessKeys {
                    access_key: access_key.clone(),
                    secret_access_key: self.target_secret_key.clone().unwrap_or_default(),
                    session_token: self.target_session_token.clone(),
                },
            }
        } else {
            S3Credentials::FromEnvironment
        };

        Some(ClientConfig {
            client_config_location: ClientConfigLocation {
                aws_config_file: self.aws_config_file.clone(),
                aws_shared_credentials_file: self.aws_shared_credentials_file.clone(),
            },
            credential,
            region: self.target_region.clone(),
            endpoint_url: self.target_endpoint_url.clone(),
            force_path_style: self.target_force_path_style,
            retry_config: RetryConfig {
                aws_max_attempts: self.aws_max_attempts,
                initial_backoff_milliseconds: self.initial_backoff_milliseconds,
            },
            cli_timeout_config: CLITimeoutConfig {
                operation_timeout_milliseconds: self.operation_timeout_milliseconds,
                operation_attempt_timeout_milliseconds: self.operation_attempt_timeout_milliseconds,
                connect_timeout_milliseconds: self.connect_timeout_milliseconds,
                read_timeout_milliseconds: self.read_timeout_milliseconds,
            },
        })
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            aws_sdk_tracing: self.aws_sdk_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }

    fn is_verbose(&self) -> bool {
        matches!(self.verbosity.log_level(), Some(level) if level >= log::Level::Debug)
    }

    fn parse_target(&self) -> Result<StoragePath, String> {
        // Completion generation never touches a bucket.
        if self.auto_complete_shell.is_some() {
            return Ok(StoragePath::S3 {
                bucket: self.bucket.clone().unwrap_or_default(),
                prefix: self.bucket_folder.clone().unwrap_or_default(),
            });
        }

        match (&self.bucket, &self.bucket_folder) {
            (Some(bucket), Some(prefix)) if !bucket.is_empty() && !prefix.is_empty() => {
                Ok(StoragePath::S3 {
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                })
            }
            _ => Err(ERROR_MESSAGE_BUCKET_REQUIRED.to_string()),
        }
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        Ok(Config {
            target: args.parse_target()?,
            target_client_config: args.build_client_config(),
            tracing_config: args.build_tracing_config(),
            concurrency: args.concurrency,
            batch_size: args.batch_size,
            verbose: args.is_verbose(),
            max_keys: args.max_keys,
            object_listing_queue_size: args.object_listing_queue_size,
            auto_complete_shell: args.auto_complete_shell,
        })
    }
}
