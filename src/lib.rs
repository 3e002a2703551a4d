/*!
# Overview
s3purge-rs deletes every object under an Amazon S3 prefix, fast.

Keys are listed page by page, grouped into batches of up to 1000 keys and
removed with the S3 batch API, with a bounded number of requests in flight.
Keys the service refuses are reported but never stop the run.

## Features
- **High Performance**: up to 1000 keys per DeleteObjects request, `-c` requests in parallel
- **Bounded Memory**: listing is suspended while the workers are busy
- **Failure Isolation**: a failed batch or key never aborts the rest of the run
- **Library-First**: the s3purge CLI is a thin wrapper over this crate

## As a Library

```toml
[dependencies]
s3purge-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use s3purge_rs::config::Config;
use s3purge_rs::config::args::parse_from_args;
use s3purge_rs::{DeletionPipeline, create_pipeline_cancellation_token};

#[tokio::main]
async fn main() {
    let args = vec!["s3purge", "my-bucket", "logs/2023/", "--concurrency", "64"];

    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = DeletionPipeline::new(config, cancellation_token).await;
    pipeline.run().await;

    if pipeline.has_error() {
        eprintln!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod aggregator;
pub mod batcher;
pub mod config;
pub mod deleter;
pub mod dispatcher;
pub mod lister;
pub mod pipeline;
pub mod stage;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::DeletionPipeline;
pub use types::error::{S3PurgeError, exit_code_from_error, is_cancelled_error, is_listing_error};
pub use types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};
pub use types::{RunState, RunSummary};
