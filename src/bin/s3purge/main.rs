use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace, warn};

use s3purge_rs::config::Config;
use s3purge_rs::{
    CLIArgs, DeletionPipeline, create_pipeline_cancellation_token, exit_code_from_error,
    is_cancelled_error,
};

mod ctrl_c_handler;
mod tracing_init;

/// s3purge - delete every object under an Amazon S3 prefix.
///
/// This binary is a thin wrapper over the s3purge-rs library.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "s3purge",
            &mut std::io::stdout(),
        );

        return Ok(());
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let exit_code = run(config).await;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> Config {
    match Config::try_from(CLIArgs::parse()) {
        Ok(config) => config,
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = config.tracing_config.as_ref() else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Run the pipeline and return the process exit code.
///
/// Keys that could not be deleted only raise a warning; the exit code stays 0.
#[cfg_attr(coverage_nightly, coverage(off))]
async fn run(config: Config) -> i32 {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let start_time = tokio::time::Instant::now();
    debug!("deletion pipeline start.");

    let mut pipeline = DeletionPipeline::new(config, cancellation_token).await;
    pipeline.run().await;

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());

    if pipeline.has_panic() {
        error!("a pipeline task panicked, the affected batches are reported as failed.");
    }

    if let Some(errors) = pipeline.get_errors_and_consume() {
        let mut exit_code = 0;
        for err in &errors {
            if is_cancelled_error(err) {
                debug!("deletion cancelled by user.");
                continue;
            }
            error!("{:#}", err);
            exit_code = exit_code.max(exit_code_from_error(err));
        }

        if exit_code != 0 {
            error!(duration_sec = duration_sec, "s3purge failed.");
            return exit_code;
        }
    }

    if pipeline.has_warning() {
        warn!(
            duration_sec = duration_sec,
            failed = pipeline.summary().failed,
            "s3purge has been completed with keys that could not be deleted."
        );
    } else {
        debug!(duration_sec = duration_sec, "s3purge has been completed.");
    }

    0
}
