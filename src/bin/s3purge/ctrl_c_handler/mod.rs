use s3purge_rs::PipelineCancellationToken;
use tokio::task::JoinHandle;
use tokio::{select, signal};
use tracing::{debug, warn};

/// Cancel `cancellation_token` on Ctrl-C. The task ends as soon as the token
/// is cancelled by anyone.
pub fn spawn_ctrl_c_handler(cancellation_token: PipelineCancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        select! {
            _ = cancellation_token.cancelled() => {
                debug!("cancellation_token canceled.")
            }
            _ = signal::ctrl_c() => {
                warn!("ctrl-c received, no more batches will be submitted.");
                cancellation_token.cancel();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use s3purge_rs::create_pipeline_cancellation_token;

    #[tokio::test]
    async fn handler_exits_on_cancelled_token() {
        let cancellation_token = create_pipeline_cancellation_token();

        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        cancellation_token.cancel();

        join_handle.await.unwrap();
        assert!(cancellation_token.is_cancelled());
    }

    #[tokio::test]
    async fn handler_keeps_waiting_without_signal() {
        let cancellation_token = create_pipeline_cancellation_token();

        let join_handle = spawn_ctrl_c_handler(cancellation_token.clone());
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert!(!join_handle.is_finished());
        assert!(!cancellation_token.is_cancelled());
        join_handle.abort();
    }
}
