use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{Orchestrator, ShutdownReason};
use crate::error::Result;

impl Orchestrator {
    /// Wait for SIGINT/SIGTERM or cancellation of `token`, then stop every
    /// component. Returns the process exit code.
    pub async fn run_until_shutdown(&self, token: &CancellationToken) -> Result<i32> {
        info!("Supervisor is running");

        let reason = wait_for_shutdown(token).await?;
        info!("Shutdown initiated: {:?}", reason);

        // `token` may already be cancelled; shutdown gets its own.
        let stop_token = CancellationToken::new();
        match self.stop(&stop_token).await {
            Ok(()) => Ok(0),
            Err(e) => {
                error!("Shutdown finished with errors: {}", e);
                Ok(1)
            }
        }
    }
}

async fn wait_for_shutdown(token: &CancellationToken) -> Result<ShutdownReason> {
    tokio::select! {
        _ = token.cancelled() => Ok(ShutdownReason::UserRequest),
        res = tokio::signal::ctrl_c() => {
            res?;
            info!("Received SIGINT signal (Ctrl+C)");
            Ok(ShutdownReason::Signal("SIGINT".to_string()))
        }
        res = terminate() => {
            res?;
            info!("Received SIGTERM signal");
            Ok(ShutdownReason::Signal("SIGTERM".to_string()))
        }
    }
}

#[cfg(unix)]
async fn terminate() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> std::io::Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
