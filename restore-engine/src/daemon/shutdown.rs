//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! On a signal the engine stops admitting restores, waits for the ones in
//! flight up to the grace period, and saves history.

use crate::engine::RestoreEngine;
use crate::utils::errors::Result;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Wait for SIGTERM or SIGINT
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM, initiating graceful shutdown...");
            }
        }
    }

    /// Drain the engine within the grace period
    pub async fn shutdown(&self, engine: &RestoreEngine) -> Result<()> {
        info!("Graceful shutdown initiated (grace: {}s)", self.grace.as_secs());
        engine.shutdown(self.grace).await?;
        info!("Graceful shutdown complete");
        Ok(())
    }
}
