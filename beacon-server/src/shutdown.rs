//! Graceful shutdown handling.
//!
//! Provides shutdown coordination for the Beacon server: signal handling
//! plus a completion handshake so in-flight webhook deliveries finish
//! before the process exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Shutdown controller for coordinating graceful shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownController {
    /// Whether shutdown has been initiated.
    shutdown_initiated: Arc<AtomicBool>,
    /// Sender for shutdown notification.
    shutdown_tx: broadcast::Sender<()>,
    /// Watch channel for shutdown completion.
    completion_tx: Arc<watch::Sender<bool>>,
    /// Receiver for shutdown completion.
    completion_rx: watch::Receiver<bool>,
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownController {
    /// Creates a new shutdown controller.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (completion_tx, completion_rx) = watch::channel(false);

        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            completion_tx: Arc::new(completion_tx),
            completion_rx,
        }
    }

    /// Initiates shutdown, notifying all listeners. Idempotent.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Shutdown initiated");
            let _ = self.shutdown_tx.send(());
        }
    }

    /// Returns whether shutdown has been initiated.
    #[must_use]
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Returns a future that completes when shutdown is initiated.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        let _ = rx.recv().await;
    }

    /// Marks shutdown as complete.
    pub fn mark_complete(&self) {
        let _ = self.completion_tx.send(true);
    }

    /// Waits for shutdown to complete with a timeout.
    ///
    /// Returns `true` if shutdown completed, `false` on timeout.
    pub async fn wait_for_completion(&self, timeout: Duration) -> bool {
        let mut rx = self.completion_rx.clone();

        tokio::select! {
            result = rx.changed() => {
                result.is_ok() && *rx.borrow()
            }
            () = tokio::time::sleep(timeout) => {
                warn!("Shutdown completion timeout after {:?}", timeout);
                false
            }
        }
    }
}

/// Sets up signal handlers for graceful shutdown.
///
/// Listens for SIGINT (Ctrl+C) and SIGTERM signals.
pub async fn setup_signal_handlers(controller: ShutdownController) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let Ok(mut sigint) = signal(SignalKind::interrupt()) else {
            warn!("Failed to install SIGINT handler");
            return;
        };
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            warn!("Failed to install SIGTERM handler");
            return;
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        controller.initiate_shutdown();
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to install Ctrl+C handler");
            return;
        }
        info!("Received Ctrl+C");
        controller.initiate_shutdown();
    }
}
