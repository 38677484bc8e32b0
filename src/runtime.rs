//! Shutdown coordination for the server and the analysis queue
use std::future::Future;
use tokio::signal;
use tokio::sync::watch;

/// Shared shutdown flag. Clones observe the same signal.
#[derive(Clone)]
pub struct ServiceRuntime {
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ServiceRuntime {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Receiver for background tasks; flips to `true` on shutdown
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Resolves on Ctrl+C or programmatic shutdown; for axum's `with_graceful_shutdown()`
    pub fn create_shutdown_future(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut shutdown_rx = self.shutdown_rx.clone();

        async move {
            if *shutdown_rx.borrow() {
                return;
            }
            tokio::select! {
                _ = signal::ctrl_c() => {
                    log::info!("[Runtime] Shutdown signal (Ctrl+C) received");
                }
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    log::info!("[Runtime] Shutdown triggered programmatically");
                }
            }
        }
    }
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self::new()
    }
}
