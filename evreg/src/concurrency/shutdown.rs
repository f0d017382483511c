//! Cooperative shutdown signaling for background loops.
//!
//! Abstracts tokio's watch channel into a shutdown handle pair. Background
//! loops hold a [`ShutdownRx`] and check it between batches, so a stop request
//! takes effect at the next batch boundary instead of interrupting a
//! pipelined cache write midway.

use tokio::sync::watch;

/// Transmitter side of a shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<()>);

impl ShutdownTx {
    /// Signals all receivers to shut down.
    pub fn shutdown(&self) {
        // Send only fails when every receiver is gone, which already is the
        // state shutdown tries to reach.
        let _ = self.0.send(());
    }
}

/// Receiver side of a shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<()>);

impl ShutdownRx {
    /// Returns whether shutdown has been requested.
    pub fn should_shutdown(&self) -> bool {
        self.0.has_changed().unwrap_or(true)
    }

    /// Completes when shutdown is requested.
    pub async fn signaled(&mut self) {
        // An error means the sender was dropped; treat that as shutdown.
        let _ = self.0.changed().await;
    }
}

/// Creates a connected shutdown channel pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(());
    (ShutdownTx(tx), ShutdownRx(rx))
}
