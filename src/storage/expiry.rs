//! Background Expiry Sweeper
//!
//! Lazy expiry only removes an item when somebody asks for it. Items that are
//! written once with a TTL and never read again would otherwise sit in memory
//! forever, so a background task periodically sweeps the engine ("active
//! expiry").
//!
//! The sweep interval adapts: when a large fraction of the cache turned out to
//! be expired the sweeper runs more often, and when nothing expires it backs off
//! towards `max_interval`.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// Configuration for the expiry sweeper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Starting interval between sweeps (default: 100ms)
    pub base_interval: Duration,

    /// Lower bound for the interval (default: 10ms)
    pub min_interval: Duration,

    /// Upper bound for the interval (default: 1s)
    pub max_interval: Duration,

    /// Expired fraction above which sweeping speeds up
    pub speedup_threshold: f64,

    /// Expired fraction below which sweeping slows down
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

impl ExpiryConfig {
    /// Computes the interval to wait before the next sweep.
    ///
    /// `scanned` is the number of items present before the sweep and `expired`
    /// the number it removed.
    pub fn next_interval(&self, current: Duration, scanned: u64, expired: u64) -> Duration {
        if scanned == 0 {
            return current;
        }

        let rate = expired as f64 / scanned as f64;
        if rate > self.speedup_threshold {
            (current / 2).max(self.min_interval)
        } else if expired == 0 && rate < self.slowdown_threshold {
            (current * 2).min(self.max_interval)
        } else {
            current
        }
    }
}

/// A handle to the running expiry sweeper.
///
/// When this handle is dropped, the sweeper task will be stopped.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper on the current Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(engine, config, shutdown_rx));
        info!("Background expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stops the sweeper. Called automatically on drop.
    pub fn stop(&self) {
        if self.shutdown_tx.send(true).is_ok() {
            info!("Background expiry sweeper stopped");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        let scanned = engine.len();
        let expired = engine.cleanup_expired();
        let next = config.next_interval(interval, scanned, expired);

        if next != interval {
            trace!(
                expired = expired,
                scanned = scanned,
                interval_ms = next.as_millis() as u64,
                "Adjusted sweep interval"
            );
            interval = next;
        }

        if expired > 0 {
            debug!(
                expired = expired,
                keys_remaining = engine.len(),
                "Expired items cleaned up"
            );
        }
    }
}

/// Starts the expiry sweeper with default configuration.
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
