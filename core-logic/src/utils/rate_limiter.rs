//! # Batch Rate Governor
//!
//! Holds batch dispatch to a target rate by enforcing a minimum interval
//! between successive grants. Independent of per-request latency and of the
//! concurrency ceiling.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug)]
pub struct RateGovernor {
    interval: Duration,
    last_grant: Mutex<Option<Instant>>,
}

impl RateGovernor {
    /// `target_rate` is in gates per second. Zero, negative or non-finite
    /// rates disable gating.
    pub fn new(target_rate: f64) -> Self {
        let interval = if target_rate.is_finite() && target_rate > 0.0 {
            Duration::from_secs_f64(1.0 / target_rate)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            last_grant: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until at least one interval has passed since the previous grant.
    pub async fn gate(&self) {
        self.acquire_slot(std::future::pending()).await;
    }

    /// Like [`Self::gate`], but gives up as soon as `stop` is cancelled.
    /// Returns `false` (and records no grant) when stopped.
    pub async fn gate_or_stop(&self, stop: &CancellationToken) -> bool {
        self.acquire_slot(stop.cancelled()).await
    }

    async fn acquire_slot(&self, interrupt: impl Future<Output = ()>) -> bool {
        // Holding the lock across the sleep serialises concurrent callers.
        let mut last = self.last_grant.lock().await;

        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.interval {
                let wait = self.interval - elapsed;
                debug!("Rate governor holding batch for {:?}", wait);
                tokio::select! {
                    _ = sleep(wait) => {}
                    _ = interrupt => return false,
                }
            }
        }

        *last = Some(Instant::now());
        true
    }
}
