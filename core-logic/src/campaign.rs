//! # Campaign Loop
//!
//! Drives generator → rate governor → batch processor until the target is
//! reached or the stop token is cancelled, then produces a single
//! [`CampaignReport`].
//!
//! ```text
//! Init ──► Running ──► Exhausted
//!   │         └──────► Stopped
//!   └──► InitFailed
//! ```

use crate::batch::BatchProcessor;
use crate::config::CampaignConfig;
use crate::error::CoreError;
use crate::generator::{DeduplicationSet, WorkItemGenerator};
use crate::metrics::{CampaignOutcome, CampaignReport, RunningTotals};
use crate::traits::{FarmProtocol, NoopObserver, Progress, ProgressObserver};
use crate::utils::limiter::ConcurrencyLimiter;
use crate::utils::rate_limiter::RateGovernor;
use crate::utils::retry::{with_timeout, RetryExecutor};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Batches between progress log lines.
const PROGRESS_LOG_EVERY: u64 = 5;

pub struct Campaign<P: FarmProtocol> {
    config: CampaignConfig,
    protocol: Arc<P>,
    seen: DeduplicationSet,
    stop: CancellationToken,
    observer: Arc<dyn ProgressObserver>,
    retry: Arc<RetryExecutor>,
    limiter: Arc<ConcurrencyLimiter>,
    governor: RateGovernor,
}

impl<P: FarmProtocol> Campaign<P> {
    pub fn new(config: CampaignConfig, protocol: P, seen: DeduplicationSet) -> Self {
        let stop = CancellationToken::new();
        let retry = Arc::new(RetryExecutor::new(config.retry.backoff, stop.clone()));
        let limiter = Arc::new(ConcurrencyLimiter::new(config.max_concurrent));
        let governor = RateGovernor::new(config.target_rate);

        Self {
            config,
            protocol: Arc::new(protocol),
            seen,
            stop,
            observer: Arc::new(NoopObserver),
            retry,
            limiter,
            governor,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    /// Clone of the cooperative stop token; cancelling it is equivalent to
    /// [`Campaign::stop`].
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Request a cooperative stop before [`Campaign::run`] starts. A live run
    /// holds `&mut self`; stop it through a [`Campaign::stop_token`] clone.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!(target: "campaign", "Campaign stop requested");
        }
        self.stop.cancel();
    }

    pub fn dedup_set(&self) -> &DeduplicationSet {
        &self.seen
    }

    pub fn into_dedup_set(self) -> DeduplicationSet {
        self.seen
    }

    /// Run to exhaustion, stop, or init failure. Never fails: every exit
    /// path yields a report.
    pub async fn run(&mut self) -> CampaignReport {
        let started = Instant::now();
        let keys_before = self.seen.len();
        let mut totals = RunningTotals::default();
        let target = self.config.target;

        if target == 0 {
            info!(target: "campaign", "Target is zero, nothing to do");
            return self.report(CampaignOutcome::Exhausted, totals, keys_before, started);
        }
        if self.stop.is_cancelled() {
            return self.report(CampaignOutcome::Stopped, totals, keys_before, started);
        }

        info!(target: "campaign", "Starting campaign for {} items...", target);

        let anchor = match self.fetch_anchor().await {
            Ok(anchor) => anchor,
            Err(_) if self.stop.is_cancelled() => {
                return self.report(CampaignOutcome::Stopped, totals, keys_before, started);
            }
            Err(e) => {
                error!(target: "campaign", "FAILED: {}", e);
                totals.error_count += 1;
                return self.report(CampaignOutcome::InitFailed, totals, keys_before, started);
            }
        };

        let mut generator = WorkItemGenerator::new(anchor, self.config.batch_size);
        let processor = BatchProcessor::new(
            self.protocol.clone(),
            self.retry.clone(),
            self.limiter.clone(),
            &self.config,
        );
        let mut batches: u64 = 0;

        let outcome = loop {
            if totals.processed >= target {
                break CampaignOutcome::Exhausted;
            }
            if self.stop.is_cancelled() {
                break CampaignOutcome::Stopped;
            }

            if !self.governor.gate_or_stop(&self.stop).await || self.stop.is_cancelled() {
                break CampaignOutcome::Stopped;
            }

            let remaining = (target - totals.processed).min(usize::MAX as u64) as usize;
            let batch = generator.next_batch(remaining, &mut self.seen);
            if batch.is_empty() {
                if generator.is_exhausted() {
                    warn!(
                        target: "campaign",
                        "No dates left before the anchor, ending at {}/{} items",
                        totals.processed, target
                    );
                    break CampaignOutcome::Exhausted;
                }
                continue;
            }

            let items = batch.len() as u64;
            let before = totals.processed;
            let result = processor.process_batch(batch).await;
            totals.record_batch(items, result.succeeded);
            batches += 1;

            self.observer.on_progress(&Progress {
                processed: totals.processed,
                target,
                gained: totals.gained,
            });

            if batches % PROGRESS_LOG_EVERY == 1 || totals.processed >= target {
                info!(
                    target: "campaign",
                    "Progress: {}/{} | Gained: {}",
                    totals.processed, target, totals.gained
                );
            }

            if self.crossed_health_check(before, totals.processed) {
                self.health_check().await;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.inter_batch_delay()) => {}
                _ = self.stop.cancelled() => {}
            }
        };

        if outcome == CampaignOutcome::Stopped {
            warn!(
                target: "campaign",
                "Campaign stopped at {}/{} items", totals.processed, target
            );
        }

        self.report(outcome, totals, keys_before, started)
    }

    async fn fetch_anchor(&self) -> Result<NaiveDate, CoreError> {
        let protocol = &self.protocol;
        let timeout = self.config.call_timeout();
        let baseline = self
            .retry
            .execute(
                || with_timeout(timeout, "baseline", protocol.fetch_baseline()),
                self.config.retry.baseline_attempts,
                "initial_baseline",
            )
            .await
            .ok_or_else(|| CoreError::InitFailed {
                reason: "baseline fetch exhausted its attempts".to_string(),
            })?;

        let anchor = protocol.anchor(&baseline).ok_or_else(|| CoreError::InitFailed {
            reason: "baseline has no anchor date".to_string(),
        })?;
        info!(target: "campaign", "Anchor date: {}", anchor);
        Ok(anchor)
    }

    fn crossed_health_check(&self, before: u64, after: u64) -> bool {
        let interval = self.config.health_check_interval;
        interval > 0 && after / interval > before / interval
    }

    /// Best-effort liveness check; the result is discarded.
    async fn health_check(&self) {
        let protocol = &self.protocol;
        let timeout = self.config.call_timeout();
        let alive = self
            .retry
            .execute(
                || with_timeout(timeout, "health_check", protocol.fetch_baseline()),
                self.config.retry.health_check_attempts,
                "health_check",
            )
            .await
            .is_some();
        if !alive {
            warn!(target: "campaign", "Health check failed, continuing");
        }
    }

    fn report(
        &self,
        outcome: CampaignOutcome,
        totals: RunningTotals,
        keys_before: usize,
        started: Instant,
    ) -> CampaignReport {
        CampaignReport::new(
            outcome,
            totals,
            self.seen.len().saturating_sub(keys_before) as u64,
            started.elapsed(),
            self.limiter.stats(),
            self.retry.stats(),
        )
    }
}
