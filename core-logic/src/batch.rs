//! # Batch Processor
//!
//! Runs one batch of work items concurrently. Each item staggers its start,
//! then performs acquire → finalize, each step going through the retry
//! executor with every attempt admitted by the concurrency limiter.

use crate::config::CampaignConfig;
use crate::generator::WorkItem;
use crate::traits::FarmProtocol;
use crate::utils::limiter::ConcurrencyLimiter;
use crate::utils::retry::{with_timeout, RetryExecutor};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, Instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub succeeded: u64,
    pub failed: u64,
}

pub struct BatchProcessor<P: FarmProtocol> {
    protocol: Arc<P>,
    retry: Arc<RetryExecutor>,
    limiter: Arc<ConcurrencyLimiter>,
    stagger: Duration,
    stagger_jitter_ms: u64,
    call_timeout: Duration,
    acquire_attempts: u32,
    finalize_attempts: u32,
}

impl<P: FarmProtocol> BatchProcessor<P> {
    pub fn new(
        protocol: Arc<P>,
        retry: Arc<RetryExecutor>,
        limiter: Arc<ConcurrencyLimiter>,
        config: &CampaignConfig,
    ) -> Self {
        Self {
            protocol,
            retry,
            limiter,
            stagger: config.stagger(),
            stagger_jitter_ms: config.stagger_jitter_ms,
            call_timeout: config.call_timeout(),
            acquire_attempts: config.retry.acquire_attempts,
            finalize_attempts: config.retry.finalize_attempts,
        }
    }

    /// Run every item to completion and count the ones that finished both
    /// steps. A panicking item is counted as failed; siblings keep running.
    pub async fn process_batch(&self, items: Vec<WorkItem>) -> BatchOutcome {
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let delay = self.start_delay(index);
            let span = tracing::debug_span!("item", key = %item.key);
            let protocol = self.protocol.clone();
            let retry = self.retry.clone();
            let limiter = self.limiter.clone();
            let call_timeout = self.call_timeout;
            let acquire_attempts = self.acquire_attempts;
            let finalize_attempts = self.finalize_attempts;

            set.spawn(
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    let handle = retry
                        .execute(
                            || {
                                limiter.run(with_timeout(
                                    call_timeout,
                                    "acquire",
                                    protocol.acquire(&item),
                                ))
                            },
                            acquire_attempts,
                            &format!("acquire[{}]", item.key),
                        )
                        .await?;

                    let ack = retry
                        .execute(
                            || {
                                limiter.run(with_timeout(
                                    call_timeout,
                                    "finalize",
                                    protocol.finalize(&handle, &item),
                                ))
                            },
                            finalize_attempts,
                            &format!("finalize[{}]", item.key),
                        )
                        .await?;

                    debug!("Item {} SUCCESS", item.key);
                    Some(ack)
                }
                .instrument(span),
            );
        }

        let mut outcome = BatchOutcome::default();
        while let Some(res) = set.join_next().await {
            match res {
                Ok(Some(_)) => outcome.succeeded += 1,
                Ok(None) => outcome.failed += 1,
                Err(e) => {
                    error!("Item task panicked or failed to join: {:?}", e);
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }

    fn start_delay(&self, index: usize) -> Duration {
        let base = self.stagger * index as u32;
        if self.stagger_jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.stagger_jitter_ms);
        base + Duration::from_millis(jitter)
    }
}
