use crate::config::BackoffTable;
use crate::error::NetworkError;
use crate::utils::classifier::{classify, ErrorClass};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Delay used for every classification when no backoff table is supplied.
pub const BASE_RETRY_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub attempts: u64,
    pub failed_attempts: u64,
    pub consecutive_errors: u64,
}

/// Bounded-attempt executor with per-classification backoff.
///
/// Failures are absorbed: the caller gets `None` once attempts run out, or
/// as soon as the stop token is cancelled.
#[derive(Debug)]
pub struct RetryExecutor {
    backoff: Option<BackoffTable>,
    stop: CancellationToken,
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    consecutive_errors: AtomicU64,
}

impl RetryExecutor {
    pub fn new(backoff: Option<BackoffTable>, stop: CancellationToken) -> Self {
        Self {
            backoff,
            stop,
            attempts: AtomicU64::new(0),
            failed_attempts: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
        }
    }

    pub fn delay_for(&self, class: ErrorClass) -> Duration {
        let ms = match &self.backoff {
            None => BASE_RETRY_DELAY_MS,
            Some(table) => match class {
                ErrorClass::RateLimited => table.rate_limited_ms,
                ErrorClass::Aborted => table.aborted_ms,
                ErrorClass::ServerError => table.server_error_ms,
                ErrorClass::NetworkError => table.network_error_ms,
                ErrorClass::Unknown => table.unknown_ms,
            },
        };
        Duration::from_millis(ms)
    }

    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        max_attempts: u32,
        context: &str,
    ) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        for attempt in 0..max_attempts {
            if self.stop.is_cancelled() {
                debug!("{} aborted before attempt {}: stop requested", context, attempt + 1);
                return None;
            }

            self.attempts.fetch_add(1, Ordering::SeqCst);
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", context, attempt + 1);
                    }
                    self.decay_consecutive_errors();
                    return Some(result);
                }
                Err(e) => {
                    let class = classify(&e);
                    self.failed_attempts.fetch_add(1, Ordering::SeqCst);
                    self.consecutive_errors.fetch_add(1, Ordering::SeqCst);

                    if attempt + 1 >= max_attempts {
                        warn!(
                            "{} failed after {} attempts ({}): {:#}",
                            context, max_attempts, class, e
                        );
                        return None;
                    }

                    let delay = self.delay_for(class);
                    debug!(
                        "{} failed (attempt {}/{}, {}). Retrying in {:?}: {:#}",
                        context,
                        attempt + 1,
                        max_attempts,
                        class,
                        delay,
                        e
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.stop.cancelled() => {}
                    }
                }
            }
        }

        None
    }

    fn decay_consecutive_errors(&self) {
        let _ = self
            .consecutive_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn consecutive_errors(&self) -> u64 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> RetryStats {
        RetryStats {
            attempts: self.attempts.load(Ordering::SeqCst),
            failed_attempts: self.failed_attempts.load(Ordering::SeqCst),
            consecutive_errors: self.consecutive_errors(),
        }
    }
}

/// Bound a single outbound call. An elapsed timer becomes
/// [`NetworkError::Timeout`] so it classifies as a network failure.
pub async fn with_timeout<T, Fut>(
    timeout: Duration,
    context: &str,
    call: Fut,
) -> anyhow::Result<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
            endpoint: context.to_string(),
        }
        .into()),
    }
}
