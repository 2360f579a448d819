//! Admission control for outbound calls.

use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimiterStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub in_flight: u64,
}

/// Caps the number of tasks executing at once.
///
/// Submissions beyond the ceiling wait for a permit; there is no separate
/// queue.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

/// Held for the lifetime of one admitted task. Settles the counters on drop,
/// so a task that panics or is cancelled still counts as failed.
struct Admission<'a> {
    limiter: &'a ConcurrencyLimiter,
    succeeded: bool,
}

impl<'a> Admission<'a> {
    fn new(limiter: &'a ConcurrencyLimiter) -> Self {
        limiter.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            limiter,
            succeeded: false,
        }
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        let outcome = if self.succeeded {
            &self.limiter.succeeded
        } else {
            &self.limiter.failed
        };
        outcome.fetch_add(1, Ordering::SeqCst);
        self.limiter.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            submitted: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
        }
    }

    pub async fn run<T, Fut>(&self, task: Fut) -> anyhow::Result<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.submitted.fetch_add(1, Ordering::SeqCst);

        let _permit = match self.semaphore.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                // Only reachable if the semaphore is closed, which this type never does.
                error!("Concurrency limiter closed: {}", e);
                self.failed.fetch_add(1, Ordering::SeqCst);
                return Err(e.into());
            }
        };

        let mut admission = Admission::new(self);
        let result = task.await;
        admission.succeeded = result.is_ok();
        result
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn stats(&self) -> LimiterStats {
        LimiterStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            in_flight: self.in_flight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_blocked_tasks_never_exceed_ceiling() {
        let limiter = Arc::new(ConcurrencyLimiter::new(2));
        let mut handles = Vec::new();

        for _ in 0..5 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter
                    .run(std::future::pending::<anyhow::Result<()>>())
                    .await
            }));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;

        let stats = limiter.stats();
        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.in_flight, 2);
        assert_eq!(limiter.available_permits(), 0);

        // Free one slot: exactly one waiter takes it.
        handles.remove(0).abort();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(limiter.in_flight(), 2);

        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_panicking_task_counts_as_failed() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));

        let task_limiter = limiter.clone();
        let joined = tokio::spawn(async move {
            task_limiter
                .run(async {
                    if true {
                        panic!("task blew up");
                    }
                    Ok::<(), anyhow::Error>(())
                })
                .await
        })
        .await;
        assert!(joined.unwrap_err().is_panic());

        let stats = limiter.stats();
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.succeeded, 0);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(limiter.available_permits(), 1);
    }

    #[tokio::test]
    async fn test_failed_task_releases_slot() {
        let limiter = ConcurrencyLimiter::new(1);

        let result: anyhow::Result<()> = limiter.run(async { Err(anyhow::anyhow!("boom")) }).await;
        assert!(result.is_err());

        let value = limiter.run(async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let stats = limiter.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(limiter.available_permits(), 1);
    }
}
