use campaign_core::{
    with_timeout, BackoffTable, ErrorClass, NetworkError, RetryExecutor, BASE_RETRY_DELAY_MS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn executor() -> RetryExecutor {
    RetryExecutor::new(Some(BackoffTable::default()), CancellationToken::new())
}

#[tokio::test(start_paused = true)]
async fn test_retry_success_first_try() {
    let counter = Arc::new(AtomicUsize::new(0));
    let retry = executor();

    let result = retry
        .execute(
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok("success".to_string())
            },
            3,
            "test_op",
        )
        .await;

    assert_eq!(result.as_deref(), Some("success"));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert_eq!(retry.stats().attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_then_success_waits_backoff() {
    let counter = Arc::new(AtomicUsize::new(0));
    let retry = executor();
    let k = 3;

    let start = Instant::now();
    let result = retry
        .execute(
            || async {
                let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if count < k {
                    Err(anyhow::anyhow!("429 Too Many Requests"))
                } else {
                    Ok(count)
                }
            },
            4,
            "test_op",
        )
        .await;

    assert_eq!(result, Some(k));
    assert!(start.elapsed() >= Duration::from_millis(300) * (k as u32 - 1));
    assert_eq!(retry.stats().failed_attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_attempts_return_none() {
    let counter = Arc::new(AtomicUsize::new(0));
    let retry = executor();

    let result: Option<()> = retry
        .execute(
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("permanent error"))
            },
            2,
            "test_op",
        )
        .await;

    assert!(result.is_none());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert_eq!(retry.consecutive_errors(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_success_decays_consecutive_errors() {
    let counter = Arc::new(AtomicUsize::new(0));
    let retry = executor();

    let _ = retry
        .execute(
            || async {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(anyhow::anyhow!("connection reset"))
                } else {
                    Ok(())
                }
            },
            2,
            "test_op",
        )
        .await;

    assert_eq!(retry.consecutive_errors(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_token_prevents_attempts() {
    let stop = CancellationToken::new();
    let retry = RetryExecutor::new(None, stop.clone());
    stop.cancel();

    let counter = Arc::new(AtomicUsize::new(0));
    let result = retry
        .execute(
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            3,
            "test_op",
        )
        .await;

    assert!(result.is_none());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_backoff_ends_call() {
    let stop = CancellationToken::new();
    let retry = RetryExecutor::new(Some(BackoffTable::default()), stop.clone());
    let counter = Arc::new(AtomicUsize::new(0));

    let result: Option<()> = retry
        .execute(
            || async {
                counter.fetch_add(1, Ordering::SeqCst);
                stop.cancel();
                Err(anyhow::anyhow!("internal server error"))
            },
            5,
            "test_op",
        )
        .await;

    assert!(result.is_none());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_backoff_table_lookup() {
    let retry = executor();
    assert_eq!(retry.delay_for(ErrorClass::RateLimited), Duration::from_millis(300));
    assert_eq!(retry.delay_for(ErrorClass::Aborted), Duration::from_millis(10));
    assert_eq!(retry.delay_for(ErrorClass::ServerError), Duration::from_millis(500));
    assert_eq!(retry.delay_for(ErrorClass::NetworkError), Duration::from_millis(150));
    assert_eq!(retry.delay_for(ErrorClass::Unknown), Duration::from_millis(200));

    let flat = RetryExecutor::new(None, CancellationToken::new());
    assert_eq!(
        flat.delay_for(ErrorClass::ServerError),
        Duration::from_millis(BASE_RETRY_DELAY_MS)
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_becomes_network_error() {
    let result: anyhow::Result<()> = with_timeout(
        Duration::from_secs(8),
        "acquire",
        std::future::pending::<anyhow::Result<()>>(),
    )
    .await;

    let err = result.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<NetworkError>(),
        Some(NetworkError::Timeout { timeout_ms: 8000, .. })
    ));
    assert_eq!(campaign_core::classify(&err), ErrorClass::NetworkError);
}
