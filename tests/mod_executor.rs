mod common;

use adaptcache::executor::{ExecuteOptions, RateLimitedExecutor, RetryPolicy};
use adaptcache::{BackendError, CacheContext, CacheError, CacheSettings, GetOptions, RuleSet, Strategy};
use common::FakeBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn opts(attempts: u32) -> ExecuteOptions {
    ExecuteOptions { timeout: Duration::from_secs(10), retry_attempts: attempts }
}

fn executor(spacing_ms: u64) -> RateLimitedExecutor {
    RateLimitedExecutor::new(Duration::from_millis(spacing_ms), RetryPolicy::default())
}

#[tokio::test(start_paused = true)]
async fn server_errors_back_off_exponentially() {
    let exec = executor(0);
    let backend = FakeBackend::new(Duration::ZERO, 11);
    backend.script([
        Err(BackendError::Server { status: 503, message: "down".into() }),
        Err(BackendError::Transport("reset".into())),
    ]);
    let start = Instant::now();
    assert_eq!(exec.execute(backend.fetcher(), opts(3)).await, Ok(11));
    // 1s after the first failure, 2s after the second.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert_eq!(backend.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn attempts_are_capped() {
    let exec = executor(0);
    let backend = FakeBackend::new(Duration::ZERO, 0);
    let fail = || Err(BackendError::Server { status: 500, message: "boom".into() });
    backend.script([fail(), fail(), fail(), fail()]);
    let res = exec.execute(backend.fetcher(), opts(3)).await;
    assert!(matches!(res, Err(CacheError::Backend(BackendError::Server { status: 500, .. }))));
    assert_eq!(backend.calls(), 3);
    assert_eq!(exec.stats().retries, 2);
}

#[tokio::test(start_paused = true)]
async fn retry_after_takes_precedence_over_backoff() {
    let exec = executor(0);
    let backend = FakeBackend::new(Duration::ZERO, 1);
    backend.script([
        Err(BackendError::from_status(429, "slow down", Some(Duration::from_secs(7)))),
        Err(BackendError::Server { status: 503, message: "down".into() }),
    ]);
    let start = Instant::now();
    assert_eq!(exec.execute(backend.fetcher(), opts(3)).await, Ok(1));
    // 7s retry-after, then the regular 2s backoff for the second failure.
    assert_eq!(start.elapsed(), Duration::from_secs(9));
    assert_eq!(exec.stats().throttled, 1);
}

#[tokio::test(start_paused = true)]
async fn throttle_without_retry_after_waits_default() {
    let exec = executor(0);
    let backend = FakeBackend::new(Duration::ZERO, 1);
    backend.script([Err(BackendError::Throttled { retry_after_ms: None })]);
    let start = Instant::now();
    assert_eq!(exec.execute(backend.fetcher(), opts(2)).await, Ok(1));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_respect_minimum_spacing() {
    let exec = Arc::new(executor(100));
    let starts = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..5 {
        let exec = Arc::clone(&exec);
        let starts = Arc::clone(&starts);
        handles.push(tokio::spawn(async move {
            exec.execute(
                move || {
                    starts.lock().push(Instant::now());
                    std::future::ready(Ok::<_, BackendError>(()))
                },
                opts(1),
            )
            .await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    let mut starts = starts.lock().clone();
    starts.sort();
    for pair in starts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(100));
    }
}

#[tokio::test(start_paused = true)]
async fn cache_get_applies_retry_settings() {
    let settings = CacheSettings { backoff_base_ms: 500, ..common::settings() };
    let cache = common::cache_with(settings, RuleSet::new(), Arc::new(adaptcache::telemetry::NullSink));
    let backend = FakeBackend::new(Duration::ZERO, 4);
    backend.script([Err(BackendError::Server { status: 503, message: "down".into() })]);
    let start = Instant::now();
    let got = cache
        .get("teams|id=1", &CacheContext::default(), GetOptions::default().with_strategy(Strategy::NetworkFirst), backend.fetcher())
        .await;
    assert_eq!(got, Ok(4));
    assert_eq!(start.elapsed(), Duration::from_millis(500));
    assert_eq!(cache.executor_stats().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_backend_times_out() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::from_secs(5), 1);
    let opts = GetOptions::default()
        .with_strategy(Strategy::NetworkOnly)
        .with_timeout(Duration::from_secs(1))
        .with_retry_attempts(1);
    let got = cache.get("odds|game=2", &CacheContext::default(), opts, backend.fetcher()).await;
    assert_eq!(got, Err(CacheError::Timeout { timeout_ms: 1000 }));
}
