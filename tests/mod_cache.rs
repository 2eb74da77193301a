mod common;

use adaptcache::{
    BackendError, BackendLoad, CacheConfig, CacheContext, CacheError, CallerTier, GetOptions, Priority, Strategy,
};
use common::FakeBackend;
use std::time::Duration;
use tokio::time::{advance, sleep};

fn cfg(strategy: Strategy, ttl_secs: u64) -> GetOptions {
    GetOptions::default().with_config(CacheConfig::new(strategy, Duration::from_secs(ttl_secs), Priority::Medium))
}

#[tokio::test(start_paused = true)]
async fn cache_first_miss_hit_then_refetch_after_ttl() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    let key = "teams|id=12";

    assert_eq!(cache.get(key, &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await, Ok(1));
    assert_eq!(backend.calls(), 1);

    advance(Duration::from_secs(5)).await;
    assert_eq!(cache.get(key, &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await, Ok(1));
    assert_eq!(backend.calls(), 1);

    advance(Duration::from_secs(6)).await;
    backend.script([Ok(2)]);
    assert_eq!(cache.get(key, &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await, Ok(2));
    assert_eq!(backend.calls(), 2);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses), (1, 2));
}

#[tokio::test(start_paused = true)]
async fn expiry_boundary_is_exclusive() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    cache.get("k", &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await.unwrap();

    advance(Duration::from_millis(9_999)).await;
    cache.get("k", &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 1);

    advance(Duration::from_millis(2)).await;
    cache.get("k", &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_misses_share_one_backend_call() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::from_millis(50), 42);
    let ctx = CacheContext::default();
    let mut handles = Vec::new();
    for _ in 0..10 {
        let cache = cache.clone();
        let fetch = backend.fetcher();
        handles.push(tokio::spawn(async move {
            cache.get("games|week=3", &ctx, cfg(Strategy::NetworkFirst, 60), fetch).await
        }));
    }
    for h in handles {
        assert_eq!(h.await.unwrap(), Ok(42));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(cache.stats().misses, 10);
}

#[tokio::test(start_paused = true)]
async fn backend_errors_reach_every_waiter() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::from_millis(20), 0);
    backend.script([Err(BackendError::Client { status: 403, message: "forbidden".into() })]);
    let ctx = CacheContext::default();
    let mut handles = Vec::new();
    for _ in 0..5 {
        let cache = cache.clone();
        let fetch = backend.fetcher();
        handles.push(tokio::spawn(async move {
            cache.get("odds|game=7", &ctx, cfg(Strategy::NetworkFirst, 60), fetch).await
        }));
    }
    for h in handles {
        assert!(matches!(
            h.await.unwrap(),
            Err(CacheError::Backend(BackendError::Client { status: 403, .. }))
        ));
    }
    assert_eq!(backend.calls(), 1);
    assert_eq!(cache.stats().errors, 5);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn network_first_surfaces_errors_instead_of_stale_data() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    let opts = cfg(Strategy::NetworkFirst, 60).with_retry_attempts(1);
    cache.get("odds|game=1", &ctx, opts.clone(), backend.fetcher()).await.unwrap();
    backend.script([Err(BackendError::Server { status: 502, message: "bad gateway".into() })]);
    let res = cache.get("odds|game=1", &ctx, opts, backend.fetcher()).await;
    assert!(matches!(res, Err(CacheError::Backend(BackendError::Server { status: 502, .. }))));
}

#[tokio::test(start_paused = true)]
async fn cache_only_never_fetches() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 5);
    let ctx = CacheContext::default();
    let res = cache.get("players|id=1", &ctx, cfg(Strategy::CacheOnly, 10), backend.fetcher()).await;
    assert_eq!(res, Err(CacheError::NotFound("players|id=1".into())));
    assert_eq!(backend.calls(), 0);

    cache.get("players|id=1", &ctx, cfg(Strategy::CacheFirst, 10), backend.fetcher()).await.unwrap();
    advance(Duration::from_secs(30)).await;
    // Expired but not yet swept: cache-only still serves it.
    let res = cache.get("players|id=1", &ctx, cfg(Strategy::CacheOnly, 10), backend.fetcher()).await;
    assert_eq!(res, Ok(5));
    assert_eq!(backend.calls(), 1);
    assert_eq!(cache.stats().not_found, 1);
}

#[tokio::test(start_paused = true)]
async fn network_only_never_writes() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 3);
    let ctx = CacheContext::default();
    for _ in 0..3 {
        cache.get("live_scores|game=9", &ctx, cfg(Strategy::NetworkOnly, 30), backend.fetcher()).await.unwrap();
    }
    assert_eq!(backend.calls(), 3);
    assert!(cache.store().get("live_scores|game=9").is_none());
}

#[tokio::test(start_paused = true)]
async fn invalidate_is_scoped_by_substring() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    for key in ["games|week=1", "games|week=2", "teams|id=1"] {
        cache.get(key, &ctx, cfg(Strategy::CacheFirst, 600), backend.fetcher()).await.unwrap();
    }
    assert_eq!(cache.invalidate(Some("games")), 2);
    assert!(cache.store().get("teams|id=1").is_some());
    assert!(cache.store().get("games|week=1").is_none());
    assert_eq!(cache.invalidate(None), 1);
    assert!(cache.is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_back_ttl_never_drops_below_floor() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::builder().live_event(true).tier(CallerTier::Premium).build();
    let opts = cfg(Strategy::CacheFirst, 60).with_custom_ttl(Duration::from_secs(2));
    cache.get("standings|conf=nfc", &ctx, opts, backend.fetcher()).await.unwrap();
    let entry = cache.store().get("standings|conf=nfc").unwrap();
    assert_eq!(entry.ttl(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn zero_custom_ttl_still_serves_from_cache() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    let opts = cfg(Strategy::CacheFirst, 60).with_custom_ttl(Duration::ZERO);
    cache.get("teams|id=30", &ctx, opts.clone(), backend.fetcher()).await.unwrap();
    advance(Duration::from_millis(1)).await;
    cache.get("teams|id=30", &ctx, opts, backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 1);
    assert_eq!(cache.store().get("teams|id=30").unwrap().ttl(), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn adaptive_grace_is_bounded_and_not_renewed() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let loaded = CacheContext::builder().load(BackendLoad::High).build();
    let key = "games|week=5";
    // effective ttl 100s x 1.2 = 120s; grace window 180s from the write.
    cache.get(key, &loaded, cfg(Strategy::Adaptive, 100), backend.fetcher()).await.unwrap();

    let mut elapsed = 0u64;
    for at in [150u64, 170, 179] {
        advance(Duration::from_secs(at - elapsed)).await;
        elapsed = at;
        cache.get(key, &loaded, cfg(Strategy::Adaptive, 100), backend.fetcher()).await.unwrap();
        assert_eq!(backend.calls(), 1, "grace hit at {at}s");
    }

    advance(Duration::from_secs(2)).await;
    cache.get(key, &loaded, cfg(Strategy::Adaptive, 100), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2, "grace window ends at 180s");
}

#[tokio::test(start_paused = true)]
async fn adaptive_without_load_has_no_grace() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    cache.get("games|week=6", &ctx, cfg(Strategy::Adaptive, 100), backend.fetcher()).await.unwrap();
    advance(Duration::from_secs(101)).await;
    cache.get("games|week=6", &ctx, cfg(Strategy::Adaptive, 100), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn critical_live_keys_always_refetch() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::builder().live_event(true).load(BackendLoad::High).build();
    let opts = GetOptions::default()
        .with_config(CacheConfig::new(Strategy::Adaptive, Duration::from_secs(600), Priority::Critical));
    cache.get("live_scores|game=1", &ctx, opts.clone(), backend.fetcher()).await.unwrap();
    cache.get("live_scores|game=1", &ctx, opts, backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn per_call_strategy_cannot_cache_critical_live_keys() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::builder().live_event(true).build();
    let opts = GetOptions::default()
        .with_config(CacheConfig::new(Strategy::Adaptive, Duration::from_secs(600), Priority::Critical))
        .with_strategy(Strategy::CacheFirst);
    cache.get("live_scores|game=4", &ctx, opts.clone(), backend.fetcher()).await.unwrap();
    advance(Duration::from_millis(1)).await;
    cache.get("live_scores|game=4", &ctx, opts, backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn caller_giving_up_does_not_cancel_fetch() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::from_millis(200), 9);
    let ctx = CacheContext::default();
    let gave_up = tokio::time::timeout(
        Duration::from_millis(10),
        cache.get("teams|id=77", &ctx, cfg(Strategy::CacheFirst, 600), backend.fetcher()),
    )
    .await;
    assert!(gave_up.is_err());
    sleep(Duration::from_millis(300)).await;
    assert!(cache.store().get("teams|id=77").is_some());
    assert_eq!(cache.in_flight(), 0);

    let again = cache.get("teams|id=77", &ctx, cfg(Strategy::CacheFirst, 600), backend.fetcher()).await;
    assert_eq!(again, Ok(9));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn pattern_table_drives_strategy() {
    let cache = common::cache();
    let backend = FakeBackend::new(Duration::ZERO, 1);
    let ctx = CacheContext::default();
    // `odds` is network-first in the default table.
    cache.get("odds|game=3", &ctx, GetOptions::default(), backend.fetcher()).await.unwrap();
    cache.get("odds|game=3", &ctx, GetOptions::default(), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 2);
    // `historical` is cache-first for a day.
    cache.get("historical|season=2001", &ctx, GetOptions::default(), backend.fetcher()).await.unwrap();
    cache.get("historical|season=2001", &ctx, GetOptions::default(), backend.fetcher()).await.unwrap();
    assert_eq!(backend.calls(), 3);
    let summary = cache.key_summary("historical|season=2001").unwrap();
    assert_eq!((summary.hits, summary.misses), (1, 1));
    assert!((cache.stats().estimated_cost_saved - 4.0).abs() < 1e-9);
}
