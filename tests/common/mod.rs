#![allow(dead_code)]

use adaptcache::telemetry::{MetricsSink, NullSink};
use adaptcache::{AdaptiveCache, BackendError, CacheSettings, RuleSet};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<u32, BackendError>> + Send>>;

/// Scriptable stand-in for the document store. Each call pops the next scripted
/// outcome; with the script empty it answers `Ok(default)`.
pub struct FakeBackend {
    calls: AtomicU32,
    latency: Duration,
    default: u32,
    script: Mutex<VecDeque<Result<u32, BackendError>>>,
}

impl FakeBackend {
    pub fn new(latency: Duration, default: u32) -> Arc<Self> {
        Arc::new(Self { calls: AtomicU32::new(0), latency, default, script: Mutex::new(VecDeque::new()) })
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Result<u32, BackendError>>) {
        self.script.lock().extend(outcomes);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetcher(self: &Arc<Self>) -> impl FnMut() -> FetchFuture + Send + 'static {
        let me = Arc::clone(self);
        move || {
            let me = Arc::clone(&me);
            Box::pin(async move {
                me.calls.fetch_add(1, Ordering::SeqCst);
                if !me.latency.is_zero() {
                    tokio::time::sleep(me.latency).await;
                }
                let next = me.script.lock().pop_front();
                next.unwrap_or(Ok(me.default))
            })
        }
    }
}

pub fn settings() -> CacheSettings {
    CacheSettings { min_request_spacing_ms: 0, ..CacheSettings::default() }
}

pub fn cache_with(settings: CacheSettings, rules: RuleSet, sink: Arc<dyn MetricsSink>) -> AdaptiveCache {
    AdaptiveCache::builder().settings(settings).rules(rules).sink(sink).build().unwrap()
}

pub fn cache() -> AdaptiveCache {
    cache_with(settings(), RuleSet::new(), Arc::new(NullSink))
}
