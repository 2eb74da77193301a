use crate::cache::{CacheEntry, CacheStore, EntryMeta, PutOutcome, StoreMetricsSnapshot};
use crate::coalesce::{Coalescer, Role};
use crate::codec::{IdentityCodec, PayloadCodec};
use crate::config::{CacheConfig, CacheSettings, ConfigTable};
use crate::context::{Adjustment, CacheContext};
use crate::daemon::{self, DaemonHandle};
use crate::errors::{BackendError, CacheError};
use crate::executor::{ExecuteOptions, ExecutorStats, RateLimitedExecutor, RetryPolicy};
use crate::persistence::{PersistedEntry, PersistenceHook};
use crate::rules::RuleSet;
use crate::strategy::{Decision, ResolveInput, Resolution, resolve};
use crate::telemetry::{KeySummary, LogSink, LookupPath, MetricsRecorder, MetricsSink, Outcome, SlowThresholds, Snapshot};
use crate::types::Strategy;
use crate::utils::num::{duration_ms, usize_to_u64};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Per-call overrides for [`AdaptiveCache::get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Replaces the pattern-table config for this call.
    pub config: Option<CacheConfig>,
    /// Replaces `base_ttl` before multipliers apply.
    pub custom_ttl: Option<Duration>,
    /// Replaces the config strategy. Rule and context overrides still take precedence.
    pub strategy: Option<Strategy>,
    /// Skip the store entirely: no read, no write-back.
    pub disable_cache: bool,
    pub disable_metrics: bool,
    pub timeout: Option<Duration>,
    /// Total backend attempts.
    pub retry_attempts: Option<u32>,
}

impl GetOptions {
    #[must_use]
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[must_use]
    pub const fn with_custom_ttl(mut self, ttl: Duration) -> Self {
        self.custom_ttl = Some(ttl);
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    #[must_use]
    pub const fn without_cache(mut self) -> Self {
        self.disable_cache = true;
        self
    }

    #[must_use]
    pub const fn without_metrics(mut self) -> Self {
        self.disable_metrics = true;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = Some(attempts);
        self
    }
}

/// How one key would be served right now, without touching the backend.
#[derive(Debug, Clone, Serialize)]
pub struct Explanation {
    pub key: String,
    pub pattern: Option<String>,
    pub config: CacheConfig,
    pub strategy: Strategy,
    pub ttl_multiplier: f64,
    pub effective_ttl_ms: u64,
    pub rules: Vec<String>,
    pub compress: bool,
    pub evict_on_sweep: bool,
    pub cached_age_ms: Option<u64>,
    pub decision: &'static str,
    pub grace_applied: bool,
}

/// Payload bytes shared between a leader and its waiters.
#[derive(Clone)]
struct Fetched {
    raw: Arc<[u8]>,
    from_cache: bool,
}

type Shared = Result<Fetched, CacheError>;

/// Everything the leader needs once it is detached from the caller.
struct FetchPlan {
    key: String,
    config: CacheConfig,
    adjustment: Adjustment,
    context: CacheContext,
    custom_ttl: Option<Duration>,
    strategy: Strategy,
    write_back: bool,
    effective_ttl: Duration,
    exec: ExecuteOptions,
}

struct Inner {
    settings: CacheSettings,
    table: ConfigTable,
    rules: RuleSet,
    store: Arc<CacheStore>,
    coalescer: Coalescer<Shared>,
    executor: RateLimitedExecutor,
    metrics: Arc<MetricsRecorder>,
    entry_codec: Arc<dyn PayloadCodec>,
    compression: Arc<dyn PayloadCodec>,
    persistence: Option<Arc<dyn PersistenceHook>>,
}

/// Adaptive cache in front of a backend. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct AdaptiveCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AdaptiveCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveCache")
            .field("entries", &self.inner.store.len())
            .field("rules", &self.inner.rules.len())
            .field("entry_codec", &self.inner.entry_codec.name())
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct AdaptiveCacheBuilder {
    settings: Option<CacheSettings>,
    rules: RuleSet,
    sink: Option<Arc<dyn MetricsSink>>,
    entry_codec: Option<Arc<dyn PayloadCodec>>,
    compression: Option<Arc<dyn PayloadCodec>>,
    persistence: Option<Arc<dyn PersistenceHook>>,
}

impl AdaptiveCacheBuilder {
    #[must_use]
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    /// Metrics sink; defaults to [`LogSink`].
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Codec applied to every stored payload.
    #[must_use]
    pub fn entry_codec(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.entry_codec = Some(codec);
        self
    }

    /// Codec applied to payloads a rule marks for compression.
    #[must_use]
    pub fn compression(mut self, codec: Arc<dyn PayloadCodec>) -> Self {
        self.compression = Some(codec);
        self
    }

    #[must_use]
    pub fn persistence(mut self, hook: Arc<dyn PersistenceHook>) -> Self {
        self.persistence = Some(hook);
        self
    }

    /// # Errors
    /// Returns `CacheError::Config` when the settings fail validation.
    pub fn build(self) -> Result<AdaptiveCache, CacheError> {
        let settings = self.settings.unwrap_or_default();
        settings.validate()?;
        let thresholds = SlowThresholds { cache: settings.slow_lookup(), backend: settings.slow_fetch() };
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));
        let policy = RetryPolicy {
            backoff_base: settings.backoff_base(),
            throttle_default_wait: settings.throttle_default_wait(),
        };
        let inner = Inner {
            table: settings.table(),
            rules: self.rules,
            store: Arc::new(CacheStore::new(settings.store.clone())),
            coalescer: Coalescer::new(),
            executor: RateLimitedExecutor::new(settings.min_request_spacing(), policy),
            metrics: Arc::new(MetricsRecorder::new(settings.metrics_ring_capacity, thresholds, sink)),
            entry_codec: self.entry_codec.unwrap_or_else(|| Arc::new(IdentityCodec)),
            compression: self.compression.unwrap_or_else(|| Arc::new(IdentityCodec)),
            persistence: self.persistence,
            settings,
        };
        log::info!(
            "adaptive cache ready: {} patterns, {} rules, max {} entries / {} bytes",
            inner.table.patterns().count(),
            inner.rules.len(),
            inner.settings.store.max_entries,
            inner.settings.store.max_bytes
        );
        Ok(AdaptiveCache { inner: Arc::new(inner) })
    }
}

impl AdaptiveCache {
    #[must_use]
    pub fn builder() -> AdaptiveCacheBuilder {
        AdaptiveCacheBuilder::default()
    }

    /// Cache with default settings, no rules and the log sink.
    ///
    /// # Errors
    /// See [`AdaptiveCacheBuilder::build`].
    pub fn with_settings(settings: CacheSettings) -> Result<Self, CacheError> {
        Self::builder().settings(settings).build()
    }

    /// Fetches `key`, serving from the store when the resolved strategy allows it and
    /// otherwise calling `fetch` through the coalescer and the rate-limited executor.
    /// Concurrent misses for one key share a single backend call; its outcome, value or
    /// error, reaches every caller.
    ///
    /// # Errors
    /// `NotFound` for a cache-only miss, the backend error after retries, `Timeout`,
    /// or `Serialization` when the payload does not match `T`.
    pub async fn get<T, F, Fut>(&self, key: &str, ctx: &CacheContext, opts: GetOptions, fetch: F) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BackendError>> + Send + 'static,
    {
        let start = Instant::now();
        let inner = &self.inner;
        let config = opts.config.clone().unwrap_or_else(|| inner.table.lookup(key).clone());
        let adjustment = inner.rules.evaluate(key, ctx, &config);
        let entry = if opts.disable_cache { None } else { inner.store.get(key) };
        let resolution = {
            let input = ResolveInput {
                config: &config,
                adjustment: &adjustment,
                context: ctx,
                custom_ttl: opts.custom_ttl,
                ttl_floor: inner.settings.ttl_floor(),
                strategy: opts.strategy,
                disable_cache: opts.disable_cache,
            };
            resolve(&input, entry.as_ref(), start)
        };

        let write_back = match (resolution.decision, entry.as_ref()) {
            (Decision::Hit, Some(e)) => match inner.decode(e) {
                Ok(raw) => {
                    if resolution.grace_applied {
                        log::debug!("serving {key} from grace window under high load");
                    }
                    let value = serde_json::from_slice::<T>(&raw);
                    let outcome = if value.is_ok() { Outcome::Hit } else { Outcome::Error };
                    self.observe(key, &opts, &config, outcome, LookupPath::Cache, start);
                    return Ok(value?);
                }
                Err(e) if resolution.strategy == Strategy::CacheOnly => {
                    self.observe(key, &opts, &config, Outcome::Error, LookupPath::Cache, start);
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("discarding undecodable entry for {key}: {e}");
                    true
                }
            },
            (Decision::Miss { write_back }, _) => write_back,
            (Decision::NotFound, _) | (Decision::Hit, None) => {
                self.observe(key, &opts, &config, Outcome::NotFound, LookupPath::Cache, start);
                return Err(CacheError::NotFound(key.to_owned()));
            }
        };

        let plan = FetchPlan {
            key: key.to_owned(),
            config: config.clone(),
            adjustment,
            context: *ctx,
            custom_ttl: opts.custom_ttl,
            strategy: resolution.strategy,
            write_back,
            effective_ttl: resolution.effective_ttl,
            exec: ExecuteOptions {
                timeout: opts.timeout.unwrap_or_else(|| inner.settings.request_timeout()),
                retry_attempts: opts.retry_attempts.unwrap_or(inner.settings.retry_attempts),
            },
        };
        let work = lead(Arc::clone(inner), plan, fetch);
        let (shared, role) = inner.coalescer.run(key, work, || Err(CacheError::FetchAborted)).await;
        if role == Role::Waiter {
            log::trace!("{key}: served by coalesced fetch");
        }

        match shared {
            Ok(fetched) => {
                let outcome = if fetched.from_cache { Outcome::Hit } else { Outcome::Miss };
                let path = if fetched.from_cache { LookupPath::Cache } else { LookupPath::Backend };
                self.observe(key, &opts, &config, outcome, path, start);
                Ok(serde_json::from_slice::<T>(&fetched.raw)?)
            }
            Err(e) => {
                self.observe(key, &opts, &config, Outcome::Error, LookupPath::Backend, start);
                Err(e)
            }
        }
    }

    fn observe(&self, key: &str, opts: &GetOptions, config: &CacheConfig, outcome: Outcome, path: LookupPath, start: Instant) {
        if !opts.disable_metrics {
            self.inner.metrics.record(key, outcome, path, start.elapsed(), config.cost_weight);
        }
    }

    /// Removes entries whose key contains `pattern`; `None` clears the store.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        let n = self.inner.store.invalidate(pattern);
        log::debug!("invalidated {n} entries (pattern {pattern:?})");
        n
    }

    #[cfg(feature = "regex")]
    pub fn invalidate_matching(&self, re: &regex::Regex) -> usize {
        self.inner.store.invalidate_matching(re)
    }

    #[must_use]
    pub fn stats(&self) -> Snapshot {
        self.inner.metrics.snapshot()
    }

    #[must_use]
    pub fn store_stats(&self) -> StoreMetricsSnapshot {
        self.inner.store.metrics_snapshot()
    }

    #[must_use]
    pub fn executor_stats(&self) -> ExecutorStats {
        self.inner.executor.stats()
    }

    #[must_use]
    pub fn key_summary(&self, key: &str) -> Option<KeySummary> {
        self.inner.metrics.key_summary(key)
    }

    /// Request counters followed by store gauges, in exposition format.
    #[must_use]
    pub fn metrics_text(&self) -> String {
        let s = self.store_stats();
        let mut out = self.inner.metrics.metrics_text();
        out.push_str(&format!(
            "adaptcache_store_entries {}\n\
             adaptcache_store_bytes {}\n\
             adaptcache_store_capacity_evictions_total {}\n\
             adaptcache_store_ttl_evictions_total {}\n\
             adaptcache_in_flight {}\n",
            self.inner.store.len(),
            s.memory_bytes,
            s.capacity_evictions,
            s.ttl_evictions,
            self.in_flight(),
        ));
        out
    }

    /// Keys with a backend fetch currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.coalescer.in_flight()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    #[must_use]
    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    #[must_use]
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Resolves config, rules and strategy for `key` under `ctx` against the current
    /// store contents.
    #[must_use]
    pub fn explain(&self, key: &str, ctx: &CacheContext, config: Option<&CacheConfig>) -> Explanation {
        let inner = &self.inner;
        let pattern = inner.table.lookup_pattern(key).map(|p| p.pattern.clone());
        let config = config.cloned().unwrap_or_else(|| inner.table.lookup(key).clone());
        let adjustment = inner.rules.evaluate(key, ctx, &config);
        let entry = inner.store.get(key);
        let now = Instant::now();
        let input = ResolveInput {
            config: &config,
            adjustment: &adjustment,
            context: ctx,
            custom_ttl: None,
            ttl_floor: inner.settings.ttl_floor(),
            strategy: None,
            disable_cache: false,
        };
        let Resolution { strategy, decision, effective_ttl, grace_applied } = resolve(&input, entry.as_ref(), now);
        Explanation {
            key: key.to_owned(),
            pattern,
            strategy,
            ttl_multiplier: adjustment.ttl_multiplier,
            effective_ttl_ms: duration_ms(effective_ttl),
            rules: adjustment.applied.iter().map(ToString::to_string).collect(),
            compress: adjustment.compress,
            evict_on_sweep: adjustment.evict,
            cached_age_ms: entry.map(|e| duration_ms(e.age(now))),
            decision: match decision {
                Decision::Hit => "hit",
                Decision::Miss { write_back: true } => "fetch-and-store",
                Decision::Miss { write_back: false } => "fetch",
                Decision::NotFound => "not-found",
            },
            grace_applied,
            config,
        }
    }

    /// Starts the sweep and summary loops on the current runtime.
    #[must_use]
    pub fn start_daemon(&self) -> DaemonHandle {
        daemon::spawn(
            Arc::clone(&self.inner.store),
            Arc::clone(&self.inner.metrics),
            self.inner.settings.sweep_interval(),
            self.inner.settings.summary_interval(),
        )
    }

    /// Loads entries from the persistence hook, skipping expired ones. Returns how many
    /// were stored; 0 without a hook.
    ///
    /// # Errors
    /// Propagates the hook's load error.
    pub fn restore(&self) -> Result<usize, CacheError> {
        let Some(hook) = self.inner.persistence.as_ref() else { return Ok(0) };
        let wall_now = Utc::now();
        let now = Instant::now();
        let mut live: Vec<(Duration, PersistedEntry)> = hook
            .load()?
            .into_iter()
            .filter(|p| !p.is_expired_at(wall_now))
            .map(|p| (p.age_at(wall_now), p))
            .collect();
        // Oldest first, so store order stays sorted by `stored_at`.
        live.sort_by(|a, b| b.0.cmp(&a.0));
        let mut stored = 0usize;
        for (age, p) in live {
            let meta = EntryMeta { strategy: p.strategy, compressed: p.compressed, evict_on_sweep: false };
            let stored_at = now.checked_sub(age).unwrap_or(now);
            let entry = CacheEntry::new(p.key, Arc::from(p.payload), Duration::from_millis(p.ttl_ms), meta, stored_at);
            if matches!(self.inner.store.put_entry(entry), PutOutcome::Stored { .. }) {
                stored += 1;
            }
        }
        log::info!("restored {stored} cache entries");
        Ok(stored)
    }

    /// Hands every unexpired entry to the persistence hook. Returns how many were saved;
    /// 0 without a hook.
    ///
    /// # Errors
    /// Propagates the hook's save error.
    pub fn persist(&self) -> Result<usize, CacheError> {
        let Some(hook) = self.inner.persistence.as_ref() else { return Ok(0) };
        let now = Instant::now();
        let saved_at = Utc::now();
        let entries: Vec<PersistedEntry> = self
            .inner
            .store
            .entries()
            .into_iter()
            .filter(|e| !e.is_expired(now) && !e.meta().evict_on_sweep)
            .map(|e| PersistedEntry {
                key: e.key().to_owned(),
                payload: e.value().to_vec(),
                ttl_ms: duration_ms(e.ttl()),
                age_ms: duration_ms(e.age(now)),
                strategy: e.strategy_at_write(),
                compressed: e.meta().compressed,
                saved_at,
            })
            .collect();
        hook.save(&entries)?;
        Ok(entries.len())
    }
}

impl Inner {
    fn encode(&self, raw: &[u8], compress: bool) -> Result<Vec<u8>, CacheError> {
        if compress {
            self.entry_codec.encode(&self.compression.encode(raw)?)
        } else {
            self.entry_codec.encode(raw)
        }
    }

    fn decode(&self, entry: &CacheEntry) -> Result<Vec<u8>, CacheError> {
        let bytes = self.entry_codec.decode(entry.value())?;
        if entry.meta().compressed { self.compression.decode(&bytes) } else { Ok(bytes) }
    }

    fn write_back(&self, plan: &FetchPlan, raw: &[u8]) {
        let encoded = match self.encode(raw, plan.adjustment.compress) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("not caching {}: {e}", plan.key);
                return;
            }
        };
        let meta = EntryMeta {
            strategy: plan.strategy,
            compressed: plan.adjustment.compress,
            evict_on_sweep: plan.adjustment.evict,
        };
        match self.store.put(plan.key.as_str(), Arc::from(encoded), plan.effective_ttl, meta) {
            PutOutcome::Stored { evicted } if evicted > 0 => {
                log::debug!("stored {} (ttl {:?}); evicted {evicted} older entries", plan.key, plan.effective_ttl);
            }
            PutOutcome::Stored { .. } => {}
            PutOutcome::Rejected => {
                log::debug!("{} ({} bytes) larger than the store budget", plan.key, usize_to_u64(raw.len()));
            }
        }
    }

    /// Entry written since the caller's own lookup, if it now satisfies the strategy.
    fn recheck(&self, plan: &FetchPlan) -> Option<Arc<[u8]>> {
        if !plan.strategy.may_use_cache() {
            return None;
        }
        let entry = self.store.get(&plan.key)?;
        let input = ResolveInput {
            config: &plan.config,
            adjustment: &plan.adjustment,
            context: &plan.context,
            custom_ttl: plan.custom_ttl,
            ttl_floor: self.settings.ttl_floor(),
            strategy: Some(plan.strategy),
            disable_cache: false,
        };
        match resolve(&input, Some(&entry), Instant::now()).decision {
            Decision::Hit => self.decode(&entry).ok().map(Arc::from),
            _ => None,
        }
    }
}

/// Leader side of a coalesced miss: re-check, fetch, write back. Runs on its own task.
async fn lead<T, F, Fut>(inner: Arc<Inner>, plan: FetchPlan, fetch: F) -> Shared
where
    T: Serialize,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    if let Some(raw) = inner.recheck(&plan) {
        return Ok(Fetched { raw, from_cache: true });
    }
    let value = inner.executor.execute(fetch, plan.exec).await?;
    let raw: Arc<[u8]> = Arc::from(serde_json::to_vec(&value)?);
    if plan.write_back {
        inner.write_back(&plan, &raw);
    }
    Ok(Fetched { raw, from_cache: false })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BackendLoad;
    use crate::rules::{OptimizationRule, RuleAction};
    use crate::telemetry::NullSink;
    use crate::types::Priority;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn cache(rules: RuleSet) -> AdaptiveCache {
        AdaptiveCache::builder()
            .settings(CacheSettings { min_request_spacing_ms: 0, ..CacheSettings::default() })
            .rules(rules)
            .sink(Arc::new(NullSink))
            .build()
            .unwrap()
    }

    fn counting(calls: &Arc<AtomicU32>, value: u32) -> impl FnMut() -> std::future::Ready<Result<u32, BackendError>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok(value))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn compressed_entries_round_trip_through_codecs() {
        let rules = RuleSet::new().with(OptimizationRule::for_keys_containing("zip-history", "historical", RuleAction::Compress));
        let c = cache(rules);
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CacheContext::default();
        assert_eq!(c.get("historical|season=1999", &ctx, GetOptions::default(), counting(&calls, 7)).await, Ok(7));
        assert!(c.store().get("historical|season=1999").is_some_and(|e| e.meta().compressed));
        assert_eq!(c.get("historical|season=1999", &ctx, GetOptions::default(), counting(&calls, 8)).await, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_cache_bypasses_store() {
        let c = cache(RuleSet::new());
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CacheContext::default();
        let opts = GetOptions::default().without_cache();
        c.get("teams|id=1", &ctx, opts.clone(), counting(&calls, 1)).await.unwrap();
        c.get("teams|id=1", &ctx, opts, counting(&calls, 1)).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(c.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn explain_reports_rules_and_decision() {
        let c = cache(RuleSet::new());
        let ctx = CacheContext::builder().load(BackendLoad::High).build();
        let ex = c.explain("teams|id=4", &ctx, None);
        assert_eq!(ex.pattern.as_deref(), Some("teams"));
        assert_eq!(ex.strategy, Strategy::CacheFirst);
        assert_eq!(ex.rules, vec!["high-load".to_string()]);
        assert_eq!(ex.effective_ttl_ms, 4_320_000);
        assert_eq!(ex.decision, "fetch-and-store");
        assert_eq!(ex.config.priority, Priority::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn metrics_can_be_disabled_per_call() {
        let c = cache(RuleSet::new());
        let calls = Arc::new(AtomicU32::new(0));
        c.get("teams|id=9", &CacheContext::default(), GetOptions::default().without_metrics(), counting(&calls, 1))
            .await
            .unwrap();
        assert_eq!(c.stats().total_requests, 0);
        c.get("teams|id=9", &CacheContext::default(), GetOptions::default(), counting(&calls, 1)).await.unwrap();
        assert_eq!(c.stats().hits, 1);
        assert!(c.metrics_text().contains("adaptcache_store_entries 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn payload_type_mismatch_on_hit_counts_as_error() {
        let c = cache(RuleSet::new());
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CacheContext::default();
        c.get("teams|id=5", &ctx, GetOptions::default(), counting(&calls, 3)).await.unwrap();
        let fetch = || std::future::ready(Ok::<_, BackendError>(String::from("unused")));
        let res = c.get::<String, _, _>("teams|id=5", &ctx, GetOptions::default(), fetch).await;
        assert!(matches!(res, Err(CacheError::Serialization(_))));
        let stats = c.stats();
        assert_eq!((stats.hits, stats.errors), (0, 1));
    }

    #[cfg(feature = "regex")]
    #[tokio::test(start_paused = true)]
    async fn invalidate_matching_leaves_other_keys() {
        let c = cache(RuleSet::new());
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CacheContext::default();
        for key in ["players|id=1", "players|id=22", "teams|id=1"] {
            c.get(key, &ctx, GetOptions::default(), counting(&calls, 1)).await.unwrap();
        }
        let re = regex::Regex::new(r"^players\|id=\d{2}$").unwrap();
        assert_eq!(c.invalidate_matching(&re), 1);
        assert_eq!(c.len(), 2);
        assert!(c.store().get("players|id=22").is_none());
    }
}
