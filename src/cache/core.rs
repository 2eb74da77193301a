use crate::cache::config::StoreConfig;
use crate::cache::entry::{CacheEntry, EntryMeta};
use crate::cache::metrics::{StoreMetrics, StoreMetricsSnapshot};
use crate::cache::policy::{evict_oldest, purge_expired};
use crate::utils::num::usize_to_u64;
use lru::LruCache;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;

/// Outcome of a `put`. A rejected entry is larger than the whole byte budget; callers
/// still hold the fetched value, so this never surfaces as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored { evicted: usize },
    Rejected,
}

struct StoreInner {
    // Unbounded and only ever `peek`ed, so iteration order is write order.
    entries: LruCache<String, CacheEntry>,
    bytes: u64,
}

/// Thread-safe in-memory entry map with entry-count and byte bounds and oldest-first
/// capacity eviction. Reads share the lock; every mutation takes it exclusively.
pub struct CacheStore {
    inner: RwLock<StoreInner>,
    config: StoreConfig,
    metrics: Arc<StoreMetrics>,
}

impl CacheStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            inner: RwLock::new(StoreInner { entries: LruCache::unbounded(), bytes: 0 }),
            config,
            metrics: Arc::new(StoreMetrics::default()),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Lookup without any freshness judgement.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.read().entries.peek(key).cloned()
    }

    /// Inserts or replaces `key`, stamped with the current time.
    pub fn put(&self, key: impl Into<String>, value: Arc<[u8]>, ttl: Duration, meta: EntryMeta) -> PutOutcome {
        let entry = CacheEntry::new(key.into(), value, ttl, meta, Instant::now());
        self.put_entry(entry)
    }

    /// Inserts a prepared entry. Entries must arrive in non-decreasing `stored_at`
    /// order for oldest-first eviction to hold; `put` and the restore path guarantee it.
    pub fn put_entry(&self, entry: CacheEntry) -> PutOutcome {
        let start = Instant::now();
        let size = usize_to_u64(entry.size_bytes());
        if size > self.config.max_bytes {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "cache entry {} ({} bytes) exceeds store budget of {} bytes; not stored",
                entry.key(),
                size,
                self.config.max_bytes
            );
            return PutOutcome::Rejected;
        }
        let max_entries = self.config.max_entries.max(1);

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        if let Some(prev) = inner.entries.pop(entry.key()) {
            inner.bytes = inner.bytes.saturating_sub(usize_to_u64(prev.size_bytes()));
            self.metrics.replacements.fetch_add(1, Ordering::Relaxed);
        }

        let mut evicted_total = 0usize;
        while !inner.entries.is_empty()
            && (inner.entries.len() + 1 > max_entries || inner.bytes.saturating_add(size) > self.config.max_bytes)
        {
            let batch = self.config.eviction_batch(inner.entries.len());
            let (evicted, freed) = evict_oldest(&mut inner.entries, &self.metrics, batch);
            inner.bytes = inner.bytes.saturating_sub(freed);
            evicted_total += evicted;
            if evicted == 0 {
                break;
            }
        }

        inner.entries.put(entry.key().to_owned(), entry);
        inner.bytes = inner.bytes.saturating_add(size);
        self.metrics.memory_bytes.store(inner.bytes, Ordering::Relaxed);
        drop(guard);

        self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
        StoreMetrics::add_elapsed(&self.metrics.total_put_ns, start);
        PutOutcome::Stored { evicted: evicted_total }
    }

    /// Removes entries whose key contains `pattern`; `None` clears everything.
    /// Returns the number removed.
    pub fn invalidate(&self, pattern: Option<&str>) -> usize {
        match pattern {
            None => {
                let mut guard = self.inner.write();
                let n = guard.entries.len();
                guard.entries.clear();
                guard.bytes = 0;
                self.metrics.memory_bytes.store(0, Ordering::Relaxed);
                drop(guard);
                self.metrics.removes.fetch_add(usize_to_u64(n), Ordering::Relaxed);
                n
            }
            Some(p) => self.remove_where(|k| k.contains(p)),
        }
    }

    /// Removes entries whose key matches `re`.
    #[cfg(feature = "regex")]
    pub fn invalidate_matching(&self, re: &regex::Regex) -> usize {
        self.remove_where(|k| re.is_match(k))
    }

    fn remove_where(&self, pred: impl Fn(&str) -> bool) -> usize {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let doomed: Vec<String> = inner.entries.iter().filter(|(k, _)| pred(k)).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            if let Some(e) = inner.entries.pop(key) {
                inner.bytes = inner.bytes.saturating_sub(usize_to_u64(e.size_bytes()));
            }
        }
        self.metrics.memory_bytes.store(inner.bytes, Ordering::Relaxed);
        drop(guard);
        self.metrics.removes.fetch_add(usize_to_u64(doomed.len()), Ordering::Relaxed);
        doomed.len()
    }

    /// Drops every entry with `now > stored_at + ttl`. Returns the number evicted.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let start = Instant::now();
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let (count, freed) = purge_expired(&mut inner.entries, &self.metrics, now);
        inner.bytes = inner.bytes.saturating_sub(freed);
        self.metrics.memory_bytes.store(inner.bytes, Ordering::Relaxed);
        drop(guard);
        StoreMetrics::add_elapsed(&self.metrics.total_sweep_ns, start);
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.inner.read().bytes
    }

    /// All entries, oldest write first.
    #[must_use]
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.inner.read().entries.iter().rev().map(|(_, e)| e.clone()).collect()
    }

    #[must_use]
    pub fn metrics_snapshot(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }
}
