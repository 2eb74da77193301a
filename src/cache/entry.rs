use crate::types::Strategy;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Write-time metadata recorded alongside a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntryMeta {
    pub strategy: Strategy,
    pub compressed: bool,
    pub evict_on_sweep: bool,
}

impl EntryMeta {
    #[must_use]
    pub const fn new(strategy: Strategy) -> Self {
        Self { strategy, compressed: false, evict_on_sweep: false }
    }
}

/// One cached value. Immutable once built: a refresh replaces the whole entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: String,
    value: Arc<[u8]>,
    stored_at: Instant,
    ttl: Duration,
    size_bytes: usize,
    meta: EntryMeta,
}

impl CacheEntry {
    #[must_use]
    pub fn new(key: String, value: Arc<[u8]>, ttl: Duration, meta: EntryMeta, stored_at: Instant) -> Self {
        let size_bytes = crate::cache::size::approximate_entry_size(&key, &value);
        Self { key, value, stored_at, ttl, size_bytes, meta }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Encoded payload as written through the codec hooks.
    #[must_use]
    pub fn value(&self) -> &Arc<[u8]> {
        &self.value
    }

    #[must_use]
    pub const fn stored_at(&self) -> Instant {
        self.stored_at
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    #[must_use]
    pub const fn strategy_at_write(&self) -> Strategy {
        self.meta.strategy
    }

    #[must_use]
    pub const fn meta(&self) -> EntryMeta {
        self.meta
    }

    /// `None` when the TTL is too large to represent as an instant.
    #[must_use]
    pub fn expires_at(&self) -> Option<Instant> {
        self.stored_at.checked_add(self.ttl)
    }

    #[must_use]
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.stored_at)
    }

    /// `now > stored_at + ttl`.
    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|at| now > at)
    }

    /// `now - stored_at < window`.
    #[must_use]
    pub fn is_fresh_within(&self, now: Instant, window: Duration) -> bool {
        self.age(now) < window
    }
}
