use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bookkeeping counters for the store itself (request outcomes live in telemetry).
#[derive(Default)]
pub struct StoreMetrics {
    pub inserts: AtomicU64,
    pub replacements: AtomicU64,
    pub removes: AtomicU64,
    pub ttl_evictions: AtomicU64,
    pub capacity_evictions: AtomicU64,
    pub rejected: AtomicU64,
    pub memory_bytes: AtomicU64,
    pub total_put_ns: AtomicU64,
    pub total_sweep_ns: AtomicU64,
}

impl StoreMetrics {
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            inserts: self.inserts.load(Ordering::Relaxed),
            replacements: self.replacements.load(Ordering::Relaxed),
            removes: self.removes.load(Ordering::Relaxed),
            ttl_evictions: self.ttl_evictions.load(Ordering::Relaxed),
            capacity_evictions: self.capacity_evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            memory_bytes: self.memory_bytes.load(Ordering::Relaxed),
            total_put_ns: self.total_put_ns.load(Ordering::Relaxed),
            total_sweep_ns: self.total_sweep_ns.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn add_elapsed(counter: &AtomicU64, start: tokio::time::Instant) {
        counter.fetch_add(
            crate::utils::num::u128_to_u64_saturating(start.elapsed().as_nanos()),
            Ordering::Relaxed,
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreMetricsSnapshot {
    pub inserts: u64,
    pub replacements: u64,
    pub removes: u64,
    pub ttl_evictions: u64,
    pub capacity_evictions: u64,
    pub rejected: u64,
    pub memory_bytes: u64,
    pub total_put_ns: u64,
    pub total_sweep_ns: u64,
}
