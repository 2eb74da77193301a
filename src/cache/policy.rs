use crate::cache::entry::CacheEntry;
use crate::cache::metrics::StoreMetrics;
use lru::LruCache;
use std::sync::atomic::Ordering;
use tokio::time::Instant;

/// Removes entries past `stored_at + ttl` (and entries flagged for eviction).
/// Returns `(evicted, freed_bytes)`.
pub(crate) fn purge_expired(
    entries: &mut LruCache<String, CacheEntry>,
    metrics: &StoreMetrics,
    now: Instant,
) -> (usize, u64) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.is_expired(now) || e.meta().evict_on_sweep)
        .map(|(k, _)| k.clone())
        .collect();

    let mut freed: u64 = 0;
    for key in &expired {
        if let Some(e) = entries.pop(key) {
            freed = freed.saturating_add(crate::utils::num::usize_to_u64(e.size_bytes()));
        }
    }
    let count = expired.len();
    if count > 0 {
        metrics.ttl_evictions.fetch_add(crate::utils::num::usize_to_u64(count), Ordering::Relaxed);
        crate::dev6!("{{\"bench\":\"store\",\"op\":\"ttl_sweep\",\"evicted\":{},\"freed_bytes\":{}}}", count, freed);
    }
    (count, freed)
}

/// Pops the `n` oldest entries. The map is kept in write order (reads only peek), so the
/// least-recently-written end is the oldest `stored_at`. Returns `(evicted, freed_bytes)`.
pub(crate) fn evict_oldest(
    entries: &mut LruCache<String, CacheEntry>,
    metrics: &StoreMetrics,
    n: usize,
) -> (usize, u64) {
    let mut evicted = 0usize;
    let mut freed: u64 = 0;
    while evicted < n {
        let Some((_, e)) = entries.pop_lru() else { break };
        freed = freed.saturating_add(crate::utils::num::usize_to_u64(e.size_bytes()));
        evicted += 1;
    }
    if evicted > 0 {
        metrics.capacity_evictions.fetch_add(crate::utils::num::usize_to_u64(evicted), Ordering::Relaxed);
        crate::dev6!("{{\"bench\":\"store\",\"op\":\"capacity_evict\",\"evicted\":{},\"freed_bytes\":{}}}", evicted, freed);
    }
    (evicted, freed)
}
