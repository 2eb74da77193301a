/// Fixed per-entry overhead: timestamps, TTL, metadata and map bookkeeping.
pub const ENTRY_OVERHEAD: usize = 16 + 16 + 8 + 4;

#[inline]
#[must_use]
pub fn approximate_entry_size(key: &str, payload: &[u8]) -> usize {
    payload.len().saturating_add(key.len()).saturating_add(ENTRY_OVERHEAD)
}
