use serde::{Deserialize, Serialize};

/// Capacity limits for the cache store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of entries.
    pub max_entries: usize,
    /// Maximum aggregate approximate size of all entries.
    pub max_bytes: u64,
    /// Fraction of current entries evicted per capacity round, oldest first.
    pub eviction_fraction: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_entries: 1000, max_bytes: 50 * 1024 * 1024, eviction_fraction: 0.2 }
    }
}

impl StoreConfig {
    /// Number of entries one eviction round removes from a store holding `len`.
    /// Always at least one when the store is non-empty.
    #[must_use]
    pub fn eviction_batch(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        let frac = if self.eviction_fraction.is_finite() { self.eviction_fraction.clamp(0.0, 1.0) } else { 0.2 };
        let n = crate::utils::num::f64_to_u64_saturating((len as f64 * frac).ceil());
        usize::try_from(n).unwrap_or(len).clamp(1, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_is_twenty_percent_rounded_up() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.eviction_batch(0), 0);
        assert_eq!(cfg.eviction_batch(1), 1);
        assert_eq!(cfg.eviction_batch(10), 2);
        assert_eq!(cfg.eviction_batch(11), 3);
    }

    #[test]
    fn batch_clamps_bad_fractions() {
        let cfg = StoreConfig { eviction_fraction: 7.0, ..Default::default() };
        assert_eq!(cfg.eviction_batch(4), 4);
        let cfg = StoreConfig { eviction_fraction: 0.0, ..Default::default() };
        assert_eq!(cfg.eviction_batch(4), 1);
    }
}
