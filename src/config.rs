//! Per-key-pattern cache configuration and process-wide settings.
//!
//! Settings load from TOML with precedence: explicit path > `ADAPTCACHE_CONFIG` >
//! `./adaptcache.toml` > defaults. Numeric knobs can then be overridden through
//! `ADAPTCACHE_*` environment variables.

use crate::cache::StoreConfig;
use crate::context::TTL_FLOOR;
use crate::errors::CacheError;
use crate::types::{Priority, Strategy};
use crate::utils::num::duration_ms;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Caching policy for one key pattern.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub strategy: Strategy,
    pub base_ttl_ms: u64,
    pub priority: Priority,
    /// Relative expense of a backend call. Reporting only.
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
}

const fn default_cost_weight() -> f64 {
    1.0
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { strategy: Strategy::CacheFirst, base_ttl_ms: 300_000, priority: Priority::Medium, cost_weight: 1.0 }
    }
}

impl CacheConfig {
    /// `base_ttl` is kept at millisecond precision; anything finer is dropped.
    #[must_use]
    pub fn new(strategy: Strategy, base_ttl: Duration, priority: Priority) -> Self {
        Self { strategy, base_ttl_ms: duration_ms(base_ttl), priority, cost_weight: 1.0 }
    }

    #[must_use]
    pub const fn with_cost_weight(mut self, weight: f64) -> Self {
        self.cost_weight = weight;
        self
    }

    #[must_use]
    pub const fn base_ttl(&self) -> Duration {
        Duration::from_millis(self.base_ttl_ms)
    }
}

/// A key prefix and the config applied to keys starting with it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub pattern: String,
    #[serde(flatten)]
    pub config: CacheConfig,
}

/// Immutable pattern table. The longest matching prefix wins; otherwise the fallback.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigTable {
    patterns: Vec<PatternConfig>,
    fallback: CacheConfig,
}

impl ConfigTable {
    #[must_use]
    pub fn new(mut patterns: Vec<PatternConfig>, fallback: CacheConfig) -> Self {
        // Longest first so the first hit is the most specific.
        patterns.sort_by(|a, b| b.pattern.len().cmp(&a.pattern.len()).then_with(|| a.pattern.cmp(&b.pattern)));
        Self { patterns, fallback }
    }

    #[must_use]
    pub fn lookup(&self, key: &str) -> &CacheConfig {
        self.lookup_pattern(key).map_or(&self.fallback, |p| &p.config)
    }

    #[must_use]
    pub fn lookup_pattern(&self, key: &str) -> Option<&PatternConfig> {
        self.patterns.iter().find(|p| key.starts_with(p.pattern.as_str()))
    }

    #[must_use]
    pub const fn fallback(&self) -> &CacheConfig {
        &self.fallback
    }

    pub fn patterns(&self) -> impl Iterator<Item = &PatternConfig> {
        self.patterns.iter()
    }
}

/// The default table for a sports-data backend.
#[must_use]
pub fn default_patterns() -> Vec<PatternConfig> {
    let p = |pattern: &str, strategy, secs, priority, weight| PatternConfig {
        pattern: pattern.to_string(),
        config: CacheConfig::new(strategy, Duration::from_secs(secs), priority).with_cost_weight(weight),
    };
    vec![
        p("live_scores", Strategy::Adaptive, 30, Priority::Critical, 2.0),
        p("games", Strategy::Adaptive, 300, Priority::High, 1.5),
        p("odds", Strategy::NetworkFirst, 60, Priority::Critical, 3.0),
        p("teams", Strategy::CacheFirst, 3600, Priority::Medium, 1.0),
        p("players", Strategy::CacheFirst, 3600, Priority::Medium, 1.0),
        p("standings", Strategy::CacheFirst, 900, Priority::Medium, 1.0),
        p("user_profile", Strategy::CacheFirst, 600, Priority::High, 0.5),
        p("historical", Strategy::CacheFirst, 86_400, Priority::Low, 4.0),
    ]
}

/// Process-wide settings for one cache instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_floor_secs: u64,
    pub sweep_interval_secs: u64,
    pub summary_interval_secs: u64,
    pub min_request_spacing_ms: u64,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
    pub throttle_default_wait_secs: u64,
    pub slow_fetch_ms: u64,
    pub slow_lookup_ms: u64,
    pub metrics_ring_capacity: usize,
    pub store: StoreConfig,
    pub default_config: CacheConfig,
    pub patterns: Vec<PatternConfig>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_floor_secs: TTL_FLOOR.as_secs(),
            sweep_interval_secs: 60,
            summary_interval_secs: 300,
            min_request_spacing_ms: 100,
            request_timeout_ms: 10_000,
            retry_attempts: 3,
            backoff_base_ms: 1000,
            throttle_default_wait_secs: 60,
            slow_fetch_ms: 1000,
            slow_lookup_ms: 500,
            metrics_ring_capacity: 1000,
            store: StoreConfig::default(),
            default_config: CacheConfig::default(),
            patterns: default_patterns(),
        }
    }
}

impl CacheSettings {
    /// Parses settings from TOML text; missing fields keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, CacheError> {
        let settings: Self = toml::from_str(s).map_err(|e| CacheError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String, CacheError> {
        toml::to_string_pretty(self).map_err(|e| CacheError::Config(e.to_string()))
    }

    pub fn from_path(path: &Path) -> Result<Self, CacheError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Loads from the first existing candidate path, then applies env overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CacheError> {
        let mut settings = match Self::find_config_path(explicit) {
            Some(p) => {
                log::info!("loading cache settings from {}", p.display());
                Self::from_path(&p)?
            }
            None => Self::default(),
        };
        settings.apply_env_with(|k| std::env::var(k).ok())?;
        Ok(settings)
    }

    fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(p) = std::env::var("ADAPTCACHE_CONFIG") {
            candidates.push(PathBuf::from(p));
        }
        if let Ok(cur) = std::env::current_dir() {
            candidates.push(cur.join("adaptcache.toml"));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    /// Applies `ADAPTCACHE_*` overrides read through `get`.
    pub fn apply_env_with(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<(), CacheError> {
        fn parse<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, CacheError> {
            raw.trim().parse::<T>().map_err(|_| CacheError::Config(format!("invalid value for {name}: {raw}")))
        }
        if let Some(v) = get("ADAPTCACHE_MAX_ENTRIES") {
            self.store.max_entries = parse("ADAPTCACHE_MAX_ENTRIES", &v)?;
        }
        if let Some(v) = get("ADAPTCACHE_MAX_BYTES") {
            self.store.max_bytes = parse("ADAPTCACHE_MAX_BYTES", &v)?;
        }
        if let Some(v) = get("ADAPTCACHE_MIN_REQUEST_SPACING_MS") {
            self.min_request_spacing_ms = parse("ADAPTCACHE_MIN_REQUEST_SPACING_MS", &v)?;
        }
        if let Some(v) = get("ADAPTCACHE_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse("ADAPTCACHE_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("ADAPTCACHE_RETRY_ATTEMPTS") {
            self.retry_attempts = parse("ADAPTCACHE_RETRY_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("ADAPTCACHE_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = parse("ADAPTCACHE_SWEEP_INTERVAL_SECS", &v)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.ttl_floor() < TTL_FLOOR {
            return Err(CacheError::Config(format!(
                "ttl_floor_secs must be at least {}",
                TTL_FLOOR.as_secs()
            )));
        }
        if self.store.max_entries == 0 {
            return Err(CacheError::Config("store.max_entries must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.store.eviction_fraction) || self.store.eviction_fraction == 0.0 {
            return Err(CacheError::Config("store.eviction_fraction must be in (0, 1]".into()));
        }
        if self.retry_attempts == 0 {
            return Err(CacheError::Config("retry_attempts must be at least 1".into()));
        }
        if self.sweep_interval_secs == 0 || self.summary_interval_secs == 0 {
            return Err(CacheError::Config("daemon intervals must be non-zero".into()));
        }
        if let Some(bad) = self.patterns.iter().find(|p| p.pattern.is_empty()) {
            return Err(CacheError::Config(format!("empty key pattern for strategy {}", bad.config.strategy)));
        }
        Ok(())
    }

    #[must_use]
    pub fn table(&self) -> ConfigTable {
        ConfigTable::new(self.patterns.clone(), self.default_config.clone())
    }

    #[must_use]
    pub const fn ttl_floor(&self) -> Duration {
        Duration::from_secs(self.ttl_floor_secs)
    }

    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    #[must_use]
    pub const fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }

    #[must_use]
    pub const fn min_request_spacing(&self) -> Duration {
        Duration::from_millis(self.min_request_spacing_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    #[must_use]
    pub const fn throttle_default_wait(&self) -> Duration {
        Duration::from_secs(self.throttle_default_wait_secs)
    }

    #[must_use]
    pub const fn slow_fetch(&self) -> Duration {
        Duration::from_millis(self.slow_fetch_ms)
    }

    #[must_use]
    pub const fn slow_lookup(&self) -> Duration {
        Duration::from_millis(self.slow_lookup_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn longest_prefix_wins() {
        let table = ConfigTable::new(
            vec![
                PatternConfig { pattern: "games".into(), config: CacheConfig::default() },
                PatternConfig {
                    pattern: "games/live".into(),
                    config: CacheConfig::new(Strategy::NetworkFirst, Duration::from_secs(10), Priority::Critical),
                },
            ],
            CacheConfig::new(Strategy::NetworkOnly, Duration::from_secs(1), Priority::Low),
        );
        assert_eq!(table.lookup("games/live|week=3").strategy, Strategy::NetworkFirst);
        assert_eq!(table.lookup("games|week=3").strategy, Strategy::CacheFirst);
        assert_eq!(table.lookup("weather").strategy, Strategy::NetworkOnly);
    }

    #[test]
    fn toml_overrides_and_defaults() {
        let text = r#"
            retry_attempts = 5
            min_request_spacing_ms = 250

            [store]
            max_entries = 42

            [[patterns]]
            pattern = "odds"
            strategy = "network-only"
            base_ttl_ms = 15000
            priority = "critical"
        "#;
        let s = CacheSettings::from_toml_str(text).unwrap();
        assert_eq!(s.retry_attempts, 5);
        assert_eq!(s.store.max_entries, 42);
        assert_eq!(s.store.max_bytes, StoreConfig::default().max_bytes);
        assert_eq!(s.sweep_interval(), Duration::from_secs(60));
        assert_eq!(s.patterns.len(), 1);
        assert_eq!(s.patterns[0].config.cost_weight, 1.0);
        assert_eq!(s.table().lookup("odds|game=9").strategy, Strategy::NetworkOnly);
    }

    #[test]
    fn settings_round_trip_through_toml() {
        let s = CacheSettings::default();
        let text = s.to_toml_string().unwrap();
        assert_eq!(CacheSettings::from_toml_str(&text).unwrap(), s);
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let env: HashMap<&str, &str> = [("ADAPTCACHE_MAX_ENTRIES", "7"), ("ADAPTCACHE_RETRY_ATTEMPTS", "2")].into();
        let mut s = CacheSettings::default();
        s.apply_env_with(|k| env.get(k).map(ToString::to_string)).unwrap();
        assert_eq!(s.store.max_entries, 7);
        assert_eq!(s.retry_attempts, 2);

        let bad: HashMap<&str, &str> = [("ADAPTCACHE_RETRY_ATTEMPTS", "zero")].into();
        assert!(matches!(
            s.apply_env_with(|k| bad.get(k).map(ToString::to_string)),
            Err(CacheError::Config(_))
        ));
    }

    #[test]
    fn invalid_settings_rejected() {
        assert!(CacheSettings::from_toml_str("retry_attempts = 0").is_err());
        assert!(CacheSettings::from_toml_str("[store]\neviction_fraction = 0.0").is_err());
        assert!(CacheSettings::from_toml_str("ttl_floor_secs = 4").is_err());
        assert!(CacheSettings::from_toml_str("ttl_floor_secs = 30").is_ok());
    }

    #[test]
    fn base_ttl_keeps_milliseconds() {
        let c = CacheConfig::new(Strategy::CacheFirst, Duration::from_millis(7_900), Priority::Medium);
        assert_eq!(c.base_ttl(), Duration::from_millis(7_900));
        let text = toml::to_string(&c).unwrap();
        assert_eq!(toml::from_str::<CacheConfig>(&text).unwrap().base_ttl(), Duration::from_millis(7_900));
    }
}
