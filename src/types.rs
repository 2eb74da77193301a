use serde::{Deserialize, Serialize};
use std::fmt;

/// Fetch strategy applied to one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheOnly,
    CacheFirst,
    NetworkFirst,
    NetworkOnly,
    Adaptive,
}

impl Strategy {
    /// Whether a fresh entry found in the store may answer the call.
    #[must_use]
    pub const fn may_use_cache(self) -> bool {
        matches!(self, Self::CacheOnly | Self::CacheFirst | Self::Adaptive)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CacheOnly => "cache-only",
            Self::CacheFirst => "cache-first",
            Self::NetworkFirst => "network-first",
            Self::NetworkOnly => "network-only",
            Self::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = crate::errors::CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "cache-only" => Ok(Self::CacheOnly),
            "cache-first" => Ok(Self::CacheFirst),
            "network-first" => Ok(Self::NetworkFirst),
            "network-only" => Ok(Self::NetworkOnly),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(crate::errors::CacheError::Config(format!("unknown strategy: {other}"))),
        }
    }
}

/// Key priority. Informs adaptive narrowing and the critical-live override.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(self, Self::Critical)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(s)
    }
}
