//! Adaptive caching and query-optimization layer for a rate-limited document-store
//! backend.

pub mod cache;
pub mod codec;
pub mod coalesce;
pub mod config;
pub mod context;
pub mod daemon;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod key;
pub mod logger;
pub mod persistence;
pub mod rules;
pub mod strategy;
pub mod telemetry;
pub mod types;
pub mod utils;

pub use crate::config::{CacheConfig, CacheSettings};
pub use crate::context::{BackendLoad, CacheContext, CallerTier, SeasonPhase, TimeOfDay};
pub use crate::engine::{AdaptiveCache, AdaptiveCacheBuilder, Explanation, GetOptions};
pub use crate::errors::{BackendError, CacheError};
pub use crate::key::CacheKey;
pub use crate::rules::{OptimizationRule, RuleAction, RuleSet};
pub use crate::types::{Priority, Strategy};
