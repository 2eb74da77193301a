mod config;
mod core;
mod entry;
mod metrics;
mod policy;
pub(crate) mod size;

pub use config::StoreConfig;
pub use core::{CacheStore, PutOutcome};
pub use entry::{CacheEntry, EntryMeta};
pub use metrics::{StoreMetrics, StoreMetricsSnapshot};
