//! Request metrics: counters, a bounded ring of recent records, slow-query flagging
//! and pluggable fire-and-forget sinks.

use crate::utils::num::{duration_ms, u128_to_u64_saturating, usize_to_u64};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_RING_CAPACITY: usize = 1000;
pub const METRICS_TARGET: &str = "adaptcache::metrics";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Hit,
    Miss,
    Error,
    NotFound,
}

/// Which path served the request; each has its own slow threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupPath {
    Cache,
    Backend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlowThresholds {
    pub cache: Duration,
    pub backend: Duration,
}

impl Default for SlowThresholds {
    fn default() -> Self {
        Self { cache: Duration::from_millis(500), backend: Duration::from_millis(1000) }
    }
}

impl SlowThresholds {
    #[must_use]
    pub const fn for_path(&self, path: LookupPath) -> Duration {
        match path {
            LookupPath::Cache => self.cache,
            LookupPath::Backend => self.backend,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    key: String,
    outcome: Outcome,
    latency: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub not_found: u64,
    /// `hits / total_requests`, 0 when nothing was recorded.
    pub hit_rate: f64,
    pub avg_latency_ms: f64,
    pub slow_queries: u64,
    pub estimated_cost_saved: f64,
    /// Records currently held in the ring.
    pub window: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeySummary {
    pub key: String,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub not_found: u64,
    pub avg_latency_ms: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlowQuery {
    /// SHA-256 of the cache key; raw keys may carry user identifiers.
    pub key_hash: String,
    pub latency_ms: u64,
    pub path: LookupPath,
    pub outcome: Outcome,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MetricsEvent {
    SlowQuery(SlowQuery),
    Summary(Snapshot),
}

/// Receives metrics events. Implementations must not block and must swallow
/// their own failures.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, event: &MetricsEvent);
}

/// Writes each event as one JSON line on the `adaptcache::metrics` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn emit(&self, event: &MetricsEvent) {
        match serde_json::to_string(event) {
            Ok(line) => log::info!(target: METRICS_TARGET, "{line}"),
            Err(e) => log::debug!("metrics event not serializable: {e}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn emit(&self, _event: &MetricsEvent) {}
}

/// Forwards events into a bounded channel; events are dropped when it is full
/// or closed.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<MetricsEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MetricsEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, dropped: AtomicU64::new(0) }, rx)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl MetricsSink for ChannelSink {
    fn emit(&self, event: &MetricsEvent) {
        if self.tx.try_send(event.clone()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub(crate) fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut h = Sha256::new();
    h.update(input.as_bytes());
    hex::encode(h.finalize())
}

#[derive(Default, Debug)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    not_found: AtomicU64,
    slow: AtomicU64,
    latency_us: AtomicU64,
}

#[derive(Debug, Default)]
struct Ring {
    records: VecDeque<Record>,
    cost_saved: f64,
}

pub struct MetricsRecorder {
    counters: Counters,
    ring: Mutex<Ring>,
    capacity: usize,
    thresholds: SlowThresholds,
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("capacity", &self.capacity)
            .field("thresholds", &self.thresholds)
            .finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    #[must_use]
    pub fn new(capacity: usize, thresholds: SlowThresholds, sink: Arc<dyn MetricsSink>) -> Self {
        let capacity = capacity.max(1);
        Self {
            counters: Counters::default(),
            ring: Mutex::new(Ring { records: VecDeque::with_capacity(capacity), cost_saved: 0.0 }),
            capacity,
            thresholds,
            sink,
        }
    }

    /// Records one completed request. Slow requests are flagged and emitted to the
    /// sink here, at completion.
    pub fn record(&self, key: &str, outcome: Outcome, path: LookupPath, latency: Duration, cost_weight: f64) {
        let c = &self.counters;
        match outcome {
            Outcome::Hit => c.hits.fetch_add(1, Ordering::Relaxed),
            Outcome::Miss => c.misses.fetch_add(1, Ordering::Relaxed),
            Outcome::Error => c.errors.fetch_add(1, Ordering::Relaxed),
            Outcome::NotFound => c.not_found.fetch_add(1, Ordering::Relaxed),
        };
        c.latency_us.fetch_add(u128_to_u64_saturating(latency.as_micros()), Ordering::Relaxed);

        {
            let mut ring = self.ring.lock();
            if ring.records.len() == self.capacity {
                ring.records.pop_front();
            }
            ring.records.push_back(Record { key: key.to_owned(), outcome, latency });
            if outcome == Outcome::Hit && cost_weight.is_finite() && cost_weight > 0.0 {
                ring.cost_saved += cost_weight;
            }
        }

        if latency > self.thresholds.for_path(path) {
            c.slow.fetch_add(1, Ordering::Relaxed);
            let event = SlowQuery {
                key_hash: sha256_hex(key),
                latency_ms: duration_ms(latency),
                path,
                outcome,
                ts: Utc::now(),
            };
            log::warn!("slow {path:?} request: {}ms (key hash {})", event.latency_ms, event.key_hash);
            self.sink.emit(&MetricsEvent::SlowQuery(event));
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let c = &self.counters;
        let hits = c.hits.load(Ordering::Relaxed);
        let misses = c.misses.load(Ordering::Relaxed);
        let errors = c.errors.load(Ordering::Relaxed);
        let not_found = c.not_found.load(Ordering::Relaxed);
        let total = hits + misses + errors + not_found;
        let latency_us = c.latency_us.load(Ordering::Relaxed);
        let (window, cost_saved) = {
            let ring = self.ring.lock();
            (ring.records.len(), ring.cost_saved)
        };
        #[allow(clippy::cast_precision_loss)]
        let (hit_rate, avg_latency_ms) = if total == 0 {
            (0.0, 0.0)
        } else {
            (hits as f64 / total as f64, latency_us as f64 / total as f64 / 1000.0)
        };
        Snapshot {
            total_requests: total,
            hits,
            misses,
            errors,
            not_found,
            hit_rate,
            avg_latency_ms,
            slow_queries: c.slow.load(Ordering::Relaxed),
            estimated_cost_saved: cost_saved,
            window,
            generated_at: Utc::now(),
        }
    }

    /// Per-key breakdown over the records still in the ring.
    #[must_use]
    pub fn key_summary(&self, key: &str) -> Option<KeySummary> {
        let ring = self.ring.lock();
        let mut s = KeySummary {
            key: key.to_owned(),
            hits: 0,
            misses: 0,
            errors: 0,
            not_found: 0,
            avg_latency_ms: 0.0,
        };
        let mut total = Duration::ZERO;
        let mut n = 0usize;
        for r in ring.records.iter().filter(|r| r.key == key) {
            match r.outcome {
                Outcome::Hit => s.hits += 1,
                Outcome::Miss => s.misses += 1,
                Outcome::Error => s.errors += 1,
                Outcome::NotFound => s.not_found += 1,
            }
            total = total.saturating_add(r.latency);
            n += 1;
        }
        if n == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            s.avg_latency_ms = total.as_secs_f64() * 1000.0 / usize_to_u64(n) as f64;
        }
        Some(s)
    }

    /// Builds a snapshot and hands it to the sink.
    pub fn emit_summary(&self) -> Snapshot {
        let snap = self.snapshot();
        log::info!(
            "cache summary: {} requests, hit rate {:.3}, avg {:.1}ms, {} slow",
            snap.total_requests,
            snap.hit_rate,
            snap.avg_latency_ms,
            snap.slow_queries
        );
        self.sink.emit(&MetricsEvent::Summary(snap.clone()));
        snap
    }

    /// OpenMetrics-style exposition of the counters.
    #[must_use]
    pub fn metrics_text(&self) -> String {
        let c = &self.counters;
        format!(
            "adaptcache_hits_total {}\n\
             adaptcache_misses_total {}\n\
             adaptcache_errors_total {}\n\
             adaptcache_not_found_total {}\n\
             adaptcache_slow_queries_total {}\n\
             adaptcache_latency_us_total {}\n",
            c.hits.load(Ordering::Relaxed),
            c.misses.load(Ordering::Relaxed),
            c.errors.load(Ordering::Relaxed),
            c.not_found.load(Ordering::Relaxed),
            c.slow.load(Ordering::Relaxed),
            c.latency_us.load(Ordering::Relaxed),
        )
    }
}
