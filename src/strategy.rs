//! Per-call strategy resolution. Stateless: one decision per call from the config,
//! the evaluated adjustment, the stored entry (if any) and the clock.

use crate::cache::CacheEntry;
use crate::config::CacheConfig;
use crate::context::{Adjustment, CacheContext};
use crate::types::Strategy;
use std::time::Duration;
use tokio::time::Instant;

/// Non-critical adaptive keys under high load may be served up to this multiple of
/// their effective TTL. The window is measured from `stored_at`, so it is a one-time
/// allowance per entry: nothing extends it short of a new write.
pub const ADAPTIVE_GRACE_FACTOR: f64 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Serve the stored entry.
    Hit,
    /// Fetch from the backend; `write_back` says whether the result is stored.
    Miss { write_back: bool },
    /// Cache-only call with nothing stored.
    NotFound,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub strategy: Strategy,
    pub decision: Decision,
    /// TTL a write-back from this call would carry.
    pub effective_ttl: Duration,
    /// True when an adaptive hit relied on the high-load grace window.
    pub grace_applied: bool,
}

/// Inputs beyond the entry itself.
#[derive(Clone, Copy, Debug)]
pub struct ResolveInput<'a> {
    pub config: &'a CacheConfig,
    pub adjustment: &'a Adjustment,
    pub context: &'a CacheContext,
    /// Per-call TTL override replacing `config.base_ttl`.
    pub custom_ttl: Option<Duration>,
    pub ttl_floor: Duration,
    /// Per-call strategy. Ranks with the config: an evaluator or rule override beats it.
    pub strategy: Option<Strategy>,
    /// Network-only for this call, ahead of every override.
    pub disable_cache: bool,
}

fn grace_window(ttl: Duration) -> Duration {
    Duration::try_from_secs_f64(ttl.as_secs_f64() * ADAPTIVE_GRACE_FACTOR).unwrap_or(Duration::MAX)
}

#[must_use]
pub fn resolve(input: &ResolveInput<'_>, entry: Option<&CacheEntry>, now: Instant) -> Resolution {
    let strategy = if input.disable_cache {
        Strategy::NetworkOnly
    } else {
        input
            .adjustment
            .strategy_override
            .or(input.strategy)
            .unwrap_or(input.config.strategy)
    };
    let base = input.custom_ttl.unwrap_or_else(|| input.config.base_ttl());
    let effective_ttl = input.adjustment.apply_ttl(base, input.ttl_floor);

    let mut grace_applied = false;
    let decision = match strategy {
        Strategy::CacheOnly => {
            if entry.is_some() {
                Decision::Hit
            } else {
                Decision::NotFound
            }
        }
        // Freshness is judged against the TTL fixed at write, not the current context.
        Strategy::CacheFirst => match entry {
            Some(e) if e.is_fresh_within(now, e.ttl()) => Decision::Hit,
            _ => Decision::Miss { write_back: true },
        },
        Strategy::NetworkFirst => Decision::Miss { write_back: true },
        Strategy::NetworkOnly => Decision::Miss { write_back: false },
        Strategy::Adaptive => match entry {
            Some(e) if e.is_fresh_within(now, effective_ttl) => Decision::Hit,
            Some(e) => {
                let critical_live = input.config.priority.is_critical() && input.context.live_event;
                if !critical_live
                    && input.context.high_load()
                    && e.is_fresh_within(now, grace_window(effective_ttl))
                {
                    grace_applied = true;
                    Decision::Hit
                } else {
                    Decision::Miss { write_back: true }
                }
            }
            None => Decision::Miss { write_back: true },
        },
    };

    Resolution { strategy, decision, effective_ttl, grace_applied }
}
