//! Per-call situational context and the pure evaluator that turns it into a TTL
//! multiplier and an optional strategy override.
//!
//! Evaluation order (multipliers compose):
//! 1. live event in progress: x0.3
//! 2. season phase: postseason x0.5, offseason x2.0, preseason x1.5, regular x1.0
//! 3. time of day: peak x0.8, off-peak x1.5, normal x1.0
//! 4. high backend load: x1.2
//! 5. premium caller: x0.5 (after load, so load never cancels it)
//!
//! A critical key during a live event is forced to network-first.

use crate::types::{Priority, Strategy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lower bound on any TTL computed from context multipliers.
pub const TTL_FLOOR: Duration = Duration::from_secs(5);

pub const LIVE_EVENT_FACTOR: f64 = 0.3;
pub const PEAK_FACTOR: f64 = 0.8;
pub const OFF_PEAK_FACTOR: f64 = 1.5;
pub const HIGH_LOAD_FACTOR: f64 = 1.2;
pub const PREMIUM_FACTOR: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonPhase {
    Preseason,
    #[default]
    Regular,
    Postseason,
    Offseason,
}

impl SeasonPhase {
    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::Preseason => 1.5,
            Self::Regular => 1.0,
            Self::Postseason => 0.5,
            Self::Offseason => 2.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerTier {
    #[default]
    Standard,
    Premium,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendLoad {
    #[default]
    Normal,
    High,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeOfDay {
    Peak,
    #[default]
    Normal,
    OffPeak,
}

impl TimeOfDay {
    /// Buckets a local hour: 18-23 peak, 0-6 off-peak, otherwise normal.
    #[must_use]
    pub const fn from_hour(hour: u32) -> Self {
        match hour {
            18..=23 => Self::Peak,
            0..=6 => Self::OffPeak,
            _ => Self::Normal,
        }
    }

    /// Bucket for the current local wall-clock hour.
    #[must_use]
    pub fn now_local() -> Self {
        use chrono::Timelike;
        Self::from_hour(chrono::Local::now().hour())
    }

    #[must_use]
    pub const fn factor(self) -> f64 {
        match self {
            Self::Peak => PEAK_FACTOR,
            Self::Normal => 1.0,
            Self::OffPeak => OFF_PEAK_FACTOR,
        }
    }
}

/// Situational flags for one request. Built fresh per call and never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheContext {
    pub live_event: bool,
    pub phase: SeasonPhase,
    pub tier: CallerTier,
    pub load: BackendLoad,
    pub time_of_day: TimeOfDay,
}

impl CacheContext {
    #[must_use]
    pub fn builder() -> CacheContextBuilder {
        CacheContextBuilder::default()
    }

    #[must_use]
    pub const fn high_load(&self) -> bool {
        matches!(self.load, BackendLoad::High)
    }
}

#[derive(Default)]
pub struct CacheContextBuilder {
    ctx: CacheContext,
}

impl CacheContextBuilder {
    #[must_use]
    pub const fn live_event(mut self, live: bool) -> Self {
        self.ctx.live_event = live;
        self
    }

    #[must_use]
    pub const fn phase(mut self, phase: SeasonPhase) -> Self {
        self.ctx.phase = phase;
        self
    }

    #[must_use]
    pub const fn tier(mut self, tier: CallerTier) -> Self {
        self.ctx.tier = tier;
        self
    }

    #[must_use]
    pub const fn load(mut self, load: BackendLoad) -> Self {
        self.ctx.load = load;
        self
    }

    #[must_use]
    pub const fn time_of_day(mut self, tod: TimeOfDay) -> Self {
        self.ctx.time_of_day = tod;
        self
    }

    #[must_use]
    pub const fn build(self) -> CacheContext {
        self.ctx
    }
}

/// Result of evaluating a context (and, later, optimization rules) for one key.
#[derive(Clone, Debug, PartialEq)]
pub struct Adjustment {
    pub ttl_multiplier: f64,
    pub strategy_override: Option<Strategy>,
    pub compress: bool,
    pub evict: bool,
    /// Names of the rules that fired, in evaluation order.
    pub applied: Vec<std::borrow::Cow<'static, str>>,
}

impl Default for Adjustment {
    fn default() -> Self {
        Self { ttl_multiplier: 1.0, strategy_override: None, compress: false, evict: false, applied: Vec::new() }
    }
}

impl Adjustment {
    /// Scales `base` by the multiplier and clamps to `floor`.
    #[must_use]
    pub fn apply_ttl(&self, base: Duration, floor: Duration) -> Duration {
        scaled_ttl(base, self.ttl_multiplier, floor)
    }
}

/// `base x multiplier`, never below `floor`. Non-finite or non-positive multipliers
/// collapse to the floor.
#[must_use]
pub fn scaled_ttl(base: Duration, multiplier: f64, floor: Duration) -> Duration {
    let secs = base.as_secs_f64() * multiplier;
    if !secs.is_finite() || secs <= floor.as_secs_f64() {
        return floor;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

/// Pure context evaluation for a key of the given priority.
#[must_use]
pub fn evaluate(ctx: &CacheContext, priority: Priority) -> Adjustment {
    let mut adj = Adjustment::default();
    if ctx.live_event {
        adj.ttl_multiplier *= LIVE_EVENT_FACTOR;
        adj.applied.push("live-event".into());
    }
    if ctx.phase != SeasonPhase::Regular {
        adj.ttl_multiplier *= ctx.phase.factor();
        adj.applied.push(match ctx.phase {
            SeasonPhase::Preseason => "preseason".into(),
            SeasonPhase::Postseason => "postseason".into(),
            _ => "offseason".into(),
        });
    }
    if ctx.time_of_day != TimeOfDay::Normal {
        adj.ttl_multiplier *= ctx.time_of_day.factor();
        adj.applied.push(if ctx.time_of_day == TimeOfDay::Peak { "peak-hours".into() } else { "off-peak".into() });
    }
    if ctx.high_load() {
        adj.ttl_multiplier *= HIGH_LOAD_FACTOR;
        adj.applied.push("high-load".into());
    }
    if ctx.tier == CallerTier::Premium {
        adj.ttl_multiplier *= PREMIUM_FACTOR;
        adj.applied.push("premium-tier".into());
    }
    if priority.is_critical() && ctx.live_event {
        adj.strategy_override = Some(Strategy::NetworkFirst);
        adj.applied.push("critical-live-network-first".into());
    }
    adj
}
