//! Ordered optimization rules layered on top of the context evaluator.
//!
//! Order is fixed: the built-in context evaluation runs first, then every rule in the
//! order it was pushed. A TTL action multiplies the running multiplier, so later rules
//! scale what earlier ones produced; a later `ForceStrategy` replaces an earlier one.
//! The TTL floor is applied by the caller after all rules.

use crate::config::CacheConfig;
use crate::context::{Adjustment, CacheContext, evaluate};
use crate::types::Strategy;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// What a rule sees when deciding whether it applies.
#[derive(Clone, Copy, Debug)]
pub struct RuleInput<'a> {
    pub key: &'a str,
    pub context: &'a CacheContext,
    pub config: &'a CacheConfig,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RuleAction {
    /// Multiply TTL by a factor of at least 1.
    WidenTtl(f64),
    /// Multiply TTL by a factor of at most 1.
    NarrowTtl(f64),
    ForceStrategy(Strategy),
    /// Write the entry through the compression codec.
    Compress,
    /// Drop the entry at the next sweep regardless of TTL.
    MarkForEviction,
}

type Predicate = dyn Fn(&RuleInput<'_>) -> bool + Send + Sync;

#[derive(Clone)]
pub struct OptimizationRule {
    name: Cow<'static, str>,
    predicate: Arc<Predicate>,
    action: RuleAction,
}

impl fmt::Debug for OptimizationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimizationRule").field("name", &self.name).field("action", &self.action).finish()
    }
}

impl OptimizationRule {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        action: RuleAction,
        predicate: impl Fn(&RuleInput<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), predicate: Arc::new(predicate), action }
    }

    /// Rule that fires for every key containing `fragment`.
    pub fn for_keys_containing(name: impl Into<Cow<'static, str>>, fragment: impl Into<String>, action: RuleAction) -> Self {
        let fragment = fragment.into();
        Self::new(name, action, move |input| input.key.contains(fragment.as_str()))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn action(&self) -> RuleAction {
        self.action
    }

    fn matches(&self, input: &RuleInput<'_>) -> bool {
        (self.predicate)(input)
    }

    fn apply(&self, adj: &mut Adjustment) {
        match self.action {
            RuleAction::WidenTtl(f) => adj.ttl_multiplier *= sanitize(f).max(1.0),
            RuleAction::NarrowTtl(f) => adj.ttl_multiplier *= sanitize(f).min(1.0),
            RuleAction::ForceStrategy(s) => adj.strategy_override = Some(s),
            RuleAction::Compress => adj.compress = true,
            RuleAction::MarkForEviction => adj.evict = true,
        }
        adj.applied.push(self.name.clone());
    }
}

fn sanitize(f: f64) -> f64 {
    if f.is_finite() && f >= 0.0 { f } else { 1.0 }
}

/// Deterministically ordered rule list.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<OptimizationRule>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule; it runs after every rule already present.
    #[must_use]
    pub fn with(mut self, rule: OptimizationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn push(&mut self, rule: OptimizationRule) {
        self.rules.push(rule);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptimizationRule> {
        self.rules.iter()
    }

    /// Context evaluation followed by every matching rule, in order.
    #[must_use]
    pub fn evaluate(&self, key: &str, context: &CacheContext, config: &CacheConfig) -> Adjustment {
        let mut adj = evaluate(context, config.priority);
        let input = RuleInput { key, context, config };
        for rule in self.rules.iter().filter(|r| r.matches(&input)) {
            rule.apply(&mut adj);
        }
        adj
    }
}
