//! Memoization of condition outcomes within one resolution run.
//!
//! Two tables live here:
//!
//! - [`ClassPresenceCache`]: class lookups keyed by class name. The class path
//!   is constant for a run, so these never go stale.
//! - [`ConditionEvaluationCache`]: full condition outcomes keyed by
//!   `(unit id, condition slot)` and stamped with the registry generation
//!   they were computed at. A hit requires an exact generation match; any
//!   mismatch re-evaluates and overwrites.
//!
//! Both are scoped to a single run and dropped with it, so there is no
//! eviction.

use std::collections::HashMap;

use crate::condition::{Condition, EvaluationContext, EvaluationOutcome};
use crate::environment::{ClassPath, Environment};
use crate::error::LookupError;
use crate::metrics::METRICS;
use crate::snapshot::RegistrySnapshot;

/// Per-class-name memo of class path answers.
#[derive(Debug, Clone, Default)]
pub struct ClassPresenceCache {
    classes: HashMap<String, bool>,
}

impl ClassPresenceCache {
    /// Lookup errors are not memoized; they abort the run anyway.
    pub fn get_or_lookup(
        &mut self,
        name: &str,
        class_path: &dyn ClassPath,
    ) -> Result<bool, LookupError> {
        if let Some(&present) = self.classes.get(name) {
            return Ok(present);
        }
        let present = class_path.class_exists(name)?;
        self.classes.insert(name.to_string(), present);
        Ok(present)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CachedOutcome {
    generation: u64,
    outcome: EvaluationOutcome,
}

/// Hit/miss counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Generation-aware outcome cache.
#[derive(Debug, Default)]
pub struct ConditionEvaluationCache {
    outcomes: HashMap<(String, usize), CachedOutcome>,
    classes: ClassPresenceCache,
    stats: CacheStats,
}

impl ConditionEvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached outcome for `(unit_id, slot)` if it was computed at
    /// the registry's current generation, otherwise evaluate and store.
    pub fn get_or_evaluate(
        &mut self,
        unit_id: &str,
        slot: usize,
        condition: &Condition,
        environment: &Environment,
        registry: &RegistrySnapshot,
    ) -> Result<EvaluationOutcome, LookupError> {
        let generation = registry.generation();
        let key = (unit_id.to_string(), slot);

        if let Some(cached) = self.outcomes.get(&key) {
            if cached.generation == generation {
                self.stats.hits += 1;
                METRICS.inc_cache_hits();
                return Ok(cached.outcome.clone());
            }
        }

        self.stats.misses += 1;
        METRICS.inc_cache_misses();
        METRICS.inc_conditions_evaluated();

        let mut ctx = EvaluationContext::new(environment, registry, &mut self.classes);
        let outcome = condition.evaluate(&mut ctx)?;
        tracing::trace!(
            unit_id = %unit_id,
            slot = slot,
            generation = generation,
            matched = outcome.matched,
            "condition evaluated"
        );
        self.outcomes.insert(
            key,
            CachedOutcome {
                generation,
                outcome: outcome.clone(),
            },
        );
        Ok(outcome)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of distinct class names looked up so far.
    pub fn classes_resolved(&self) -> usize {
        self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
