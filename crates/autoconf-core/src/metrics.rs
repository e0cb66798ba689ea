//! Global atomic counters for resolution observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the engine does so at the end of every run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters: no allocations, no locking.
pub struct Metrics {
    resolutions_run: AtomicU64,
    conditions_evaluated: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    units_accepted: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            resolutions_run: AtomicU64::new(0),
            conditions_evaluated: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            units_accepted: AtomicU64::new(0),
        }
    }

    pub fn inc_resolutions(&self) {
        self.resolutions_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "resolutions_run", "counter incremented");
    }

    pub fn inc_conditions_evaluated(&self) {
        self.conditions_evaluated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_units_accepted(&self) {
        self.units_accepted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "units_accepted", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            resolutions_run = self.resolutions_run(),
            conditions_evaluated = self.conditions_evaluated(),
            cache_hits = self.cache_hits(),
            cache_misses = self.cache_misses(),
            units_accepted = self.units_accepted(),
        );
    }

    pub fn resolutions_run(&self) -> u64 {
        self.resolutions_run.load(Ordering::Relaxed)
    }

    pub fn conditions_evaluated(&self) -> u64 {
        self.conditions_evaluated.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn units_accepted(&self) -> u64 {
        self.units_accepted.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.resolutions_run.store(0, Ordering::Relaxed);
        self.conditions_evaluated.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.units_accepted.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.conditions_evaluated(), 0);
        m.inc_conditions_evaluated();
        m.inc_conditions_evaluated();
        assert_eq!(m.conditions_evaluated(), 2);

        m.inc_cache_hits();
        m.inc_cache_misses();
        m.inc_cache_misses();
        assert_eq!(m.cache_hits(), 1);
        assert_eq!(m.cache_misses(), 2);

        m.inc_resolutions();
        m.inc_units_accepted();
        assert_eq!(m.resolutions_run(), 1);
        assert_eq!(m.units_accepted(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_resolutions();
        m.inc_cache_hits();
        m.inc_units_accepted();
        m.reset();
        assert_eq!(m.resolutions_run(), 0);
        assert_eq!(m.cache_hits(), 0);
        assert_eq!(m.units_accepted(), 0);
    }
}
