//! Structured observability hooks for resolution runs.
//!
//! This module provides:
//! - A run-scoped tracing span via the [`ResolutionSpan`] RAII guard
//! - Emission functions for the lifecycle events of a run: start, phase-1
//!   prune, plan, per-unit transitions, finish and fatal errors
//!
//! Events carry a dotted `event` field so they can be filtered uniformly.

use tracing::{debug, info, warn};

/// RAII guard that enters a run-scoped span for the duration of a resolution.
///
/// # Example
///
/// ```ignore
/// let _span = ResolutionSpan::enter("5f0c...");
/// // every event below is associated with run_id = "5f0c..."
/// ```
pub struct ResolutionSpan {
    _span: tracing::span::EnteredSpan,
}

impl ResolutionSpan {
    pub fn enter(run_id: &str) -> Self {
        let span = tracing::info_span!("autoconf.resolution", run_id = %run_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_resolution_started(candidates: usize, exclusions: usize) {
    info!(
        event = "autoconf.resolution.started",
        candidates = candidates,
        exclusions = exclusions,
    );
}

/// Emit event: phase 1 finished; `survivors` units go on to ordering.
pub fn emit_static_phase_finished(survivors: usize, rejected: usize) {
    debug!(
        event = "autoconf.phase1.finished",
        survivors = survivors,
        rejected = rejected,
    );
}

pub fn emit_plan_computed(plan_len: usize) {
    debug!(event = "autoconf.plan.computed", units = plan_len);
}

pub fn emit_unit_accepted(unit_id: &str, generation: u64, pass: usize) {
    debug!(
        event = "autoconf.unit.accepted",
        unit_id = %unit_id,
        generation = generation,
        pass = pass,
    );
}

pub fn emit_unit_rejected(unit_id: &str, reason: Option<&str>) {
    debug!(
        event = "autoconf.unit.rejected",
        unit_id = %unit_id,
        reason = reason.unwrap_or("<none>"),
    );
}

pub fn emit_unit_excluded(unit_id: &str, excluded_by: Option<&str>) {
    debug!(
        event = "autoconf.unit.excluded",
        unit_id = %unit_id,
        excluded_by = excluded_by.unwrap_or("<explicit>"),
    );
}

/// Emit event: an exclusion named an id that is not a candidate (warning level).
pub fn emit_unknown_exclusion(unit_id: &str) {
    warn!(event = "autoconf.exclusion.unknown", unit_id = %unit_id);
}

/// Emit event: an accepted unit tried to exclude an already-accepted one.
pub fn emit_late_exclusion(unit_id: &str, target: &str) {
    warn!(
        event = "autoconf.exclusion.ignored",
        unit_id = %unit_id,
        target = %target,
        "target was accepted before the excluding unit"
    );
}

pub fn emit_resolution_finished(accepted: usize, rejected: usize, excluded: usize, passes: usize) {
    info!(
        event = "autoconf.resolution.finished",
        accepted = accepted,
        rejected = rejected,
        excluded = excluded,
        passes = passes,
    );
}

/// Emit event: the run aborted (warning level).
pub fn emit_resolution_failed(error: &dyn std::fmt::Display) {
    warn!(event = "autoconf.resolution.failed", error = %error);
}
