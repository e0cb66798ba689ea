//! The auto-configuration resolution driver.
//!
//! A run moves every candidate through
//! `Pending → Evaluating → {Accepted | Rejected | Excluded}`:
//!
//! 1. Explicit exclusions (request plus the exclusion property) are applied.
//! 2. Phase 1 evaluates class-path and property conditions, which do not
//!    depend on the registry, and rejects units that fail them.
//! 3. Survivors are ordered by [`OrderingResolver`]; a cycle aborts the run
//!    before any unit is evaluated against the registry.
//! 4. Phase 2 walks the plan in passes. Each pass evaluates every pending
//!    unit's bean conditions and requirements against the current registry
//!    generation; accepted units merge their beans (advancing the generation)
//!    and exclude their exclusion targets. Passes repeat until one accepts
//!    nothing. Units still pending at that point are rejected.
//!
//! Accepted units are never re-evaluated, and the registry only grows, so
//! given identical inputs two runs produce identical reports. The accepted
//! sequence follows plan order regardless of the pass a unit was accepted
//! in; `accepted_generation` records the acceptance order.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{CacheStats, ConditionEvaluationCache};
use crate::candidate::{CandidateRegistry, CandidateSource, ConfigurationUnit};
use crate::condition::{Condition, EvaluationOutcome};
use crate::environment::Environment;
use crate::error::{AutoConfigError, LookupError, ResolutionError, ResolutionFailure, Result};
use crate::metrics::METRICS;
use crate::obs::{
    emit_late_exclusion, emit_plan_computed, emit_resolution_failed, emit_resolution_finished,
    emit_resolution_started, emit_static_phase_finished, emit_unit_accepted, emit_unit_excluded,
    emit_unit_rejected, emit_unknown_exclusion, ResolutionSpan,
};
use crate::ordering::{OrderedPlan, OrderingResolver};
use crate::report::{EvaluationPhase, EvaluationReport, UnitState};
use crate::snapshot::{BeanContribution, RegistrySnapshot};

/// Property holding a comma-separated list of unit ids to exclude.
pub const DEFAULT_EXCLUSION_PROPERTY: &str = "autoconfigure.exclude";

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionOptions {
    /// Upper bound on phase-2 passes; defaults to `plan length + 1`.
    pub max_passes: Option<usize>,
    /// Property consulted for additional exclusions; `None` disables it.
    pub exclusion_property: Option<String>,
}

impl Default for ResolutionOptions {
    fn default() -> Self {
        Self {
            max_passes: None,
            exclusion_property: Some(DEFAULT_EXCLUSION_PROPERTY.to_string()),
        }
    }
}

/// Per-run inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionRequest {
    /// Beans present before resolution (user-defined configuration).
    pub initial_beans: Vec<BeanContribution>,
    /// Unit ids disabled by the caller.
    pub exclusions: BTreeSet<String>,
}

impl ResolutionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bean(mut self, bean: BeanContribution) -> Self {
        self.initial_beans.push(bean);
        self
    }

    pub fn exclude(mut self, unit_id: impl Into<String>) -> Self {
        self.exclusions.insert(unit_id.into());
        self
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub run_id: Uuid,
    /// Accepted unit ids in plan order.
    pub accepted: Vec<String>,
    pub plan: OrderedPlan,
    pub report: EvaluationReport,
    /// Final registry contents.
    pub registry: RegistrySnapshot,
    pub cache_stats: CacheStats,
}

impl Resolution {
    pub fn is_accepted(&self, unit_id: &str) -> bool {
        self.accepted.iter().any(|id| id == unit_id)
    }
}

/// Resolves a candidate set against an environment.
#[derive(Debug, Clone)]
pub struct AutoConfigurationEngine {
    candidates: CandidateRegistry,
    environment: Environment,
    options: ResolutionOptions,
}

impl AutoConfigurationEngine {
    pub fn new(candidates: CandidateRegistry, environment: Environment) -> Self {
        Self {
            candidates,
            environment,
            options: ResolutionOptions::default(),
        }
    }

    /// Load candidates from `source` and register them.
    pub fn from_source(source: &dyn CandidateSource, environment: Environment) -> Result<Self> {
        Ok(Self::new(CandidateRegistry::load(source)?, environment))
    }

    /// Override options (builder pattern).
    pub fn with_options(mut self, options: ResolutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn candidates(&self) -> &CandidateRegistry {
        &self.candidates
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn options(&self) -> &ResolutionOptions {
        &self.options
    }

    /// Run a full resolution.
    ///
    /// On failure the returned [`ResolutionFailure`] carries the report as it
    /// stood when the run aborted.
    pub fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> std::result::Result<Resolution, ResolutionFailure> {
        let run_id = Uuid::new_v4();
        let _span = ResolutionSpan::enter(&run_id.to_string());
        METRICS.inc_resolutions();

        let mut run = Run::new(self, request);
        let outcome = run.prepare().and_then(|plan| {
            run.drive(&plan)?;
            Ok(plan)
        });
        METRICS.flush();

        match outcome {
            Ok(plan) => Ok(run.finish(run_id, plan)),
            Err(error) => {
                emit_resolution_failed(&error);
                run.seal(Some(&error));
                Err(ResolutionFailure::new(error, run.report))
            }
        }
    }

    /// Exclusions, phase 1 and ordering only; nothing is evaluated against
    /// the registry.
    pub fn plan(
        &self,
        request: &ResolutionRequest,
    ) -> std::result::Result<(OrderedPlan, EvaluationReport), ResolutionFailure> {
        let run_id = Uuid::new_v4();
        let _span = ResolutionSpan::enter(&run_id.to_string());

        let mut run = Run::new(self, request);
        match run.prepare() {
            Ok(plan) => Ok((plan, run.report)),
            Err(error) => {
                emit_resolution_failed(&error);
                run.seal(Some(&error));
                Err(ResolutionFailure::new(error, run.report))
            }
        }
    }
}

/// Mutable state of one run. Dropped when the run ends.
struct Run<'e> {
    engine: &'e AutoConfigurationEngine,
    request: &'e ResolutionRequest,
    report: EvaluationReport,
    cache: ConditionEvaluationCache,
    registry: RegistrySnapshot,
    /// Phase-1 reasons per discovery position, kept for phase-2 reports.
    static_reasons: Vec<Vec<String>>,
}

impl<'e> Run<'e> {
    fn new(engine: &'e AutoConfigurationEngine, request: &'e ResolutionRequest) -> Self {
        Self {
            engine,
            request,
            report: EvaluationReport::new(&engine.candidates),
            cache: ConditionEvaluationCache::new(),
            registry: RegistrySnapshot::with_initial_beans(request.initial_beans.iter().cloned()),
            static_reasons: vec![Vec::new(); engine.candidates.len()],
        }
    }

    /// Exclusions, phase 1, ordering.
    fn prepare(&mut self) -> Result<OrderedPlan> {
        let engine = self.engine;
        let exclusions = self.collect_exclusions()?;
        emit_resolution_started(engine.candidates.len(), exclusions.len());

        for id in &exclusions {
            match engine.candidates.position(id) {
                Some(pos) => {
                    let entry = self.report.entry_mut(pos);
                    entry.state = UnitState::Excluded;
                    emit_unit_excluded(id, None);
                }
                None => {
                    emit_unknown_exclusion(id);
                    self.report.unknown_exclusions.push(id.clone());
                }
            }
        }

        let mut survivors: Vec<&'e ConfigurationUnit> = Vec::new();
        let mut rejected = 0;
        for (pos, unit) in engine.candidates.iter().enumerate() {
            if self.report.units[pos].state != UnitState::Pending {
                continue;
            }
            if self.evaluate_static(pos, unit)? {
                survivors.push(unit);
            } else {
                rejected += 1;
            }
        }
        emit_static_phase_finished(survivors.len(), rejected);

        let plan = OrderingResolver::resolve(&survivors)?;
        emit_plan_computed(plan.len());
        self.report.plan = Some(plan.clone());
        Ok(plan)
    }

    fn collect_exclusions(&self) -> Result<BTreeSet<String>> {
        let mut exclusions = self.request.exclusions.clone();
        if let Some(key) = &self.engine.options.exclusion_property {
            let value = self
                .engine
                .environment
                .properties()
                .property(key)
                .map_err(|e| ResolutionError::Environment {
                    key: key.clone(),
                    cause: e.to_string(),
                })?;
            if let Some(value) = value {
                exclusions.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
        }
        Ok(exclusions)
    }

    /// Evaluate class-path and property conditions in declaration order,
    /// stopping at the first failure. Returns whether the unit survives.
    fn evaluate_static(&mut self, pos: usize, unit: &ConfigurationUnit) -> Result<bool> {
        self.report.entry_mut(pos).state = UnitState::Evaluating;
        let mut outcome = EvaluationOutcome::new(true);
        for (slot, condition) in unit.static_conditions() {
            let child = self.evaluate_condition(unit, slot, condition)?;
            let matched = child.matched;
            outcome.absorb(child);
            if !matched {
                outcome.matched = false;
                break;
            }
        }

        self.static_reasons[pos] = outcome.reasons.clone();
        let entry = self.report.entry_mut(pos);
        entry.reasons = outcome.reasons;
        if outcome.matched {
            entry.state = UnitState::Pending;
        } else {
            entry.state = UnitState::Rejected;
            entry.phase = Some(EvaluationPhase::Static);
            emit_unit_rejected(&unit.id, entry.reasons.last().map(String::as_str));
        }
        Ok(outcome.matched)
    }

    /// Phase 2: passes over the plan until no pass accepts anything.
    fn drive(&mut self, plan: &OrderedPlan) -> Result<()> {
        let engine = self.engine;
        let mut pending: Vec<usize> = plan
            .iter()
            .filter_map(|id| engine.candidates.position(id))
            .collect();
        let max_passes = engine.options.max_passes.unwrap_or(pending.len() + 1);
        let mut pass = 0;

        loop {
            pending.retain(|&pos| self.report.units[pos].state == UnitState::Pending);
            if pending.is_empty() {
                break;
            }
            if pass >= max_passes {
                return Err(ResolutionError::FixpointNotReached {
                    passes: pass,
                    pending: pending
                        .iter()
                        .map(|&pos| engine.candidates.units()[pos].id.clone())
                        .collect(),
                }
                .into());
            }
            pass += 1;
            self.report.passes = pass;

            let mut accepted_this_pass = 0;
            for &pos in &pending {
                // May have been excluded earlier in this pass.
                if self.report.units[pos].state != UnitState::Pending {
                    continue;
                }
                let unit = &engine.candidates.units()[pos];
                self.report.entry_mut(pos).state = UnitState::Evaluating;

                let outcome = self.evaluate_registry(unit)?;
                let entry = self.report.entry_mut(pos);
                entry.phase = Some(EvaluationPhase::Registry);
                entry.reasons = self.static_reasons[pos].clone();
                entry.reasons.extend(outcome.reasons);

                if outcome.matched {
                    self.accept(pos, unit, pass);
                    accepted_this_pass += 1;
                } else {
                    entry.state = UnitState::Pending;
                }
            }

            tracing::debug!(pass = pass, accepted = accepted_this_pass, "pass complete");
            if accepted_this_pass == 0 {
                break;
            }
        }

        for &pos in &pending {
            let entry = self.report.entry_mut(pos);
            if entry.state == UnitState::Pending {
                entry.state = UnitState::Rejected;
                emit_unit_rejected(&entry.unit_id, entry.reasons.last().map(String::as_str));
            }
        }
        Ok(())
    }

    /// Bean conditions in declaration order, then `requires`, stopping at
    /// the first failure.
    fn evaluate_registry(&mut self, unit: &ConfigurationUnit) -> Result<EvaluationOutcome> {
        let mut outcome = EvaluationOutcome::new(true);
        let declared = unit.deferred_conditions().map(|(slot, c)| (slot, c.clone()));
        let checks: Vec<(usize, Condition)> =
            declared.chain(unit.requirement_conditions()).collect();

        for (slot, condition) in &checks {
            let child = self.evaluate_condition(unit, *slot, condition)?;
            let matched = child.matched;
            outcome.absorb(child);
            if !matched {
                outcome.matched = false;
                break;
            }
        }
        Ok(outcome)
    }

    fn evaluate_condition(
        &mut self,
        unit: &ConfigurationUnit,
        slot: usize,
        condition: &Condition,
    ) -> Result<EvaluationOutcome> {
        self.cache
            .get_or_evaluate(
                &unit.id,
                slot,
                condition,
                &self.engine.environment,
                &self.registry,
            )
            .map_err(|e| lookup_failure(unit, condition, e))
    }

    /// The only place the registry is mutated.
    fn accept(&mut self, pos: usize, unit: &ConfigurationUnit, pass: usize) {
        let engine = self.engine;
        let generation = self.registry.merge(&unit.id, &unit.contributes);

        let entry = self.report.entry_mut(pos);
        entry.state = UnitState::Accepted;
        entry.accepted_generation = Some(generation);
        self.report.accepted_order.push(unit.id.clone());
        METRICS.inc_units_accepted();
        emit_unit_accepted(&unit.id, generation, pass);

        for target in &unit.excludes {
            let Some(target_pos) = engine.candidates.position(target) else {
                tracing::debug!(unit_id = %unit.id, target = %target, "exclusion target is not a candidate");
                continue;
            };
            let target_state = self.report.units[target_pos].state;
            match target_state {
                UnitState::Pending => {
                    let excluded = self.report.entry_mut(target_pos);
                    excluded.state = UnitState::Excluded;
                    excluded.excluded_by = Some(unit.id.clone());
                    emit_unit_excluded(target, Some(unit.id.as_str()));
                }
                UnitState::Accepted => {
                    emit_late_exclusion(&unit.id, target);
                    self.report
                        .entry_mut(pos)
                        .reasons
                        .push(format!("exclusion of '{target}' ignored: already accepted"));
                }
                UnitState::Evaluating | UnitState::Rejected | UnitState::Excluded => {}
            }
        }
    }

    /// Last touches to the report before it leaves the run. On failure the
    /// lookup cause is recorded on the unit that aborted.
    fn seal(&mut self, error: Option<&AutoConfigError>) {
        if let Some(plan) = &self.report.plan {
            let mut ordered = std::mem::take(&mut self.report.accepted_order);
            ordered.sort_by_key(|id| plan.position(id).unwrap_or(usize::MAX));
            self.report.accepted_order = ordered;
        }
        self.report.final_generation = self.registry.generation();

        if let Some(AutoConfigError::Resolution(ResolutionError::Lookup {
            unit_id, cause, ..
        })) = error
        {
            if let Some(pos) = self.engine.candidates.position(unit_id) {
                self.report
                    .entry_mut(pos)
                    .reasons
                    .push(format!("evaluation aborted: {cause}"));
            }
        }
    }

    fn finish(mut self, run_id: Uuid, plan: OrderedPlan) -> Resolution {
        self.seal(None);
        let report = self.report;
        emit_resolution_finished(
            report.accepted_order.len(),
            report.rejected().count(),
            report.excluded().count(),
            report.passes,
        );
        Resolution {
            run_id,
            accepted: report.accepted_order.clone(),
            plan,
            report,
            registry: self.registry,
            cache_stats: self.cache.stats(),
        }
    }
}

fn lookup_failure(
    unit: &ConfigurationUnit,
    condition: &Condition,
    error: LookupError,
) -> AutoConfigError {
    ResolutionError::Lookup {
        unit_id: unit.id.clone(),
        condition: condition.to_string(),
        cause: error.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{MapPropertySource, StaticClassPath};

    fn engine(units: Vec<ConfigurationUnit>, env: Environment) -> AutoConfigurationEngine {
        AutoConfigurationEngine::new(CandidateRegistry::new(units).unwrap(), env)
    }

    #[test]
    fn test_late_bean_gets_second_pass() {
        // "web" needs a bean that only "pool" (planned later) contributes.
        let units = vec![
            ConfigurationUnit::new("web").when(Condition::bean_present("pool")),
            ConfigurationUnit::new("pool").contributes(BeanContribution::of_kind("pool")),
        ];
        let resolution = engine(units, Environment::empty())
            .resolve(&ResolutionRequest::new())
            .unwrap();
        assert_eq!(resolution.accepted, vec!["web", "pool"]);
        assert_eq!(resolution.report.passes, 2);
        let web = resolution.report.unit("web").unwrap();
        assert_eq!(web.accepted_generation, Some(2));
    }

    #[test]
    fn test_max_passes_bound_raises_fixpoint_error() {
        let units = vec![
            ConfigurationUnit::new("web").when(Condition::bean_present("pool")),
            ConfigurationUnit::new("pool").contributes(BeanContribution::of_kind("pool")),
        ];
        let options = ResolutionOptions {
            max_passes: Some(1),
            ..ResolutionOptions::default()
        };
        let failure = engine(units, Environment::empty())
            .with_options(options)
            .resolve(&ResolutionRequest::new())
            .unwrap_err();
        let err = failure.resolution_error().unwrap();
        assert!(matches!(err, ResolutionError::FixpointNotReached { passes: 1, .. }));
        assert_eq!(err.unit_id(), Some("web"));
        assert_eq!(failure.report.state_of("pool"), Some(UnitState::Accepted));
    }

    #[test]
    fn test_exclusion_property_is_merged() {
        let env = Environment::new(
            StaticClassPath::default(),
            MapPropertySource::default().with(DEFAULT_EXCLUSION_PROPERTY, " a , ,b"),
        );
        let units = vec![
            ConfigurationUnit::new("a"),
            ConfigurationUnit::new("b"),
            ConfigurationUnit::new("c"),
        ];
        let resolution = engine(units, env).resolve(&ResolutionRequest::new()).unwrap();
        assert_eq!(resolution.accepted, vec!["c"]);
        assert_eq!(resolution.report.state_of("a"), Some(UnitState::Excluded));
        assert_eq!(resolution.report.state_of("b"), Some(UnitState::Excluded));
    }

    #[test]
    fn test_exclusion_property_can_be_disabled() {
        let env = Environment::new(
            StaticClassPath::default(),
            MapPropertySource::default().with(DEFAULT_EXCLUSION_PROPERTY, "a"),
        );
        let options = ResolutionOptions {
            exclusion_property: None,
            ..ResolutionOptions::default()
        };
        let resolution = engine(vec![ConfigurationUnit::new("a")], env)
            .with_options(options)
            .resolve(&ResolutionRequest::new())
            .unwrap();
        assert_eq!(resolution.accepted, vec!["a"]);
    }

    #[test]
    fn test_late_exclusion_is_recorded_not_applied() {
        let units = vec![
            ConfigurationUnit::new("first"),
            ConfigurationUnit::new("second").excludes("first"),
        ];
        let resolution = engine(units, Environment::empty())
            .resolve(&ResolutionRequest::new())
            .unwrap();
        assert_eq!(resolution.accepted, vec!["first", "second"]);
        let second = resolution.report.unit("second").unwrap();
        assert!(second.reasons[0].contains("ignored"));
    }

    #[test]
    fn test_requires_checked_after_conditions() {
        let units = vec![ConfigurationUnit::new("jdbc")
            .when(Condition::bean_absent("template"))
            .requires("ds")];
        let resolution = engine(units, Environment::empty())
            .resolve(&ResolutionRequest::new())
            .unwrap();
        let jdbc = resolution.report.unit("jdbc").unwrap();
        assert_eq!(jdbc.state, UnitState::Rejected);
        assert_eq!(jdbc.reasons.len(), 2);
        assert!(jdbc.reasons[1].contains("no bean of type 'ds'"));
    }

    #[test]
    fn test_unknown_exclusions_are_reported() {
        let resolution = engine(vec![ConfigurationUnit::new("a")], Environment::empty())
            .resolve(&ResolutionRequest::new().exclude("ghost"))
            .unwrap();
        assert_eq!(resolution.report.unknown_exclusions, vec!["ghost"]);
        assert_eq!(resolution.accepted, vec!["a"]);
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_decisions_are_traced() {
        let units = vec![
            ConfigurationUnit::new("modern").excludes("legacy"),
            ConfigurationUnit::new("legacy"),
        ];
        engine(units, Environment::empty())
            .resolve(&ResolutionRequest::new().exclude("ghost"))
            .unwrap();
        assert!(logs_contain("autoconf.unit.accepted"));
        assert!(logs_contain("autoconf.unit.excluded"));
        assert!(logs_contain("autoconf.exclusion.unknown"));
    }

    #[test]
    fn test_plan_only_runs_phase_one() {
        let env = Environment::new(StaticClassPath::new(["x.Present"]), MapPropertySource::default());
        let units = vec![
            ConfigurationUnit::new("b").after("a"),
            ConfigurationUnit::new("a"),
            ConfigurationUnit::new("gone").when(Condition::class_present("x.Missing")),
        ];
        let (plan, report) = engine(units, env).plan(&ResolutionRequest::new()).unwrap();
        assert_eq!(plan.ids().to_vec(), vec!["a", "b"]);
        assert_eq!(report.state_of("gone"), Some(UnitState::Rejected));
        assert_eq!(report.state_of("a"), Some(UnitState::Pending));
    }
}
