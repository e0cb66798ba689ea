//! End-to-end resolution behaviour: back-off, visibility, exclusions,
//! ordering among survivors, cycles, determinism and failure reporting.

use autoconf_core::{
    AutoConfigurationEngine, BeanContribution, CandidateRegistry, ClassPath, Condition,
    ConfigurationUnit, Environment, EvaluationPhase, LookupError, MapPropertySource,
    ResolutionError, ResolutionRequest, StaticClassPath, UnitState,
};

fn engine(units: Vec<ConfigurationUnit>) -> AutoConfigurationEngine {
    engine_with(units, Environment::empty())
}

fn engine_with(units: Vec<ConfigurationUnit>, env: Environment) -> AutoConfigurationEngine {
    AutoConfigurationEngine::new(CandidateRegistry::new(units).expect("valid candidates"), env)
}

fn classes(names: &[&str]) -> Environment {
    Environment::new(
        StaticClassPath::new(names.iter().copied()),
        MapPropertySource::default(),
    )
}

// ---- Back-off scenario ----

#[test]
fn data_source_scenario_accepts_a_then_c_and_rejects_b() {
    let units = vec![
        ConfigurationUnit::new("A").contributes(BeanContribution::of_kind("ds")),
        ConfigurationUnit::new("B").when(Condition::bean_absent("ds")),
        ConfigurationUnit::new("C")
            .when(Condition::bean_present("ds"))
            .after("A"),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();

    assert_eq!(resolution.accepted, vec!["A", "C"]);
    let a = resolution.report.unit("A").unwrap();
    assert_eq!(a.accepted_generation, Some(1));

    let b = resolution.report.unit("B").unwrap();
    assert_eq!(b.state, UnitState::Rejected);
    assert_eq!(b.phase, Some(EvaluationPhase::Registry));
    assert!(b.reasons.iter().any(|r| r.contains("ds") && r.contains("found bean")));

    let c = resolution.report.unit("C").unwrap();
    assert_eq!(c.accepted_generation, Some(2));
    assert_eq!(resolution.registry.generation(), 2);
}

#[test]
fn user_bean_makes_unit_back_off() {
    let units = vec![ConfigurationUnit::new("DataSource")
        .when(Condition::bean_absent("ds"))
        .contributes(BeanContribution::new("autoDs", "ds"))];
    let request = ResolutionRequest::new().with_bean(BeanContribution::new("userDs", "ds"));
    let resolution = engine(units).resolve(&request).unwrap();

    assert!(resolution.accepted.is_empty());
    let reasons = &resolution.report.unit("DataSource").unwrap().reasons;
    assert!(reasons[0].contains("userDs"));
    assert_eq!(resolution.registry.bean_names("ds", None), vec!["userDs"]);
}

// ---- Monotonic visibility ----

#[test]
fn later_units_see_every_earlier_contribution() {
    let units = vec![
        ConfigurationUnit::new("pool").contributes(BeanContribution::of_kind("pool")),
        ConfigurationUnit::new("ds")
            .after("pool")
            .contributes(BeanContribution::of_kind("ds")),
        ConfigurationUnit::new("tx")
            .after("ds")
            .when(Condition::bean_present("pool"))
            .when(Condition::bean_present("ds")),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    assert_eq!(resolution.accepted, vec!["pool", "ds", "tx"]);
    assert_eq!(resolution.report.passes, 1);
}

// ---- Exclusions ----

#[test]
fn explicit_exclusion_wins_over_everything() {
    let units = vec![
        ConfigurationUnit::new("A"),
        ConfigurationUnit::new("B").excludes("A"),
    ];
    let resolution = engine(units)
        .resolve(&ResolutionRequest::new().exclude("A"))
        .unwrap();
    let a = resolution.report.unit("A").unwrap();
    assert_eq!(a.state, UnitState::Excluded);
    assert_eq!(a.excluded_by, None);
    assert_eq!(resolution.accepted, vec!["B"]);
}

#[test]
fn excluded_unit_does_not_exclude_on_its_own_behalf() {
    let units = vec![
        ConfigurationUnit::new("A").excludes("C"),
        ConfigurationUnit::new("C"),
    ];
    let resolution = engine(units)
        .resolve(&ResolutionRequest::new().exclude("A"))
        .unwrap();
    assert_eq!(resolution.report.state_of("A"), Some(UnitState::Excluded));
    assert_eq!(resolution.report.state_of("C"), Some(UnitState::Accepted));
}

#[test]
fn rejected_unit_does_not_exclude() {
    let units = vec![
        ConfigurationUnit::new("A")
            .when(Condition::class_present("x.Missing"))
            .excludes("C"),
        ConfigurationUnit::new("C"),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    assert_eq!(resolution.report.state_of("A"), Some(UnitState::Rejected));
    assert_eq!(resolution.report.state_of("C"), Some(UnitState::Accepted));
}

#[test]
fn accepted_unit_excludes_pending_target() {
    let units = vec![
        ConfigurationUnit::new("Modern").excludes("Legacy"),
        ConfigurationUnit::new("Legacy"),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    let legacy = resolution.report.unit("Legacy").unwrap();
    assert_eq!(legacy.state, UnitState::Excluded);
    assert_eq!(legacy.excluded_by.as_deref(), Some("Modern"));
    assert_eq!(resolution.accepted, vec!["Modern"]);
}

// ---- Ordering among survivors ----

#[test]
fn broken_before_constraint_from_pruned_unit_is_ignored() {
    let units = vec![
        ConfigurationUnit::new("B"),
        ConfigurationUnit::new("A")
            .when(Condition::class_present("x.Absent"))
            .before("B"),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    assert_eq!(resolution.accepted, vec!["B"]);
    let a = resolution.report.unit("A").unwrap();
    assert_eq!(a.state, UnitState::Rejected);
    assert_eq!(a.phase, Some(EvaluationPhase::Static));
    assert_eq!(resolution.plan.ids().to_vec(), vec!["B"]);
}

#[test]
fn plan_orders_survivors_by_constraints() {
    let units = vec![
        ConfigurationUnit::new("web").after("json"),
        ConfigurationUnit::new("json").after("core"),
        ConfigurationUnit::new("core"),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    assert_eq!(resolution.accepted, vec!["core", "json", "web"]);
}

#[test]
fn second_pass_acceptance_keeps_plan_order() {
    // X must precede Y but only matches once Z, planned after Y, has run.
    let units = vec![
        ConfigurationUnit::new("X")
            .before("Y")
            .when(Condition::bean_present("b")),
        ConfigurationUnit::new("Y"),
        ConfigurationUnit::new("Z")
            .after("Y")
            .contributes(BeanContribution::of_kind("b")),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();

    assert_eq!(resolution.plan.ids().to_vec(), vec!["X", "Y", "Z"]);
    assert_eq!(resolution.accepted, vec!["X", "Y", "Z"]);
    assert_eq!(resolution.report.accepted_order, resolution.accepted);
    assert_eq!(resolution.report.passes, 2);

    let generation = |id: &str| resolution.report.unit(id).unwrap().accepted_generation;
    assert_eq!(generation("Y"), Some(1));
    assert_eq!(generation("Z"), Some(2));
    assert_eq!(generation("X"), Some(3));

    let text = resolution.report.render_text();
    assert!(text.find("   X (generation 3)").unwrap() < text.find("   Y (generation 1)").unwrap());
}

// ---- Cycles ----

#[test]
fn cycle_aborts_before_any_registry_evaluation() {
    let units = vec![
        ConfigurationUnit::new("A")
            .before("B")
            .contributes(BeanContribution::of_kind("a")),
        ConfigurationUnit::new("B").before("A"),
        ConfigurationUnit::new("Free"),
    ];
    let failure = engine(units).resolve(&ResolutionRequest::new()).unwrap_err();

    let cycle = failure.ordering_error().expect("ordering error");
    assert!(cycle.cycle_members.contains(&"A".to_string()));
    assert!(cycle.cycle_members.contains(&"B".to_string()));
    assert!(!cycle.cycle_members.contains(&"Free".to_string()));

    assert!(failure.report.accepted_order.is_empty());
    assert!(failure.report.plan.is_none());
    for unit in &failure.report.units {
        assert_eq!(unit.state, UnitState::Pending, "{} was evaluated", unit.unit_id);
    }
}

#[test]
fn cycle_through_pruned_unit_is_not_a_cycle() {
    let units = vec![
        ConfigurationUnit::new("A").before("B"),
        ConfigurationUnit::new("B")
            .before("A")
            .when(Condition::class_present("x.Missing")),
    ];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    assert_eq!(resolution.accepted, vec!["A"]);
}

// ---- Composite short-circuit through the engine ----

#[test]
fn all_of_reports_only_evaluated_children() {
    let units = vec![ConfigurationUnit::new("U").when(Condition::all_of(vec![
        Condition::class_present("X"),
        Condition::bean_present("y"),
    ]))];
    let resolution = engine(units).resolve(&ResolutionRequest::new()).unwrap();
    let u = resolution.report.unit("U").unwrap();
    assert_eq!(u.state, UnitState::Rejected);
    assert_eq!(u.reasons.len(), 1);
}

#[test]
fn none_of_reports_every_child() {
    let units = vec![ConfigurationUnit::new("U").when(Condition::none_of(vec![
        Condition::class_present("X"),
        Condition::bean_present("y"),
    ]))];
    let resolution = engine_with(units, classes(&["X"]))
        .resolve(&ResolutionRequest::new())
        .unwrap();
    let u = resolution.report.unit("U").unwrap();
    assert_eq!(u.state, UnitState::Rejected);
    assert_eq!(u.reasons.len(), 2);
}

// ---- Determinism ----

#[test]
fn repeated_runs_produce_identical_reports() {
    let units = vec![
        ConfigurationUnit::new("d").after("a"),
        ConfigurationUnit::new("b").when(Condition::bean_absent("x")),
        ConfigurationUnit::new("a").contributes(BeanContribution::of_kind("x")),
        ConfigurationUnit::new("c").when(Condition::bean_present("x")),
        ConfigurationUnit::new("e")
            .when(Condition::class_present("e.Cls"))
            .excludes("c"),
    ];
    let engine = engine_with(units, classes(&["e.Cls"]));
    let request = ResolutionRequest::new();

    let first = engine.resolve(&request).unwrap();
    let second = engine.resolve(&request).unwrap();
    assert_eq!(first.accepted, second.accepted);
    assert_eq!(first.report, second.report);
    assert_eq!(first.report.digest().unwrap(), second.report.digest().unwrap());
    assert_ne!(first.run_id, second.run_id);
}

// ---- Lookup failures ----

struct FailingClassPath;

impl ClassPath for FailingClassPath {
    fn class_exists(&self, name: &str) -> Result<bool, LookupError> {
        if name == "ok.Cls" {
            Ok(true)
        } else {
            Err(LookupError::MalformedClassName(name.to_string()))
        }
    }
}

#[test]
fn lookup_failure_is_fatal_and_keeps_partial_report() {
    let units = vec![
        ConfigurationUnit::new("Good").when(Condition::class_absent("x.Gone")),
        ConfigurationUnit::new("Fine").when(Condition::class_present("ok.Cls")),
        ConfigurationUnit::new("Bad").when(Condition::class_present("ok.Cls")),
    ];
    // "Good" asks for x.Gone, which this class path refuses to answer.
    let env = Environment::new(FailingClassPath, MapPropertySource::default());
    let failure = engine_with(units, env)
        .resolve(&ResolutionRequest::new())
        .unwrap_err();

    match failure.resolution_error() {
        Some(ResolutionError::Lookup {
            unit_id, condition, ..
        }) => {
            assert_eq!(unit_id, "Good");
            assert!(condition.contains("x.Gone"));
        }
        other => panic!("expected lookup error, got {other:?}"),
    }
    assert!(failure.report.accepted_order.is_empty());
    let good = failure.report.unit("Good").unwrap();
    assert_eq!(good.state, UnitState::Evaluating);
    assert!(good.reasons.iter().any(|r| r.contains("evaluation aborted")));
    assert_eq!(failure.report.state_of("Fine"), Some(UnitState::Pending));
}

#[test]
fn malformed_class_name_is_not_a_silent_mismatch() {
    let units = vec![ConfigurationUnit::new("U").when(Condition::class_present("com..Broken"))];
    let failure = engine(units).resolve(&ResolutionRequest::new()).unwrap_err();
    let err = failure.resolution_error().expect("resolution error");
    assert_eq!(err.unit_id(), Some("U"));
    assert!(err.to_string().contains("malformed class name"));
}

#[test]
fn failure_in_phase_two_keeps_earlier_acceptances_in_report() {
    let units = vec![
        ConfigurationUnit::new("First").contributes(BeanContribution::of_kind("ds")),
        ConfigurationUnit::new("Second").when(Condition::any_of(vec![
            Condition::bean_absent("ds"),
            Condition::class_present("bad..name"),
        ])),
    ];
    let failure = engine(units).resolve(&ResolutionRequest::new()).unwrap_err();
    assert_eq!(failure.report.accepted_order, vec!["First"]);
    assert_eq!(failure.report.final_generation, 1);
    assert_eq!(
        failure.report.unit("First").unwrap().accepted_generation,
        Some(failure.report.final_generation)
    );

    let second = failure.report.unit("Second").unwrap();
    assert_eq!(second.state, UnitState::Evaluating);
    assert!(second.reasons.last().unwrap().contains("malformed class name"));

    let text = failure.report.render_text();
    assert!(text.contains("Aborted during evaluation:"));
    assert!(!text.contains("Not evaluated:"));
}
