//! Conditions gating unit activation, and their evaluation.
//!
//! A [`Condition`] is a plain value: a tagged union of leaf predicates
//! (class, bean, property) and composites. Evaluation is a pure function of
//! the condition and an [`EvaluationContext`]; outcomes are cached
//! externally by [`crate::cache::ConditionEvaluationCache`], never on the
//! condition itself.
//!
//! Composite semantics:
//!
//! - `AllOf` stops at the first failing child.
//! - `AnyOf` stops at the first matching child.
//! - `NoneOf` always evaluates every child so its diagnostics are complete.
//!
//! In every case the outcome carries the reasons of exactly the children
//! that were evaluated, in evaluation order.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cache::ClassPresenceCache;
use crate::environment::{parse_bool_token, Environment};
use crate::error::LookupError;
use crate::snapshot::RegistrySnapshot;

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A predicate gating whether a configuration unit activates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// The named class must be on the class path.
    ClassPresent { class_name: String },
    /// The named class must not be on the class path.
    ClassAbsent { class_name: String },
    /// At least one bean of `bean_type` (named `qualifier`, if given) must be registered.
    BeanPresent {
        bean_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualifier: Option<String>,
    },
    /// No bean of `bean_type` (named `qualifier`, if given) may be registered.
    BeanAbsent {
        bean_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qualifier: Option<String>,
    },
    /// A property must hold a value.
    ///
    /// With no `expected_value` the property is read as a boolean and must be
    /// truthy. An expected value of `"true"` or `"false"` (any case) is a
    /// boolean comparison; any other expected value is a case-sensitive
    /// exact match.
    PropertyMatch {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected_value: Option<String>,
        #[serde(default)]
        match_if_missing: bool,
    },
    AllOf { children: Vec<Condition> },
    AnyOf { children: Vec<Condition> },
    NoneOf { children: Vec<Condition> },
}

impl Condition {
    pub fn class_present(class_name: impl Into<String>) -> Self {
        Self::ClassPresent {
            class_name: class_name.into(),
        }
    }

    pub fn class_absent(class_name: impl Into<String>) -> Self {
        Self::ClassAbsent {
            class_name: class_name.into(),
        }
    }

    pub fn bean_present(bean_type: impl Into<String>) -> Self {
        Self::BeanPresent {
            bean_type: bean_type.into(),
            qualifier: None,
        }
    }

    pub fn bean_present_named(bean_type: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self::BeanPresent {
            bean_type: bean_type.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    pub fn bean_absent(bean_type: impl Into<String>) -> Self {
        Self::BeanAbsent {
            bean_type: bean_type.into(),
            qualifier: None,
        }
    }

    pub fn bean_absent_named(bean_type: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self::BeanAbsent {
            bean_type: bean_type.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Boolean flag that must be truthy and is not matched when unset.
    pub fn property_enabled(key: impl Into<String>) -> Self {
        Self::PropertyMatch {
            key: key.into(),
            expected_value: None,
            match_if_missing: false,
        }
    }

    pub fn property_equals(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::PropertyMatch {
            key: key.into(),
            expected_value: Some(expected.into()),
            match_if_missing: false,
        }
    }

    pub fn property(
        key: impl Into<String>,
        expected_value: Option<String>,
        match_if_missing: bool,
    ) -> Self {
        Self::PropertyMatch {
            key: key.into(),
            expected_value,
            match_if_missing,
        }
    }

    pub fn all_of(children: Vec<Condition>) -> Self {
        Self::AllOf { children }
    }

    pub fn any_of(children: Vec<Condition>) -> Self {
        Self::AnyOf { children }
    }

    pub fn none_of(children: Vec<Condition>) -> Self {
        Self::NoneOf { children }
    }

    /// `true` when neither this condition nor any descendant reads the bean
    /// registry. Such conditions can be decided in phase 1.
    pub fn is_static(&self) -> bool {
        match self {
            Self::ClassPresent { .. } | Self::ClassAbsent { .. } | Self::PropertyMatch { .. } => {
                true
            }
            Self::BeanPresent { .. } | Self::BeanAbsent { .. } => false,
            Self::AllOf { children } | Self::AnyOf { children } | Self::NoneOf { children } => {
                children.iter().all(Condition::is_static)
            }
        }
    }

    /// Check structural invariants. Returns the first violation found.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ClassPresent { class_name } | Self::ClassAbsent { class_name } => {
                if class_name.trim().is_empty() {
                    return Err(format!("{} has an empty class name", self.kind()));
                }
            }
            Self::BeanPresent { bean_type, .. } | Self::BeanAbsent { bean_type, .. } => {
                if bean_type.trim().is_empty() {
                    return Err(format!("{} has an empty bean type", self.kind()));
                }
            }
            Self::PropertyMatch { key, .. } => {
                if key.trim().is_empty() {
                    return Err("property_match has an empty key".to_string());
                }
            }
            Self::AllOf { children } | Self::AnyOf { children } | Self::NoneOf { children } => {
                if children.is_empty() {
                    return Err(format!("{} must contain at least one child", self.kind()));
                }
                for child in children {
                    child.validate()?;
                }
            }
        }
        Ok(())
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ClassPresent { .. } => "class_present",
            Self::ClassAbsent { .. } => "class_absent",
            Self::BeanPresent { .. } => "bean_present",
            Self::BeanAbsent { .. } => "bean_absent",
            Self::PropertyMatch { .. } => "property_match",
            Self::AllOf { .. } => "all_of",
            Self::AnyOf { .. } => "any_of",
            Self::NoneOf { .. } => "none_of",
        }
    }

    /// Evaluate against the current class path, properties and registry.
    ///
    /// Lookup failures propagate; they are never reported as a non-match.
    pub fn evaluate(
        &self,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<EvaluationOutcome, LookupError> {
        match self {
            Self::ClassPresent { class_name } => {
                let outcome = if ctx.class_exists(class_name)? {
                    EvaluationOutcome::matched(format!("required class '{class_name}' found"))
                } else {
                    EvaluationOutcome::no_match(format!(
                        "required class '{class_name}' not found"
                    ))
                };
                Ok(outcome)
            }
            Self::ClassAbsent { class_name } => {
                let outcome = if ctx.class_exists(class_name)? {
                    EvaluationOutcome::no_match(format!("unwanted class '{class_name}' found"))
                } else {
                    EvaluationOutcome::matched(format!("unwanted class '{class_name}' not found"))
                };
                Ok(outcome)
            }
            Self::BeanPresent {
                bean_type,
                qualifier,
            } => {
                let names = ctx.registry.bean_names(bean_type, qualifier.as_deref());
                let target = describe_bean(bean_type, qualifier.as_deref());
                let outcome = if names.is_empty() {
                    EvaluationOutcome::no_match(format!("no bean {target} found"))
                } else {
                    EvaluationOutcome::matched(format!(
                        "found bean {target}: {}",
                        names.join(", ")
                    ))
                };
                Ok(outcome)
            }
            Self::BeanAbsent {
                bean_type,
                qualifier,
            } => {
                let names = ctx.registry.bean_names(bean_type, qualifier.as_deref());
                let target = describe_bean(bean_type, qualifier.as_deref());
                let outcome = if names.is_empty() {
                    EvaluationOutcome::matched(format!("no bean {target} found"))
                } else {
                    EvaluationOutcome::no_match(format!(
                        "found bean {target}: {}",
                        names.join(", ")
                    ))
                };
                Ok(outcome)
            }
            Self::PropertyMatch {
                key,
                expected_value,
                match_if_missing,
            } => evaluate_property(ctx, key, expected_value.as_deref(), *match_if_missing),
            Self::AllOf { children } => {
                let mut out = EvaluationOutcome::new(true);
                for child in children {
                    let child_outcome = child.evaluate(ctx)?;
                    let matched = child_outcome.matched;
                    out.absorb(child_outcome);
                    if !matched {
                        out.matched = false;
                        break;
                    }
                }
                Ok(out)
            }
            Self::AnyOf { children } => {
                let mut out = EvaluationOutcome::new(false);
                for child in children {
                    let child_outcome = child.evaluate(ctx)?;
                    let matched = child_outcome.matched;
                    out.absorb(child_outcome);
                    if matched {
                        out.matched = true;
                        break;
                    }
                }
                Ok(out)
            }
            Self::NoneOf { children } => {
                let mut out = EvaluationOutcome::new(true);
                for child in children {
                    let child_outcome = child.evaluate(ctx)?;
                    if child_outcome.matched {
                        out.matched = false;
                    }
                    out.absorb(child_outcome);
                }
                Ok(out)
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassPresent { class_name } | Self::ClassAbsent { class_name } => {
                write!(f, "{}({class_name})", self.kind())
            }
            Self::BeanPresent {
                bean_type,
                qualifier,
            }
            | Self::BeanAbsent {
                bean_type,
                qualifier,
            } => match qualifier {
                Some(q) => write!(f, "{}({bean_type} '{q}')", self.kind()),
                None => write!(f, "{}({bean_type})", self.kind()),
            },
            Self::PropertyMatch {
                key,
                expected_value,
                match_if_missing,
            } => {
                let expected = expected_value.as_deref().unwrap_or("<truthy>");
                write!(f, "property_match({key}={expected}")?;
                if *match_if_missing {
                    write!(f, ", match_if_missing")?;
                }
                write!(f, ")")
            }
            Self::AllOf { children } | Self::AnyOf { children } | Self::NoneOf { children } => {
                write!(f, "{}[", self.kind())?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, "]")
            }
        }
    }
}

fn describe_bean(bean_type: &str, qualifier: Option<&str>) -> String {
    match qualifier {
        Some(q) => format!("of type '{bean_type}' named '{q}'"),
        None => format!("of type '{bean_type}'"),
    }
}

fn evaluate_property(
    ctx: &mut EvaluationContext<'_>,
    key: &str,
    expected: Option<&str>,
    match_if_missing: bool,
) -> Result<EvaluationOutcome, LookupError> {
    let Some(actual) = ctx.property(key)? else {
        return Ok(if match_if_missing {
            EvaluationOutcome::matched(format!("property '{key}' not set, matched if missing"))
        } else {
            EvaluationOutcome::no_match(format!("property '{key}' not set"))
        });
    };

    let boolean_expectation = match expected {
        None => Some(true),
        Some(e) if e.eq_ignore_ascii_case("true") => Some(true),
        Some(e) if e.eq_ignore_ascii_case("false") => Some(false),
        Some(_) => None,
    };

    let outcome = match (boolean_expectation, expected) {
        (Some(want), _) => match parse_bool_token(&actual) {
            Some(got) if got == want => EvaluationOutcome::matched(format!(
                "property '{key}' = '{actual}' is {got}"
            )),
            Some(got) => EvaluationOutcome::no_match(format!(
                "property '{key}' = '{actual}' is {got}, expected {want}"
            )),
            None => EvaluationOutcome::no_match(format!(
                "property '{key}' = '{actual}' is not a boolean, expected {want}"
            )),
        },
        (None, Some(exp)) if actual == exp => {
            EvaluationOutcome::matched(format!("property '{key}' = '{actual}' matched"))
        }
        (None, exp) => EvaluationOutcome::no_match(format!(
            "property '{key}' = '{actual}', expected '{}'",
            exp.unwrap_or_default()
        )),
    };
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Result of evaluating a condition or a whole unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub matched: bool,
    /// Reasons from every evaluated leaf, in evaluation order.
    pub reasons: Vec<String>,
}

impl EvaluationOutcome {
    pub fn new(matched: bool) -> Self {
        Self {
            matched,
            reasons: Vec::new(),
        }
    }

    pub fn matched(reason: impl Into<String>) -> Self {
        Self {
            matched: true,
            reasons: vec![reason.into()],
        }
    }

    pub fn no_match(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            reasons: vec![reason.into()],
        }
    }

    /// Append another outcome's reasons without touching `matched`.
    pub fn absorb(&mut self, other: EvaluationOutcome) {
        self.reasons.extend(other.reasons);
    }
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a condition may consult during one evaluation.
pub struct EvaluationContext<'a> {
    environment: &'a Environment,
    registry: &'a RegistrySnapshot,
    classes: &'a mut ClassPresenceCache,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(
        environment: &'a Environment,
        registry: &'a RegistrySnapshot,
        classes: &'a mut ClassPresenceCache,
    ) -> Self {
        Self {
            environment,
            registry,
            classes,
        }
    }

    pub fn registry(&self) -> &RegistrySnapshot {
        self.registry
    }

    /// Class lookups are memoized per class name for the whole run.
    fn class_exists(&mut self, name: &str) -> Result<bool, LookupError> {
        self.classes
            .get_or_lookup(name, self.environment.class_path())
    }

    fn property(&self, key: &str) -> Result<Option<String>, LookupError> {
        self.environment.properties().property(key)
    }
}
