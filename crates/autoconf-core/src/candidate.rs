//! Configuration units and the candidate registry.
//!
//! A [`ConfigurationUnit`] is an immutable declaration: conditions, ordering
//! hints, exclusions, the beans it would register and the bean kinds it
//! requires. [`CandidateRegistry`] holds the discovered units in discovery
//! order and enforces the registration-time invariants.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::error::{AutoConfigError, Result};
use crate::snapshot::BeanContribution;

/// A candidate configuration module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationUnit {
    /// Globally unique identifier.
    pub id: String,
    /// Conditions, all of which must match, evaluated in declaration order.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Units this one must precede.
    #[serde(default)]
    pub before: BTreeSet<String>,
    /// Units this one must follow.
    #[serde(default)]
    pub after: BTreeSet<String>,
    /// Units excluded once this one is accepted.
    #[serde(default)]
    pub excludes: BTreeSet<String>,
    /// Beans registered on acceptance.
    #[serde(default)]
    pub contributes: Vec<BeanContribution>,
    /// Bean kinds that must already be registered.
    #[serde(default)]
    pub requires: BTreeSet<String>,
}

impl ConfigurationUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            conditions: Vec::new(),
            before: BTreeSet::new(),
            after: BTreeSet::new(),
            excludes: BTreeSet::new(),
            contributes: Vec::new(),
            requires: BTreeSet::new(),
        }
    }

    /// Add a condition (builder pattern).
    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn before(mut self, id: impl Into<String>) -> Self {
        self.before.insert(id.into());
        self
    }

    pub fn after(mut self, id: impl Into<String>) -> Self {
        self.after.insert(id.into());
        self
    }

    pub fn excludes(mut self, id: impl Into<String>) -> Self {
        self.excludes.insert(id.into());
        self
    }

    pub fn contributes(mut self, bean: BeanContribution) -> Self {
        self.contributes.push(bean);
        self
    }

    pub fn requires(mut self, kind: impl Into<String>) -> Self {
        self.requires.insert(kind.into());
        self
    }

    /// No declared conditions and no bean requirements.
    pub fn is_unconditional(&self) -> bool {
        self.conditions.is_empty() && self.requires.is_empty()
    }

    /// Conditions that do not read the bean registry, with their slots.
    pub fn static_conditions(&self) -> impl Iterator<Item = (usize, &Condition)> {
        self.conditions.iter().enumerate().filter(|(_, c)| c.is_static())
    }

    /// Conditions that read the bean registry, with their slots.
    pub fn deferred_conditions(&self) -> impl Iterator<Item = (usize, &Condition)> {
        self.conditions.iter().enumerate().filter(|(_, c)| !c.is_static())
    }

    /// Implicit `BeanPresent` checks for `requires`, with slots following
    /// the declared conditions.
    pub fn requirement_conditions(&self) -> Vec<(usize, Condition)> {
        let base = self.conditions.len();
        self.requires
            .iter()
            .enumerate()
            .map(|(i, kind)| (base + i, Condition::bean_present(kind.clone())))
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: String| AutoConfigError::InvalidCandidate {
            unit_id: self.id.clone(),
            reason,
        };
        if self.id.trim().is_empty() {
            return Err(invalid("identifier must not be empty".to_string()));
        }
        if self.before.contains(&self.id) {
            return Err(invalid("declares itself in 'before'".to_string()));
        }
        if self.after.contains(&self.id) {
            return Err(invalid("declares itself in 'after'".to_string()));
        }
        if self.excludes.contains(&self.id) {
            return Err(invalid("excludes itself".to_string()));
        }
        for condition in &self.conditions {
            condition.validate().map_err(invalid)?;
        }
        Ok(())
    }
}

/// The discovered candidate set, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct CandidateRegistry {
    units: Vec<ConfigurationUnit>,
    index: HashMap<String, usize>,
}

impl CandidateRegistry {
    /// Register `units` in the given (discovery) order.
    ///
    /// Returns [`AutoConfigError::DuplicateCandidate`] on a repeated id and
    /// [`AutoConfigError::InvalidCandidate`] for self references or empty
    /// composite conditions.
    pub fn new(units: Vec<ConfigurationUnit>) -> Result<Self> {
        let mut index = HashMap::with_capacity(units.len());
        for (pos, unit) in units.iter().enumerate() {
            unit.validate()?;
            if index.insert(unit.id.clone(), pos).is_some() {
                return Err(AutoConfigError::DuplicateCandidate {
                    unit_id: unit.id.clone(),
                });
            }
        }
        Ok(Self { units, index })
    }

    /// Load and register from a discovery source.
    pub fn load(source: &dyn CandidateSource) -> Result<Self> {
        Self::new(source.load_candidates()?)
    }

    pub fn get(&self, id: &str) -> Option<&ConfigurationUnit> {
        self.index.get(id).map(|&pos| &self.units[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Discovery position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn units(&self) -> &[ConfigurationUnit] {
        &self.units
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Supplies candidate units from some discovery mechanism.
pub trait CandidateSource {
    fn load_candidates(&self) -> Result<Vec<ConfigurationUnit>>;
}

impl CandidateSource for Vec<ConfigurationUnit> {
    fn load_candidates(&self) -> Result<Vec<ConfigurationUnit>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_preserves_discovery_order() {
        let reg = CandidateRegistry::new(vec![
            ConfigurationUnit::new("b"),
            ConfigurationUnit::new("a"),
        ])
        .unwrap();
        let ids: Vec<&str> = reg.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(reg.position("a"), Some(1));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = CandidateRegistry::new(vec![
            ConfigurationUnit::new("dup"),
            ConfigurationUnit::new("dup"),
        ])
        .unwrap_err();
        assert!(matches!(err, AutoConfigError::DuplicateCandidate { unit_id } if unit_id == "dup"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let err = CandidateRegistry::new(vec![ConfigurationUnit::new("a").after("a")]).unwrap_err();
        assert!(matches!(err, AutoConfigError::InvalidCandidate { .. }));

        let err = CandidateRegistry::new(vec![ConfigurationUnit::new("a").before("a")]).unwrap_err();
        assert!(err.to_string().contains("before"));
    }

    #[test]
    fn test_empty_composite_rejected_at_registration() {
        let unit = ConfigurationUnit::new("a").when(Condition::any_of(vec![]));
        let err = CandidateRegistry::new(vec![unit]).unwrap_err();
        assert!(err.to_string().contains("at least one child"));
    }

    #[test]
    fn test_condition_partitioning_keeps_slots() {
        let unit = ConfigurationUnit::new("a")
            .when(Condition::bean_absent("ds"))
            .when(Condition::class_present("X"))
            .requires("pool");
        let statics: Vec<usize> = unit.static_conditions().map(|(s, _)| s).collect();
        let deferred: Vec<usize> = unit.deferred_conditions().map(|(s, _)| s).collect();
        assert_eq!(statics, vec![1]);
        assert_eq!(deferred, vec![0]);
        let reqs = unit.requirement_conditions();
        assert_eq!(reqs[0].0, 2);
        assert_eq!(reqs[0].1, Condition::bean_present("pool"));
    }

    #[test]
    fn test_unit_deserializes_with_defaults() {
        let json = r#"{"id":"web","after":["core"]}"#;
        let unit: ConfigurationUnit = serde_json::from_str(json).unwrap();
        assert_eq!(unit, ConfigurationUnit::new("web").after("core"));
        assert!(unit.is_unconditional());
    }
}
