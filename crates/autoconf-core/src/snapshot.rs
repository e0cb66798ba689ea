//! The bean registry observed by bean-presence conditions.
//!
//! # Invariants
//!
//! The registry is monotonic within a run: beans are only ever added, and the
//! generation counter advances by exactly one per merged unit. Units accepted
//! later therefore always observe a superset of what earlier units
//! contributed, which is what makes `BeanAbsent` back-off sound.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A bean a unit registers when it is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeanContribution {
    /// Bean identifier.
    pub name: String,
    /// Bean kind, matched by `bean_type` in bean conditions.
    pub kind: String,
}

impl BeanContribution {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
        }
    }

    /// A bean whose name equals its kind.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            name: kind.clone(),
            kind,
        }
    }
}

/// A registered bean and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeanDefinition {
    pub name: String,
    pub kind: String,
    /// Contributing unit; `None` for beans present before resolution began.
    pub origin: Option<String>,
    /// Generation at which the bean became visible.
    pub generation: u64,
}

/// Bean registry plus a generation counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    definitions: Vec<BeanDefinition>,
    generation: u64,
}

impl RegistrySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with user-defined beans. Seeding does not advance the generation.
    pub fn with_initial_beans(beans: impl IntoIterator<Item = BeanContribution>) -> Self {
        let definitions = beans
            .into_iter()
            .map(|b| BeanDefinition {
                name: b.name,
                kind: b.kind,
                origin: None,
                generation: 0,
            })
            .collect();
        Self {
            definitions,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Merge an accepted unit's contributions and advance the generation.
    ///
    /// This is the only mutation point of the registry.
    pub(crate) fn merge(&mut self, unit_id: &str, contributions: &[BeanContribution]) -> u64 {
        self.generation += 1;
        for c in contributions {
            self.definitions.push(BeanDefinition {
                name: c.name.clone(),
                kind: c.kind.clone(),
                origin: Some(unit_id.to_string()),
                generation: self.generation,
            });
        }
        self.generation
    }

    /// Names of beans of `kind`, restricted to `qualifier` when given, in
    /// registration order.
    pub fn bean_names(&self, kind: &str, qualifier: Option<&str>) -> Vec<&str> {
        self.definitions
            .iter()
            .filter(|d| d.kind == kind && qualifier.map_or(true, |q| d.name == q))
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn contains(&self, kind: &str, qualifier: Option<&str>) -> bool {
        !self.bean_names(kind, qualifier).is_empty()
    }

    pub fn definitions(&self) -> &[BeanDefinition] {
        &self.definitions
    }

    /// Bean names grouped by kind.
    pub fn by_kind(&self) -> BTreeMap<&str, Vec<&str>> {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for d in &self.definitions {
            grouped.entry(d.kind.as_str()).or_default().push(d.name.as_str());
        }
        grouped
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
