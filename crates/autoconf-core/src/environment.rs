//! Injected lookup capabilities: class path and property sources.
//!
//! The engine never touches ambient state. Everything a condition may ask
//! about the outside world goes through an [`Environment`], which bundles a
//! [`ClassPath`] and a [`PropertySource`]. Both are expected to be stable for
//! the duration of a resolution run; implementations backed by real I/O
//! should memoize before the run starts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::error::LookupError;

static CLASS_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$")
        .expect("class name pattern is a valid regex")
});

/// Answers whether a named class is available.
pub trait ClassPath: Send + Sync {
    fn class_exists(&self, name: &str) -> Result<bool, LookupError>;
}

/// Resolves a property key to its value, if set.
pub trait PropertySource: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    fn property(&self, key: &str) -> Result<Option<String>, LookupError>;
}

/// Whether `name` is a well-formed dotted class name (`com.example.Foo`).
pub fn is_valid_class_name(name: &str) -> bool {
    CLASS_NAME.is_match(name)
}

/// Relaxed boolean coercion.
///
/// Truthy tokens are `true`, `yes`, `1`, `on`; falsy tokens are `false`,
/// `no`, `0`, `off`. Matching is ASCII case-insensitive and ignores
/// surrounding whitespace. Anything else is not a boolean and yields `None`.
pub fn parse_bool_token(value: &str) -> Option<bool> {
    let v = value.trim();
    const TRUTHY: [&str; 4] = ["true", "yes", "1", "on"];
    const FALSY: [&str; 4] = ["false", "no", "0", "off"];
    if TRUTHY.iter().any(|t| v.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSY.iter().any(|t| v.eq_ignore_ascii_case(t)) {
        Some(false)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Class path
// ---------------------------------------------------------------------------

/// A fixed set of class names.
#[derive(Debug, Clone, Default)]
pub struct StaticClassPath {
    classes: BTreeSet<String>,
}

impl StaticClassPath {
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
        }
    }

    /// Add a class (builder pattern).
    pub fn with_class(mut self, name: impl Into<String>) -> Self {
        self.classes.insert(name.into());
        self
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl ClassPath for StaticClassPath {
    fn class_exists(&self, name: &str) -> Result<bool, LookupError> {
        if !is_valid_class_name(name) {
            return Err(LookupError::MalformedClassName(name.to_string()));
        }
        Ok(self.classes.contains(name))
    }
}

// ---------------------------------------------------------------------------
// Property sources
// ---------------------------------------------------------------------------

/// In-memory key/value properties.
#[derive(Debug, Clone)]
pub struct MapPropertySource {
    name: String,
    values: BTreeMap<String, String>,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn from_map(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Set a property (builder pattern).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl Default for MapPropertySource {
    fn default() -> Self {
        Self::new("properties")
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn property(&self, key: &str) -> Result<Option<String>, LookupError> {
        Ok(self.values.get(key).cloned())
    }
}

/// Process environment variables with relaxed key mapping.
///
/// `feature.enabled` and `feature-enabled` both map to `FEATURE_ENABLED`,
/// prefixed with `<PREFIX>_` when a prefix is configured.
#[derive(Debug, Clone, Default)]
pub struct EnvPropertySource {
    prefix: Option<String>,
}

impl EnvPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// The environment variable name consulted for `key`.
    pub fn variable_name(&self, key: &str) -> String {
        let relaxed: String = key
            .chars()
            .map(|c| match c {
                '.' | '-' => '_',
                other => other.to_ascii_uppercase(),
            })
            .collect();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_ascii_uppercase(), relaxed),
            None => relaxed,
        }
    }
}

impl PropertySource for EnvPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn property(&self, key: &str) -> Result<Option<String>, LookupError> {
        match std::env::var(self.variable_name(key)) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(LookupError::Source {
                source_name: self.name().to_string(),
                message: e.to_string(),
            }),
        }
    }
}

/// An ordered chain of sources; the first source that has the key wins.
#[derive(Clone, Default)]
pub struct LayeredPropertySource {
    layers: Vec<Arc<dyn PropertySource>>,
}

impl LayeredPropertySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-precedence layer.
    pub fn with_layer(mut self, layer: impl PropertySource + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl fmt::Debug for LayeredPropertySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.layers.iter().map(|l| l.name()))
            .finish()
    }
}

impl PropertySource for LayeredPropertySource {
    fn name(&self) -> &str {
        "layered"
    }

    fn property(&self, key: &str) -> Result<Option<String>, LookupError> {
        for layer in &self.layers {
            if let Some(value) = layer.property(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// The collaborators a resolution run consults.
#[derive(Clone)]
pub struct Environment {
    class_path: Arc<dyn ClassPath>,
    properties: Arc<dyn PropertySource>,
}

impl Environment {
    pub fn new(
        class_path: impl ClassPath + 'static,
        properties: impl PropertySource + 'static,
    ) -> Self {
        Self {
            class_path: Arc::new(class_path),
            properties: Arc::new(properties),
        }
    }

    pub fn from_shared(
        class_path: Arc<dyn ClassPath>,
        properties: Arc<dyn PropertySource>,
    ) -> Self {
        Self {
            class_path,
            properties,
        }
    }

    /// No classes, no properties.
    pub fn empty() -> Self {
        Self::new(StaticClassPath::default(), MapPropertySource::default())
    }

    pub fn class_path(&self) -> &dyn ClassPath {
        self.class_path.as_ref()
    }

    pub fn properties(&self) -> &dyn PropertySource {
        self.properties.as_ref()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("properties", &self.properties.name())
            .finish_non_exhaustive()
    }
}
