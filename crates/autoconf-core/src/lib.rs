//! Autoconf Core Library
//!
//! Conditional auto-configuration resolution: given a set of candidate
//! configuration units, a class path, external properties and the beans
//! already registered, decide which units activate and in what order.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use autoconf_core::{
//!     AutoConfigurationEngine, BeanContribution, CandidateRegistry, Condition,
//!     ConfigurationUnit, Environment, ResolutionRequest,
//! };
//!
//! let registry = CandidateRegistry::new(vec![
//!     ConfigurationUnit::new("DataSource").contributes(BeanContribution::of_kind("ds")),
//!     ConfigurationUnit::new("Jdbc")
//!         .after("DataSource")
//!         .when(Condition::bean_present("ds")),
//! ])?;
//! let engine = AutoConfigurationEngine::new(registry, Environment::empty());
//! let resolution = engine.resolve(&ResolutionRequest::new())?;
//! println!("{}", resolution.report.render_text());
//! ```

pub mod cache;
pub mod candidate;
pub mod condition;
pub mod engine;
pub mod environment;
pub mod error;
pub mod manifest;
pub mod metrics;
pub mod obs;
pub mod ordering;
pub mod report;
pub mod snapshot;
pub mod telemetry;

pub use cache::{CacheStats, ClassPresenceCache, ConditionEvaluationCache};
pub use candidate::{CandidateRegistry, CandidateSource, ConfigurationUnit};
pub use condition::{Condition, EvaluationContext, EvaluationOutcome};
pub use engine::{
    AutoConfigurationEngine, Resolution, ResolutionOptions, ResolutionRequest,
    DEFAULT_EXCLUSION_PROPERTY,
};
pub use environment::{
    is_valid_class_name, parse_bool_token, ClassPath, EnvPropertySource, Environment,
    LayeredPropertySource, MapPropertySource, PropertySource, StaticClassPath,
};
pub use error::{
    AutoConfigError, LookupError, OrderingError, ResolutionError, ResolutionFailure, Result,
};
pub use manifest::{Manifest, ManifestEnvironment, ManifestFile, ManifestFormat};
pub use metrics::METRICS;
pub use obs::ResolutionSpan;
pub use ordering::{OrderedPlan, OrderingGraph, OrderingResolver};
pub use report::{EvaluationPhase, EvaluationReport, UnitReport, UnitState};
pub use snapshot::{BeanContribution, BeanDefinition, RegistrySnapshot};
pub use telemetry::init_tracing;

/// Autoconf version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
