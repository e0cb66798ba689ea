//! Error taxonomy for auto-configuration resolution.
//!
//! Two errors are fatal to a run: [`OrderingError`] (a cycle among the
//! surviving before/after constraints) and [`ResolutionError`] (a lookup
//! failure or a fixpoint that never converged). Units ending up rejected or
//! excluded are not errors; they are reported through
//! [`crate::report::EvaluationReport`].

use thiserror::Error;

use crate::report::EvaluationReport;

/// Failure of an injected collaborator (class path or property source).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The class name is not a well-formed dotted identifier.
    #[error("malformed class name: '{0}'")]
    MalformedClassName(String),

    /// A property source could not answer.
    #[error("property source '{source_name}' failed: {message}")]
    Source {
        source_name: String,
        message: String,
    },
}

/// A cycle was found among the before/after constraints of surviving units.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("auto-configuration ordering cycle detected between: {}", cycle_members.join(" -> "))]
pub struct OrderingError {
    /// Members of the cycle in edge order; the first member is not repeated.
    pub cycle_members: Vec<String>,
}

/// Fatal evaluation failure attributable to a unit or to the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// A condition lookup failed while evaluating `unit_id`.
    #[error("condition {condition} on unit '{unit_id}' could not be evaluated: {cause}")]
    Lookup {
        unit_id: String,
        condition: String,
        cause: String,
    },

    /// The run-level exclusion property could not be read.
    #[error("failed to read property '{key}': {cause}")]
    Environment { key: String, cause: String },

    /// The phase-2 driver exceeded its pass bound.
    #[error("fixpoint not reached after {passes} passes; still pending: {pending:?}")]
    FixpointNotReached { passes: usize, pending: Vec<String> },
}

impl ResolutionError {
    /// The unit the error is attributed to, when there is exactly one.
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            Self::Lookup { unit_id, .. } => Some(unit_id),
            Self::FixpointNotReached { pending, .. } => pending.first().map(String::as_str),
            Self::Environment { .. } => None,
        }
    }
}

/// Umbrella error for the engine, the candidate registry and discovery.
#[derive(Debug, Error)]
pub enum AutoConfigError {
    #[error(transparent)]
    Ordering(#[from] OrderingError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A candidate declaration violates a registration invariant.
    #[error("invalid candidate '{unit_id}': {reason}")]
    InvalidCandidate { unit_id: String, reason: String },

    /// Two candidates share an identifier.
    #[error("duplicate candidate identifier: '{unit_id}'")]
    DuplicateCandidate { unit_id: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for auto-configuration operations.
pub type Result<T> = std::result::Result<T, AutoConfigError>;

/// A fatal run failure together with the report gathered before it.
///
/// Units evaluated before the failure keep their final states; everything
/// else is left `Pending`.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct ResolutionFailure {
    #[source]
    pub error: AutoConfigError,
    pub report: Box<EvaluationReport>,
}

impl ResolutionFailure {
    pub(crate) fn new(error: impl Into<AutoConfigError>, report: EvaluationReport) -> Self {
        Self {
            error: error.into(),
            report: Box::new(report),
        }
    }

    /// The ordering cycle, if that is what aborted the run.
    pub fn ordering_error(&self) -> Option<&OrderingError> {
        match &self.error {
            AutoConfigError::Ordering(e) => Some(e),
            _ => None,
        }
    }

    /// The resolution error, if that is what aborted the run.
    pub fn resolution_error(&self) -> Option<&ResolutionError> {
        match &self.error {
            AutoConfigError::Resolution(e) => Some(e),
            _ => None,
        }
    }
}
