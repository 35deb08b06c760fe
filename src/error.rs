//! Error types for the composite framework.

use std::fmt;

use thiserror::Error;

use crate::validation::ValidationResult;

/// Root error type for composite operations.
#[derive(Error, Debug, Clone)]
pub enum CompositeError {
    /// Architecture or registry misconfiguration
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The application model failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationResult),

    /// Composite or service lookup failed
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// An injection point could not be satisfied
    #[error("Injection error: {0}")]
    Injection(#[from] InjectionError),

    /// Activation or passivation failed
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// Operation not permitted in the current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A property constraint rejected a value
    #[error("Constraint violation on property '{property}': {reason}")]
    ConstraintViolation {
        /// Property name
        property: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A fragment or hook failed while running
    #[error("Invocation failed: {0}")]
    InvocationFailed(String),
}

/// Errors raised while configuring an architecture.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No support is registered for the composite model type
    #[error("No support registered for composite model type '{0}'")]
    UnregisteredModelType(String),

    /// A support for this model type is already registered
    #[error("Support already registered for composite model type '{0}'")]
    AlreadyRegistered(String),

    /// The registry lacks support for plain composites
    #[error("Support registry must contain plain composite support")]
    MissingPlainSupport,

    /// No strategy is registered for the injection scope
    #[error("No injection strategy registered for scope '{0}'")]
    UnregisteredScope(String),

    /// Application configuration is invalid
    #[error("Invalid application configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised when looking up composites or services.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// Nothing visible matched the requested types
    #[error("No suitable {model_type} composite found for {requested} from {location}")]
    NotFound {
        /// Composite model type searched for
        model_type: String,
        /// Requested type list
        requested: String,
        /// Layer/module the search started from
        location: String,
    },

    /// More than one distinct composite matched the requested types
    #[error(
        "More than one suitable {model_type} composite found for {requested} from {location}: {}",
        candidates.join(" and ")
    )]
    Ambiguous {
        /// Composite model type searched for
        model_type: String,
        /// Requested type list
        requested: String,
        /// Layer/module the search started from
        location: String,
        /// Public types of each competing composite
        candidates: Vec<String>,
    },

    /// No layer or module with this name exists
    #[error("Unknown location: {0}")]
    UnknownLocation(String),
}

/// Errors raised by injection strategies and injected-value access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    /// The strategy could not supply a value
    #[error("Cannot inject {scope} '{name}' of type {target}: {reason}")]
    NotPossible {
        /// Injection scope
        scope: String,
        /// Injection point name
        name: String,
        /// Requested type
        target: String,
        /// Why injection failed
        reason: String,
    },

    /// No value was injected under this name
    #[error("No injected value named '{0}'")]
    Missing(String),

    /// The injected value has a different type
    #[error("Injected value '{name}' is not of type {expected}")]
    TypeMismatch {
        /// Injection point name
        name: String,
        /// Requested type
        expected: String,
    },

    /// A method argument is missing or has a different type
    #[error("Argument {index} is missing or not of type {expected}")]
    ArgumentMismatch {
        /// Argument position
        index: usize,
        /// Requested type
        expected: String,
    },
}

/// Errors raised while activating or passivating an application.
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    /// A service activation hook failed
    #[error("Activation of {composite} failed: {source}")]
    ActivationFailed {
        /// Public types of the failing service
        composite: String,
        /// Underlying failure
        #[source]
        source: Box<CompositeError>,
    },

    /// One or more passivation hooks failed; all hooks were run
    #[error("{0}")]
    PassivationFailed(PassivationFailures),

    /// The service was requested by the thread already activating or
    /// passivating it
    #[error("Cyclic activation of {composite}")]
    CyclicActivation {
        /// Public types of the service
        composite: String,
    },
}

/// Aggregate of every passivation hook failure from one passivation run.
#[derive(Debug, Clone, Default)]
pub struct PassivationFailures {
    failures: Vec<(String, CompositeError)>,
}

impl PassivationFailures {
    /// Create an empty aggregate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for the named composite.
    pub fn push(&mut self, composite: impl Into<String>, error: CompositeError) {
        self.failures.push((composite.into(), error));
    }

    /// All recorded failures in the order they happened.
    pub fn failures(&self) -> &[(String, CompositeError)] {
        &self.failures
    }

    /// Number of recorded failures.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether no failure was recorded.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for PassivationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passivation failure(s)", self.failures.len())?;
        for (composite, error) in &self.failures {
            write!(f, "; {composite}: {error}")?;
        }
        Ok(())
    }
}

impl From<String> for CompositeError {
    fn from(msg: String) -> Self {
        CompositeError::InvocationFailed(msg)
    }
}

impl From<&str> for CompositeError {
    fn from(msg: &str) -> Self {
        CompositeError::InvocationFailed(msg.to_string())
    }
}

/// Result type alias for composite operations.
pub type CompositeResult<T> = Result<T, CompositeError>;

/// Result type alias for configuration operations.
pub type ConfigurationResult<T> = Result<T, ConfigurationError>;

/// Result type alias for resolution operations.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Result type alias for injection operations.
pub type InjectionResult<T> = Result<T, InjectionError>;
