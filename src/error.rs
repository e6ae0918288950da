//! Error types for the Dockhand reconciliation system.
//!
//! This module provides the error hierarchy for every stage of a
//! reconciliation: configuration, desired-spec validation, planning,
//! backend calls, and plan execution.

use std::path::PathBuf;
use thiserror::Error;

use crate::model::ObservedState;
use crate::planner::Operation;

/// The main error type for the Dockhand reconciliation system.
#[derive(Debug, Error)]
pub enum DockhandError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Desired spec or comparison policy is malformed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No valid plan exists for the requested transition.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Resource backend errors.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Plan execution errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// An environment override could not be applied.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// Offending value.
        value: String,
    },

    /// Duplicate resource or definition.
    #[error("Duplicate {resource_type}: {name}")]
    DuplicateName {
        /// What was duplicated (resource, type definition).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },
}

/// Desired spec and policy validation errors.
///
/// These are always raised before the backend is contacted.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Resource identity is incomplete.
    #[error("Resource {what} cannot be empty")]
    EmptyIdentity {
        /// Which part of the identity is empty (`kind` or `name`).
        what: &'static str,
    },

    /// No resource type definition is registered for the kind.
    #[error("Unknown resource kind: {kind}")]
    UnknownKind {
        /// The unregistered kind.
        kind: String,
    },

    /// A field was named twice in the same desired spec.
    #[error("Field '{field}' is specified more than once")]
    DuplicateField {
        /// Field name.
        field: String,
    },

    /// A field name is empty.
    #[error("Field names cannot be empty")]
    EmptyFieldName,

    /// The resource type forbids fields it does not declare.
    #[error("Field '{field}' is not managed by resource kind '{kind}'")]
    UnknownField {
        /// Resource kind.
        kind: String,
        /// Field name.
        field: String,
    },

    /// The desired value does not match the declared value kind.
    #[error("Field '{field}' expects a {expected} value, got {found}")]
    KindMismatch {
        /// Field name.
        field: String,
        /// Declared value kind.
        expected: String,
        /// Shape of the value that was supplied.
        found: String,
    },

    /// A policy is internally inconsistent.
    #[error("Invalid policy for field '{field}': {message}")]
    InvalidPolicy {
        /// Field name.
        field: String,
        /// Description of the problem.
        message: String,
    },
}

/// Planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The target lifecycle cannot be reached with the kind's capabilities.
    #[error("Cannot move {kind} '{name}' from {current} to {target}: {reason}")]
    Unreachable {
        /// Resource kind.
        kind: String,
        /// Resource name.
        name: String,
        /// Current lifecycle.
        current: String,
        /// Requested target.
        target: String,
        /// Missing capability or other explanation.
        reason: String,
    },
}

/// Resource backend errors.
///
/// Every backend failure is tagged transient or permanent; `NotFound` is
/// kept separate so that idempotent removal can be recognised.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// A failure that may succeed when retried (connection reset, 5xx).
    #[error("transient failure during {operation}: {message}")]
    Transient {
        /// Backend operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The backend timed out. Treated as transient.
    #[error("timeout during {operation} after {secs}s")]
    Timeout {
        /// Backend operation that failed.
        operation: String,
        /// Elapsed seconds.
        secs: u64,
    },

    /// A failure that will not go away on retry.
    #[error("permanent failure during {operation}: {message}")]
    Permanent {
        /// Backend operation that failed.
        operation: String,
        /// Description of the failure.
        message: String,
    },

    /// The resource conflicts with existing backend state.
    #[error("conflict during {operation}: {message}")]
    Conflict {
        /// Backend operation that failed.
        operation: String,
        /// Description of the conflict.
        message: String,
    },

    /// The resource does not exist.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Resource identifier.
        resource: String,
    },
}

/// Plan execution errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A plan step failed; remaining steps were not executed.
    #[error("step {step} ({operation}) failed: {source}")]
    StepFailed {
        /// Index of the failed step within the plan.
        step: usize,
        /// Operation of the failed step.
        operation: Operation,
        /// Underlying backend failure.
        source: BackendError,
        /// Last observed state known to be accurate.
        last_known_good: Option<Box<ObservedState>>,
    },

    /// A step's lifecycle precondition did not hold.
    #[error("step {step} ({operation}) requires {required}, resource is {actual}")]
    PreconditionFailed {
        /// Index of the step.
        step: usize,
        /// Operation of the step.
        operation: Operation,
        /// Required lifecycle.
        required: String,
        /// Lifecycle tracked by the executor.
        actual: String,
    },

    /// Cancellation was requested before a step started.
    #[error("cancelled before step {step} ({operation})")]
    Cancelled {
        /// Index of the step that did not start.
        step: usize,
        /// Operation of the step that did not start.
        operation: Operation,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for Dockhand operations.
pub type Result<T> = std::result::Result<T, DockhandError>;

impl DockhandError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Backend(e) => e.is_transient(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn invalid(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn invalid_general(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
            field: None,
        }
    }
}

impl BackendError {
    /// Creates a transient error.
    #[must_use]
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    #[must_use]
    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Returns true if the resource is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ReconcileError {
    /// Index of the plan step this error is attributed to, if any.
    #[must_use]
    pub const fn step(&self) -> Option<usize> {
        match self {
            Self::StepFailed { step, .. }
            | Self::PreconditionFailed { step, .. }
            | Self::Cancelled { step, .. } => Some(*step),
            Self::Aborted { .. } => None,
        }
    }
}
