//! Error types for declaration graphs.
//!
//! Errors are categorized by the stage that produced them so callers can
//! tell a malformed graph apart from a failed remote operation. Every
//! category is fatal to the run: nothing in this crate retries.

use std::fmt;
use thiserror::Error;

use crate::resource::DeclarationId;
use crate::types::ResourceKind;

/// Result type for declaration graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage at which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The graph itself is invalid (duplicate names, unknown references, cycles)
    Declaration,
    /// A deferred input could not be turned into a concrete value
    Resolution,
    /// The engine failed to create or update a resource
    Provisioning,
    /// A transformation rejected a rendered object
    Transformation,
    /// Local plumbing (thread pool, prompts)
    Internal,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Declaration => "Invalid declaration graph",
            Self::Resolution => "Unresolvable input",
            Self::Provisioning => "Remote provisioning failed",
            Self::Transformation => "Transformation failed",
            Self::Internal => "Internal error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Declaration => "Fix the declaration order or names and run again",
            Self::Resolution => "Check that the owning resource reports the expected outputs",
            Self::Provisioning => {
                "Resources applied so far were kept; fix the cause and re-apply to converge"
            }
            Self::Transformation => "Check the chart's rendered objects against the transformation",
            Self::Internal => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Failure to turn a deferred value into a concrete one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The owning declaration has not been provisioned yet
    #[error("outputs of `{0}` are not known yet")]
    Unresolved(DeclarationId),

    /// The owning declaration was provisioned but reported no such output
    #[error("`{id}` has no output `{path}`")]
    MissingOutput { id: DeclarationId, path: String },

    /// The output exists but has the wrong shape
    #[error("output `{path}` of `{id}` has an unexpected type: {message}")]
    Type {
        id: DeclarationId,
        path: String,
        message: String,
    },

    /// A lifted function rejected the resolved values
    #[error("{0}")]
    Invalid(String),
}

impl ResolveError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Whether the value is merely pending rather than broken
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Unresolved(_))
    }
}

/// A transformation rejected a rendered object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transformation `{transformation}` failed: {message}")]
pub struct TransformError {
    pub transformation: String,
    pub message: String,
}

impl TransformError {
    pub fn new(transformation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            transformation: transformation.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while declaring or executing a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// Two declarations share a logical name
    #[error("declaration `{0}` already exists")]
    DuplicateDeclaration(DeclarationId),

    /// A declaration references itself
    #[error("declaration `{0}` depends on itself")]
    SelfDependency(DeclarationId),

    /// A declaration references something not declared before it
    #[error("declaration `{id}` depends on unknown declaration `{dependency}`")]
    UnknownDependency {
        id: DeclarationId,
        dependency: DeclarationId,
    },

    /// Lookup of a declaration that is not in the graph
    #[error("unknown declaration `{0}`")]
    UnknownDeclaration(DeclarationId),

    /// A declaration's arguments are invalid
    #[error("invalid {kind} declaration `{id}`: {message}")]
    InvalidDeclaration {
        id: DeclarationId,
        kind: ResourceKind,
        message: String,
    },

    /// Two exports share a key
    #[error("export `{0}` already exists")]
    DuplicateExport(String),

    /// Target filter matched nothing
    #[error("no declaration matches target `{0}`")]
    UnknownTarget(String),

    /// The dependency edges contain a cycle
    #[error("dependency cycle detected in declaration graph")]
    CycleDetected,

    /// A deferred input or export could not be resolved
    #[error("failed to resolve `{id}`: {source}")]
    Resolution {
        id: String,
        #[source]
        source: ResolveError,
    },

    /// The engine failed to provision a declaration
    #[error("failed to provision {kind} `{id}`: {message}")]
    Provisioning {
        id: DeclarationId,
        kind: ResourceKind,
        message: String,
    },

    /// A transformation failed while installing a chart
    #[error("failed to install `{id}`: {message}")]
    Transformation { id: DeclarationId, message: String },

    /// Confirmation prompt failed
    #[error("confirmation failed: {0}")]
    Interaction(String),

    /// Worker pool could not be created
    #[error("failed to create apply thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    pub fn invalid(id: &DeclarationId, kind: ResourceKind, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            id: id.clone(),
            kind,
            message: message.into(),
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::DuplicateDeclaration(_)
            | Error::SelfDependency(_)
            | Error::UnknownDependency { .. }
            | Error::UnknownDeclaration(_)
            | Error::InvalidDeclaration { .. }
            | Error::DuplicateExport(_)
            | Error::UnknownTarget(_)
            | Error::CycleDetected => ErrorCategory::Declaration,
            Error::Resolution { .. } => ErrorCategory::Resolution,
            Error::Provisioning { .. } => ErrorCategory::Provisioning,
            Error::Transformation { .. } => ErrorCategory::Transformation,
            Error::Interaction(_) | Error::ThreadPool(_) => ErrorCategory::Internal,
        }
    }
}
