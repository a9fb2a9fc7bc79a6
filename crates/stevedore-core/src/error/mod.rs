//! Error types and result aliases for Stevedore operations.
//!
//! One unified error type covers every failure the resolver core can report.
//! Errors are values propagated upward; the core never recovers or retries
//! internally.

use thiserror::Error;

use crate::types::PkgState;

/// Unified error type for all Stevedore operations
#[derive(Error, Debug)]
pub enum SolverError {
    // Lookup errors
    #[error("no package family '{base_fingerprint}' is known to the index")]
    UnknownFamily { base_fingerprint: String },

    #[error("family '{base_fingerprint}' has no version satisfying '{range}' (available: {available})")]
    NoSatisfyingVersion {
        base_fingerprint: String,
        range: String,
        available: String,
    },

    #[error("repository has no package matching '{name}' in range '{range}'")]
    DependencyLocate { name: String, range: String },

    #[error("failed to load chart archive '{archive}': {reason}")]
    DependencyLoad { archive: String, reason: String },

    // Identity errors
    #[error("fingerprint '{fingerprint}' already maps to different chart content")]
    DuplicateFingerprint { fingerprint: String },

    // Constraint errors
    #[error("conflicting states for '{fingerprint}': wanted {wanted:?} but already {existing:?}")]
    StateConflict {
        fingerprint: String,
        wanted: PkgState,
        existing: PkgState,
    },

    #[error("'{for_package}' requires '{depends_on}', which is marked absent")]
    UnsatisfiableDependency {
        for_package: String,
        depends_on: String,
    },

    #[error("cannot remove '{removed}': '{blocked_by}' still requires it")]
    DependentStillRequires { removed: String, blocked_by: String },

    // Planning errors
    #[error("ordering cycle through an optional relation: {}", .members.join(" -> "))]
    PlanCycle { members: Vec<String> },

    // Ambient errors
    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("resolution aborted: {reason}")]
    Aborted { reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type alias for Stevedore operations
pub type SolverResult<T> = Result<T, SolverError>;

impl SolverError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Whether this is an expected, user-facing constraint failure rather
    /// than an index/repository defect
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            SolverError::StateConflict { .. }
                | SolverError::UnsatisfiableDependency { .. }
                | SolverError::DependentStillRequires { .. }
        )
    }
}
