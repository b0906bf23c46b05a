//! Error types for valueflow-core
//!
//! Provides unified error handling across the crate.

use thiserror::Error;

/// Main error type for valueflow operations
#[derive(Debug, Error)]
pub enum ValueflowError {
    /// A persisted analysis artifact that a later phase depends on is gone.
    /// This is the only fatal condition in the engine; everything else
    /// (unresolvable names, unresolvable callees, cycles, non-convergence)
    /// degrades to sentinel values instead of erroring.
    #[error("missing artifact: {0}")]
    MissingArtifact(String),

    /// Program database error (loader/front-end collaborator)
    #[error("program db error: {0}")]
    ProgramDb(String),

    /// Analysis error
    #[error("analysis error: {0}")]
    Analysis(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl ValueflowError {
    /// Create a missing-artifact error
    pub fn missing(what: impl Into<String>) -> Self {
        ValueflowError::MissingArtifact(what.into())
    }

    /// Create an analysis error
    pub fn analysis(msg: impl Into<String>) -> Self {
        ValueflowError::Analysis(msg.into())
    }

    /// Create a program-db error
    pub fn program_db(msg: impl Into<String>) -> Self {
        ValueflowError::ProgramDb(msg.into())
    }
}

/// Result type alias for valueflow operations
pub type Result<T> = std::result::Result<T, ValueflowError>;
