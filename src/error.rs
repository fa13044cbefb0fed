//! Error taxonomy for the harness.
//!
//! Configuration and resolution errors end the affected benchmark body, fixture
//! construction errors end the trial, and timing overflows only drop one sample
//! (they surface as [`crate::harness::Diagnostic`]s, not through `BenchError`,
//! unless every sample of a run was lost).

use thiserror::Error;

use crate::fixture::FixtureScope;

/// Top-level error returned by a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid count, arity, batch size or iteration settings.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A guest provider could not satisfy a requested call target.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Setup of a scoped fixture failed.
    #[error("fixture construction failed at {scope} scope: {reason}")]
    FixtureConstruction { scope: FixtureScope, reason: String },

    /// Elapsed-time computation wrapped or went backwards.
    #[error("timing overflow: {0}")]
    TimingOverflow(String),

    /// The benchmark body itself failed inside the measured window.
    #[error("benchmark body failed: {0}")]
    Invocation(#[from] InvokeError),
}

impl BenchError {
    pub fn config(msg: impl Into<String>) -> Self {
        BenchError::Configuration(msg.into())
    }

    /// Wraps any displayable failure as a fixture construction error at `scope`.
    pub fn fixture(scope: FixtureScope, err: impl std::fmt::Display) -> Self {
        BenchError::FixtureConstruction {
            scope,
            reason: err.to_string(),
        }
    }
}

/// Failure to bind a call target.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("{provider}: module `{module}` not found")]
    ModuleNotFound { provider: String, module: String },

    #[error("{provider}: `{identifier}` not found in module `{module}`")]
    UnknownIdentifier {
        provider: String,
        module: String,
        identifier: String,
    },

    #[error("{provider}: `{identifier}` takes {actual} argument(s), signature requires {expected}")]
    ArityMismatch {
        provider: String,
        identifier: String,
        expected: usize,
        actual: usize,
    },

    #[error("{provider}: `{identifier}` cannot be bound with a {repr} signature")]
    UnsupportedRepresentation {
        provider: String,
        identifier: String,
        repr: &'static str,
    },

    #[error("{provider}: module `{module}` failed to load: {reason}")]
    Load {
        provider: String,
        module: String,
        reason: String,
    },
}

/// Failure of a single call through a [`crate::target::CallTarget`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: usize, actual: usize },

    #[error("argument {position} has an unexpected representation")]
    Type { position: usize },

    #[error("result has an unexpected representation")]
    ResultType,

    #[error("guest failure: {0}")]
    Guest(String),
}
