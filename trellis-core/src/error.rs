//! Error types shared across the crate.

use thiserror::Error;

/// Errors produced by the reactive core and the patch engine.
///
/// None of these are fatal: the scheduler and the component layer report them
/// through [`crate::diagnostics::handle_error`] and keep the previous visible
/// state.
#[derive(Debug, Error)]
pub enum Error {
    /// An evaluation function (getter, callback or render function) failed.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// A watcher re-entered the queue too many times within one flush.
    #[error("possible infinite update loop in {expression} ({count} re-entries)")]
    CircularUpdate { expression: String, count: usize },

    /// A watch expression could not be parsed into a field path.
    #[error("failed watching path \"{0}\": only simple dot-delimited paths are supported")]
    InvalidPath(String),

    /// A cyclic value graph was asked to produce a tree representation.
    #[error("value graph contains a cycle")]
    CyclicValue,

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),
}

impl Error {
    /// Shorthand for building an [`Error::Evaluation`] from any message.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;
