//! Error types for bitfunnel.
//!
//! Library crates use [`FunnelError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Pipeline stages never surface these errors: transport and parse failures
//! are converted into each stage's degraded result at the stage boundary.
//! Running out of retries is not an error either; it produces a record with
//! `degraded = true`.

use std::path::PathBuf;

/// Top-level error type for all bitfunnel operations.
#[derive(Debug, thiserror::Error)]
pub enum FunnelError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// An external call (judgment service, content or item provider) did not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response did not match the expected shape.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// A call completed but yielded no usable content.
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The persistence sink rejected the results.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Query planning produced no search terms; the run is aborted.
    #[error("no search terms could be generated for the query")]
    NoSearchTerms,

    /// Discovery found no candidates for any term; the run is aborted.
    #[error("no candidates were discovered for the search terms")]
    NoCandidates,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, FunnelError>;

impl FunnelError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a transport error from any displayable message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error aborts a whole run rather than a single candidate.
    pub fn aborts_run(&self) -> bool {
        matches!(self, Self::NoSearchTerms | Self::NoCandidates)
    }
}
