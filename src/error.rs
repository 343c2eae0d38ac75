//! Error handling for the equivalence harness.
//!
//! Only harness-level problems are errors. Anything a unit does while it
//! runs (raising, hanging, failing to load) is data and is reported through
//! [`crate::sandbox::ExecutionResult`] instead.
//!
//! # Propagation
//!
//! - `UnparsableSource`, and `Io` while reading one reference, are fatal for
//!   that unit only: it is logged and listed as skipped.
//! - `CorpusMissing` and `InvalidConfig` abort the whole run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the harness itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The unit source could not be statically parsed.
    #[error("unparsable source at line {line}: {message}")]
    UnparsableSource {
        /// 1-based line where parsing failed.
        line: usize,
        /// What the parser rejected.
        message: String,
    },

    /// A corpus or candidate directory does not exist.
    #[error("corpus directory missing: {0}")]
    CorpusMissing(PathBuf),

    /// Filesystem failure while loading or writing harness files.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration rejected before the run starts.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON encoding or decoding failed.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sandbox driver produced something the harness cannot read.
    #[error("driver protocol violation: {0}")]
    Protocol(String),
}

impl HarnessError {
    /// Shorthand for wrapping an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error should abort the whole run rather than one unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CorpusMissing(_) | Self::InvalidConfig(_))
    }
}

/// Result type used across the harness.
pub type HarnessResult<T> = Result<T, HarnessError>;
