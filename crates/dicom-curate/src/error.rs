//! Error types for the dicom-curate library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for curation operations.
///
/// Only pipeline-level failures surface as `CurateError` from a run.
/// Per-file faults are recorded as strings in that file's
/// [`MapResults`](crate::MapResults) and never abort the run.
#[derive(Debug, Error)]
pub enum CurateError {
    /// Error reading or writing a file.
    #[error("IO error for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed specification list.
    #[error("Composition error: {0}")]
    Composition(String),

    /// A specification layer declared a different version.
    #[error("All curation specification versions must be '{expected}', found '{found}'")]
    VersionMismatch { expected: String, found: String },

    /// Bytes could not be decoded as a DICOM Part 10 file.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A dataset could not be serialized.
    #[error("Encode error: {0}")]
    Encode(String),

    /// Invalid run configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Fetch or upload failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The scanner hit a traversal fault.
    #[error("Scan error: {0}")]
    Scan(String),

    /// A mapping worker terminated unexpectedly.
    #[error("Mapping worker crashed: {0}")]
    WorkerCrashed(String),

    /// Error from the CSV library.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Regex compilation error.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl CurateError {
    /// Wrap an IO error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CurateError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for curation operations.
pub type Result<T> = std::result::Result<T, CurateError>;
