//! Error types for stillframe

use thiserror::Error;

/// Result type alias using the stillframe Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared data model
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or inconsistent registry. Fatal: surfaced before any
    /// check executes.
    #[error("Invalid registry: {0}")]
    InvalidRegistry(String),

    #[error("Duplicate artifact name '{0}' - artifact names double as baseline filenames")]
    DuplicateArtifact(String),

    #[error("Missing required field '{field}' in {entry}")]
    MissingField { entry: String, field: String },

    #[error("Baseline metadata unavailable: {0}")]
    BaselineMetadata(String),
}
