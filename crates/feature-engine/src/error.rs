//! Feature Engine Error Types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading schema artifacts or enforcing a row against them
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Row cannot be typed against the frozen schema; never passed to the model
    #[error("Schema violation in column {column:?}: {reason}")]
    SchemaViolation { column: String, reason: String },

    /// Artifact content is inconsistent
    #[error("Invalid artifact {artifact}: {reason}")]
    InvalidArtifact { artifact: String, reason: String },

    /// Artifact file could not be read
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact file is not valid JSON of the expected shape
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Derivation thresholds that cannot bucket every value
    #[error("Invalid derivation config: {0}")]
    InvalidConfig(String),

    /// Built-in vocabulary disagrees with the schema's closed set
    #[error("Vocabulary for {column:?} does not match the schema: {reason}")]
    VocabularyMismatch { column: String, reason: String },
}
