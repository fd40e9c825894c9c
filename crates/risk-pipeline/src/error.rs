//! Pipeline Error Types

use data_validator::ValidationReport;
use feature_engine::FeatureError;
use inference_engine::InferenceError;
use thiserror::Error;

/// Errors returned by the screening pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input rejected; user-facing, every problem listed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationReport),

    /// Row could not be typed against the frozen schema
    #[error(transparent)]
    Schema(#[from] FeatureError),

    /// Artifacts missing or inconsistent; raised only while starting up
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Configuration rejected while building the pipeline
    #[error("Invalid pipeline config: {0}")]
    InvalidConfig(String),
}

impl PipelineError {
    /// Stable kind used for metric labels and API error codes
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_failed",
            PipelineError::Schema(FeatureError::SchemaViolation { .. }) => "schema_violation",
            PipelineError::Schema(_) => "schema_error",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::Inference(_) => "inference_failed",
            PipelineError::InvalidConfig(_) => "invalid_config",
        }
    }
}
