//! Tree Ensemble Inference Engine
//!
//! Scores schema-aligned feature vectors with a gradient-boosted binary
//! classifier and explains predictions with additive path attributions.

mod engine;
mod explain;
mod model;

pub use engine::{sigmoid, InferenceEngine, PredictionResult, RiskLabel, HIGH_RISK_THRESHOLD};
pub use explain::{rank_attributions, Attribution, DEFAULT_TOP_K};
pub use model::{Contributions, GradientBoostedModel, Node, RiskModel, Tree, TreeEnsemble, MODEL_FILE};

use thiserror::Error;

/// Errors during model loading or inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
}
