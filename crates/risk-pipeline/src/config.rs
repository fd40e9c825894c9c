//! Pipeline Configuration

use data_validator::ValidationConfig;
use feature_engine::DerivationConfig;
use inference_engine::DEFAULT_TOP_K;
use serde::{Deserialize, Serialize};

/// Attribution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Attach attributions unless the request opts out
    pub enabled: bool,
    /// Number of attributions kept
    pub top_k: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Everything the pipeline needs besides the artifacts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub validation: ValidationConfig,
    pub derivation: DerivationConfig,
    pub explain: ExplainConfig,
}
