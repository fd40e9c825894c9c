//! Startup Artifact Loading

use crate::error::PipelineError;
use feature_engine::FeatureSchema;
use inference_engine::{GradientBoostedModel, MODEL_FILE};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// Schema and model loaded once at process start
#[derive(Debug, Clone)]
pub struct Artifacts {
    pub schema: Arc<FeatureSchema>,
    pub model: Arc<GradientBoostedModel>,
}

impl Artifacts {
    /// Load `features.json`, `dtypes.json`, `categories.json` and `model.json`
    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        let schema = FeatureSchema::load(dir).map_err(|e| unavailable(dir, e.to_string()))?;
        let model = GradientBoostedModel::load(&dir.join(MODEL_FILE), &schema)
            .map_err(|e| unavailable(dir, e.to_string()))?;

        info!("Artifacts ready from {}", dir.display());
        Ok(Self {
            schema: Arc::new(schema),
            model: Arc::new(model),
        })
    }
}

fn unavailable(dir: &Path, reason: String) -> PipelineError {
    error!("Cannot load artifacts from {}: {}", dir.display(), reason);
    PipelineError::ModelUnavailable(reason)
}
