//! Screening Pipeline
//!
//! raw observation → validation → derivation → normalization → schema
//! enforcement → prediction. Built once from immutable artifacts; every call
//! is a pure function of its input.

use crate::artifacts::Artifacts;
use crate::config::{ExplainConfig, PipelineConfig};
use crate::error::PipelineError;
use data_validator::{RawObservation, Validator};
use feature_engine::{
    CategoryNormalizer, DerivedAttributes, FeatureAssembler, FeatureSchema, FeatureVector,
    SchemaEnforcer, UnmappedCategory,
};
use inference_engine::{InferenceEngine, PredictionResult, RiskModel};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Schema-aligned features for one request
#[derive(Debug, Clone, Serialize)]
pub struct TransformOutput {
    pub features: FeatureVector,
    pub derived: DerivedAttributes,
    /// Categorical inputs that fell back to a column default
    pub fallbacks: Vec<UnmappedCategory>,
}

/// Prediction together with the intermediate values that produced it
#[derive(Debug, Clone, Serialize)]
pub struct ScreeningOutcome {
    pub prediction: PredictionResult,
    pub derived: DerivedAttributes,
    pub fallbacks: Vec<UnmappedCategory>,
    #[serde(skip)]
    pub features: FeatureVector,
}

/// The end-to-end screening pipeline
#[derive(Debug, Clone)]
pub struct ScreeningPipeline {
    validator: Validator,
    assembler: FeatureAssembler,
    enforcer: SchemaEnforcer,
    engine: InferenceEngine,
    explain: ExplainConfig,
}

impl ScreeningPipeline {
    /// Assemble a pipeline; any disagreement between the built-in vocabularies,
    /// the schema and the model is refused here rather than per request
    pub fn new(
        schema: Arc<FeatureSchema>,
        model: Arc<dyn RiskModel>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config
            .derivation
            .validate()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let untyped = schema.untyped_columns();
        if !untyped.is_empty() {
            return Err(PipelineError::ModelUnavailable(format!(
                "schema columns without a model dtype: {:?}",
                untyped
            )));
        }
        if model.num_features() != schema.len() {
            return Err(PipelineError::ModelUnavailable(format!(
                "model expects {} features, schema has {}",
                model.num_features(),
                schema.len()
            )));
        }

        let normalizer = CategoryNormalizer::standard()
            .and_then(|n| n.aligned_with(&schema))
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;
        FeatureAssembler::check_derived_labels(&schema)
            .map_err(|e| PipelineError::ModelUnavailable(e.to_string()))?;

        info!(
            "Screening pipeline ready: {} columns, {} trees, explain={} (top {})",
            schema.len(),
            model.num_trees(),
            config.explain.enabled,
            config.explain.top_k
        );

        Ok(Self {
            validator: Validator::new(config.validation),
            assembler: FeatureAssembler::new(normalizer, config.derivation),
            enforcer: SchemaEnforcer::new(schema),
            engine: InferenceEngine::new(model),
            explain: config.explain,
        })
    }

    /// Pipeline over loaded artifacts
    pub fn from_artifacts(artifacts: Artifacts, config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::new(artifacts.schema, artifacts.model, config)
    }

    /// Load artifacts from a directory and build the pipeline
    pub fn load(dir: &Path, config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::from_artifacts(Artifacts::load(dir)?, config)
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.enforcer.schema()
    }

    pub fn model(&self) -> &dyn RiskModel {
        self.engine.model()
    }

    pub fn explain_config(&self) -> &ExplainConfig {
        &self.explain
    }

    /// Validate, derive, normalize and enforce without scoring
    pub fn transform(&self, raw: &RawObservation) -> Result<TransformOutput, PipelineError> {
        let observation = self.validator.validate(raw)?;
        let assembled = self.assembler.assemble(&observation)?;
        let features = self.enforcer.enforce(&assembled.record)?;

        debug!(
            "Transformed observation: {} columns, {} missing",
            features.len(),
            features.missing_count()
        );

        Ok(TransformOutput {
            features,
            derived: assembled.derived,
            fallbacks: assembled.fallbacks,
        })
    }

    /// Full screening with the configured attribution setting
    pub fn transform_and_predict(&self, raw: &RawObservation) -> Result<ScreeningOutcome, PipelineError> {
        self.transform_and_predict_with(raw, self.explain.enabled)
    }

    /// Full screening; `explain` overrides the configured attribution setting
    pub fn transform_and_predict_with(
        &self,
        raw: &RawObservation,
        explain: bool,
    ) -> Result<ScreeningOutcome, PipelineError> {
        let start = Instant::now();
        let result = self.run(raw, explain);
        metrics::histogram!("screening_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                metrics::counter!("predictions_total", "label" => outcome.prediction.label.as_str()).increment(1);
                info!(
                    "Prediction: p={:.3} ({}), {} fallback(s)",
                    outcome.prediction.probability,
                    outcome.prediction.label.as_str(),
                    outcome.fallbacks.len()
                );
            }
            Err(e) => {
                metrics::counter!("prediction_rejections_total", "kind" => e.kind()).increment(1);
                warn!("Screening rejected ({}): {}", e.kind(), e);
            }
        }
        result
    }

    fn run(&self, raw: &RawObservation, explain: bool) -> Result<ScreeningOutcome, PipelineError> {
        let TransformOutput {
            features,
            derived,
            fallbacks,
        } = self.transform(raw)?;

        let top_k = explain.then_some(self.explain.top_k);
        let prediction = self.engine.predict(&features, top_k)?;

        Ok(ScreeningOutcome {
            prediction,
            derived,
            fallbacks,
            features,
        })
    }
}
