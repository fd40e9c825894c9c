//! Prediction Façade

use crate::explain::{rank_attributions, Attribution};
use crate::model::RiskModel;
use crate::InferenceError;
use feature_engine::FeatureVector;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Probability at or above which a row is labelled high risk
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;

/// Binary risk label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLabel {
    #[serde(rename = "High LBW Risk")]
    High,
    #[serde(rename = "Lower LBW Risk")]
    Lower,
}

impl RiskLabel {
    /// Label for a probability
    pub fn from_probability(probability: f64) -> Self {
        if probability >= HIGH_RISK_THRESHOLD {
            RiskLabel::High
        } else {
            RiskLabel::Lower
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLabel::High => "High LBW Risk",
            RiskLabel::Lower => "Lower LBW Risk",
        }
    }
}

/// Prediction result for one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Positive-class (LBW) probability in [0, 1]
    pub probability: f64,
    pub label: RiskLabel,
    /// Expected log-odds, present when attributions were requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributions: Option<Vec<Attribution>>,
}

/// Wraps a loaded model; holds no mutable state
#[derive(Clone)]
pub struct InferenceEngine {
    model: Arc<dyn RiskModel>,
}

impl InferenceEngine {
    pub fn new(model: Arc<dyn RiskModel>) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &dyn RiskModel {
        self.model.as_ref()
    }

    /// Score a schema-aligned vector; `explain` is the number of attributions wanted
    pub fn predict(
        &self,
        features: &FeatureVector,
        explain: Option<usize>,
    ) -> Result<PredictionResult, InferenceError> {
        let start = Instant::now();

        if features.len() != self.model.num_features() {
            return Err(InferenceError::InvalidInputShape {
                expected: format!("{} features", self.model.num_features()),
                actual: format!("{} features", features.len()),
            });
        }

        let inputs = features.model_inputs();
        let margin = self.model.margin(&inputs);
        if !margin.is_finite() {
            return Err(InferenceError::InferenceFailed(format!("non-finite margin {}", margin)));
        }
        let probability = sigmoid(margin);

        let (base_value, attributions) = match explain {
            Some(top_k) => {
                let contributions = self.model.contributions(&inputs);
                let ranked = rank_attributions(features.names(), &contributions.values, top_k);
                (Some(contributions.base_value), Some(ranked))
            }
            None => (None, None),
        };

        debug!(
            "Inference completed in {}us: margin={:.4} p={:.4}",
            start.elapsed().as_micros(),
            margin,
            probability
        );

        Ok(PredictionResult {
            probability,
            label: RiskLabel::from_probability(probability),
            base_value,
            attributions,
        })
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("num_features", &self.model.num_features())
            .field("num_trees", &self.model.num_trees())
            .finish()
    }
}

/// Logistic function
pub fn sigmoid(margin: f64) -> f64 {
    1.0 / (1.0 + (-margin).exp())
}
