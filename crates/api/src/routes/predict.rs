//! Prediction Route

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use data_validator::RawObservation;
use feature_engine::{DerivedAttributes, UnmappedCategory};
use inference_engine::{Attribution, RiskLabel};
use risk_pipeline::{PipelineError, ScreeningOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::AppState;

/// Query parameters for the predict endpoint
#[derive(Debug, Default, Deserialize)]
pub struct PredictQuery {
    /// Override the configured attribution setting
    pub explain: Option<bool>,
}

/// Successful screening response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub request_id: Uuid,
    /// Rounded to 3 decimal places
    pub risk_probability: f64,
    pub risk_label: RiskLabel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_drivers: Option<Vec<Attribution>>,
    pub derived: DerivedAttributes,
    /// Categorical inputs replaced by a column default
    pub warnings: Vec<UnmappedCategory>,
}

impl PredictResponse {
    fn new(request_id: Uuid, outcome: ScreeningOutcome) -> Self {
        Self {
            request_id,
            risk_probability: round3(outcome.prediction.probability),
            risk_label: outcome.prediction.label,
            base_value: outcome.prediction.base_value,
            top_drivers: outcome.prediction.attributions,
            derived: outcome.derived,
            warnings: outcome.fallbacks,
        }
    }
}

/// One problem in a rejected request
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub kind: &'static str,
    pub fields: Vec<&'static str>,
    pub message: String,
}

/// Error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub request_id: Uuid,
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<ErrorDetail>,
}

/// Score one beneficiary record
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PredictQuery>,
    payload: Result<Json<RawObservation>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let Json(raw) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return payload_rejection(request_id, rejection),
    };
    let explain = params
        .explain
        .unwrap_or(state.pipeline.explain_config().enabled);

    match state.pipeline.transform_and_predict_with(&raw, explain) {
        Ok(outcome) => Json(PredictResponse::new(request_id, outcome)).into_response(),
        Err(e) => error_response(request_id, e),
    }
}

fn error_response(request_id: Uuid, err: PipelineError) -> Response {
    let status = match &err {
        PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Schema(_) | PipelineError::Inference(_) | PipelineError::InvalidConfig(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("Request {} failed: {}", request_id, err);
    }

    let details = match &err {
        PipelineError::Validation(report) => report
            .errors
            .iter()
            .map(|e| ErrorDetail {
                kind: e.kind(),
                fields: e.fields(),
                message: e.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };

    let body = ErrorResponse {
        request_id,
        error: err.kind(),
        message: err.to_string(),
        details,
    };
    (status, Json(body)).into_response()
}

/// Body that could not be read as an observation, e.g. a list field sent as text
fn payload_rejection(request_id: Uuid, rejection: JsonRejection) -> Response {
    warn!("Request {} has an unreadable body: {}", request_id, rejection.body_text());
    metrics::counter!("prediction_rejections_total", "kind" => "invalid_payload").increment(1);

    let body = ErrorResponse {
        request_id,
        error: "invalid_payload",
        message: rejection.body_text(),
        details: Vec::new(),
    };
    (rejection.status(), Json(body)).into_response()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
