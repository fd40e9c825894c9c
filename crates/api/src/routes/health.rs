//! Health Route

use axum::{extract::State, Json};
use risk_pipeline::ScreeningPipeline;
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub model: ModelStatus,
}

/// Loaded model summary
#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub feature_count: usize,
    pub tree_count: usize,
    pub explain_enabled: bool,
    pub top_k: usize,
}

impl ModelStatus {
    fn of(pipeline: &ScreeningPipeline) -> Self {
        Self {
            feature_count: pipeline.schema().len(),
            tree_count: pipeline.model().num_trees(),
            explain_enabled: pipeline.explain_config().enabled,
            top_k: pipeline.explain_config().top_k,
        }
    }
}

/// Health check handler
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        model: ModelStatus::of(&state.pipeline),
    })
}
