//! LBW Risk Screening API Server
//!
//! Thin HTTP boundary over the screening pipeline: one prediction endpoint,
//! a health check and Prometheus metrics.

use anyhow::Context;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use risk_pipeline::ScreeningPipeline;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_governor::GovernorLayer;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod rate_limit;
mod routes;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use rate_limit::{create_governor_config, RateLimitConfig};

/// Application state shared across handlers; immutable after startup
pub struct AppState {
    pub pipeline: ScreeningPipeline,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus handle, when the exporter is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new application state
    pub fn new(pipeline: ScreeningPipeline, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            pipeline,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics,
        }
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/predict", post(routes::predict::predict))
        .route("/metrics", get(routes::metrics::render))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Initialize logging; `RUST_LOG` overrides the configured level
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics exporter registered");
            metrics::describe_counter!("predictions_total", "Successful predictions by risk label");
            metrics::describe_counter!("prediction_rejections_total", "Rejected requests by error kind");
            metrics::describe_counter!("category_fallback_total", "Unmapped categorical inputs by column");
            metrics::describe_counter!(
                "category_out_of_set_total",
                "Categorical values outside the schema's closed set"
            );
            metrics::describe_counter!(
                "household_asset_unrecognized_total",
                "Asset names not in the household asset catalogue"
            );
            metrics::describe_histogram!("screening_duration_seconds", "End-to-end screening latency");
            Some(handle)
        }
        Err(err) => {
            warn!("Failed to install Prometheus metrics exporter: {}", err);
            None
        }
    }
}

/// Load artifacts and serve until the listener fails
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let metrics = if config.metrics_enabled {
        init_metrics()
    } else {
        info!("Prometheus metrics exporter disabled via configuration");
        None
    };

    let pipeline = ScreeningPipeline::load(&config.artifacts_dir, config.pipeline.clone())
        .with_context(|| format!("refusing to start without artifacts in {}", config.artifacts_dir.display()))?;
    let state = Arc::new(AppState::new(pipeline, metrics));

    let mut app = create_router(state);
    if config.rate_limit.enabled {
        let governor = create_governor_config(&config.rate_limit)
            .context("rate limit requires non-zero per_second and burst_size")?;
        app = app.layer(GovernorLayer { config: governor });
        info!(
            "Rate limiting: burst {} replenishing every {}s",
            config.rate_limit.burst_size, config.rate_limit.per_second
        );
    }
    if config.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    info!("Starting API server on {}", config.server.bind);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use risk_pipeline::PipelineConfig;
    use serde_json::{json, Value};
    use std::path::Path;
    use tower::ServiceExt;

    fn app() -> Router {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../artifacts");
        let pipeline = ScreeningPipeline::load(&dir, PipelineConfig::default()).unwrap();
        let handle = PrometheusBuilder::new().build_recorder().handle();
        create_router(Arc::new(AppState::new(pipeline, Some(handle))))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let request = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model"]["feature_count"], 32);
        assert_eq!(body["model"]["tree_count"], 5);
    }

    #[tokio::test]
    async fn test_predict_success() {
        let payload = json!({
            "measured_HB": 5.5,
            "lmp_date": "2024-01-01",
            "registration_date": "2024-02-01",
            "water_source_clean": "rooftop tank"
        });
        let (status, body) = send(app(), post("/api/v1/predict", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk_label"], "High LBW Risk");
        assert_eq!(body["risk_probability"], 0.562);
        assert_eq!(body["derived"]["hb_risk_bin"], "severe_anaemia");
        assert_eq!(body["derived"]["registration_bucket"], "Early");
        assert_eq!(body["warnings"][0]["fallback"], "Delivered / other");
        assert!(body["top_drivers"].as_array().unwrap().len() <= 8);
        assert!(body["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_predict_without_explanation() {
        let payload = json!({"lmp_date": "2024-01-01", "registration_date": "2024-02-01"});
        let (status, body) = send(app(), post("/api/v1/predict?explain=false", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("top_drivers").is_none());
        assert!(body.get("base_value").is_none());
    }

    #[tokio::test]
    async fn test_predict_validation_rejection() {
        let payload = json!({
            "lmp_date": "2024-03-01",
            "registration_date": "2024-02-01",
            "hemoglobin": 42
        });
        let (status, body) = send(app(), post("/api/v1/predict", payload)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation_failed");
        let kinds: Vec<&str> = body["details"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|d| d["kind"].as_str())
            .collect();
        assert_eq!(kinds, vec!["out_of_range", "invalid_temporal_order"]);
    }

    #[tokio::test]
    async fn test_predict_temporal_rejection() {
        let payload = json!({"lmp_date": "2024-03-01", "registration_date": "2024-02-01"});
        let (status, body) = send(app(), post("/api/v1/predict", payload)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["details"][0]["kind"], "invalid_temporal_order");
        assert_eq!(body["details"][0]["fields"], json!(["lmp_date", "registration_date"]));
    }

    #[tokio::test]
    async fn test_mistyped_field_gets_error_envelope() {
        let payload = json!({
            "lmp_date": "2024-01-01",
            "registration_date": "2024-02-01",
            "household_assets": "Television"
        });
        let response = app().oneshot(post("/api/v1/predict", payload)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers()["content-type"].to_str().unwrap(),
            "application/json"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "invalid_payload");
        assert!(body["request_id"].is_string());
        assert!(body["message"].as_str().unwrap().contains("household_assets"));
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_envelope() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/predict")
            .header("content-type", "application/json")
            .body(Body::from("{\"lmp_date\": "))
            .unwrap();
        let (status, body) = send(app(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_payload");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
