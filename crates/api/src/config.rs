//! Server Configuration
//!
//! Layered: built-in defaults, then an optional TOML/JSON/YAML file, then
//! `LBW__`-prefixed environment variables (`LBW__SERVER__BIND=0.0.0.0:9000`).

use crate::rate_limit::RateLimitConfig;
use ::config::{Config, ConfigError, Environment, File};
use risk_pipeline::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Allow cross-origin browser clients
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            cors_permissive: false,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Directory holding features.json, dtypes.json, categories.json and model.json
    pub artifacts_dir: PathBuf,
    pub pipeline: PipelineConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    /// Expose Prometheus metrics at `/metrics`
    pub metrics_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            artifacts_dir: PathBuf::from("artifacts"),
            pipeline: PipelineConfig::default(),
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            metrics_enabled: true,
        }
    }
}

impl AppConfig {
    /// Load from an optional file plus the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(Environment::with_prefix("LBW").separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
