//! LBW Risk Screening Server - Main Entry Point
//!
//! Usage: `lbw-screening [config-file]`; the file may also be given in `LBW_CONFIG`.

use anyhow::Result;
use api::{init_logging, run_server, AppConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("LBW_CONFIG"))
        .map(PathBuf::from);

    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== LBW Risk Screening v{} ===", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Configuration loaded from {}", path.display());
    }
    info!("Artifacts directory: {}", config.artifacts_dir.display());

    run_server(config).await
}
