//! Config loading and server bootstrap shared by the binaries

use crate::http::{create_router, ApiState};
use anyhow::Context;
use solarscan_core::SolarScanConfig;
use solarscan_eye::models::ModelManager;
use solarscan_eye::{SolarPipeline, TileFetcher, YoloModel};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

/// Read the config file (or defaults), then overlay `SOLARSCAN_*` variables
pub fn load_config(path: Option<&Path>) -> anyhow::Result<SolarScanConfig> {
    let mut config = match path {
        Some(path) => SolarScanConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SolarScanConfig::default(),
    };
    config.apply_env();
    Ok(config)
}

/// Load the detector and wire the tile fetcher into a pipeline
pub async fn build_pipeline(config: Arc<SolarScanConfig>) -> anyhow::Result<Arc<SolarPipeline>> {
    let manager = ModelManager::new(&config.detector);
    let model_path = manager.ensure_model().await?;

    info!("🧠 Loading detector from {:?}...", model_path);
    let detector_config = config.detector.clone();
    let detector = tokio::task::spawn_blocking(move || YoloModel::load(&detector_config))
        .await
        .context("detector loading task panicked")??;
    info!("✅ Detector ready");

    let fetcher = TileFetcher::from_config(&config.tiles)?;
    info!("🛰️  Tile providers: {:?}", fetcher.sources());

    Ok(Arc::new(SolarPipeline::new(config, fetcher, Arc::new(detector))))
}

/// Bind and serve until Ctrl+C
pub async fn serve(config: SolarScanConfig) -> anyhow::Result<()> {
    config.validate()?;
    let config = Arc::new(config);

    std::fs::create_dir_all(&config.server.outputs_dir).with_context(|| {
        format!("cannot create outputs dir {}", config.server.outputs_dir.display())
    })?;

    let pipeline = build_pipeline(Arc::clone(&config)).await?;
    let app = create_router(ApiState::new(Arc::clone(&config), pipeline));

    let addr = format!("{}:{}", config.server.bind_address, config.server.bind_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {}", addr))?;

    info!("🌐 SolarScan listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutdown signal received"),
        Err(e) => warn!("Failed to listen for shutdown signal: {}", e),
    }
}
