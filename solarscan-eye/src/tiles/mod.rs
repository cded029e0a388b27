//! Aerial tile acquisition with a primary provider and a fallback

pub mod esri;
pub mod google;

pub use esri::EsriProvider;
pub use google::GoogleTileProvider;

use async_trait::async_trait;
use image::RgbImage;
use solarscan_core::config::TileConfig;
use solarscan_core::TileSource;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum TileError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("could not decode tile image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("invalid tile request: {0}")]
    InvalidRequest(String),

    #[error("all tile providers failed: {}", .0.join("; "))]
    AllProvidersFailed(Vec<String>),
}

/// Square tile centered on a coordinate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileRequest {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
    /// Edge length in pixels
    pub size: u32,
}

/// Source of aerial imagery
#[async_trait]
pub trait TileProvider: Send + Sync {
    fn source(&self) -> TileSource;

    /// Fetch an RGB image of `request.size` x `request.size` pixels
    async fn fetch(&self, request: &TileRequest) -> Result<RgbImage, TileError>;
}

#[derive(Debug, Clone)]
pub struct FetchedTile {
    pub image: RgbImage,
    pub source: TileSource,
    /// True when the primary provider failed and a later one answered
    pub fallback_used: bool,
}

/// Tries each provider in order until one returns a tile
pub struct TileFetcher {
    providers: Vec<Arc<dyn TileProvider>>,
    attempts_per_provider: u32,
    retry_backoff: Duration,
}

impl TileFetcher {
    pub fn new(
        primary: Arc<dyn TileProvider>,
        fallback: Option<Arc<dyn TileProvider>>,
        attempts_per_provider: u32,
        retry_backoff: Duration,
    ) -> Self {
        let mut providers = vec![primary];
        providers.extend(fallback);
        Self {
            providers,
            attempts_per_provider: attempts_per_provider.max(1),
            retry_backoff,
        }
    }

    /// ESRI first, Google tiles as fallback when enabled
    pub fn from_config(config: &TileConfig) -> Result<Self, TileError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()?;

        let primary: Arc<dyn TileProvider> =
            Arc::new(EsriProvider::new(client.clone(), config.esri_url.clone()));
        let fallback: Option<Arc<dyn TileProvider>> = if config.enable_fallback {
            Some(Arc::new(GoogleTileProvider::new(
                client,
                config.google_url_template.clone(),
            )))
        } else {
            None
        };

        Ok(Self::new(
            primary,
            fallback,
            config.attempts_per_provider,
            config.retry_backoff(),
        ))
    }

    pub fn sources(&self) -> Vec<TileSource> {
        self.providers.iter().map(|p| p.source()).collect()
    }

    pub async fn fetch(&self, request: &TileRequest) -> Result<FetchedTile, TileError> {
        let mut failures = Vec::new();

        for (index, provider) in self.providers.iter().enumerate() {
            let source = provider.source();
            if index > 0 {
                info!(
                    "Falling back to {} for ({:.6}, {:.6})",
                    source, request.lat, request.lon
                );
            }

            let mut last_error = None;
            for attempt in 1..=self.attempts_per_provider {
                debug!("Fetching {} tile, attempt {}/{}", source, attempt, self.attempts_per_provider);
                match provider.fetch(request).await {
                    Ok(image) => {
                        return Ok(FetchedTile {
                            image,
                            source,
                            fallback_used: index > 0,
                        });
                    }
                    Err(e) => {
                        warn!(
                            "{} tile fetch failed (attempt {}/{}): {}",
                            source, attempt, self.attempts_per_provider, e
                        );
                        last_error = Some(e);
                        if attempt < self.attempts_per_provider && !self.retry_backoff.is_zero() {
                            tokio::time::sleep(self.retry_backoff).await;
                        }
                    }
                }
            }

            if let Some(e) = last_error {
                failures.push(format!("{}: {}", source, e));
            }
        }

        Err(TileError::AllProvidersFailed(failures))
    }
}

/// Status check shared by the HTTP providers
pub(crate) async fn get_bytes(
    request: reqwest::RequestBuilder,
) -> Result<bytes::Bytes, TileError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(TileError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response.bytes().await?)
}
