//! ESRI World Imagery `export` endpoint

use super::{get_bytes, TileError, TileProvider, TileRequest};
use async_trait::async_trait;
use image::RgbImage;
use solarscan_core::geo::esri_export_bbox;
use solarscan_core::TileSource;
use tracing::debug;

/// Requests a single image whose bbox is centered on the coordinate
pub struct EsriProvider {
    client: reqwest::Client,
    export_url: String,
}

impl EsriProvider {
    pub fn new(client: reqwest::Client, export_url: String) -> Self {
        Self { client, export_url }
    }

    /// Query string sent to the export endpoint
    pub fn query_params(request: &TileRequest) -> Vec<(&'static str, String)> {
        let bbox = esri_export_bbox(request.lat, request.lon, request.zoom, request.size);
        vec![
            ("bbox", bbox.to_string()),
            ("bboxSR", "4326".to_string()),
            ("size", format!("{},{}", request.size, request.size)),
            ("imageSR", "4326".to_string()),
            ("format", "jpg".to_string()),
            ("f", "image".to_string()),
            ("dpi", "96".to_string()),
        ]
    }
}

#[async_trait]
impl TileProvider for EsriProvider {
    fn source(&self) -> TileSource {
        TileSource::Esri
    }

    async fn fetch(&self, request: &TileRequest) -> Result<RgbImage, TileError> {
        if request.size == 0 {
            return Err(TileError::InvalidRequest("tile size must be > 0".to_string()));
        }

        let params = Self::query_params(request);
        debug!("ESRI export bbox={}", params[0].1);

        let bytes = get_bytes(self.client.get(&self.export_url).query(&params)).await?;
        let image = image::load_from_memory(&bytes)?.to_rgb8();

        // The service may clamp the requested size
        if image.dimensions() != (request.size, request.size) {
            debug!(
                "ESRI returned {:?}, resizing to {}x{}",
                image.dimensions(),
                request.size,
                request.size
            );
            return Ok(image::imageops::resize(
                &image,
                request.size,
                request.size,
                image::imageops::FilterType::Triangle,
            ));
        }

        Ok(image)
    }
}
