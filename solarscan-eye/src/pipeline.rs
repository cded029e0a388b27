//! Single-coordinate pipeline: fetch, detect, render, shape the record

use crate::error::VisionError;
use crate::models::{Detection, Detector};
use crate::processing::{render_overlay, DetectionPipeline};
use crate::tiles::{TileFetcher, TileRequest};
use image::RgbImage;
use solarscan_core::config::SolarScanConfig;
use solarscan_core::geo::{bbox_area_sqm, validate_coordinates};
use solarscan_core::record::{today, RecordContext};
use solarscan_core::{PredictionRecord, SampleId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the tile and overlay images for one coordinate are written
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub tile: PathBuf,
    pub overlay: PathBuf,
}

impl OutputPaths {
    pub fn new(tile: impl Into<PathBuf>, overlay: impl Into<PathBuf>) -> Self {
        Self {
            tile: tile.into(),
            overlay: overlay.into(),
        }
    }

    /// Unique file names for one web request
    pub fn for_request(outputs_dir: &Path) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(
            outputs_dir.join(format!("{}_tile.jpg", id)),
            outputs_dir.join(format!("{}_overlay.jpg", id)),
        )
    }

    /// `tiles/<id>.jpg` and `overlays/<id>_overlay.jpg` under a batch directory
    pub fn for_sample(batch_dir: &Path, sample_id: &SampleId) -> Self {
        let stem = sample_id.file_stem();
        Self::new(
            batch_dir.join("tiles").join(format!("{}.jpg", stem)),
            batch_dir.join("overlays").join(format!("{}_overlay.jpg", stem)),
        )
    }
}

/// Path as emitted in records, always with forward slashes
pub fn display_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Everything observed while producing one record
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub record: PredictionRecord,
    pub fallback_used: bool,
    pub fetch_failed: bool,
    /// A provider returned a tile but it could not be written to disk
    pub write_failed: bool,
    pub inference_failed: bool,
    pub detections: usize,
}

pub struct SolarPipeline {
    config: Arc<SolarScanConfig>,
    fetcher: TileFetcher,
    detection: DetectionPipeline,
}

impl SolarPipeline {
    pub fn new(config: Arc<SolarScanConfig>, fetcher: TileFetcher, detector: Arc<dyn Detector>) -> Self {
        Self {
            config,
            fetcher,
            detection: DetectionPipeline::new(detector),
        }
    }

    pub fn config(&self) -> &SolarScanConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &str {
        self.detection.detector_name()
    }

    /// Produce the record for one coordinate.
    ///
    /// Only invalid coordinates are an error; provider, model and image
    /// write failures become `NOT_VERIFIABLE` records.
    pub async fn run_single(
        &self,
        sample_id: SampleId,
        lat: f64,
        lon: f64,
        paths: &OutputPaths,
        tile_size: u32,
    ) -> Result<PredictionRecord, VisionError> {
        Ok(self.run(sample_id, lat, lon, paths, tile_size).await?.record)
    }

    pub async fn run(
        &self,
        sample_id: SampleId,
        lat: f64,
        lon: f64,
        paths: &OutputPaths,
        tile_size: u32,
    ) -> Result<PipelineRun, VisionError> {
        validate_coordinates(lat, lon)?;

        let zoom = self.config.tiles.zoom;
        let request = TileRequest { lat, lon, zoom, size: tile_size };
        let mut ctx = RecordContext {
            sample_id,
            lat,
            lon,
            buffer_radius_sqft: self.config.record.buffer_radius_sqft,
            source: None,
            capture_date: None,
            tile_image: None,
            overlay_image: None,
        };

        let fetched = match self.fetcher.fetch(&request).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("Tile fetch failed for {} ({:.6}, {:.6}): {}", ctx.sample_id, lat, lon, e);
                ctx.tile_image = existing_path(&paths.tile);
                return Ok(failed_fetch(ctx));
            }
        };

        let source = fetched.source;
        let fallback_used = fetched.fallback_used;
        let tile = Arc::new(fetched.image);

        if let Err(e) = save_jpeg(Arc::clone(&tile), paths.tile.clone()).await {
            warn!("Could not write {} tile to {:?}: {}", source, paths.tile, e);
            ctx.tile_image = existing_path(&paths.tile);
            return Ok(PipelineRun {
                record: PredictionRecord::unverifiable(ctx),
                fallback_used,
                fetch_failed: false,
                write_failed: true,
                inference_failed: false,
                detections: 0,
            });
        }
        ctx.source = Some(source);
        ctx.tile_image = Some(display_path(&paths.tile));
        debug!("Saved {} tile to {:?}", source, paths.tile);

        let detections = match self.detection.detect(Arc::clone(&tile)).await {
            Ok(detections) => detections,
            Err(e) => {
                warn!("Inference failed for {}: {}", ctx.sample_id, e);
                return Ok(PipelineRun {
                    record: PredictionRecord::unverifiable(ctx),
                    fallback_used,
                    fetch_failed: false,
                    write_failed: false,
                    inference_failed: true,
                    detections: 0,
                });
            }
        };

        let overlay = Arc::new(render_overlay(&tile, &detections));
        match save_jpeg(overlay, paths.overlay.clone()).await {
            Ok(()) => ctx.overlay_image = Some(display_path(&paths.overlay)),
            Err(e) => warn!("Could not write overlay {:?}: {}", paths.overlay, e),
        }
        ctx.capture_date = Some(today());

        let count = detections.len();
        let record = match detections.first() {
            Some(top) => self.shape_detection(ctx, top, lat, zoom),
            None => PredictionRecord::unverifiable(ctx),
        };

        info!(
            "{} via {}: has_solar={} confidence={} qc={:?}",
            record.sample_id,
            source,
            record.has_solar,
            record.confidence,
            record.qc_status
        );

        Ok(PipelineRun {
            record,
            fallback_used,
            fetch_failed: false,
            write_failed: false,
            inference_failed: false,
            detections: count,
        })
    }

    fn shape_detection(&self, ctx: RecordContext, top: &Detection, lat: f64, zoom: u8) -> PredictionRecord {
        let bbox = top.bbox_f64();
        let area = bbox_area_sqm(bbox, lat, zoom);
        PredictionRecord::detected(
            ctx,
            bbox,
            top.confidence as f64,
            area,
            self.config.record.qc_threshold,
        )
    }
}

fn failed_fetch(ctx: RecordContext) -> PipelineRun {
    PipelineRun {
        record: PredictionRecord::unverifiable(ctx),
        fallback_used: false,
        fetch_failed: true,
        write_failed: false,
        inference_failed: false,
        detections: 0,
    }
}

fn existing_path(path: &Path) -> Option<String> {
    path.is_file().then(|| display_path(path))
}

async fn save_jpeg(image: Arc<RgbImage>, path: PathBuf) -> Result<(), VisionError> {
    tokio::task::spawn_blocking(move || -> Result<(), VisionError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        image.save_with_format(&path, image::ImageFormat::Jpeg)?;
        Ok(())
    })
    .await
    .map_err(|e| VisionError::Processing(format!("Image write task failed: {}", e)))?
}
