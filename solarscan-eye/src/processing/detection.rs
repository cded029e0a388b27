//! Object detection pipeline

use crate::error::VisionError;
use crate::models::{Detection, Detector};
use image::RgbImage;
use std::sync::Arc;
use tracing::debug;

/// Runs a detector off the async executor
#[derive(Clone)]
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>) -> Self {
        Self { detector }
    }

    pub fn detector_name(&self) -> &str {
        self.detector.name()
    }

    /// Detect objects in `image`, highest confidence first
    pub async fn detect(&self, image: Arc<RgbImage>) -> Result<Vec<Detection>, VisionError> {
        debug!("Running {} on {}x{} tile", self.detector.name(), image.width(), image.height());

        let detector = Arc::clone(&self.detector);
        let mut detections = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| VisionError::Processing(format!("Detection task failed: {}", e)))??;

        detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}
