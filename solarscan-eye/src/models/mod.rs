//! Detector models and weight management

pub mod manager;
pub mod yolo;

pub use manager::ModelManager;
pub use yolo::YoloModel;

use crate::error::VisionError;
use image::RgbImage;

/// Detected object in image pixel coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
}

impl Detection {
    pub fn width(&self) -> f32 {
        (self.bbox[2] - self.bbox[0]).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bbox[3] - self.bbox[1]).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.bbox[0].max(other.bbox[0]);
        let iy1 = self.bbox[1].max(other.bbox[1]);
        let ix2 = self.bbox[2].min(other.bbox[2]);
        let iy2 = self.bbox[3].min(other.bbox[3]);

        if ix2 <= ix1 || iy2 <= iy1 {
            return 0.0;
        }

        let inter = (ix2 - ix1) * (iy2 - iy1);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        (inter / union).clamp(0.0, 1.0)
    }

    pub fn bbox_f64(&self) -> [f64; 4] {
        self.bbox.map(|v| v as f64)
    }
}

/// Object detector over RGB images
pub trait Detector: Send + Sync {
    /// Detections sorted by confidence, highest first
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, VisionError>;

    fn name(&self) -> &str;
}

/// Greedy non-maximum suppression; keeps at most `max_detections`
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.retain(|d| d.confidence.is_finite());
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in detections {
        if keep.len() >= max_detections {
            break;
        }
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}
