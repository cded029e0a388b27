//! YOLO object detection model

use super::{non_max_suppression, Detection, Detector};
use crate::error::VisionError;
use crate::utils::{letterbox, rgb_to_chw_tensor, Letterbox};
use image::RgbImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use solarscan_core::config::DetectorConfig;
use std::path::Path;
use tracing::{debug, info};

/// Upper bound on candidate rows accepted from the output head
const MAX_CANDIDATES: usize = 100_000;

/// Thresholds applied to the raw output head
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloParams {
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.30,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}

impl From<&DetectorConfig> for YoloParams {
    fn from(config: &DetectorConfig) -> Self {
        Self {
            input_size: config.input_size,
            conf_threshold: config.conf_threshold,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// YOLOv8-style detector exported to ONNX
pub struct YoloModel {
    session: Mutex<Session>,
    params: YoloParams,
    name: String,
}

impl YoloModel {
    /// Load the ONNX weights described by `config`
    pub fn load(config: &DetectorConfig) -> Result<Self, VisionError> {
        Self::new(&config.model_path, YoloParams::from(config), config.intra_threads)
    }

    pub fn new(model_path: &Path, params: YoloParams, intra_threads: usize) -> Result<Self, VisionError> {
        if !model_path.is_file() {
            return Err(VisionError::Model(format!(
                "YOLO weights not found at: {}",
                model_path.display()
            )));
        }

        let session = Session::builder()
            .map_err(|e| VisionError::Ort(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| VisionError::Ort(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(intra_threads.max(1))
            .map_err(|e| VisionError::Ort(format!("Failed to set intra threads: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| VisionError::Ort(format!("Failed to load YOLO model: {}", e)))?;

        info!("YOLO model loaded from {:?}", model_path);

        let name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "yolo".to_string());

        Ok(Self {
            session: Mutex::new(session),
            params,
            name,
        })
    }

    pub fn params(&self) -> &YoloParams {
        &self.params
    }

    fn infer(&self, input: Vec<f32>) -> Result<(Vec<i64>, Vec<f32>), VisionError> {
        let size = self.params.input_size as usize;
        let tensor = Tensor::from_array(([1usize, 3, size, size], input.into_boxed_slice()))
            .map_err(|e| VisionError::Ort(format!("Failed to create input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::Ort(format!("YOLO inference failed: {}", e)))?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::Ort(format!("Failed to extract output tensor: {}", e)))?;

        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

impl Detector for YoloModel {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, VisionError> {
        let (input_image, geometry) = letterbox(image, self.params.input_size)?;
        let input = rgb_to_chw_tensor(&input_image);

        let (shape, data) = self.infer(input)?;
        debug!("YOLO output shape: {:?}", shape);

        let detections = decode_output(&shape, &data, &geometry, &self.params)?;
        debug!("YOLO detected {} objects", detections.len());
        Ok(detections)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Decode a YOLOv8 head (`[1, 4 + nc, N]`, or transposed `[1, N, 4 + nc]`)
/// into detections in source-image pixels.
pub fn decode_output(
    shape: &[i64],
    data: &[f32],
    geometry: &Letterbox,
    params: &YoloParams,
) -> Result<Vec<Detection>, VisionError> {
    let dims: Vec<usize> = match shape {
        [1, a, b] if *a > 0 && *b > 0 => vec![*a as usize, *b as usize],
        [a, b] if *a > 0 && *b > 0 => vec![*a as usize, *b as usize],
        _ => {
            return Err(VisionError::Model(format!(
                "Unexpected YOLO output shape {:?}",
                shape
            )))
        }
    };

    // Attributes (4 box coords + class scores) are fewer than candidates
    let (attrs, candidates, transposed) = if dims[0] <= dims[1] {
        (dims[0], dims[1], false)
    } else {
        (dims[1], dims[0], true)
    };

    if attrs < 5 {
        return Err(VisionError::Model(format!(
            "YOLO output has {} attributes, need at least 5",
            attrs
        )));
    }
    if candidates > MAX_CANDIDATES {
        return Err(VisionError::Model(format!(
            "YOLO output has too many candidates: {}",
            candidates
        )));
    }
    if data.len() < attrs * candidates {
        return Err(VisionError::Model(format!(
            "YOLO output truncated: {} values for {}x{}",
            data.len(),
            attrs,
            candidates
        )));
    }

    let at = |attr: usize, i: usize| -> f32 {
        if transposed {
            data[i * attrs + attr]
        } else {
            data[attr * candidates + i]
        }
    };

    let mut detections = Vec::new();
    for i in 0..candidates {
        let mut best_class = 0;
        let mut best_score = f32::MIN;
        for class in 0..attrs - 4 {
            let score = at(4 + class, i);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }

        if !best_score.is_finite() || best_score < params.conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) || w <= 0.0 || h <= 0.0 {
            continue;
        }

        let bbox = geometry.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]);
        if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
            continue;
        }

        detections.push(Detection {
            class_id: best_class,
            confidence: best_score.min(1.0),
            bbox,
        });
    }

    Ok(non_max_suppression(
        detections,
        params.iou_threshold,
        params.max_detections,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_geometry(size: u32) -> Letterbox {
        Letterbox {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            src_width: size,
            src_height: size,
        }
    }

    /// Build a channel-major `[1, 5, N]` head with one class
    fn head(boxes: &[(f32, f32, f32, f32, f32)]) -> (Vec<i64>, Vec<f32>) {
        let n = boxes.len();
        let mut data = vec![0.0f32; 5 * n];
        for (i, &(cx, cy, w, h, score)) in boxes.iter().enumerate() {
            data[i] = cx;
            data[n + i] = cy;
            data[2 * n + i] = w;
            data[3 * n + i] = h;
            data[4 * n + i] = score;
        }
        (vec![1, 5, n as i64], data)
    }

    #[test]
    fn test_decode_filters_by_confidence() {
        let (shape, data) = head(&[
            (100.0, 100.0, 20.0, 20.0, 0.9),
            (300.0, 300.0, 20.0, 20.0, 0.1),
            (500.0, 500.0, 40.0, 20.0, 0.31),
            (5.0, 5.0, 2.0, 2.0, 0.2),
            (50.0, 50.0, 2.0, 2.0, 0.0),
            (60.0, 60.0, 2.0, 2.0, 0.0),
        ]);
        let detections = decode_output(&shape, &data, &identity_geometry(640), &YoloParams::default()).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence, 0.9);
        assert_eq!(detections[0].bbox, [90.0, 90.0, 110.0, 110.0]);
        assert_eq!(detections[1].bbox, [480.0, 490.0, 520.0, 510.0]);
    }

    #[test]
    fn test_decode_transposed_layout() {
        // [1, N, 5] with N = 6 > 5 attributes
        let mut data = Vec::new();
        for i in 0..6 {
            let score = if i == 2 { 0.8 } else { 0.0 };
            data.extend_from_slice(&[200.0, 200.0, 50.0, 50.0, score]);
        }
        let detections = decode_output(&[1, 6, 5], &data, &identity_geometry(640), &YoloParams::default()).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, [175.0, 175.0, 225.0, 225.0]);
    }

    #[test]
    fn test_decode_applies_nms() {
        let (shape, data) = head(&[
            (100.0, 100.0, 40.0, 40.0, 0.8),
            (102.0, 101.0, 40.0, 40.0, 0.7),
            (400.0, 400.0, 40.0, 40.0, 0.6),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
        ]);
        let detections = decode_output(&shape, &data, &identity_geometry(640), &YoloParams::default()).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].confidence, 0.8);
        assert_eq!(detections[1].confidence, 0.6);
    }

    #[test]
    fn test_decode_maps_through_letterbox() {
        let geometry = Letterbox {
            scale: 0.625,
            pad_x: 0.0,
            pad_y: 0.0,
            src_width: 1024,
            src_height: 1024,
        };
        let (shape, data) = head(&[
            (100.0, 100.0, 50.0, 50.0, 0.9),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
            (0.0, 0.0, 0.0, 0.0, 0.0),
        ]);
        let detections = decode_output(&shape, &data, &geometry, &YoloParams::default()).unwrap();
        assert_eq!(detections[0].bbox, [120.0, 120.0, 200.0, 200.0]);
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let params = YoloParams::default();
        let geometry = identity_geometry(640);
        assert!(decode_output(&[1, 2, 3, 4], &[0.0; 24], &geometry, &params).is_err());
        assert!(decode_output(&[1, 4, 10], &[0.0; 40], &geometry, &params).is_err());
        assert!(decode_output(&[1, 5, 10], &[0.0; 10], &geometry, &params).is_err());
    }

    #[test]
    fn test_missing_weights_fail_fast() {
        let config = DetectorConfig {
            model_path: "definitely/not/here.onnx".into(),
            ..DetectorConfig::default()
        };
        match YoloModel::load(&config) {
            Err(VisionError::Model(msg)) => assert!(msg.contains("not found")),
            Err(other) => panic!("expected Model error, got {}", other),
            Ok(_) => panic!("expected missing weights to fail"),
        }
    }
}
