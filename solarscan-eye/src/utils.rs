//! Utility functions for detector input preparation

use crate::error::VisionError;
use image::{Rgb, RgbImage};

/// Gray used by YOLO letterboxing
const PAD_VALUE: u8 = 114;

/// Geometry of a letterboxed image, used to map boxes back to the source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub src_width: u32,
    pub src_height: u32,
}

impl Letterbox {
    /// Map a box from model input space back into source pixels
    pub fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
        let w = self.src_width as f32;
        let h = self.src_height as f32;
        [
            ((bbox[0] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[1] - self.pad_y) / self.scale).clamp(0.0, h),
            ((bbox[2] - self.pad_x) / self.scale).clamp(0.0, w),
            ((bbox[3] - self.pad_y) / self.scale).clamp(0.0, h),
        ]
    }
}

/// Resize preserving aspect ratio and pad to a `target` x `target` square
pub fn letterbox(image: &RgbImage, target: u32) -> Result<(RgbImage, Letterbox), VisionError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::Processing("Invalid image dimensions".to_string()));
    }
    if target == 0 {
        return Err(VisionError::Processing("Target dimensions cannot be zero".to_string()));
    }

    let scale = (target as f32 / width as f32).min(target as f32 / height as f32);
    let scaled_w = ((width as f32 * scale).round() as u32).clamp(1, target);
    let scaled_h = ((height as f32 * scale).round() as u32).clamp(1, target);

    let resized = if (scaled_w, scaled_h) == (width, height) {
        image.clone()
    } else {
        image::imageops::resize(image, scaled_w, scaled_h, image::imageops::FilterType::Triangle)
    };

    let pad_x = (target - scaled_w) / 2;
    let pad_y = (target - scaled_h) / 2;

    let mut canvas = RgbImage::from_pixel(target, target, Rgb([PAD_VALUE; 3]));
    image::imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Ok((
        canvas,
        Letterbox {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            src_width: width,
            src_height: height,
        },
    ))
}

/// Convert an RGB image to a normalized `[3, H, W]` float tensor
pub fn rgb_to_chw_tensor(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = (width * height) as usize;
    let mut tensor = vec![0.0f32; plane * 3];

    for (x, y, pixel) in image.enumerate_pixels() {
        let idx = (y * width + x) as usize;
        for c in 0..3 {
            tensor[c * plane + idx] = pixel[c] as f32 / 255.0;
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_square_is_plain_resize() {
        let image = RgbImage::from_pixel(1024, 1024, Rgb([10, 20, 30]));
        let (out, lb) = letterbox(&image, 640).unwrap();
        assert_eq!(out.dimensions(), (640, 640));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 0.0);
        assert!((lb.scale - 0.625).abs() < 1e-6);
    }

    #[test]
    fn test_letterbox_pads_wide_image() {
        let image = RgbImage::from_pixel(640, 320, Rgb([0, 0, 0]));
        let (out, lb) = letterbox(&image, 640).unwrap();
        assert_eq!(lb.pad_y, 160.0);
        assert_eq!(out.get_pixel(0, 0), &Rgb([PAD_VALUE; 3]));
        assert_eq!(out.get_pixel(0, 320), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_letterbox_unmap_roundtrip() {
        let image = RgbImage::new(1024, 1024);
        let (_, lb) = letterbox(&image, 640).unwrap();
        let mapped = lb.unmap([62.5, 125.0, 187.5, 250.0]);
        assert!((mapped[0] - 100.0).abs() < 1e-3);
        assert!((mapped[3] - 400.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_unmap_clamps() {
        let image = RgbImage::new(100, 100);
        let (_, lb) = letterbox(&image, 640).unwrap();
        let mapped = lb.unmap([-50.0, -50.0, 10_000.0, 10_000.0]);
        assert_eq!(mapped, [0.0, 0.0, 100.0, 100.0]);
    }

    #[test]
    fn test_letterbox_rejects_empty() {
        let image = RgbImage::new(0, 0);
        assert!(letterbox(&image, 640).is_err());
    }

    #[test]
    fn test_rgb_to_chw_layout() {
        let mut image = RgbImage::new(2, 1);
        image.put_pixel(0, 0, Rgb([255, 0, 0]));
        image.put_pixel(1, 0, Rgb([0, 255, 51]));
        let tensor = rgb_to_chw_tensor(&image);
        assert_eq!(tensor.len(), 6);
        assert_eq!(tensor[0], 1.0);
        assert_eq!(tensor[1], 0.0);
        assert_eq!(tensor[3], 1.0);
        assert!((tensor[5] - 0.2).abs() < 1e-6);
    }
}
