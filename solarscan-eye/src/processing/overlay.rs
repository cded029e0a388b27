//! Detection overlays drawn on top of the fetched tile

use crate::models::Detection;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const BOX_THICKNESS: u32 = 3;
const TOP_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OTHER_COLOR: Rgb<u8> = Rgb([255, 200, 0]);

/// Copy of `tile` with a hollow box per detection. The first detection is
/// treated as the top one and drawn last so it stays on top.
pub fn render_overlay(tile: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = tile.clone();
    for detection in detections.iter().skip(1) {
        draw_box(&mut canvas, detection, OTHER_COLOR);
    }
    if let Some(top) = detections.first() {
        draw_box(&mut canvas, top, TOP_COLOR);
    }
    canvas
}

fn draw_box(canvas: &mut RgbImage, detection: &Detection, color: Rgb<u8>) {
    let (width, height) = canvas.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let x1 = detection.bbox[0].round().clamp(0.0, (width - 1) as f32) as i32;
    let y1 = detection.bbox[1].round().clamp(0.0, (height - 1) as f32) as i32;
    let x2 = detection.bbox[2].round().clamp(0.0, (width - 1) as f32) as i32;
    let y2 = detection.bbox[3].round().clamp(0.0, (height - 1) as f32) as i32;

    for inset in 0..BOX_THICKNESS as i32 {
        let w = x2 - x1 + 1 - 2 * inset;
        let h = y2 - y1 + 1 - 2 * inset;
        if w < 1 || h < 1 {
            break;
        }
        let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
