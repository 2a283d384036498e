// src/detection/annotate.rs
//
// In-place frame annotation. Box outlines are rasterized straight into the
// RGB buffer; label text travels as an overlay and is rendered by the
// video backend, which owns the font machinery.

use crate::types::{BBox, Frame, Overlay, Rgb};

pub const COLOR_WARN: Rgb = [255, 0, 0];
pub const COLOR_OK: Rgb = [0, 255, 0];
pub const COLOR_SIGN: Rgb = [0, 165, 255];

const BOX_THICKNESS: usize = 2;
const LABEL_OFFSET_Y: i32 = 6;

/// Draw a box outline and attach `label` above its top-left corner.
pub fn annotate_box(frame: &mut Frame, bbox: &BBox, color: Rgb, label: String) {
    draw_box(frame, bbox, color, BOX_THICKNESS);
    frame.overlays.push(Overlay {
        text: label,
        origin: (bbox[0] as i32, (bbox[1] as i32).saturating_sub(LABEL_OFFSET_Y)),
        color,
    });
}

/// Rasterize a rectangle outline, clipped to the frame.
pub fn draw_box(frame: &mut Frame, bbox: &BBox, color: Rgb, thickness: usize) {
    if frame.width == 0 || frame.height == 0 || frame.data.len() < frame.width * frame.height * 3 {
        return;
    }
    if bbox.iter().any(|v| !v.is_finite()) {
        return;
    }

    let max_x = (frame.width - 1) as f32;
    let max_y = (frame.height - 1) as f32;
    let x1 = bbox[0].min(bbox[2]).clamp(0.0, max_x) as usize;
    let x2 = bbox[0].max(bbox[2]).clamp(0.0, max_x) as usize;
    let y1 = bbox[1].min(bbox[3]).clamp(0.0, max_y) as usize;
    let y2 = bbox[1].max(bbox[3]).clamp(0.0, max_y) as usize;

    for t in 0..thickness {
        // top / bottom edges
        for x in x1..=x2 {
            put(frame, x, (y1 + t).min(y2), color);
            put(frame, x, y2.saturating_sub(t).max(y1), color);
        }
        // left / right edges
        for y in y1..=y2 {
            put(frame, (x1 + t).min(x2), y, color);
            put(frame, x2.saturating_sub(t).max(x1), y, color);
        }
    }
}

fn put(frame: &mut Frame, x: usize, y: usize, color: Rgb) {
    let idx = (y * frame.width + x) * 3;
    frame.data[idx..idx + 3].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_drawn_interior_untouched() {
        let mut frame = Frame::blank(20, 20, 0, 0.0);
        draw_box(&mut frame, &[2.0, 2.0, 12.0, 12.0], COLOR_OK, 1);

        assert_eq!(frame.pixel(2, 2), Some(COLOR_OK));
        assert_eq!(frame.pixel(12, 7), Some(COLOR_OK));
        assert_eq!(frame.pixel(7, 12), Some(COLOR_OK));
        assert_eq!(frame.pixel(7, 7), Some([0, 0, 0]));
        assert_eq!(frame.pixel(15, 15), Some([0, 0, 0]));
    }

    #[test]
    fn test_box_clipped_to_frame() {
        let mut frame = Frame::blank(10, 10, 0, 0.0);
        draw_box(&mut frame, &[-5.0, -5.0, 50.0, 50.0], COLOR_WARN, 2);

        assert_eq!(frame.pixel(0, 0), Some(COLOR_WARN));
        assert_eq!(frame.pixel(9, 9), Some(COLOR_WARN));
        assert_eq!(frame.pixel(1, 5), Some(COLOR_WARN));
        assert_eq!(frame.pixel(5, 5), Some([0, 0, 0]));
    }

    #[test]
    fn test_label_overlay_attached() {
        let mut frame = Frame::blank(100, 100, 0, 0.0);
        annotate_box(&mut frame, &[10.0, 30.0, 40.0, 60.0], COLOR_SIGN, "stop 0.91".into());

        assert_eq!(frame.overlays.len(), 1);
        assert_eq!(frame.overlays[0].origin, (10, 24));
        assert_eq!(frame.overlays[0].text, "stop 0.91");
    }

    #[test]
    fn test_non_finite_box_ignored() {
        let mut frame = Frame::blank(10, 10, 0, 0.0);
        draw_box(&mut frame, &[f32::NAN, 0.0, 5.0, 5.0], COLOR_OK, 1);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_label_origin_saturates_far_above_frame() {
        let mut frame = Frame::blank(10, 10, 0, 0.0);
        annotate_box(&mut frame, &[1.0, -1e12, 5.0, 5.0], COLOR_OK, "car".into());
        assert_eq!(frame.overlays[0].origin, (1, i32::MIN));
    }
}
