// src/detection/postprocess.rs
//
// Model-independent YOLO plumbing: letterbox preprocessing, output decoding
// and non-maximum suppression. Kept free of any runtime so it is exercised
// without a model.

use crate::types::BBox;

/// Square model input side.
pub const MODEL_INPUT_SIZE: usize = 640;
/// Anchor count of a 640×640 YOLOv8 head.
pub const YOLO_ANCHORS: usize = 8400;
const PAD_VALUE: u8 = 114;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    pub fn fit(src_w: usize, src_h: usize, target: usize) -> Self {
        let scale = (target as f32 / src_w as f32).min(target as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as usize;
        let scaled_h = (src_h as f32 * scale) as usize;
        Self {
            scale,
            pad_x: (target.saturating_sub(scaled_w)) as f32 / 2.0,
            pad_y: (target.saturating_sub(scaled_h)) as f32 / 2.0,
        }
    }

    /// Model-space corner box back to source pixels.
    pub fn unmap(&self, bbox: BBox) -> BBox {
        [
            (bbox[0] - self.pad_x) / self.scale,
            (bbox[1] - self.pad_y) / self.scale,
            (bbox[2] - self.pad_x) / self.scale,
            (bbox[3] - self.pad_y) / self.scale,
        ]
    }
}

/// Letterboxed, normalized CHW tensor for an RGB frame.
pub fn preprocess(src: &[u8], src_w: usize, src_h: usize, target: usize) -> (Vec<f32>, Letterbox) {
    let lb = Letterbox::fit(src_w, src_h, target);
    let scaled_w = ((src_w as f32 * lb.scale) as usize).clamp(1, target);
    let scaled_h = ((src_h as f32 * lb.scale) as usize).clamp(1, target);
    let resized = resize_bilinear(src, src_w, src_h, scaled_w, scaled_h);

    let mut canvas = vec![PAD_VALUE; target * target * 3];
    let (off_x, off_y) = (lb.pad_x as usize, lb.pad_y as usize);
    for y in 0..scaled_h {
        let dst_row = ((y + off_y) * target + off_x) * 3;
        let src_row = y * scaled_w * 3;
        canvas[dst_row..dst_row + scaled_w * 3]
            .copy_from_slice(&resized[src_row..src_row + scaled_w * 3]);
    }

    let plane = target * target;
    let mut input = vec![0.0f32; 3 * plane];
    for (i, px) in canvas.chunks_exact(3).enumerate() {
        for c in 0..3 {
            input[c * plane + i] = px[c] as f32 / 255.0;
        }
    }
    (input, lb)
}

pub fn resize_bilinear(src: &[u8], src_w: usize, src_h: usize, dst_w: usize, dst_h: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dst_h * dst_w * 3];
    if src_w == 0 || src_h == 0 || src.len() < src_w * src_h * 3 {
        return dst;
    }
    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for dy in 0..dst_h {
        for dx in 0..dst_w {
            let sx = dx as f32 * x_ratio;
            let sy = dy as f32 * y_ratio;
            let sx0 = (sx.floor() as usize).min(src_w - 1);
            let sy0 = (sy.floor() as usize).min(src_h - 1);
            let sx1 = (sx0 + 1).min(src_w - 1);
            let sy1 = (sy0 + 1).min(src_h - 1);
            let fx = sx - sx0 as f32;
            let fy = sy - sy0 as f32;

            for c in 0..3 {
                let p00 = src[(sy0 * src_w + sx0) * 3 + c] as f32;
                let p10 = src[(sy0 * src_w + sx1) * 3 + c] as f32;
                let p01 = src[(sy1 * src_w + sx0) * 3 + c] as f32;
                let p11 = src[(sy1 * src_w + sx1) * 3 + c] as f32;

                let val = p00 * (1.0 - fx) * (1.0 - fy)
                    + p10 * fx * (1.0 - fy)
                    + p01 * (1.0 - fx) * fy
                    + p11 * fx * fy;

                dst[(dy * dst_w + dx) * 3 + c] = val.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    dst
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: BBox,
    pub confidence: f32,
    pub class_id: usize,
}

/// Decode a `[4 + classes, anchors]` YOLO head. The class count follows
/// from the tensor length. Boxes come back in source pixels.
pub fn decode(output: &[f32], anchors: usize, letterbox: &Letterbox, conf_thresh: f32) -> Vec<Candidate> {
    if anchors == 0 || output.len() < anchors * 5 {
        return Vec::new();
    }
    let classes = output.len() / anchors - 4;
    let mut candidates = Vec::new();

    for i in 0..anchors {
        let cx = output[i];
        let cy = output[anchors + i];
        let w = output[anchors * 2 + i];
        let h = output[anchors * 3 + i];

        let mut best = (0usize, 0.0f32);
        for c in 0..classes {
            let conf = output[anchors * (4 + c) + i];
            if conf > best.1 {
                best = (c, conf);
            }
        }
        if best.1 < conf_thresh {
            continue;
        }

        let corners = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];
        candidates.push(Candidate {
            bbox: letterbox.unmap(corners),
            confidence: best.1,
            class_id: best.0,
        });
    }
    candidates
}

/// Class-agnostic greedy NMS, highest confidence first.
pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::new();
    for cand in candidates {
        if keep.iter().all(|k| iou(&k.bbox, &cand.bbox) < iou_threshold) {
            keep.push(cand);
        }
    }
    keep
}

pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_frame() {
        let lb = Letterbox::fit(1280, 720, 640);
        assert!((lb.scale - 0.5).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 140.0);

        let back = lb.unmap([100.0, 240.0, 200.0, 340.0]);
        assert_eq!(back, [200.0, 200.0, 400.0, 400.0]);
    }

    #[test]
    fn test_preprocess_pads_and_normalizes() {
        let src = vec![255u8; 4 * 2 * 3];
        let (input, lb) = preprocess(&src, 4, 2, 8);
        assert_eq!(input.len(), 3 * 64);
        assert_eq!(lb.pad_y, 2.0);
        // top row is padding, centre row is image
        assert!((input[0] - 114.0 / 255.0).abs() < 1e-6);
        assert!((input[3 * 8] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_picks_best_class_above_threshold() {
        // two anchors, three classes
        let anchors = 2;
        let output = vec![
            50.0, 10.0, // cx
            50.0, 10.0, // cy
            20.0, 4.0, // w
            10.0, 4.0, // h
            0.1, 0.05, // class 0
            0.2, 0.1, // class 1
            0.8, 0.2, // class 2
        ];
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let found = decode(&output, anchors, &lb, 0.25);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 2);
        assert_eq!(found[0].bbox, [40.0, 45.0, 60.0, 55.0]);
    }

    #[test]
    fn test_decode_rejects_short_tensor() {
        let lb = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        assert!(decode(&[0.0; 7], 2, &lb, 0.1).is_empty());
    }

    #[test]
    fn test_nms_suppresses_overlaps() {
        let c = |x: f32, conf: f32| Candidate {
            bbox: [x, 0.0, x + 10.0, 10.0],
            confidence: conf,
            class_id: 2,
        };
        let kept = nms(vec![c(0.0, 0.6), c(1.0, 0.9), c(50.0, 0.5)], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].bbox[0], 50.0);
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        assert!((iou(&a, &[5.0, 0.0, 15.0, 10.0]) - 1.0 / 3.0).abs() < 1e-6);
    }
}
