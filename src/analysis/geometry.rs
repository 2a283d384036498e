// src/analysis/geometry.rs
//
// Pinhole camera model: an object of known physical width W that spans
// w pixels sits at distance Z = W * f / w, with f the focal length in
// pixels derived from the horizontal field of view.

use crate::types::BBox;

/// Focal length in pixels for an image `image_width_px` wide.
///
/// `hfov_deg` must lie in (0, 180); the result is meaningless outside that
/// range. `Config::validate` rejects such values before a run starts.
pub fn focal_pixels(image_width_px: f64, hfov_deg: f64) -> f64 {
    (image_width_px / 2.0) / (hfov_deg.to_radians() / 2.0).tan()
}

/// Box width in pixels, clamped to at least one pixel.
pub fn box_pixel_width(bbox: &BBox) -> f64 {
    ((bbox[2] - bbox[0]) as f64).max(1.0)
}

/// Distance in meters to an object of physical width `real_width_m`.
///
/// Degenerate (zero or negative width) boxes are clamped to one pixel
/// instead of being rejected.
pub fn estimate_distance(bbox: &BBox, focal_length_px: f64, real_width_m: f64) -> f64 {
    (real_width_m * focal_length_px) / box_pixel_width(bbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focal_length_for_90_degree_fov() {
        // tan(45°) = 1, so f equals half the image width
        let f = focal_pixels(1280.0, 90.0);
        assert!((f - 640.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_pinhole() {
        let f = 640.0;
        let bbox = [100.0, 200.0, 164.0, 260.0]; // 64 px wide
        let d = estimate_distance(&bbox, f, 1.8);
        assert!((d - 18.0).abs() < 1e-9);
    }

    #[test]
    fn test_distance_strictly_decreasing_with_width() {
        let f = focal_pixels(1920.0, 70.0);
        let mut previous = f64::INFINITY;
        for w in 1..400 {
            let bbox = [500.0, 300.0, 500.0 + w as f32, 380.0];
            let d = estimate_distance(&bbox, f, 1.8);
            assert!(d < previous, "width {} gave {} >= {}", w, d, previous);
            previous = d;
        }
    }

    #[test]
    fn test_zero_width_box_is_clamped() {
        let f = 700.0;
        let zero = [10.0, 10.0, 10.0, 50.0];
        let inverted = [20.0, 10.0, 10.0, 50.0];
        assert_eq!(estimate_distance(&zero, f, 1.8), 1.8 * 700.0);
        assert_eq!(estimate_distance(&inverted, f, 1.8), 1.8 * 700.0);
    }
}
