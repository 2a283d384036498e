// src/detection/hough_lanes.rs
//
// Classic lane finding: Canny edges, probabilistic Hough segments, then one
// fitted boundary per side of the road. Only the edge and segment stage
// needs OpenCV; fitting works on plain segments.

use crate::config::LaneConfig;
use crate::types::Lane;

/// Line segment [x1, y1, x2, y2] in pixels.
pub type Segment = [f32; 4];

#[derive(Debug, Default, Clone, Copy)]
struct SideFit {
    /// Σ w·(dx/dy)
    slope: f32,
    /// Σ w·x where the segment's line crosses y = 0
    intercept: f32,
    weight: f32,
}

impl SideFit {
    fn add(&mut self, dx_dy: f32, x_at_zero: f32, w: f32) {
        self.slope += w * dx_dy;
        self.intercept += w * x_at_zero;
        self.weight += w;
    }

    fn lane(&self, y_top: f32, y_bottom: f32, height: f32) -> Option<Lane> {
        if self.weight <= 0.0 {
            return None;
        }
        let k = self.slope / self.weight;
        let b = self.intercept / self.weight;
        Some(Lane {
            points: vec![(k * y_top + b, y_top), (k * y_bottom + b, y_bottom)],
            confidence: (self.weight / height).min(1.0),
        })
    }
}

/// Fit at most one left and one right boundary from Hough segments.
///
/// Left boundaries lean right going up the image (x falls as y grows) and
/// sit in the left half at their midpoint; right boundaries mirror that.
/// Flat segments and segments above the road region are ignored. Each
/// segment votes with its length.
pub fn fit_lanes(segments: &[Segment], width: usize, height: usize, config: &LaneConfig) -> Vec<Lane> {
    let (w, h) = (width as f32, height as f32);
    let y_top = h * config.roi_top;
    let mut left = SideFit::default();
    let mut right = SideFit::default();

    for &[x1, y1, x2, y2] in segments {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            continue;
        }
        let (dx, dy) = (x2 - x1, y2 - y1);
        if dy.abs() < f32::EPSILON || dy.abs() < config.min_slope * dx.abs() {
            continue;
        }
        if y1.max(y2) < y_top {
            continue;
        }

        let dx_dy = dx / dy;
        let x_at_zero = x1 - dx_dy * y1;
        let length = (dx * dx + dy * dy).sqrt();
        let mid_x = (x1 + x2) / 2.0;

        if dx_dy < 0.0 && mid_x < w / 2.0 {
            left.add(dx_dy, x_at_zero, length);
        } else if dx_dy > 0.0 && mid_x >= w / 2.0 {
            right.add(dx_dy, x_at_zero, length);
        }
    }

    [left, right]
        .iter()
        .filter_map(|side| side.lane(y_top, h, h))
        .collect()
}

#[cfg(feature = "opencv")]
pub use self::cv::HoughLaneDetector;

#[cfg(feature = "opencv")]
mod cv {
    use super::{fit_lanes, Segment};
    use crate::config::LaneConfig;
    use crate::detection::capability::LaneDetector;
    use crate::types::{Frame, Lane};
    use anyhow::{ensure, Result};
    use opencv::{
        core::{self, Mat, Vec4i},
        imgproc,
        prelude::*,
    };
    use tracing::debug;

    pub struct HoughLaneDetector {
        config: LaneConfig,
    }

    impl HoughLaneDetector {
        pub fn new(config: &LaneConfig) -> Self {
            Self {
                config: config.clone(),
            }
        }

        fn segments(&self, frame: &Frame) -> Result<Vec<Segment>> {
            ensure!(
                frame.data.len() == frame.width * frame.height * 3,
                "frame buffer does not match {}x{}",
                frame.width,
                frame.height
            );
            let rgb = Mat::from_slice(&frame.data)?;
            let rgb = rgb.reshape(3, frame.height as i32)?;

            let mut gray = Mat::default();
            imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;
            let mut edges = Mat::default();
            imgproc::canny(
                &gray,
                &mut edges,
                self.config.canny_low,
                self.config.canny_high,
                3,
                false,
            )?;

            let mut lines = core::Vector::<Vec4i>::new();
            imgproc::hough_lines_p(
                &edges,
                &mut lines,
                1.0,
                std::f64::consts::PI / 180.0,
                self.config.hough_threshold,
                self.config.min_line_length,
                self.config.max_line_gap,
            )?;

            Ok(lines
                .iter()
                .map(|l| {
                    let [x1, y1, x2, y2] = l.0;
                    [x1 as f32, y1 as f32, x2 as f32, y2 as f32]
                })
                .collect())
        }
    }

    impl LaneDetector for HoughLaneDetector {
        fn detect_lanes(&mut self, frame: &Frame) -> Result<Vec<Lane>> {
            let segments = self.segments(frame)?;
            let lanes = fit_lanes(&segments, frame.width, frame.height, &self.config);
            debug!(
                "Frame {}: {} Hough segment(s), {} lane boundary(ies)",
                frame.index,
                segments.len(),
                lanes.len()
            );
            Ok(lanes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::lane_monitor::find_vehicle_lane;

    fn bottom_x(lane: &Lane) -> f32 {
        lane.points.last().unwrap().0
    }

    #[test]
    fn test_fits_one_boundary_per_side() {
        let config = LaneConfig::default();
        // road converging towards (640, 400) on a 1280x720 frame
        let segments = vec![
            [340.0, 700.0, 540.0, 500.0],
            [320.0, 720.0, 420.0, 620.0],
            [940.0, 700.0, 740.0, 500.0],
        ];
        let lanes = fit_lanes(&segments, 1280, 720, &config);

        assert_eq!(lanes.len(), 2);
        assert!((bottom_x(&lanes[0]) - 320.0).abs() < 1.0);
        assert!((bottom_x(&lanes[1]) - 960.0).abs() < 1.0);
        assert_eq!(lanes[0].points[0].1, 720.0 * config.roi_top);

        let (_, offset) = find_vehicle_lane(&lanes, 1280.0).unwrap();
        assert!(offset.abs() < 0.01);
    }

    #[test]
    fn test_ignores_flat_and_sky_segments() {
        let config = LaneConfig::default();
        let segments = vec![
            // horizon line
            [0.0, 500.0, 1280.0, 520.0],
            // above the road region
            [500.0, 200.0, 400.0, 300.0],
            // not finite
            [f32::NAN, 700.0, 540.0, 500.0],
        ];
        assert!(fit_lanes(&segments, 1280, 720, &config).is_empty());
    }

    #[test]
    fn test_side_must_match_lean() {
        let config = LaneConfig::default();
        // leans like a left boundary but sits in the right half
        let segments = vec![[1000.0, 700.0, 1200.0, 500.0]];
        assert!(fit_lanes(&segments, 1280, 720, &config).is_empty());
    }

    #[test]
    fn test_drift_shows_up_as_offset() {
        let config = LaneConfig::default();
        // boundaries at 600 and 1100 at the bottom; centre 640 hugs the left one
        let segments = vec![[600.0, 720.0, 630.0, 520.0], [1100.0, 720.0, 950.0, 520.0]];
        let lanes = fit_lanes(&segments, 1280, 720, &config);

        let (_, offset) = find_vehicle_lane(&lanes, 1280.0).unwrap();
        assert!(offset < -config.departure_offset);
    }

    #[cfg(feature = "opencv")]
    #[test]
    fn test_hough_detector_finds_painted_lanes() {
        use crate::detection::capability::LaneDetector;
        use crate::types::Frame;

        let (w, h) = (1280usize, 720usize);
        let mut frame = Frame::blank(w, h, 0, 0.0);
        let mut paint = |x: f32, y: usize| {
            for dx in 0..6 {
                let px = x as usize + dx;
                if px < w {
                    let idx = (y * w + px) * 3;
                    frame.data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        };
        for y in 400..h {
            let t = (y - 400) as f32 / (h - 400) as f32;
            paint(600.0 - 300.0 * t, y);
            paint(680.0 + 300.0 * t, y);
        }

        let mut detector = HoughLaneDetector::new(&LaneConfig::default());
        let lanes = detector.detect_lanes(&frame).unwrap();

        assert_eq!(lanes.len(), 2);
        assert!(bottom_x(&lanes[0]) < 640.0);
        assert!(bottom_x(&lanes[1]) > 640.0);
    }
}
