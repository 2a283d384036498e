// src/analysis/lane_monitor.rs
//
// Lane-position heuristic: the ego vehicle sits at the horizontal centre of
// the frame. Find the pair of lane boundaries enclosing it at the bottom of
// the frame and measure the normalized offset inside that pair
// (-1 = on the left boundary, 0 = centred, +1 = on the right boundary).

use crate::config::LaneConfig;
use crate::detection::capability::LaneDetector;
use crate::types::{AlertKind, Frame, Lane, LaneStatus, RawSignal, Severity};
use anyhow::Result;
use tracing::debug;

/// Index of the enclosing lane pair and the normalized offset within it.
pub fn find_vehicle_lane(lanes: &[Lane], frame_width: f32) -> Option<(usize, f32)> {
    if lanes.len() < 2 {
        return None;
    }

    let vehicle_x = frame_width / 2.0;

    // x position of each boundary at the bottom of the frame
    let mut bottoms: Vec<f32> = lanes
        .iter()
        .filter_map(|lane| {
            lane.points
                .iter()
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                .map(|p| p.0)
        })
        .filter(|x| x.is_finite())
        .collect();

    bottoms.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    for (i, pair) in bottoms.windows(2).enumerate() {
        let (left_x, right_x) = (pair[0], pair[1]);
        let lane_width = right_x - left_x;
        if lane_width <= f32::EPSILON {
            continue;
        }
        if left_x <= vehicle_x && vehicle_x <= right_x {
            let offset_from_left = vehicle_x - left_x;
            let normalized = (offset_from_left / lane_width - 0.5) * 2.0;
            return Some((i, normalized));
        }
    }

    None
}

pub struct LaneMonitor {
    detector: Option<Box<dyn LaneDetector + Send>>,
    departure_offset: f32,
}

impl LaneMonitor {
    pub fn new(detector: Option<Box<dyn LaneDetector + Send>>, config: &LaneConfig) -> Self {
        Self {
            detector,
            departure_offset: config.departure_offset,
        }
    }

    /// Monitor with no lane capability: every frame is `within`.
    pub fn disabled(config: &LaneConfig) -> Self {
        Self::new(None, config)
    }

    pub fn assess(&mut self, frame: &Frame) -> Result<LaneStatus> {
        let Some(detector) = self.detector.as_mut() else {
            return Ok(LaneStatus::Within);
        };

        let lanes = detector.detect_lanes(frame)?;
        let status = match find_vehicle_lane(&lanes, frame.width as f32) {
            Some((idx, offset)) if offset.abs() > self.departure_offset => {
                debug!("Lane {}: offset {:+.2} beyond threshold", idx, offset);
                LaneStatus::Departing
            }
            _ => LaneStatus::Within,
        };
        Ok(status)
    }
}

pub fn departure_signal() -> RawSignal {
    RawSignal {
        kind: AlertKind::LaneDeparture,
        description: "Lane departure detected".to_string(),
        severity: Severity::High,
        track_id: None,
        distance_m: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary(x_bottom: f32) -> Lane {
        Lane {
            points: vec![(x_bottom + 40.0, 400.0), (x_bottom, 700.0)],
            confidence: 0.9,
        }
    }

    struct FixedLanes(Vec<Lane>);

    impl LaneDetector for FixedLanes {
        fn detect_lanes(&mut self, _frame: &Frame) -> Result<Vec<Lane>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_centred_vehicle() {
        let lanes = vec![boundary(440.0), boundary(840.0)];
        let (idx, offset) = find_vehicle_lane(&lanes, 1280.0).unwrap();
        assert_eq!(idx, 0);
        assert!(offset.abs() < 1e-6);
    }

    #[test]
    fn test_offset_toward_right_boundary() {
        // centre 640 in [340, 680] → 300/340 of the way across
        let lanes = vec![boundary(680.0), boundary(340.0), boundary(1100.0)];
        let (idx, offset) = find_vehicle_lane(&lanes, 1280.0).unwrap();
        assert_eq!(idx, 0);
        assert!(offset > 0.7);
    }

    #[test]
    fn test_needs_two_boundaries() {
        assert!(find_vehicle_lane(&[boundary(600.0)], 1280.0).is_none());
        assert!(find_vehicle_lane(&[boundary(700.0), boundary(900.0)], 1280.0).is_none());
    }

    #[test]
    fn test_monitor_statuses() {
        let config = LaneConfig::default();
        let frame = Frame::blank(1280, 720, 0, 0.0);

        let mut disabled = LaneMonitor::disabled(&config);
        assert_eq!(disabled.assess(&frame).unwrap(), LaneStatus::Within);

        let mut centred = LaneMonitor::new(
            Some(Box::new(FixedLanes(vec![boundary(440.0), boundary(840.0)]))),
            &config,
        );
        assert_eq!(centred.assess(&frame).unwrap(), LaneStatus::Within);

        let mut drifting = LaneMonitor::new(
            Some(Box::new(FixedLanes(vec![boundary(340.0), boundary(660.0)]))),
            &config,
        );
        assert_eq!(drifting.assess(&frame).unwrap(), LaneStatus::Departing);
    }
}
