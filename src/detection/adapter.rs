// src/detection/adapter.rs
//
// Turns raw tracker output into per-object readings:
//   whitelist filter → distance (vehicles with a track id) → closing speed
//   → time-to-collision → warning tier → frame annotation.

use super::annotate::{annotate_box, COLOR_OK, COLOR_WARN};
use super::capability::{RawDetection, TrackingDetector};
use crate::analysis::geometry::estimate_distance;
use crate::analysis::speed_tracker::TrackSpeedEstimator;
use crate::config::{ClassConfig, Config, ThresholdConfig};
use crate::types::{AlertKind, BBox, Frame, RawSignal, Severity, TrackId};
use anyhow::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningTier {
    /// Closer than the collision distance.
    Collision,
    /// Closer than obstacle_factor × collision distance.
    Obstacle,
}

pub fn classify_tier(distance_m: f64, thresholds: &ThresholdConfig) -> Option<WarningTier> {
    if distance_m < thresholds.collision_distance_m {
        Some(WarningTier::Collision)
    } else if distance_m < thresholds.obstacle_distance_m() {
        Some(WarningTier::Obstacle)
    } else {
        None
    }
}

/// One whitelisted object in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectReading {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub track_id: Option<TrackId>,
    pub distance_m: Option<f64>,
    pub speed_kmh: Option<f64>,
    pub relative_mps: Option<f64>,
    pub ttc_s: Option<f64>,
    pub tier: Option<WarningTier>,
}

impl ObjectReading {
    pub fn warn(&self) -> bool {
        self.tier == Some(WarningTier::Collision)
    }

    fn label(&self) -> String {
        let mut label = self.class_name.clone();
        if let Some(d) = self.distance_m {
            label.push_str(&format!(" {:.2}m", d));
        }
        if let Some(s) = self.speed_kmh {
            label.push_str(&format!(" {:+.1}km/h", s));
        }
        if let Some(t) = self.ttc_s {
            label.push_str(&format!(" TTC:{:.1}s", t));
        }
        if self.warn() {
            label.push_str(" WARN");
        }
        label
    }
}

#[derive(Debug, Clone, Default)]
pub struct FrameDetections {
    pub objects: Vec<ObjectReading>,
    pub signals: Vec<RawSignal>,
}

impl FrameDetections {
    /// Object with the smallest distance; distance-less objects rank last.
    pub fn nearest(&self) -> Option<&ObjectReading> {
        self.objects.iter().min_by(|a, b| {
            let da = a.distance_m.unwrap_or(f64::INFINITY);
            let db = b.distance_m.unwrap_or(f64::INFINITY);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
    }
}

pub struct DetectionAdapter<D: TrackingDetector> {
    detector: D,
    classes: ClassConfig,
    thresholds: ThresholdConfig,
    focal_px: f64,
    speeds: TrackSpeedEstimator,
}

impl<D: TrackingDetector> DetectionAdapter<D> {
    pub fn new(detector: D, config: &Config, focal_px: f64) -> Self {
        Self {
            detector,
            classes: config.classes.clone(),
            thresholds: config.thresholds.clone(),
            focal_px,
            speeds: TrackSpeedEstimator::new(&config.tracking),
        }
    }

    /// Run detection on `frame`, annotate it, and return readings plus raw
    /// collision/obstacle signals. `now` is the frame time in seconds.
    pub fn process(&mut self, frame: &mut Frame, now: f64) -> Result<FrameDetections> {
        let raw = self.detector.detect_and_track(frame)?;
        let mut out = FrameDetections::default();

        for det in raw {
            let Some(reading) = self.read(&det, now) else {
                continue;
            };

            if let (Some(tier), Some(distance)) = (reading.tier, reading.distance_m) {
                out.signals.push(tier_signal(&reading, tier, distance));
            }

            let color = if reading.warn() { COLOR_WARN } else { COLOR_OK };
            annotate_box(frame, &reading.bbox, color, reading.label());
            out.objects.push(reading);
        }

        debug!(
            "Frame {}: {} object(s), {} signal(s)",
            frame.index,
            out.objects.len(),
            out.signals.len()
        );
        Ok(out)
    }

    fn read(&mut self, det: &RawDetection, now: f64) -> Option<ObjectReading> {
        let class_id = match u32::try_from(det.class_id) {
            Ok(id) => id,
            Err(_) => {
                debug!("Skipping detection with malformed class {}", det.class_id);
                return None;
            }
        };
        let spec = self.classes.get(class_id)?;

        if det.bbox.iter().any(|v| !v.is_finite()) {
            debug!("Skipping {} with non-finite box", spec.name);
            return None;
        }

        let track_id = match det.track_id {
            None => None,
            Some(t) if t < 0 => None,
            Some(t) => match TrackId::try_from(t) {
                Ok(id) => Some(id),
                Err(_) => {
                    debug!("Skipping {} with malformed track id {}", spec.name, t);
                    return None;
                }
            },
        };

        let mut reading = ObjectReading {
            class_id,
            class_name: spec.name.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
            track_id,
            distance_m: None,
            speed_kmh: None,
            relative_mps: None,
            ttc_s: None,
            tier: None,
        };

        if let (true, Some(id)) = (spec.vehicle, track_id) {
            let width_m = self.classes.width_m(Some(class_id));
            let distance = estimate_distance(&det.bbox, self.focal_px, width_m);
            let speed = self.speeds.estimate_speed(id, distance, now);

            reading.distance_m = Some(distance);
            reading.speed_kmh = speed.map(|s| s.speed_kmh);
            reading.relative_mps = speed.map(|s| s.relative_mps);
            reading.ttc_s = speed
                .filter(|s| s.relative_mps > self.thresholds.approach_speed_mps)
                .map(|s| distance / s.relative_mps);
            reading.tier = classify_tier(distance, &self.thresholds);
        }

        Some(reading)
    }

    pub fn tracked_count(&self) -> usize {
        self.speeds.len()
    }
}

fn tier_signal(reading: &ObjectReading, tier: WarningTier, distance: f64) -> RawSignal {
    let (kind, description, severity) = match tier {
        WarningTier::Collision => (
            AlertKind::Collision,
            format!("{} too close ({:.1}m)", reading.class_name, distance),
            Severity::High,
        ),
        WarningTier::Obstacle => (
            AlertKind::Obstacle,
            format!("{} detected at {:.1}m", reading.class_name, distance),
            Severity::Low,
        ),
    };
    RawSignal {
        kind,
        description,
        severity,
        track_id: reading.track_id,
        distance_m: Some(distance),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::collections::VecDeque;

    /// Replays one scripted detection list per call.
    struct Scripted(VecDeque<Result<Vec<RawDetection>>>);

    impl TrackingDetector for Scripted {
        fn detect_and_track(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>> {
            self.0.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn car(track: i64, x1: f32, width: f32) -> RawDetection {
        RawDetection {
            class_id: 2,
            confidence: 0.9,
            bbox: [x1, 300.0, x1 + width, 380.0],
            track_id: Some(track),
        }
    }

    // f = 640 px with a 90° FOV on a 1280 px frame; car width 1.8 m.
    // distance = 1152 / width_px
    fn adapter(frames: Vec<Result<Vec<RawDetection>>>) -> DetectionAdapter<Scripted> {
        let mut config = Config::default();
        config.camera.hfov_deg = 90.0;
        DetectionAdapter::new(Scripted(frames.into()), &config, 640.0)
    }

    #[test]
    fn test_whitelist_filters_classes() {
        let dog = RawDetection {
            class_id: 16,
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
            track_id: Some(1),
        };
        let mut a = adapter(vec![Ok(vec![dog, car(2, 100.0, 64.0)])]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        let out = a.process(&mut frame, 0.0).unwrap();

        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].class_name, "car");
    }

    #[test]
    fn test_tiers_and_signals() {
        // 1152/192 = 6 m (collision), 1152/96 = 12 m (none, not < 12), 1152/100 = 11.52 m (obstacle)
        let mut a = adapter(vec![Ok(vec![
            car(1, 0.0, 192.0),
            car(2, 300.0, 96.0),
            car(3, 600.0, 100.0),
        ])]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        let out = a.process(&mut frame, 0.0).unwrap();

        assert_eq!(out.objects[0].tier, Some(WarningTier::Collision));
        assert!(out.objects[0].warn());
        assert_eq!(out.objects[1].tier, None);
        assert_eq!(out.objects[2].tier, Some(WarningTier::Obstacle));

        assert_eq!(out.signals.len(), 2);
        assert_eq!(out.signals[0].kind, AlertKind::Collision);
        assert_eq!(out.signals[0].severity, Severity::High);
        assert_eq!(out.signals[0].description, "car too close (6.0m)");
        assert_eq!(out.signals[1].kind, AlertKind::Obstacle);
        assert_eq!(out.signals[1].severity, Severity::Low);
        assert_eq!(out.signals[1].track_id, Some(3));
    }

    #[test]
    fn test_speed_and_ttc_for_approaching_track() {
        // 20 m then 10 m one second later
        let mut a = adapter(vec![
            Ok(vec![car(5, 100.0, 57.6)]),
            Ok(vec![car(5, 100.0, 115.2)]),
        ]);
        let mut f0 = Frame::blank(1280, 720, 0, 0.0);
        let first = a.process(&mut f0, 0.0).unwrap();
        assert_eq!(first.objects[0].speed_kmh, None);
        assert_eq!(first.objects[0].ttc_s, None);

        let mut f1 = Frame::blank(1280, 720, 1, 1000.0);
        let second = a.process(&mut f1, 1.0).unwrap();
        let obj = &second.objects[0];
        assert!((obj.distance_m.unwrap() - 10.0).abs() < 1e-3);
        assert!((obj.relative_mps.unwrap() - 10.0).abs() < 1e-2);
        assert!((obj.speed_kmh.unwrap() - 36.0).abs() < 1e-1);
        assert!((obj.ttc_s.unwrap() - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_receding_track_has_no_ttc() {
        let mut a = adapter(vec![
            Ok(vec![car(5, 100.0, 115.2)]),
            Ok(vec![car(5, 100.0, 57.6)]),
        ]);
        let mut f0 = Frame::blank(1280, 720, 0, 0.0);
        a.process(&mut f0, 0.0).unwrap();
        let mut f1 = Frame::blank(1280, 720, 1, 500.0);
        let out = a.process(&mut f1, 0.5).unwrap();

        assert!(out.objects[0].speed_kmh.unwrap() < 0.0);
        assert_eq!(out.objects[0].ttc_s, None);
    }

    #[test]
    fn test_untracked_and_non_vehicle_have_no_distance() {
        let person = RawDetection {
            class_id: 0,
            confidence: 0.8,
            bbox: [0.0, 0.0, 40.0, 120.0],
            track_id: Some(9),
        };
        let mut untracked = car(-1, 100.0, 300.0);
        untracked.track_id = Some(-1);
        let mut a = adapter(vec![Ok(vec![person, untracked])]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        let out = a.process(&mut frame, 0.0).unwrap();

        assert_eq!(out.objects.len(), 2);
        assert!(out.objects.iter().all(|o| o.distance_m.is_none()));
        assert_eq!(out.objects[1].track_id, None);
        assert!(out.signals.is_empty());
        assert_eq!(a.tracked_count(), 0);
    }

    #[test]
    fn test_malformed_detections_skipped() {
        let bad_class = RawDetection {
            class_id: -3,
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
            track_id: Some(1),
        };
        let mut bad_track = car(1, 0.0, 50.0);
        bad_track.track_id = Some(i64::MAX);
        let mut bad_box = car(2, 0.0, 50.0);
        bad_box.bbox[2] = f32::NAN;

        let mut a = adapter(vec![Ok(vec![bad_class, bad_track, bad_box, car(3, 0.0, 50.0)])]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        let out = a.process(&mut frame, 0.0).unwrap();

        assert_eq!(out.objects.len(), 1);
        assert_eq!(out.objects[0].track_id, Some(3));
    }

    #[test]
    fn test_detector_error_propagates() {
        let mut a = adapter(vec![Err(anyhow!("model crashed"))]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        assert!(a.process(&mut frame, 0.0).is_err());
    }

    #[test]
    fn test_frame_annotated() {
        let mut a = adapter(vec![Ok(vec![car(1, 100.0, 192.0)])]);
        let mut frame = Frame::blank(1280, 720, 0, 0.0);
        a.process(&mut frame, 0.0).unwrap();

        assert_eq!(frame.pixel(100, 300), Some(COLOR_WARN));
        assert_eq!(frame.overlays.len(), 1);
        assert_eq!(frame.overlays[0].text, "car 6.00m WARN");
    }

    #[test]
    fn test_nearest_ignores_missing_distance() {
        let make = |d: Option<f64>| ObjectReading {
            class_id: 2,
            class_name: "car".into(),
            confidence: 0.9,
            bbox: [0.0; 4],
            track_id: Some(1),
            distance_m: d,
            speed_kmh: None,
            relative_mps: None,
            ttc_s: None,
            tier: None,
        };
        let frame = FrameDetections {
            objects: vec![make(None), make(Some(12.3)), make(Some(4.0))],
            signals: Vec::new(),
        };
        assert_eq!(frame.nearest().unwrap().distance_m, Some(4.0));

        let only_missing = FrameDetections {
            objects: vec![make(None)],
            signals: Vec::new(),
        };
        assert_eq!(only_missing.nearest().unwrap().distance_m, None);
        assert!(FrameDetections::default().nearest().is_none());
    }
}
