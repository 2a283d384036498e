// src/pipeline/frame_context.rs
//
// Everything known about one frame after the adapters ran. The sampler and
// the arbiter both read from this, so samples and alerts for a frame agree
// on time and on the nearest object.

use crate::config::TimeBase;
use crate::detection::adapter::{FrameDetections, ObjectReading};
use crate::types::{LaneStatus, RawSignal, SensorSample};
use chrono::{DateTime, Utc};
use std::time::Instant;

/// Maps frame indices to run time in seconds.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    base: TimeBase,
    fps: f64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl FrameClock {
    pub fn new(base: TimeBase, fps: f64) -> Self {
        Self {
            base,
            fps,
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    /// Seconds since the start of the run for frame `index`.
    pub fn time_of(&self, index: u64) -> f64 {
        match self.base {
            TimeBase::Video => index as f64 / self.fps,
            TimeBase::Wall => self.started.elapsed().as_secs_f64(),
        }
    }

    /// Wall-clock timestamp for a run time.
    pub fn timestamp(&self, now: f64) -> DateTime<Utc> {
        self.started_at + chrono::Duration::microseconds((now * 1e6).round() as i64)
    }
}

/// Who the samples belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleIdentity {
    pub vehicle_id: String,
    pub simulation_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub now: f64,
    pub timestamp: DateTime<Utc>,
    pub detections: FrameDetections,
    pub sign_signals: Vec<RawSignal>,
    pub lane_status: LaneStatus,
}

impl FrameContext {
    pub fn new(frame_id: u64, now: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            frame_id,
            now,
            timestamp,
            detections: FrameDetections::default(),
            sign_signals: Vec::new(),
            lane_status: LaneStatus::Within,
        }
    }

    pub fn nearest(&self) -> Option<&ObjectReading> {
        self.detections.nearest()
    }

    /// All raw signals of the frame: objects, signs, then lane.
    pub fn signals(&self) -> Vec<RawSignal> {
        let mut signals = self.detections.signals.clone();
        signals.extend(self.sign_signals.iter().cloned());
        if self.lane_status == LaneStatus::Departing {
            signals.push(crate::analysis::lane_monitor::departure_signal());
        }
        signals
    }

    /// Telemetry for the nearest object, or `None` when nothing was seen.
    pub fn sample(&self, who: &SampleIdentity, frame_url: Option<String>) -> Option<SensorSample> {
        let nearest = self.nearest()?;
        Some(SensorSample {
            vehicle_id: who.vehicle_id.clone(),
            simulation_id: who.simulation_id.clone(),
            user_id: who.user_id.clone(),
            timestamp: self.timestamp,
            speed: nearest.speed_kmh,
            distance_to_object: nearest.distance_m,
            lane_status: self.lane_status,
            obstacle_detected: nearest.tier.is_some(),
            camera_frame_url: frame_url,
            track_id: nearest.track_id,
            frame_index: self.frame_id,
            ttc: nearest.ttc_s,
            warn: nearest.warn(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::adapter::WarningTier;
    use crate::types::AlertKind;

    fn reading(track: u32, distance: Option<f64>, tier: Option<WarningTier>) -> ObjectReading {
        ObjectReading {
            class_id: 2,
            class_name: "car".into(),
            confidence: 0.9,
            bbox: [0.0, 0.0, 10.0, 10.0],
            track_id: Some(track),
            distance_m: distance,
            speed_kmh: distance.map(|_| 7.2),
            relative_mps: distance.map(|_| 2.0),
            ttc_s: distance.map(|d| d / 2.0),
            tier,
        }
    }

    fn who() -> SampleIdentity {
        SampleIdentity {
            vehicle_id: "veh001".into(),
            simulation_id: "sim1".into(),
            user_id: "user001".into(),
        }
    }

    #[test]
    fn test_sample_uses_nearest_object() {
        let mut ctx = FrameContext::new(12, 0.4, Utc::now());
        ctx.detections.objects = vec![
            reading(1, None, None),
            reading(2, Some(12.3), None),
            reading(3, Some(4.0), Some(WarningTier::Collision)),
        ];

        let sample = ctx.sample(&who(), None).unwrap();
        assert_eq!(sample.distance_to_object, Some(4.0));
        assert_eq!(sample.track_id, Some(3));
        assert_eq!(sample.ttc, Some(2.0));
        assert!(sample.warn);
        assert!(sample.obstacle_detected);
        assert_eq!(sample.frame_index, 12);
        assert_eq!(sample.vehicle_id, "veh001");
    }

    #[test]
    fn test_no_objects_no_sample() {
        let ctx = FrameContext::new(0, 0.0, Utc::now());
        assert!(ctx.sample(&who(), None).is_none());
    }

    #[test]
    fn test_lane_departure_joins_signals() {
        let mut ctx = FrameContext::new(0, 0.0, Utc::now());
        ctx.lane_status = LaneStatus::Departing;
        let signals = ctx.signals();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, AlertKind::LaneDeparture);
    }

    #[test]
    fn test_video_clock() {
        let clock = FrameClock::new(TimeBase::Video, 2.0);
        assert_eq!(clock.time_of(0), 0.0);
        assert_eq!(clock.time_of(3), 1.5);
        let t0 = clock.timestamp(0.0);
        let t1 = clock.timestamp(1.5);
        assert_eq!((t1 - t0).num_milliseconds(), 1500);
    }
}
