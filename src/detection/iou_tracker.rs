// src/detection/iou_tracker.rs
//
// Greedy IoU tracker giving per-frame detections a persistent identity.
//
//   - Pairs above `min_iou` are matched best-first, same class only
//   - Unmatched detections open new tracks
//   - Tracks coast through short gaps and are dropped after `max_coast_frames`

use super::capability::{ObjectDetector, RawDetection, TrackingDetector};
use super::postprocess::{iou, Candidate};
use crate::config::TrackingConfig;
use crate::types::{BBox, Frame, TrackId};
use anyhow::Result;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct IouTrackerConfig {
    pub min_iou: f32,
    pub max_coast_frames: u32,
}

impl Default for IouTrackerConfig {
    fn default() -> Self {
        Self::from(&TrackingConfig::default())
    }
}

impl From<&TrackingConfig> for IouTrackerConfig {
    fn from(config: &TrackingConfig) -> Self {
        Self {
            min_iou: config.min_iou,
            max_coast_frames: config.max_coast_frames,
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    id: TrackId,
    bbox: BBox,
    class_id: usize,
    frames_since_hit: u32,
}

pub struct IouTracker {
    config: IouTrackerConfig,
    tracks: Vec<Track>,
    next_id: TrackId,
}

impl IouTracker {
    pub fn new(config: IouTrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::with_capacity(32),
            next_id: 1,
        }
    }

    /// Assign a track id to every candidate, in input order.
    pub fn update(&mut self, candidates: &[Candidate]) -> Vec<TrackId> {
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (ci, cand) in candidates.iter().enumerate() {
                if cand.class_id != track.class_id {
                    continue;
                }
                let score = iou(&track.bbox, &cand.bbox);
                if score >= self.config.min_iou {
                    pairs.push((ti, ci, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut track_matched = vec![false; self.tracks.len()];
        let mut assigned: Vec<Option<TrackId>> = vec![None; candidates.len()];
        for (ti, ci, _) in pairs {
            if track_matched[ti] || assigned[ci].is_some() {
                continue;
            }
            track_matched[ti] = true;
            let track = &mut self.tracks[ti];
            track.bbox = candidates[ci].bbox;
            track.frames_since_hit = 0;
            assigned[ci] = Some(track.id);
        }

        for (ti, matched) in track_matched.iter().enumerate() {
            if !matched {
                self.tracks[ti].frames_since_hit += 1;
            }
        }
        let max_coast = self.config.max_coast_frames;
        let before = self.tracks.len();
        self.tracks.retain(|t| t.frames_since_hit <= max_coast);
        if self.tracks.len() < before {
            debug!("Dropped {} coasting track(s)", before - self.tracks.len());
        }

        assigned
            .into_iter()
            .zip(candidates)
            .map(|(slot, cand)| match slot {
                Some(id) => id,
                None => self.open_track(cand),
            })
            .collect()
    }

    fn open_track(&mut self, cand: &Candidate) -> TrackId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        self.tracks.push(Track {
            id,
            bbox: cand.bbox,
            class_id: cand.class_id,
            frames_since_hit: 0,
        });
        id
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }
}

/// An `ObjectDetector` with an `IouTracker` behind it.
pub struct Tracked<D: ObjectDetector> {
    detector: D,
    tracker: IouTracker,
}

impl<D: ObjectDetector> Tracked<D> {
    pub fn new(detector: D, config: IouTrackerConfig) -> Self {
        Self {
            detector,
            tracker: IouTracker::new(config),
        }
    }
}

impl<D: ObjectDetector> TrackingDetector for Tracked<D> {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        let candidates = self.detector.detect(frame)?;
        let ids = self.tracker.update(&candidates);
        Ok(candidates
            .into_iter()
            .zip(ids)
            .map(|(c, id)| RawDetection {
                class_id: c.class_id as i64,
                confidence: c.confidence,
                bbox: c.bbox,
                track_id: Some(i64::from(id)),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(x: f32, class_id: usize) -> Candidate {
        Candidate {
            bbox: [x, 100.0, x + 50.0, 150.0],
            confidence: 0.8,
            class_id,
        }
    }

    #[test]
    fn test_identity_persists_across_frames() {
        let mut tracker = IouTracker::new(IouTrackerConfig::default());
        let first = tracker.update(&[cand(0.0, 2), cand(300.0, 2)]);
        assert_eq!(first, vec![1, 2]);

        // both moved a little, order swapped
        let second = tracker.update(&[cand(305.0, 2), cand(5.0, 2)]);
        assert_eq!(second, vec![2, 1]);
    }

    #[test]
    fn test_class_change_opens_new_track() {
        let mut tracker = IouTracker::new(IouTrackerConfig::default());
        tracker.update(&[cand(0.0, 2)]);
        let ids = tracker.update(&[cand(0.0, 7)]);
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_tracks_coast_then_expire() {
        let mut tracker = IouTracker::new(IouTrackerConfig {
            min_iou: 0.3,
            max_coast_frames: 2,
        });
        tracker.update(&[cand(0.0, 2)]);
        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.update(&[cand(0.0, 2)]), vec![1]);

        tracker.update(&[]);
        tracker.update(&[]);
        tracker.update(&[]);
        assert_eq!(tracker.active_tracks(), 0);
        assert_eq!(tracker.update(&[cand(0.0, 2)]), vec![2]);
    }

    struct Fixed(Vec<Candidate>);

    impl ObjectDetector for Fixed {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Candidate>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_tracked_detector_reports_ids() {
        let mut det = Tracked::new(Fixed(vec![cand(10.0, 2)]), IouTrackerConfig::default());
        let frame = Frame::blank(4, 4, 0, 0.0);

        let a = det.detect_and_track(&frame).unwrap();
        let b = det.detect_and_track(&frame).unwrap();
        assert_eq!(a[0].track_id, Some(1));
        assert_eq!(b[0].track_id, Some(1));
        assert_eq!(b[0].class_id, 2);
    }
}
