// src/detection/capability.rs
//
// Narrow seams to the model backends. The pipeline only ever sees these
// traits, so tests drive it with scripted fakes.

use super::postprocess::Candidate;
use crate::types::{BBox, Frame, Lane};
use anyhow::Result;

/// Detection as reported by a tracking model, before any validation.
///
/// Fields are kept loose on purpose: class or track values that do not fit
/// the pipeline's id types are how a malformed detection shows up.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: i64,
    pub confidence: f32,
    pub bbox: BBox,
    /// `None` or negative means untracked.
    pub track_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawSign {
    pub class_id: i64,
    pub confidence: f32,
    pub bbox: BBox,
    /// Human-readable label when the classifier knows one.
    pub label: Option<String>,
}

/// Object detection with persistent track identity.
///
/// Implementations keep tracker state between calls; one instance serves
/// one source, fed in frame order.
pub trait TrackingDetector {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<RawDetection>>;
}

/// Per-frame object detection without identity; see `iou_tracker::Tracked`.
pub trait ObjectDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Candidate>>;
}

pub trait SignClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<RawSign>>;
}

/// Lane boundary detection. Optional: without one every frame is `within`.
pub trait LaneDetector {
    fn detect_lanes(&mut self, frame: &Frame) -> Result<Vec<Lane>>;
}

impl<T: TrackingDetector + ?Sized> TrackingDetector for Box<T> {
    fn detect_and_track(&mut self, frame: &Frame) -> Result<Vec<RawDetection>> {
        (**self).detect_and_track(frame)
    }
}

impl<T: SignClassifier + ?Sized> SignClassifier for Box<T> {
    fn classify(&mut self, frame: &Frame) -> Result<Vec<RawSign>> {
        (**self).classify(frame)
    }
}

/// Classifier for runs without a sign model.
pub struct NoSigns;

impl SignClassifier for NoSigns {
    fn classify(&mut self, _frame: &Frame) -> Result<Vec<RawSign>> {
        Ok(Vec::new())
    }
}
