// src/detection/mod.rs

pub mod adapter;
pub mod annotate;
pub mod capability;
pub mod hough_lanes;
pub mod iou_tracker;
pub mod postprocess;
pub mod sign_adapter;
#[cfg(feature = "onnx")]
pub mod yolo;

// Re-export public APIs
pub use adapter::{DetectionAdapter, FrameDetections, ObjectReading, WarningTier};
pub use capability::{
    LaneDetector, NoSigns, ObjectDetector, RawDetection, RawSign, SignClassifier,
    TrackingDetector,
};
#[cfg(feature = "opencv")]
pub use hough_lanes::HoughLaneDetector;
pub use iou_tracker::{IouTracker, IouTrackerConfig, Tracked};
pub use sign_adapter::SignAdapter;
#[cfg(feature = "onnx")]
pub use yolo::YoloModel;
