// src/analysis/mod.rs
//
// Numeric estimation over detections:
//   bbox width → geometry (distance) → speed_tracker (closing speed)
//   lane boundaries → lane_monitor (lane status)

pub mod geometry;
pub mod lane_monitor;
pub mod speed_tracker;

pub use geometry::{estimate_distance, focal_pixels};
pub use lane_monitor::LaneMonitor;
pub use speed_tracker::{ClosingSpeed, TrackSpeedEstimator};
