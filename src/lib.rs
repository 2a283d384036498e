// src/lib.rs
//
// Dashcam hazard assessment.
//
// Frame flow:
//   FrameSource → DetectionAdapter (distance, closing speed, TTC)
//               → SignAdapter → LaneMonitor
//               → AlertArbiter (cooldown) + telemetry sampling
//               → FrameSink → VideoFinalizer → RunResult

pub mod alerts;
pub mod analysis;
pub mod config;
pub mod detection;
pub mod error;
pub mod pipeline;
pub mod service;
pub mod types;
pub mod video;

pub use config::Config;
pub use error::AdasError;
pub use pipeline::{PipelineOrchestrator, RunRequest, RunState};
pub use service::{AdasService, RunFactory, ServiceError};
pub use types::{AlertEvent, ProcessRequest, RunResult, SensorSample};
