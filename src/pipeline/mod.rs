// src/pipeline/mod.rs

pub mod frame_context;
pub mod metrics;
pub mod orchestrator;

pub use frame_context::{FrameClock, FrameContext, SampleIdentity};
pub use metrics::{MetricsSummary, PipelineMetrics};
pub use orchestrator::{PipelineOrchestrator, RunRequest, RunState};
