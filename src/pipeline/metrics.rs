// src/pipeline/metrics.rs
//
// Run counters. Cloning shares the counters, so a caller can keep a handle
// and watch a run that executes on another thread.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_objects: Arc<AtomicU64>,
    pub frame_failures: Arc<AtomicU64>,
    pub samples: Arc<AtomicU64>,
    pub alerts: Arc<AtomicU64>,
    pub detection_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_objects: Arc::new(AtomicU64::new(0)),
            frame_failures: Arc::new(AtomicU64::new(0)),
            samples: Arc::new(AtomicU64::new(0)),
            alerts: Arc::new(AtomicU64::new(0)),
            detection_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let detect_us = self.detection_time_us.load(Ordering::Relaxed);
        MetricsSummary {
            total_frames: frames,
            fps: self.fps(),
            frames_with_objects: self.frames_with_objects.load(Ordering::Relaxed),
            frame_failures: self.frame_failures.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
            avg_detection_us: if frames > 0 { detect_us / frames } else { 0 },
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_objects: u64,
    pub frame_failures: u64,
    pub samples: u64,
    pub alerts: u64,
    pub avg_detection_us: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_counters() {
        let metrics = PipelineMetrics::new();
        let handle = metrics.clone();

        metrics.inc(&metrics.total_frames);
        metrics.inc(&metrics.total_frames);
        metrics.add(&metrics.detection_time_us, 300);

        let summary = handle.summary();
        assert_eq!(summary.total_frames, 2);
        assert_eq!(summary.avg_detection_us, 150);
    }

    #[test]
    fn test_empty_summary() {
        let summary = PipelineMetrics::new().summary();
        assert_eq!(summary.total_frames, 0);
        assert_eq!(summary.avg_detection_us, 0);
    }
}
