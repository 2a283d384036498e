// src/pipeline/orchestrator.rs
//
// Drives one run:
//   Opening → Running → Finalizing → Done, or Failed from any of them.
//
// An orchestrator owns every stateful component of its run (tracker state,
// cooldown table, lane monitor). It runs exactly once; concurrent runs use
// separate orchestrators.

use super::frame_context::{FrameClock, FrameContext, SampleIdentity};
use super::metrics::PipelineMetrics;
use crate::alerts::AlertArbiter;
use crate::analysis::geometry::focal_pixels;
use crate::analysis::lane_monitor::LaneMonitor;
use crate::config::Config;
use crate::detection::adapter::DetectionAdapter;
use crate::detection::capability::{SignClassifier, TrackingDetector};
use crate::detection::sign_adapter::SignAdapter;
use crate::error::AdasError;
use crate::types::{AlertEvent, Frame, RunResult, SensorSample, TIME_EPSILON_S};
use crate::video::{FrameSink, FrameSource, MediaBackend, VideoFinalizer};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Opening,
    Running,
    Finalizing,
    Done,
    Failed,
}

/// One source file plus the identity stamped on every sample.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub source: PathBuf,
    pub identity: SampleIdentity,
}

/// Open streams of a run. Released exactly once, on every path.
struct OpenStreams {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    raw_path: PathBuf,
    clock: FrameClock,
    focal_px: f64,
}

impl OpenStreams {
    fn release(&mut self, frames_written: u64) -> Result<()> {
        if let Err(e) = self.source.close() {
            warn!("⚠️  Failed to close source: {:#}", e);
        }
        self.sink.finish().map_err(|e| {
            anyhow::Error::from(AdasError::StreamIo {
                frame: frames_written,
                reason: format!("finishing output: {:#}", e),
            })
        })
    }
}

pub struct PipelineOrchestrator<D: TrackingDetector, C: SignClassifier> {
    config: Config,
    detector: Option<D>,
    signs: SignAdapter<C>,
    lanes: LaneMonitor,
    arbiter: AlertArbiter,
    metrics: PipelineMetrics,
    state: RunState,
}

impl<D: TrackingDetector, C: SignClassifier> PipelineOrchestrator<D, C> {
    pub fn new(config: Config, detector: D, classifier: C, lanes: LaneMonitor) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            signs: SignAdapter::new(classifier, &config.signs),
            arbiter: AlertArbiter::new(config.alerts.cooldown_s),
            detector: Some(detector),
            lanes,
            metrics: PipelineMetrics::new(),
            state: RunState::Idle,
            config,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Shared handle to this run's counters.
    pub fn metrics(&self) -> PipelineMetrics {
        self.metrics.clone()
    }

    /// Process `request` to exhaustion. Fatal errors carry an `AdasError`;
    /// partial samples and alerts are discarded on failure.
    pub fn run(
        &mut self,
        request: &RunRequest,
        media: &dyn MediaBackend,
        finalizer: &VideoFinalizer,
    ) -> Result<RunResult> {
        info!("🎬 Processing {}", request.source.display());

        match self.execute(request, media, finalizer) {
            Ok(result) => {
                self.transition(RunState::Done);
                let summary = self.metrics.summary();
                info!(
                    "✓ Run {} done: {} frames, {} samples, {} alerts, {:.1} FPS",
                    request.identity.simulation_id,
                    summary.total_frames,
                    result.sensor_data.len(),
                    result.alerts.len(),
                    summary.fps
                );
                if summary.frame_failures > 0 {
                    warn!("  ⚠️  {} frame(s) recovered from inference errors", summary.frame_failures);
                }
                debug!("  Avg detection time: {}us", summary.avg_detection_us);
                Ok(result)
            }
            Err(e) => {
                error!("Run {} failed in {:?}: {:#}", request.identity.simulation_id, self.state, e);
                self.transition(RunState::Failed);
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state {:?} → {:?}", self.state, next);
        self.state = next;
    }

    fn execute(
        &mut self,
        request: &RunRequest,
        media: &dyn MediaBackend,
        finalizer: &VideoFinalizer,
    ) -> Result<RunResult> {
        self.transition(RunState::Opening);
        let detector = self
            .detector
            .take()
            .context("orchestrator already ran; build a new one per run")?;
        let mut streams = self.open(request, media, finalizer)?;
        let mut detections = DetectionAdapter::new(detector, &self.config, streams.focal_px);

        self.transition(RunState::Running);
        let outcome = self.drive(&mut detections, &mut streams, &request.identity, media);

        self.transition(RunState::Finalizing);
        let written = self
            .metrics
            .total_frames
            .load(std::sync::atomic::Ordering::Relaxed);
        let released = streams.release(written);
        let (samples, alerts) = outcome?;
        released?;

        let video_url =
            finalizer.finalize_or_raw(&request.identity.simulation_id, &streams.raw_path);
        Ok(RunResult::completed(samples, alerts, Some(video_url)))
    }

    fn open(
        &self,
        request: &RunRequest,
        media: &dyn MediaBackend,
        finalizer: &VideoFinalizer,
    ) -> Result<OpenStreams> {
        let path = &request.source;
        let mut source = media.open_source(path).map_err(|e| AdasError::SourceOpen {
            path: path.clone(),
            reason: format!("{:#}", e),
        })?;

        let props = source.properties();
        if props.width == 0 || props.height == 0 {
            if let Err(e) = source.close() {
                warn!("⚠️  Failed to close source: {:#}", e);
            }
            return Err(AdasError::EmptySource(path.clone()).into());
        }

        let fps = props
            .fps
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(self.config.camera.fallback_fps);
        let focal_px = focal_pixels(props.width as f64, self.config.camera.hfov_deg);
        let raw_path = finalizer.raw_path(&request.identity.simulation_id);

        let sink = std::fs::create_dir_all(finalizer.output_dir())
            .with_context(|| format!("Failed to create {}", finalizer.output_dir().display()))
            .and_then(|_| media.open_sink(&raw_path, props.width, props.height, fps));
        let sink = match sink {
            Ok(sink) => sink,
            Err(e) => {
                if let Err(close_err) = source.close() {
                    warn!("⚠️  Failed to close source: {:#}", close_err);
                }
                return Err(AdasError::SinkOpen {
                    path: raw_path,
                    reason: format!("{:#}", e),
                }
                .into());
            }
        };

        info!(
            "✓ Source ready: {}x{} @ {:.1} fps, focal {:.1}px",
            props.width, props.height, fps, focal_px
        );
        if let Some(total) = props.total_frames {
            debug!("  Expecting {} frame(s)", total);
        }

        Ok(OpenStreams {
            source,
            sink,
            raw_path,
            clock: FrameClock::new(self.config.sampling.time_base, fps),
            focal_px,
        })
    }

    fn drive(
        &mut self,
        detections: &mut DetectionAdapter<D>,
        streams: &mut OpenStreams,
        who: &SampleIdentity,
        media: &dyn MediaBackend,
    ) -> Result<(Vec<SensorSample>, Vec<AlertEvent>)> {
        let interval = self.config.sampling.interval_s;
        let started = Instant::now();
        let mut samples = Vec::new();
        let mut alerts = Vec::new();
        let mut last_sample: Option<f64> = None;
        let mut frame_id: u64 = 0;

        loop {
            let next = streams.source.next_frame().map_err(|e| AdasError::StreamIo {
                frame: frame_id,
                reason: format!("reading source: {:#}", e),
            })?;
            let Some(mut frame) = next else {
                break;
            };

            let now = streams.clock.time_of(frame_id);
            let mut ctx = FrameContext::new(frame_id, now, streams.clock.timestamp(now));
            self.analyze(detections, &mut frame, &mut ctx);

            let due = last_sample.map_or(true, |t| now - t >= interval - TIME_EPSILON_S);
            if due && ctx.nearest().is_some() {
                let url = self.snapshot(media, &frame, who, frame_id);
                if let Some(sample) = ctx.sample(who, url) {
                    samples.push(sample);
                    last_sample = Some(now);
                    self.metrics.inc(&self.metrics.samples);
                }
            }

            let events = self.arbiter.arbitrate(&ctx.signals(), now, ctx.timestamp);
            self.metrics.add(&self.metrics.alerts, events.len() as u64);
            alerts.extend(events);

            streams.sink.write(&frame).map_err(|e| AdasError::StreamIo {
                frame: frame_id,
                reason: format!("writing output: {:#}", e),
            })?;

            frame_id += 1;
            self.metrics.inc(&self.metrics.total_frames);
            if frame_id % 100 == 0 {
                info!(
                    "Processed frames: {}, elapsed: {:.1}s",
                    frame_id,
                    started.elapsed().as_secs_f64()
                );
            }
        }

        Ok((samples, alerts))
    }

    /// Detection, signs and lanes for one frame. Adapter failures are
    /// logged and leave the frame with nothing detected.
    fn analyze(
        &mut self,
        detections: &mut DetectionAdapter<D>,
        frame: &mut Frame,
        ctx: &mut FrameContext,
    ) {
        let mut failed = false;

        let t = Instant::now();
        match detections.process(frame, ctx.now) {
            Ok(found) => {
                if !found.objects.is_empty() {
                    self.metrics.inc(&self.metrics.frames_with_objects);
                }
                ctx.detections = found;
            }
            Err(e) => {
                warn!("⚠️  Detection failed on frame {}: {:#}", ctx.frame_id, e);
                failed = true;
            }
        }
        self.metrics
            .add(&self.metrics.detection_time_us, t.elapsed().as_micros() as u64);

        match self.signs.process(frame) {
            Ok(signals) => ctx.sign_signals = signals,
            Err(e) => {
                warn!("⚠️  Sign classification failed on frame {}: {:#}", ctx.frame_id, e);
                failed = true;
            }
        }

        match self.lanes.assess(frame) {
            Ok(status) => ctx.lane_status = status,
            Err(e) => {
                warn!("⚠️  Lane detection failed on frame {}: {:#}", ctx.frame_id, e);
                failed = true;
            }
        }

        if failed {
            self.metrics.inc(&self.metrics.frame_failures);
        }
    }

    fn snapshot(
        &self,
        media: &dyn MediaBackend,
        frame: &Frame,
        who: &SampleIdentity,
        frame_id: u64,
    ) -> Option<String> {
        let snapshots = &self.config.snapshots;
        if !snapshots.enabled {
            return None;
        }

        let name = format!("frame_{}_{}.jpg", who.simulation_id, frame_id);
        let dir = Path::new(&snapshots.dir);
        let saved = std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))
            .and_then(|_| media.save_snapshot(frame, &dir.join(&name)));

        match saved {
            Ok(()) => Some(format!(
                "{}/{}",
                snapshots.public_prefix.trim_end_matches('/'),
                name
            )),
            Err(e) => {
                warn!("⚠️  Snapshot for frame {} not saved: {:#}", frame_id, e);
                None
            }
        }
    }
}
