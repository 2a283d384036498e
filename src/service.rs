// src/service.rs
//
// Request layer: resolves the caller's path, builds fresh per-run
// components and maps outcomes onto 404/500-style errors. No transport;
// a server or the batch binary sits on top.

use crate::analysis::lane_monitor::LaneMonitor;
use crate::config::Config;
use crate::detection::capability::{SignClassifier, TrackingDetector};
use crate::pipeline::{PipelineOrchestrator, RunRequest, SampleIdentity};
use crate::types::{ProcessRequest, RunResult};
use crate::video::{FfmpegTranscoder, MediaBackend, Transcoder, VideoFinalizer};
use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::NotFound(_) => 404,
            ServiceError::ProcessingFailed(_) => 500,
        }
    }
}

/// Simulation ids for a batch of inputs: the file stem, suffixed `_2`,
/// `_3`, ... when taken, so concurrent runs never share output files.
pub fn unique_simulation_ids(paths: &[PathBuf]) -> Vec<String> {
    let mut taken = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "unnamed".to_string());
            let mut id = stem.clone();
            let mut n = 2;
            while !taken.insert(id.clone()) {
                id = format!("{}_{}", stem, n);
                n += 1;
            }
            id
        })
        .collect()
}

/// Builds the components of one run. Called once per request so runs never
/// share tracker or cooldown state.
pub trait RunFactory: Send + Sync {
    type Detector: TrackingDetector;
    type Classifier: SignClassifier;

    fn detector(&self, config: &Config) -> Result<Self::Detector>;
    fn classifier(&self, config: &Config) -> Result<Self::Classifier>;
    fn media(&self) -> &dyn MediaBackend;

    fn lanes(&self, config: &Config) -> Result<LaneMonitor> {
        Ok(LaneMonitor::disabled(&config.lanes))
    }

    fn transcoder(&self, config: &Config) -> Option<Box<dyn Transcoder>> {
        config
            .transcoder
            .enabled
            .then(|| Box::new(FfmpegTranscoder::new(&config.transcoder)) as Box<dyn Transcoder>)
    }
}

pub struct AdasService<F: RunFactory> {
    config: Config,
    factory: F,
}

impl<F: RunFactory> AdasService<F> {
    pub fn new(config: Config, factory: F) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, factory })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Upload-relative paths (`/Uploads/videos/...` or any relative path)
    /// map to the file name inside the uploads directory; other absolute
    /// paths are used as given.
    pub fn resolve_input(&self, filepath: &str) -> PathBuf {
        let path = Path::new(filepath);
        if filepath.starts_with("/Uploads/videos") || !path.is_absolute() {
            if let Some(name) = path.file_name() {
                return Path::new(&self.config.video.uploads_dir).join(name);
            }
        }
        path.to_path_buf()
    }

    pub fn process(&self, request: &ProcessRequest) -> Result<RunResult, ServiceError> {
        let started = Instant::now();
        let source = self.resolve_input(&request.filepath);
        if !source.exists() {
            error!("File not found: {}", source.display());
            return Err(ServiceError::NotFound(source));
        }

        info!(
            "▶️  Processing simulation {} with file: {}",
            request.simulation_id,
            source.display()
        );

        let run = RunRequest {
            source,
            identity: SampleIdentity {
                vehicle_id: request.vehicle_id.clone(),
                simulation_id: request.simulation_id.clone(),
                user_id: request.user_id.clone(),
            },
        };

        match self.run(&run) {
            Ok(result) => {
                info!(
                    "✅ Simulation {} completed in {:.2}s: {} alerts",
                    request.simulation_id,
                    started.elapsed().as_secs_f64(),
                    result.summary.total_alerts
                );
                Ok(result)
            }
            Err(e) => {
                error!("❌ Error processing simulation {}: {:#}", request.simulation_id, e);
                Err(ServiceError::ProcessingFailed(format!("{:#}", e)))
            }
        }
    }

    fn run(&self, request: &RunRequest) -> Result<RunResult> {
        let mut orchestrator = PipelineOrchestrator::new(
            self.config.clone(),
            self.factory.detector(&self.config)?,
            self.factory.classifier(&self.config)?,
            self.factory.lanes(&self.config)?,
        )?;
        let finalizer = VideoFinalizer::new(self.factory.transcoder(&self.config), &self.config.video);
        orchestrator.run(request, self.factory.media(), &finalizer)
    }
}
