// src/main.rs
//
// Batch processor: runs every media file given on the command line (or
// found under `video.input_dir`) and prints one JSON result line per file
// on stdout. Logs go to stderr.

use adas_pipeline::analysis::LaneMonitor;
use adas_pipeline::config::Config;
use adas_pipeline::detection::{
    HoughLaneDetector, IouTrackerConfig, NoSigns, SignClassifier, Tracked, YoloModel,
};
use adas_pipeline::service::{unique_simulation_ids, AdasService, RunFactory};
use adas_pipeline::types::ProcessRequest;
use adas_pipeline::video::{is_media, MediaBackend, OpenCvMedia};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Loads fresh models for every run.
struct ModelFactory {
    media: OpenCvMedia,
}

impl RunFactory for ModelFactory {
    type Detector = Tracked<YoloModel>;
    type Classifier = Box<dyn SignClassifier>;

    fn detector(&self, config: &Config) -> Result<Self::Detector> {
        let model = YoloModel::load(&config.models.detector_path, &config.models)?;
        Ok(Tracked::new(model, IouTrackerConfig::from(&config.tracking)))
    }

    fn classifier(&self, config: &Config) -> Result<Self::Classifier> {
        match &config.models.sign_path {
            Some(path) => Ok(Box::new(YoloModel::load(path, &config.models)?)),
            None => Ok(Box::new(NoSigns)),
        }
    }

    fn media(&self) -> &dyn MediaBackend {
        &self.media
    }

    fn lanes(&self, config: &Config) -> Result<LaneMonitor> {
        if !config.lanes.hough_enabled {
            return Ok(LaneMonitor::disabled(&config.lanes));
        }
        Ok(LaneMonitor::new(
            Some(Box::new(HoughLaneDetector::new(&config.lanes))),
            &config.lanes,
        ))
    }
}

fn find_media_files(input_dir: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(input_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_media(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("ADAS_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = if Path::new(&config_path).exists() {
        Config::load(&config_path)?
    } else {
        Config::default()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("🚗 ADAS Processor Starting");
    info!("✓ Configuration loaded from {}", config_path);
    info!(
        "Thresholds: collision={:.1}m, obstacle={:.1}m, cooldown={:.1}s",
        config.thresholds.collision_distance_m,
        config.thresholds.obstacle_distance_m(),
        config.alerts.cooldown_s
    );

    let args: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    let files = if args.is_empty() {
        find_media_files(&config.video.input_dir)
    } else {
        args
    };

    if files.is_empty() {
        error!("No media files found in {}", config.video.input_dir);
        return Ok(());
    }
    info!("Found {} media file(s) to process", files.len());

    let vehicle_id = std::env::var("ADAS_VEHICLE_ID").unwrap_or_else(|_| "local".to_string());
    let user_id = std::env::var("ADAS_USER_ID").unwrap_or_else(|_| "local".to_string());
    let service = Arc::new(AdasService::new(
        config,
        ModelFactory {
            media: OpenCvMedia,
        },
    )?);

    let inputs: Vec<PathBuf> = files
        .iter()
        .filter_map(|file| match std::fs::canonicalize(file) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("⚠️  Skipping {}: {}", file.display(), e);
                None
            }
        })
        .collect();
    let ids = unique_simulation_ids(&inputs);

    let mut handles = Vec::with_capacity(inputs.len());
    for (absolute, simulation_id) in inputs.into_iter().zip(ids) {
        let request = ProcessRequest {
            filepath: absolute.display().to_string(),
            vehicle_id: vehicle_id.clone(),
            simulation_id,
            user_id: user_id.clone(),
        };
        let service = Arc::clone(&service);
        handles.push(tokio::task::spawn_blocking(move || {
            let outcome = service.process(&request);
            (request, outcome)
        }));
    }

    let mut succeeded = 0usize;
    let total = handles.len();
    for handle in handles {
        let (request, outcome) = handle.await.context("processing task panicked")?;
        match outcome {
            Ok(result) => {
                println!("{}", serde_json::to_string(&result)?);

                succeeded += 1;
                info!("\n✓ {} processed", request.filepath);
                info!("  Samples: {}", result.sensor_data.len());
                info!(
                    "  Alerts: {} (collision {}, obstacle {}, lane {}, sign {})",
                    result.summary.total_alerts,
                    result.summary.collision_count,
                    result.summary.obstacle_count,
                    result.summary.lane_departure_count,
                    result.summary.traffic_sign_count
                );
                info!("  Video: {}", result.video_url.as_deref().unwrap_or("-"));
            }
            Err(e) => {
                error!("[{}] {} ({})", e.status_code(), e, request.filepath);
            }
        }
    }

    info!("Done: {}/{} file(s) processed", succeeded, total);
    Ok(())
}
