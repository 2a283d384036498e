// src/config.rs

use crate::error::AdasError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraConfig,
    pub classes: ClassConfig,
    pub thresholds: ThresholdConfig,
    pub alerts: AlertConfig,
    pub sampling: SamplingConfig,
    pub signs: SignConfig,
    pub lanes: LaneConfig,
    pub tracking: TrackingConfig,
    pub models: ModelConfig,
    pub video: VideoConfig,
    pub snapshots: SnapshotConfig,
    pub transcoder: TranscoderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub hfov_deg: f64,
    pub fallback_fps: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            hfov_deg: 70.0,
            fallback_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSpec {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub vehicle: bool,
    /// Physical width used by the pinhole model.
    #[serde(default)]
    pub width_m: Option<f64>,
}

impl ClassSpec {
    fn new(id: u32, name: &str, vehicle: bool, width_m: Option<f64>) -> Self {
        Self {
            id,
            name: name.to_string(),
            vehicle,
            width_m,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassConfig {
    pub whitelist: Vec<ClassSpec>,
    pub default_width_m: f64,
}

impl Default for ClassConfig {
    fn default() -> Self {
        // COCO ids
        Self {
            whitelist: vec![
                ClassSpec::new(0, "person", false, None),
                ClassSpec::new(1, "bicycle", false, None),
                ClassSpec::new(2, "car", true, Some(1.8)),
                ClassSpec::new(3, "motorcycle", true, Some(0.8)),
                ClassSpec::new(5, "bus", true, Some(2.5)),
                ClassSpec::new(7, "truck", true, Some(2.5)),
                ClassSpec::new(9, "traffic light", false, None),
            ],
            default_width_m: 1.8,
        }
    }
}

impl ClassConfig {
    pub fn get(&self, class_id: u32) -> Option<&ClassSpec> {
        self.whitelist.iter().find(|c| c.id == class_id)
    }

    pub fn is_vehicle(&self, class_id: u32) -> bool {
        self.get(class_id).map(|c| c.vehicle).unwrap_or(false)
    }

    /// Real-world width for a class, falling back to the default width.
    pub fn width_m(&self, class_id: Option<u32>) -> f64 {
        class_id
            .and_then(|id| self.get(id))
            .and_then(|c| c.width_m)
            .unwrap_or(self.default_width_m)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub collision_distance_m: f64,
    /// Obstacle tier upper bound, as a multiple of the collision distance.
    pub obstacle_factor: f64,
    /// Minimum closing speed for a time-to-collision to be reported.
    pub approach_speed_mps: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            collision_distance_m: 8.0,
            obstacle_factor: 1.5,
            approach_speed_mps: 0.1,
        }
    }
}

impl ThresholdConfig {
    pub fn obstacle_distance_m(&self) -> f64 {
        self.collision_distance_m * self.obstacle_factor
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub cooldown_s: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { cooldown_s: 5.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBase {
    /// frame_index / fps
    Video,
    /// Monotonic time since the run started.
    Wall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_s: f64,
    pub time_base: TimeBase,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_s: 0.5,
            time_base: TimeBase::Video,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignConfig {
    pub confidence_threshold: f32,
    /// Label per class id, used when the classifier supplies none.
    pub class_names: Vec<String>,
}

impl Default for SignConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.4,
            class_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// |normalized offset| beyond which the ego vehicle is departing.
    pub departure_offset: f32,
    /// Use the Hough lane detector when the binary has OpenCV.
    pub hough_enabled: bool,
    pub canny_low: f64,
    pub canny_high: f64,
    pub hough_threshold: i32,
    pub min_line_length: f64,
    pub max_line_gap: f64,
    /// Segments flatter than this |dy/dx| are not lane markings.
    pub min_slope: f32,
    /// Fraction of the frame height where the road region starts.
    pub roi_top: f32,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            departure_offset: 0.7,
            hough_enabled: true,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_threshold: 100,
            min_line_length: 100.0,
            max_line_gap: 10.0,
            min_slope: 0.3,
            roi_top: 0.55,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub max_tracks: usize,
    pub stale_after_s: f64,
    /// Minimum IoU for the reference tracker to keep an identity.
    pub min_iou: f32,
    pub max_coast_frames: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_tracks: 512,
            stale_after_s: 10.0,
            min_iou: 0.3,
            max_coast_frames: 15,
        }
    }
}

/// ONNX model backends. Only read when the `onnx` feature is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub detector_path: String,
    /// Sign model; no sign alerts without one.
    pub sign_path: Option<String>,
    pub confidence_threshold: f32,
    pub nms_iou: f32,
    pub use_cuda: bool,
    pub num_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: "models/yolov8n.onnx".to_string(),
            sign_path: None,
            confidence_threshold: 0.25,
            nms_iou: 0.45,
            use_cuda: false,
            num_threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub input_dir: String,
    pub uploads_dir: String,
    pub output_dir: String,
    pub public_prefix: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            input_dir: "videos".to_string(),
            uploads_dir: "Uploads/videos".to_string(),
            output_dir: "Processed/videos".to_string(),
            public_prefix: "/Processed/videos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub dir: String,
    pub public_prefix: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: "Uploads/frames".to_string(),
            public_prefix: "/Uploads/frames".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub enabled: bool,
    pub ffmpeg_path: String,
    pub preset: String,
    pub crf: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            preset: "medium".to_string(),
            crf: 23,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "adas_pipeline=info,ort=warn".to_string(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AdasError> {
        let fov = self.camera.hfov_deg;
        if !(fov > 0.0 && fov < 180.0) {
            return Err(AdasError::InvalidConfig(format!(
                "camera.hfov_deg must be in (0, 180), got {}",
                fov
            )));
        }
        if self.classes.whitelist.is_empty() {
            return Err(AdasError::InvalidConfig(
                "classes.whitelist is empty".to_string(),
            ));
        }
        let positive = [
            ("thresholds.collision_distance_m", self.thresholds.collision_distance_m),
            ("thresholds.obstacle_factor", self.thresholds.obstacle_factor),
            ("classes.default_width_m", self.classes.default_width_m),
            ("sampling.interval_s", self.sampling.interval_s),
            ("camera.fallback_fps", self.camera.fallback_fps),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(AdasError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.tracking.max_tracks == 0 {
            return Err(AdasError::InvalidConfig(
                "tracking.max_tracks must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.lanes.roi_top) {
            return Err(AdasError::InvalidConfig(format!(
                "lanes.roi_top must be in [0, 1), got {}",
                self.lanes.roi_top
            )));
        }
        if self.alerts.cooldown_s < 0.0 {
            return Err(AdasError::InvalidConfig(format!(
                "alerts.cooldown_s must not be negative, got {}",
                self.alerts.cooldown_s
            )));
        }
        Ok(())
    }
}
