// src/types.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates: [x1, y1, x2, y2].
pub type BBox = [f32; 4];

/// Identifier assigned by the tracking capability to one physical object.
pub type TrackId = u32;

/// Slack for comparing run times derived from `index / fps`, which are not
/// exact in f64 (0.7 - 0.2 < 0.5).
pub const TIME_EPSILON_S: f64 = 1e-6;

/// RGB color used for overlays.
pub type Rgb = [u8; 3];

/// Text drawn next to a box by the video backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub text: String,
    pub origin: (i32, i32),
    pub color: Rgb,
}

/// One decoded frame, packed RGB (3 bytes per pixel, row-major).
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub index: u64,
    pub timestamp_ms: f64,
    pub overlays: Vec<Overlay>,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: usize, height: usize, index: u64, timestamp_ms: f64) -> Self {
        Self {
            data,
            width,
            height,
            index,
            timestamp_ms,
            overlays: Vec::new(),
        }
    }

    /// Solid black frame, mostly useful for synthetic sources.
    pub fn blank(width: usize, height: usize, index: u64, timestamp_ms: f64) -> Self {
        Self::new(vec![0u8; width * height * 3], width, height, index, timestamp_ms)
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) * 3;
        self.data
            .get(idx..idx + 3)
            .map(|p| [p[0], p[1], p[2]])
    }
}

/// Lane boundary as a polyline, top to bottom.
#[derive(Debug, Clone)]
pub struct Lane {
    pub points: Vec<(f32, f32)>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Collision,
    Obstacle,
    LaneDeparture,
    TrafficSign,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Collision => "collision",
            AlertKind::Obstacle => "obstacle",
            AlertKind::LaneDeparture => "lane_departure",
            AlertKind::TrafficSign => "traffic_sign",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneStatus {
    Within,
    Departing,
}

/// Per-frame hazard signal before cooldown arbitration.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    pub kind: AlertKind,
    pub description: String,
    pub severity: Severity,
    pub track_id: Option<TrackId>,
    /// Distance of the object that raised the signal, when known.
    pub distance_m: Option<f64>,
}

/// Telemetry record emitted once per sampling interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    #[serde(rename = "vehicleId")]
    pub vehicle_id: String,
    #[serde(rename = "simulationId")]
    pub simulation_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// km/h, negative when the object recedes.
    pub speed: Option<f64>,
    pub distance_to_object: Option<f64>,
    pub lane_status: LaneStatus,
    pub obstacle_detected: bool,
    pub camera_frame_url: Option<String>,
    pub track_id: Option<TrackId>,
    pub frame_index: u64,
    pub ttc: Option<f64>,
    pub warn: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub description: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub track_id: Option<TrackId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSummary {
    pub total_alerts: usize,
    pub collision_count: usize,
    pub traffic_sign_count: usize,
    pub lane_departure_count: usize,
    pub obstacle_count: usize,
}

impl AlertSummary {
    pub fn tally(alerts: &[AlertEvent]) -> Self {
        let count = |kind: AlertKind| alerts.iter().filter(|a| a.kind == kind).count();
        Self {
            total_alerts: alerts.len(),
            collision_count: count(AlertKind::Collision),
            traffic_sign_count: count(AlertKind::TrafficSign),
            lane_departure_count: count(AlertKind::LaneDeparture),
            obstacle_count: count(AlertKind::Obstacle),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
}

/// Final record returned by one processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub status: RunStatus,
    pub summary: AlertSummary,
    pub sensor_data: Vec<SensorSample>,
    pub alerts: Vec<AlertEvent>,
    pub video_url: Option<String>,
}

impl RunResult {
    pub fn completed(
        sensor_data: Vec<SensorSample>,
        alerts: Vec<AlertEvent>,
        video_url: Option<String>,
    ) -> Self {
        Self {
            status: RunStatus::Completed,
            summary: AlertSummary::tally(&alerts),
            sensor_data,
            alerts,
            video_url,
        }
    }
}

/// Identity of a run, as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub filepath: String,
    pub vehicle_id: String,
    pub simulation_id: String,
    pub user_id: String,
}
