use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub id: String,
    pub stream_url: String,
    pub infer_url: String,
    #[serde(default)]
    pub crop: Option<CropConfig>,
}

/// Fixed viewport trim, in pixels from each frame edge.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CropConfig {
    #[serde(default)]
    pub left: u32,
    #[serde(default)]
    pub right: u32,
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub bottom: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub buffer_capacity: usize,
    pub idle_timeout_secs: f64,
    pub cooldown_secs: f64,
    pub duplicate_px: f32,
    pub min_span_px: f32,
    pub edge_margin_px: f32,
    pub watch_interval_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 10,
            idle_timeout_secs: 2.0,
            cooldown_secs: 8.0,
            duplicate_px: 5.0,
            min_span_px: 15.0,
            edge_margin_px: 35.0,
            watch_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub reconnect_interval_secs: f64,
    pub poll_interval_ms: u64,
    pub read_timeout_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            reconnect_interval_secs: 10.0,
            poll_interval_ms: 50,
            read_timeout_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Polygon approximation tolerance as a fraction of contour perimeter.
    pub approx_tolerance: f32,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            approx_tolerance: 0.04,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub timeout_secs: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.36,
            timeout_secs: 2.0,
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
            level: "impact_detection=info".to_string(),
        }
    }
}

/// A 2D point in raw frame pixels, serialized on the wire as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f32, f32)", into = "(f32, f32)")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f32, f32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned bounding box, serialized on the wire as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The tracked representative point: bottom-center of the box.
    pub fn tip(&self) -> Point {
        Point::new((self.x1 + self.x2) / 2.0, self.y2)
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(b: [f32; 4]) -> Self {
        Self {
            x1: b[0],
            y1: b[1],
            x2: b[2],
            y2: b[3],
        }
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// Decoded RGB8 frame. `seq` is assigned by the capture loop and increases
/// monotonically per camera, so consumers can skip a frame they already
/// processed.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: f64,
    pub seq: u64,
}

impl Frame {
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One raw detector output for a frame.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// The tracked point for one frame where the object was seen.
#[derive(Debug, Clone, Copy)]
pub struct DetectionSample {
    pub tip: Point,
    pub timestamp_ms: f64,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl DetectionSample {
    pub fn from_detection(det: &Detection, timestamp_ms: f64) -> Self {
        Self {
            tip: det.bbox.tip(),
            timestamp_ms,
            bbox: det.bbox,
            confidence: det.confidence,
        }
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
        * 1000.0
}
