// src/detect.rs
//
// Seams for the external vision service. The core only assumes a detector
// may return zero results and a segmenter may return no contour; both are
// driven from blocking worker threads so model latency never stalls the
// event loop. The bundled implementation posts JPEG frames to a per-camera
// HTTP inference endpoint.

use crate::types::{Detection, DetectorConfig, Frame, Point};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

pub trait ObjectDetector: Send + Sync {
    /// Detections for the tracked object class in one frame, already
    /// filtered by the configured confidence threshold.
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}

pub trait TargetSegmenter: Send + Sync {
    /// Contour of the target region in one frame, or `None` when the
    /// segmentation model found nothing usable.
    fn segment(&self, frame: &Frame) -> Result<Option<Vec<Point>>>;
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    bbox: [f32; 4],
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    #[serde(default)]
    contour: Option<Vec<Point>>,
}

pub struct HttpInferenceClient {
    agent: ureq::Agent,
    detect_url: String,
    segment_url: String,
    confidence_threshold: f32,
}

impl HttpInferenceClient {
    pub fn new(base_url: &str, cfg: &DetectorConfig) -> Self {
        let base = base_url.trim_end_matches('/');
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs_f64(cfg.timeout_secs))
            .build();
        Self {
            agent,
            detect_url: format!("{base}/detect"),
            segment_url: format!("{base}/segment"),
            confidence_threshold: cfg.confidence_threshold,
        }
    }

    fn post_frame(&self, url: &str, frame: &Frame) -> Result<ureq::Response> {
        let jpeg = encode_jpeg(frame)?;
        self.agent
            .post(url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(&jpeg)
            .with_context(|| format!("inference request to {url} failed"))
    }
}

impl ObjectDetector for HttpInferenceClient {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let response: DetectResponse = self
            .post_frame(&self.detect_url, frame)?
            .into_json()
            .context("malformed detect response")?;
        Ok(filter_detections(response.detections, self.confidence_threshold))
    }
}

impl TargetSegmenter for HttpInferenceClient {
    fn segment(&self, frame: &Frame) -> Result<Option<Vec<Point>>> {
        let response: SegmentResponse = self
            .post_frame(&self.segment_url, frame)?
            .into_json()
            .context("malformed segment response")?;
        Ok(response.contour.filter(|c| !c.is_empty()))
    }
}

fn filter_detections(wire: Vec<WireDetection>, threshold: f32) -> Vec<Detection> {
    wire.into_iter()
        .filter(|d| d.confidence >= threshold)
        .map(|d| Detection {
            bbox: d.bbox.into(),
            confidence: d.confidence,
        })
        .collect()
}

/// Re-encode an RGB8 frame as JPEG for upload.
fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>> {
    use image::ImageEncoder;

    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 85);
    encoder
        .write_image(
            &frame.data,
            frame.width,
            frame.height,
            image::ExtendedColorType::Rgb8,
        )
        .context("jpeg encoding failed")?;
    Ok(out)
}
