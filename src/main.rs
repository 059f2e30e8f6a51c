// src/main.rs

mod broadcast;
mod calibration;
mod config;
mod detect;
mod events;
mod frame_source;
mod geometry;
mod pipeline;
mod render;
mod tracker;
mod types;

use crate::broadcast::EventBroadcaster;
use crate::calibration::Calibrator;
use crate::detect::HttpInferenceClient;
use crate::frame_source::{FrameSource, MjpegConnector};
use crate::pipeline::{CameraContext, CameraRegistry};
use crate::types::{CameraConfig, Config};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(cameras = config.cameras.len(), "starting impact detection service");

    let registry = Arc::new(CameraRegistry::new());
    let broadcaster = Arc::new(EventBroadcaster::new());

    for cam in &config.cameras {
        let ctx = registry.get_or_create(&cam.id, || build_camera(cam, &config));
        let client = Arc::new(HttpInferenceClient::new(&cam.infer_url, &config.detector));
        tokio::spawn(pipeline::detection::detection_loop(
            ctx,
            client,
            broadcaster.clone(),
            config.capture.poll_interval_ms,
        ));
    }

    tokio::spawn(pipeline::watcher::idle_watcher(
        registry.clone(),
        broadcaster.clone(),
        config.tracking.watch_interval_ms,
    ));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    registry.stop_all();
    Ok(())
}

fn build_camera(cam: &CameraConfig, config: &Config) -> CameraContext {
    let connector = MjpegConnector::new(
        &cam.stream_url,
        Duration::from_secs_f64(config.capture.read_timeout_secs),
    );
    let frames = FrameSource::start(
        cam.id.clone(),
        Box::new(connector),
        Duration::from_secs_f64(config.capture.reconnect_interval_secs),
        cam.crop,
    );
    let segmenter = Arc::new(HttpInferenceClient::new(&cam.infer_url, &config.detector));
    let calibrator = Calibrator::new(segmenter, config.calibration.approx_tolerance);
    CameraContext::new(&cam.id, frames, calibrator, &config.tracking)
}
