// src/pipeline/registry.rs
//
// Explicit per-camera registry: camera id -> CameraContext, created on
// first lookup and handed around by Arc instead of living in globals.

use crate::calibration::Calibrator;
use crate::frame_source::FrameSource;
use crate::tracker::TrajectoryTracker;
use crate::types::TrackingConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Everything owned per camera: frame ingestion, calibration, and the
/// tracking state machine. Lives for the whole process once created.
pub struct CameraContext {
    pub id: String,
    pub frames: FrameSource,
    pub calibrator: Calibrator,
    tracker: Mutex<TrajectoryTracker>,
    frame_size: Mutex<Option<(u32, u32)>>,
}

impl CameraContext {
    pub fn new(
        id: &str,
        frames: FrameSource,
        calibrator: Calibrator,
        tracking: &TrackingConfig,
    ) -> Self {
        Self {
            id: id.to_string(),
            frames,
            calibrator,
            tracker: Mutex::new(TrajectoryTracker::new(tracking)),
            frame_size: Mutex::new(None),
        }
    }

    /// The tracker mutex also serializes the watcher's is_idle + finalize
    /// pair against concurrent ingest calls; hold the guard across both.
    pub fn tracker(&self) -> MutexGuard<'_, TrajectoryTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn frame_size(&self) -> Option<(u32, u32)> {
        *self
            .frame_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_frame_size(&self, size: (u32, u32)) {
        *self
            .frame_size
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(size);
    }

    pub fn stop(&self) {
        self.frames.stop();
    }
}

#[derive(Default)]
pub struct CameraRegistry {
    cameras: Mutex<HashMap<String, Arc<CameraContext>>>,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, HashMap<String, Arc<CameraContext>>> {
        self.cameras.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the context for `id`, building it on first reference.
    pub fn get_or_create(
        &self,
        id: &str,
        build: impl FnOnce() -> CameraContext,
    ) -> Arc<CameraContext> {
        let mut cameras = self.inner();
        if let Some(existing) = cameras.get(id) {
            return existing.clone();
        }
        info!(camera = id, "creating camera context");
        let ctx = Arc::new(build());
        cameras.insert(id.to_string(), ctx.clone());
        ctx
    }

    pub fn get(&self, id: &str) -> Option<Arc<CameraContext>> {
        self.inner().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Arc<CameraContext>> {
        self.inner().values().cloned().collect()
    }

    pub fn stop_all(&self) {
        for ctx in self.all() {
            ctx.stop();
        }
        self.inner().clear();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::detect::TargetSegmenter;
    use crate::frame_source::{CaptureError, StreamConnector, VideoStream};
    use crate::types::{now_ms, Frame, Point};
    use std::time::Duration;

    pub struct IdleConnector;

    struct IdleStream;

    impl VideoStream for IdleStream {
        fn read(&mut self) -> Result<Frame, CaptureError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(Frame {
                data: vec![0; 32 * 32 * 3],
                width: 32,
                height: 32,
                timestamp_ms: now_ms(),
                seq: 0,
            })
        }
    }

    impl StreamConnector for IdleConnector {
        fn connect(&self) -> Result<Box<dyn VideoStream>, CaptureError> {
            Ok(Box::new(IdleStream))
        }
    }

    pub struct NullSegmenter;

    impl TargetSegmenter for NullSegmenter {
        fn segment(&self, _frame: &Frame) -> anyhow::Result<Option<Vec<Point>>> {
            Ok(None)
        }
    }

    pub fn context(id: &str) -> CameraContext {
        let frames = FrameSource::start(
            id.to_string(),
            Box::new(IdleConnector),
            Duration::from_millis(50),
            None,
        );
        let calibrator = Calibrator::new(std::sync::Arc::new(NullSegmenter), 0.04);
        CameraContext::new(id, frames, calibrator, &TrackingConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::context;
    use super::*;

    #[test]
    fn test_context_created_once_per_id() {
        let registry = CameraRegistry::new();
        let a = registry.get_or_create("target1", || context("target1"));
        let b = registry.get_or_create("target1", || context("target1"));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.all().len(), 1);
        registry.stop_all();
    }

    #[test]
    fn test_get_unknown_camera() {
        let registry = CameraRegistry::new();
        assert!(registry.get("nope").is_none());
    }

    #[test]
    fn test_stop_all_clears_registry() {
        let registry = CameraRegistry::new();
        registry.get_or_create("target1", || context("target1"));
        registry.get_or_create("target2", || context("target2"));
        registry.stop_all();
        assert!(registry.all().is_empty());
    }
}
