// src/pipeline/detection.rs
//
// Per-camera detection loop: polls the latest frame, skips frames already
// processed, runs the external detector on a blocking worker, and feeds
// accepted samples into the tracker. Also triggers lazy calibration while
// the camera has no target polygon.

use crate::broadcast::EventBroadcaster;
use crate::detect::ObjectDetector;
use crate::events::CameraEvent;
use crate::pipeline::registry::CameraContext;
use crate::types::{Detection, DetectionSample, Frame};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub async fn detection_loop(
    ctx: Arc<CameraContext>,
    detector: Arc<dyn ObjectDetector>,
    broadcaster: Arc<EventBroadcaster>,
    poll_interval_ms: u64,
) {
    let poll = Duration::from_millis(poll_interval_ms.max(1));
    let mut last_seq: u64 = 0;

    loop {
        tokio::time::sleep(poll).await;

        let Some(frame) = ctx.frames.latest_frame() else {
            continue;
        };
        // capture may be slower than polling; never reprocess a frame
        if frame.seq == last_seq {
            continue;
        }
        last_seq = frame.seq;
        ctx.set_frame_size(frame.size());

        if ctx.calibrator.polygon().is_none() {
            calibrate(&ctx, &broadcaster, frame.clone()).await;
        }

        let detect_frame = frame.clone();
        let detect = detector.clone();
        let result =
            tokio::task::spawn_blocking(move || detect.detect(&detect_frame)).await;

        let detections = match result {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                // a failed frame is skipped, never fatal to the loop
                debug!(camera = %ctx.id, "detector failed: {e:#}");
                continue;
            }
            Err(e) => {
                warn!(camera = %ctx.id, "detector worker panicked: {e}");
                continue;
            }
        };

        if let Some(best) = strongest(detections) {
            let sample = DetectionSample::from_detection(&best, frame.timestamp_ms);
            let accepted = ctx.tracker().ingest(sample, Instant::now());
            if accepted {
                broadcaster.publish(
                    &ctx.id,
                    &CameraEvent::Arrow {
                        tip: sample.tip,
                        bbox: sample.bbox,
                    },
                    Some(frame.size()),
                );
            }
        }
    }
}

async fn calibrate(ctx: &Arc<CameraContext>, broadcaster: &Arc<EventBroadcaster>, frame: Arc<Frame>) {
    let worker_ctx = ctx.clone();
    let result =
        tokio::task::spawn_blocking(move || worker_ctx.calibrator.try_calibrate(&frame)).await;
    match result {
        Ok(Some(polygon)) => {
            info!(camera = %ctx.id, "camera calibrated");
            broadcaster.publish(
                &ctx.id,
                &CameraEvent::Polygon {
                    points: polygon.points(),
                },
                ctx.frame_size(),
            );
        }
        Ok(None) => {}
        Err(e) => warn!(camera = %ctx.id, "calibration worker panicked: {e}"),
    }
}

/// The single tracked object is the highest-confidence detection.
fn strongest(detections: Vec<Detection>) -> Option<Detection> {
    detections.into_iter().reduce(|best, d| {
        if d.confidence > best.confidence {
            d
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::registry::test_support;
    use crate::types::BoundingBox;
    use anyhow::Result;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FallingObjectDetector {
        calls: AtomicU32,
    }

    impl ObjectDetector for FallingObjectDetector {
        fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            let y = 40.0 + n * 20.0;
            Ok(vec![Detection {
                bbox: BoundingBox::new(95.0, y - 10.0, 105.0, y),
                confidence: 0.9,
            }])
        }
    }

    #[test]
    fn test_strongest_picks_highest_confidence() {
        let detections = vec![
            Detection {
                bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
                confidence: 0.4,
            },
            Detection {
                bbox: BoundingBox::new(2.0, 2.0, 3.0, 3.0),
                confidence: 0.8,
            },
        ];
        assert_eq!(strongest(detections).unwrap().confidence, 0.8);
        assert!(strongest(Vec::new()).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_loop_ingests_samples_and_emits_arrows() {
        let ctx = Arc::new(test_support::context("target1"));
        let broadcaster = Arc::new(EventBroadcaster::new());
        let (id, mut rx) = broadcaster.subscribe("target1");
        broadcaster.report_viewport("target1", id, (32, 32), None, Some((32, 32)));
        let _ = rx.try_recv(); // drop the no_target reply

        let detector = Arc::new(FallingObjectDetector {
            calls: AtomicU32::new(0),
        });
        let task = tokio::spawn(detection_loop(
            ctx.clone(),
            detector,
            broadcaster.clone(),
            5,
        ));
        tokio::time::sleep(Duration::from_millis(400)).await;
        task.abort();

        assert!(ctx.tracker().buffered() >= 2);
        let first_arrow = rx.try_recv().unwrap();
        assert!(first_arrow.contains(r#""type":"arrow""#));
        ctx.stop();
    }
}
