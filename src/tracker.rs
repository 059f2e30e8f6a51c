// src/tracker.rs
//
// Per-camera trajectory state machine. Converts a stream of noisy point
// detections into a single hit decision: samples accumulate in a bounded
// buffer while the object is in flight, and once no new samples arrive for
// the idle timeout the buffer is finalized into at most one hit point.

use crate::geometry::TargetPolygon;
use crate::types::{DetectionSample, Point, TrackingConfig};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

pub struct TrajectoryTracker {
    buffer: VecDeque<DetectionSample>,
    capacity: usize,
    idle_timeout: Duration,
    cooldown: Duration,
    duplicate_px: f32,
    min_span_px: f32,
    edge_margin_px: f32,
    last_sample_at: Option<Instant>,
    last_hit_at: Option<Instant>,
}

impl TrajectoryTracker {
    pub fn new(cfg: &TrackingConfig) -> Self {
        Self {
            buffer: VecDeque::with_capacity(cfg.buffer_capacity),
            capacity: cfg.buffer_capacity.max(1),
            idle_timeout: Duration::from_secs_f64(cfg.idle_timeout_secs),
            cooldown: Duration::from_secs_f64(cfg.cooldown_secs),
            duplicate_px: cfg.duplicate_px,
            min_span_px: cfg.min_span_px,
            edge_margin_px: cfg.edge_margin_px,
            last_sample_at: None,
            last_hit_at: None,
        }
    }

    /// Appends a sample to the tracking buffer, evicting the oldest at
    /// capacity. A sample within `duplicate_px` of the most recently buffered
    /// one (on both axes) is a stationary re-detection and is dropped.
    /// Returns whether the sample was accepted.
    pub fn ingest(&mut self, sample: DetectionSample, now: Instant) -> bool {
        if let Some(last) = self.buffer.back() {
            if (last.tip.x - sample.tip.x).abs() < self.duplicate_px
                && (last.tip.y - sample.tip.y).abs() < self.duplicate_px
            {
                return false;
            }
        }
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(sample);
        self.last_sample_at = Some(now);
        true
    }

    /// True when an in-progress trajectory has gone quiet: the buffer holds
    /// samples, none have arrived within the idle timeout, and the hit
    /// cooldown has elapsed. The idle watcher polls this and calls
    /// `finalize` when it turns true.
    pub fn is_idle(&self, now: Instant) -> bool {
        if self.buffer.is_empty() {
            return false;
        }
        let Some(last_sample) = self.last_sample_at else {
            return false;
        };
        if let Some(last_hit) = self.last_hit_at {
            if now.duration_since(last_hit) < self.cooldown {
                return false;
            }
        }
        now.duration_since(last_sample) > self.idle_timeout
    }

    /// Classifies the buffered trajectory and always clears the buffer.
    /// Returns the raw-frame hit point, or `None` when the buffer was noise
    /// (too short, or vertical span under the minimum).
    pub fn finalize(&mut self, now: Instant, polygon: Option<&TargetPolygon>) -> Option<Point> {
        let samples: Vec<DetectionSample> = self.buffer.drain(..).collect();
        if samples.len() < 2 {
            return None;
        }

        let mut y_min = f32::MAX;
        let mut y_max = f32::MIN;
        for s in &samples {
            y_min = y_min.min(s.tip.y);
            y_max = y_max.max(s.tip.y);
        }
        if y_max - y_min < self.min_span_px {
            debug!(
                span = y_max - y_min,
                "vertical span under threshold, discarding as static detection"
            );
            return None;
        }

        // The first sample where y stops increasing is the impact signature;
        // without one, the object left the frame and the last sample stands.
        let candidate = samples
            .windows(2)
            .position(|w| w[1].tip.y < w[0].tip.y)
            .map(|i| samples[i].tip)
            .unwrap_or(samples[samples.len() - 1].tip);

        let tip = match polygon {
            Some(poly) => refine_hit(candidate, &samples, poly, self.edge_margin_px),
            None => candidate,
        };

        self.last_hit_at = Some(now);
        Some(tip)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Containment refinement: keep a candidate inside the target; otherwise
/// prefer any buffered sample that was inside; otherwise pull the closest
/// boundary point inward by the edge margin.
fn refine_hit(
    candidate: Point,
    samples: &[DetectionSample],
    polygon: &TargetPolygon,
    edge_margin_px: f32,
) -> Point {
    if polygon.contains(candidate) {
        return candidate;
    }
    if let Some(inside) = samples.iter().find(|s| polygon.contains(s.tip)) {
        debug!(x = inside.tip.x, y = inside.tip.y, "using in-target sample from buffer");
        return inside.tip;
    }
    match polygon.closest_boundary_point(candidate) {
        Some(edge) => polygon.nudge_inward(edge, edge_margin_px),
        None => candidate,
    }
}
