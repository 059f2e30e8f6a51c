// src/calibration.rs
//
// One-shot geometric calibration of the target region. Runs lazily off a
// single frame: segment the target, approximate the contour to a polygon,
// and accept only a clean quadrilateral. The result is cached until
// explicitly invalidated; an uncalibrated camera keeps working with
// unrefined hit points.

use crate::detect::TargetSegmenter;
use crate::geometry::{approx_polygon, perimeter, TargetPolygon};
use crate::types::Frame;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

pub struct Calibrator {
    segmenter: Arc<dyn TargetSegmenter>,
    approx_tolerance: f32,
    cached: Mutex<Option<TargetPolygon>>,
}

impl Calibrator {
    pub fn new(segmenter: Arc<dyn TargetSegmenter>, approx_tolerance: f32) -> Self {
        Self {
            segmenter,
            approx_tolerance,
            cached: Mutex::new(None),
        }
    }

    pub fn polygon(&self) -> Option<TargetPolygon> {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached polygon, or attempts a fresh calibration from
    /// `frame`. Never errors: segmentation failures and non-quadrilateral
    /// contours leave the camera uncalibrated.
    pub fn try_calibrate(&self, frame: &Frame) -> Option<TargetPolygon> {
        if let Some(existing) = self.polygon() {
            return Some(existing);
        }

        let contour = match self.segmenter.segment(frame) {
            Ok(Some(contour)) if contour.len() >= 3 => contour,
            Ok(_) => {
                debug!("segmenter returned no usable contour");
                return None;
            }
            Err(e) => {
                debug!("target segmentation failed: {e:#}");
                return None;
            }
        };

        let epsilon = self.approx_tolerance * perimeter(&contour);
        let approx = approx_polygon(&contour, epsilon);
        let Some(polygon) = TargetPolygon::from_corners(&approx) else {
            debug!(
                corners = approx.len(),
                "contour did not reduce to a quadrilateral"
            );
            return None;
        };

        info!(corners = ?polygon.corners(), "target polygon calibrated");
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = Some(polygon);
        Some(polygon)
    }

    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
