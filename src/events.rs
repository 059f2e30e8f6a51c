// src/events.rs
//
// The event union published per camera. Coordinates inside a freshly built
// event are raw frame pixels; the broadcaster converts them into each
// viewer's render space before delivery.

use crate::render::RenderSpace;
use crate::types::{BoundingBox, Point};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CameraEvent {
    /// Live overlay for an object still in flight.
    Arrow { tip: Point, bbox: BoundingBox },
    /// A finalized hit.
    Hit { tip: Point },
    /// The calibrated target region.
    Polygon { points: Vec<Point> },
    Error { reason: String },
}

impl CameraEvent {
    /// Converts the event into a session's render space. Coordinate-bearing
    /// events require a known mapping and return `None` without one;
    /// `Error` passes through untouched.
    pub fn to_render(&self, space: Option<&RenderSpace>) -> Option<CameraEvent> {
        match self {
            CameraEvent::Arrow { tip, bbox } => {
                let space = space?;
                Some(CameraEvent::Arrow {
                    tip: space.map_point(*tip),
                    bbox: space.map_bbox(*bbox),
                })
            }
            CameraEvent::Hit { tip } => {
                let space = space?;
                Some(CameraEvent::Hit {
                    tip: space.map_point(*tip),
                })
            }
            CameraEvent::Polygon { points } => {
                let space = space?;
                Some(CameraEvent::Polygon {
                    points: space.map_points(points),
                })
            }
            CameraEvent::Error { .. } => Some(self.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shapes() {
        let hit = CameraEvent::Hit {
            tip: Point::new(50.0, 60.0),
        };
        assert_eq!(
            serde_json::to_string(&hit).unwrap(),
            r#"{"type":"hit","tip":[50.0,60.0]}"#
        );

        let arrow = CameraEvent::Arrow {
            tip: Point::new(1.0, 2.0),
            bbox: BoundingBox::new(0.0, 0.0, 2.0, 2.0),
        };
        assert_eq!(
            serde_json::to_string(&arrow).unwrap(),
            r#"{"type":"arrow","tip":[1.0,2.0],"bbox":[0.0,0.0,2.0,2.0]}"#
        );

        let err = CameraEvent::Error {
            reason: "no_target".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"type":"error","reason":"no_target"}"#
        );
    }

    #[test]
    fn test_coordinate_events_need_a_mapping() {
        let hit = CameraEvent::Hit {
            tip: Point::new(50.0, 60.0),
        };
        assert!(hit.to_render(None).is_none());

        let err = CameraEvent::Error {
            reason: "no_target".to_string(),
        };
        assert_eq!(err.to_render(None), Some(err.clone()));
    }

    #[test]
    fn test_polygon_maps_all_points() {
        let space = RenderSpace::new(Some((1280, 720)), Some((640, 360))).unwrap();
        let poly = CameraEvent::Polygon {
            points: vec![Point::new(100.0, 100.0), Point::new(200.0, 100.0)],
        };
        let mapped = poly.to_render(Some(&space)).unwrap();
        assert_eq!(
            mapped,
            CameraEvent::Polygon {
                points: vec![Point::new(50.0, 50.0), Point::new(100.0, 50.0)],
            }
        );
    }
}
