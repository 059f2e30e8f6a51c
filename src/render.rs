// src/render.rs
//
// Aspect-fit (letterbox) mapping from raw frame pixels into a viewer's
// on-screen video element space. Every viewer reports its own element size,
// so the mapping is recomputed per session at send time.

use crate::types::{BoundingBox, Point};

#[derive(Debug, Clone, Copy)]
pub struct RenderSpace {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl RenderSpace {
    /// Returns `None` when either size is unknown or degenerate; callers
    /// must not guess a default viewport.
    pub fn new(frame_size: Option<(u32, u32)>, viewport: Option<(u32, u32)>) -> Option<Self> {
        let (fw, fh) = frame_size?;
        let (vw, vh) = viewport?;
        if fw == 0 || fh == 0 || vw == 0 || vh == 0 {
            return None;
        }
        let (fw, fh) = (fw as f32, fh as f32);
        let (vw, vh) = (vw as f32, vh as f32);
        let scale = (vw / fw).min(vh / fh);
        Some(Self {
            scale,
            pad_x: (vw - fw * scale) / 2.0,
            pad_y: (vh - fh * scale) / 2.0,
        })
    }

    pub fn map_point(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.pad_x, p.y * self.scale + self.pad_y)
    }

    pub fn map_bbox(&self, b: BoundingBox) -> BoundingBox {
        let p1 = self.map_point(Point::new(b.x1, b.y1));
        let p2 = self.map_point(Point::new(b.x2, b.y2));
        BoundingBox::new(p1.x, p1.y, p2.x, p2.y)
    }

    pub fn map_points(&self, pts: &[Point]) -> Vec<Point> {
        pts.iter().map(|p| self.map_point(*p)).collect()
    }

    #[cfg(test)]
    fn unmap_point(&self, p: Point) -> Point {
        Point::new((p.x - self.pad_x) / self.scale, (p.y - self.pad_y) / self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_scale_viewport() {
        // 1280x720 frame in a 640x360 element: scale 0.5, no padding
        let space = RenderSpace::new(Some((1280, 720)), Some((640, 360))).unwrap();
        let p = space.map_point(Point::new(100.0, 100.0));
        assert_eq!(p, Point::new(50.0, 50.0));
    }

    #[test]
    fn test_letterbox_padding() {
        // 1280x720 frame in a square 700x700 element: vertical bars
        let space = RenderSpace::new(Some((1280, 720)), Some((700, 700))).unwrap();
        let origin = space.map_point(Point::new(0.0, 0.0));
        assert_eq!(origin.x, 0.0);
        let expected_pad = (700.0 - 720.0 * (700.0 / 1280.0)) / 2.0;
        assert!((origin.y - expected_pad).abs() < 1e-3);
    }

    #[test]
    fn test_unknown_sizes_yield_none() {
        assert!(RenderSpace::new(None, Some((640, 360))).is_none());
        assert!(RenderSpace::new(Some((1280, 720)), None).is_none());
        assert!(RenderSpace::new(Some((0, 720)), Some((640, 360))).is_none());
        assert!(RenderSpace::new(Some((1280, 720)), Some((640, 0))).is_none());
    }

    #[test]
    fn test_round_trip_recovers_point() {
        let cases = [
            ((1280u32, 720u32), (640u32, 360u32)),
            ((1920, 1080), (500, 900)),
            ((640, 480), (1333, 777)),
        ];
        for (frame, viewport) in cases {
            let space = RenderSpace::new(Some(frame), Some(viewport)).unwrap();
            let original = Point::new(123.4, 456.7);
            let back = space.unmap_point(space.map_point(original));
            assert!((back.x - original.x).abs() < 1e-2);
            assert!((back.y - original.y).abs() < 1e-2);
        }
    }

    #[test]
    fn test_bbox_maps_both_corners() {
        let space = RenderSpace::new(Some((1280, 720)), Some((640, 360))).unwrap();
        let mapped = space.map_bbox(BoundingBox::new(100.0, 100.0, 300.0, 200.0));
        assert_eq!(mapped, BoundingBox::new(50.0, 50.0, 150.0, 100.0));
    }
}
