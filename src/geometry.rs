// src/geometry.rs
//
// Polygon primitives for the calibrated target region: canonical corner
// ordering, containment tests, centroid via polygon moments, closest
// boundary point, and closed-contour polygon approximation.

use crate::types::Point;

/// The four-corner target region, corners in canonical order
/// {top-left, top-right, bottom-right, bottom-left}.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPolygon {
    corners: [Point; 4],
}

impl TargetPolygon {
    /// Builds a polygon from exactly four points, applying the canonical
    /// ordering. Returns `None` for any other point count.
    pub fn from_corners(pts: &[Point]) -> Option<Self> {
        if pts.len() != 4 {
            return None;
        }
        let corners = order_corners([pts[0], pts[1], pts[2], pts[3]]);
        Some(Self { corners })
    }

    pub fn corners(&self) -> &[Point; 4] {
        &self.corners
    }

    pub fn points(&self) -> Vec<Point> {
        self.corners.to_vec()
    }

    pub fn contains(&self, p: Point) -> bool {
        point_in_polygon(p, &self.corners)
    }

    /// Centroid from polygon area moments. Falls back to the vertex average
    /// when the polygon is degenerate (zero signed area).
    pub fn centroid(&self) -> Point {
        let pts = &self.corners;
        let mut area2 = 0.0f32;
        let mut cx = 0.0f32;
        let mut cy = 0.0f32;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            let cross = a.x * b.y - b.x * a.y;
            area2 += cross;
            cx += (a.x + b.x) * cross;
            cy += (a.y + b.y) * cross;
        }
        if area2.abs() < f32::EPSILON {
            let n = pts.len() as f32;
            return Point::new(
                pts.iter().map(|p| p.x).sum::<f32>() / n,
                pts.iter().map(|p| p.y).sum::<f32>() / n,
            );
        }
        let factor = 1.0 / (3.0 * area2);
        Point::new(cx * factor, cy * factor)
    }

    /// Closest point on the polygon boundary to `p`, over all four edges.
    pub fn closest_boundary_point(&self, p: Point) -> Option<Point> {
        let pts = &self.corners;
        let mut best: Option<(f32, Point)> = None;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            if a == b {
                continue;
            }
            let candidate = closest_point_on_segment(p, a, b);
            let dist = p.distance_to(candidate);
            if best.map_or(true, |(d, _)| dist < d) {
                best = Some((dist, candidate));
            }
        }
        best.map(|(_, point)| point)
    }

    /// Shifts `p` by `margin` pixels toward the polygon centroid. Used to pull
    /// an edge hit point inside the target.
    pub fn nudge_inward(&self, p: Point, margin: f32) -> Point {
        nudge_toward(p, self.centroid(), margin)
    }
}

/// Canonical four-corner ordering: top-left has the minimum coordinate sum,
/// bottom-right the maximum; top-right minimizes (y - x), bottom-left
/// maximizes it. Idempotent for any valid quadrilateral orientation.
pub fn order_corners(pts: [Point; 4]) -> [Point; 4] {
    let extreme = |key: fn(&Point) -> f32, min: bool| -> Point {
        let mut best = pts[0];
        let mut best_key = key(&pts[0]);
        for p in &pts[1..] {
            let k = key(p);
            if (min && k < best_key) || (!min && k > best_key) {
                best = *p;
                best_key = k;
            }
        }
        best
    };
    let top_left = extreme(|p| p.x + p.y, true);
    let bottom_right = extreme(|p| p.x + p.y, false);
    let top_right = extreme(|p| p.y - p.x, true);
    let bottom_left = extreme(|p| p.y - p.x, false);
    [top_left, top_right, bottom_right, bottom_left]
}

/// Even-odd ray casting containment test.
pub fn point_in_polygon(p: Point, polygon: &[Point]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[j];
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Projects `p` onto segment `ab`, clamped to the segment endpoints.
pub fn closest_point_on_segment(p: Point, a: Point, b: Point) -> Point {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f32::EPSILON {
        return a;
    }
    let t = ((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq;
    let t = t.clamp(0.0, 1.0);
    Point::new(a.x + t * dx, a.y + t * dy)
}

/// Moves `p` by `margin` along the direction toward `toward`. Returns `p`
/// unchanged when the two points coincide.
pub fn nudge_toward(p: Point, toward: Point, margin: f32) -> Point {
    let dx = toward.x - p.x;
    let dy = toward.y - p.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len <= f32::EPSILON {
        return p;
    }
    Point::new(p.x + dx / len * margin, p.y + dy / len * margin)
}

/// Perimeter of a closed contour.
pub fn perimeter(points: &[Point]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        total += a.distance_to(b);
    }
    total
}

/// Approximates a closed contour with a simpler polygon (Douglas-Peucker).
/// The contour is split at the vertex farthest from the first point and each
/// open chain is simplified with tolerance `epsilon`.
pub fn approx_polygon(contour: &[Point], epsilon: f32) -> Vec<Point> {
    if contour.len() <= 3 {
        return contour.to_vec();
    }
    let mut split = 1;
    let mut max_dist = 0.0f32;
    for (i, p) in contour.iter().enumerate().skip(1) {
        let d = contour[0].distance_to(*p);
        if d > max_dist {
            max_dist = d;
            split = i;
        }
    }
    let mut first_half = simplify_chain(&contour[..=split], epsilon);
    let mut second_half: Vec<Point> = contour[split..].to_vec();
    second_half.push(contour[0]);
    let second_half = simplify_chain(&second_half, epsilon);

    // drop shared endpoints when joining the two chains
    first_half.pop();
    let mut result = first_half;
    result.extend_from_slice(&second_half[..second_half.len() - 1]);
    result
}

fn simplify_chain(chain: &[Point], epsilon: f32) -> Vec<Point> {
    if chain.len() < 3 {
        return chain.to_vec();
    }
    let first = chain[0];
    let last = chain[chain.len() - 1];
    let mut max_dist = 0.0f32;
    let mut index = 0;
    for (i, p) in chain.iter().enumerate().take(chain.len() - 1).skip(1) {
        let d = p.distance_to(closest_point_on_segment(*p, first, last));
        if d > max_dist {
            max_dist = d;
            index = i;
        }
    }
    if max_dist > epsilon {
        let mut left = simplify_chain(&chain[..=index], epsilon);
        let right = simplify_chain(&chain[index..], epsilon);
        left.pop();
        left.extend_from_slice(&right);
        left
    } else {
        vec![first, last]
    }
}
