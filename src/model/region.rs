// src/model/region.rs
//! Polygon regions on the base layer's pixel plane

use serde::{Deserialize, Serialize};

/// Minimum number of boundary points for a well-formed region.
pub const MIN_REGION_POINTS: usize = 3;

/// A user-authored polygon delimiting where a floor layer is considered
/// active. Points are ordered boundary vertices in base-layer pixel
/// coordinates; the closing edge back to the first point is implicit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub points: Vec<(f64, f64)>,
}

impl Region {
    pub fn new(points: Vec<(f64, f64)>) -> Self {
        Self { points }
    }

    /// Whether this region has enough points to form a polygon.
    pub fn is_valid(&self) -> bool {
        self.points.len() >= MIN_REGION_POINTS
    }

    /// Even-odd ray-casting containment test.
    ///
    /// A point exactly on an edge may register as inside or outside
    /// depending on which side the crossing test lands on; that boundary
    /// ambiguity is accepted, not treated as a defect.
    pub fn contains_point(&self, map_x: f64, map_y: f64) -> bool {
        if self.points.len() < MIN_REGION_POINTS {
            return false;
        }

        let n = self.points.len();
        let mut inside = false;

        let (mut p1x, mut p1y) = self.points[0];
        for i in 1..=n {
            let (p2x, p2y) = self.points[i % n];
            // A horizontal edge can never satisfy the strict/inclusive
            // y-range pair, so the division below is safe.
            if map_y > p1y.min(p2y)
                && map_y <= p1y.max(p2y)
                && map_x <= p1x.max(p2x)
                && p1y != p2y
            {
                let x_intersect = (map_y - p1y) * (p2x - p1x) / (p2y - p1y) + p1x;
                if p1x == p2x || map_x <= x_intersect {
                    inside = !inside;
                }
            }
            p1x = p2x;
            p1y = p2y;
        }

        inside
    }

    /// Polygon-polygon intersection test: any vertex of one polygon inside
    /// the other, or any pair of boundary edges crossing.
    pub fn intersects_with(&self, other: &Region) -> bool {
        for &(x, y) in &self.points {
            if other.contains_point(x, y) {
                return true;
            }
        }

        for &(x, y) in &other.points {
            if self.contains_point(x, y) {
                return true;
            }
        }

        for i in 0..self.points.len() {
            let a1 = self.points[i];
            let a2 = self.points[(i + 1) % self.points.len()];

            for j in 0..other.points.len() {
                let b1 = other.points[j];
                let b2 = other.points[(j + 1) % other.points.len()];

                if segments_intersect(a1, a2, b1, b2) {
                    return true;
                }
            }
        }

        false
    }
}

type Point = (f64, f64);

/// Strict segment-segment intersection via orientation signs, with an
/// explicit point-on-segment check for the collinear case.
fn segments_intersect(p1: Point, p2: Point, p3: Point, p4: Point) -> bool {
    let d1 = cross(p3, p4, p1);
    let d2 = cross(p3, p4, p2);
    let d3 = cross(p1, p2, p3);
    let d4 = cross(p1, p2, p4);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    // Collinear endpoints lying on the other segment.
    if d1 == 0.0 && on_segment(p3, p1, p4) {
        return true;
    }
    if d2 == 0.0 && on_segment(p3, p2, p4) {
        return true;
    }
    if d3 == 0.0 && on_segment(p1, p3, p2) {
        return true;
    }
    if d4 == 0.0 && on_segment(p1, p4, p2) {
        return true;
    }

    false
}

/// Cross product of vectors OA and OB.
fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Whether point `q` lies on segment `pr`, assuming the three points are
/// collinear.
fn on_segment(p: Point, q: Point, r: Point) -> bool {
    q.0 <= p.0.max(r.0) && q.0 >= p.0.min(r.0) && q.1 <= p.1.max(r.1) && q.1 >= p.1.min(r.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Region {
        Region::new(vec![(0.0, 0.0), (10.0, 0.0), (5.0, 10.0)])
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Region {
        Region::new(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
    }

    #[test]
    fn test_contains_centroid() {
        let region = triangle();
        assert!(region.contains_point(5.0, 10.0 / 3.0));
    }

    #[test]
    fn test_contains_far_outside() {
        let region = triangle();
        assert!(!region.contains_point(1000.0, 1000.0));
        assert!(!region.contains_point(-50.0, 5.0));
    }

    #[test]
    fn test_degenerate_region_never_contains() {
        let region = Region::new(vec![(0.0, 0.0), (10.0, 10.0)]);
        assert!(!region.contains_point(5.0, 5.0));
        assert!(!region.is_valid());
        assert!(!Region::new(vec![]).contains_point(0.0, 0.0));
    }

    #[test]
    fn test_disjoint_squares() {
        let a = square(0.0, 0.0, 1.0, 1.0);
        let b = square(5.0, 5.0, 6.0, 6.0);
        assert!(!a.intersects_with(&b));
        assert!(!b.intersects_with(&a));
    }

    #[test]
    fn test_overlapping_squares() {
        let a = square(0.0, 0.0, 2.0, 2.0);
        let b = square(1.0, 1.0, 3.0, 3.0);
        assert!(a.intersects_with(&b));
        assert!(b.intersects_with(&a));
    }

    #[test]
    fn test_containment_is_intersection() {
        // No vertex of the outer square lies inside the inner one, and no
        // edges cross; the inner vertex test has to catch it.
        let outer = square(0.0, 0.0, 10.0, 10.0);
        let inner = square(4.0, 4.0, 6.0, 6.0);
        assert!(outer.intersects_with(&inner));
        assert!(inner.intersects_with(&outer));
    }

    #[test]
    fn test_collinear_edge_overlap() {
        let p1 = (0.0, 0.0);
        let p2 = (10.0, 0.0);
        let p3 = (5.0, 0.0);
        let p4 = (15.0, 0.0);
        assert!(segments_intersect(p1, p2, p3, p4));

        // Collinear but disjoint.
        let p5 = (11.0, 0.0);
        let p6 = (20.0, 0.0);
        assert!(!segments_intersect(p1, p2, p5, p6));
    }

    #[test]
    fn test_crossing_segments() {
        assert!(segments_intersect(
            (0.0, 0.0),
            (10.0, 10.0),
            (0.0, 10.0),
            (10.0, 0.0)
        ));
        assert!(!segments_intersect(
            (0.0, 0.0),
            (1.0, 1.0),
            (5.0, 5.0),
            (6.0, 5.0)
        ));
    }

    #[test]
    fn test_points_serialize_as_pairs() {
        let region = triangle();
        let json = serde_json::to_string(&region).unwrap();
        assert!(json.contains("[0.0,0.0]") || json.contains("[0,0]"));
        let back: Region = serde_json::from_str(&json).unwrap();
        assert_eq!(back, region);
    }
}
