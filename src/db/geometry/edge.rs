//! Edges and edge pairs
//!
//! An `Edge` is a directed segment. For polygon edges the interior of the
//! polygon is on the right side (see `Polygon`).

use super::polygon::Polygon;
use super::trans::ICplxTrans;
use super::types::{Bounded, Coord, Point, Rect, Vector};
use serde::{Deserialize, Serialize};

/// A directed segment from `p1` to `p2`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Edge {
    pub p1: Point,
    pub p2: Point,
}

impl Edge {
    pub const fn new(p1: Point, p2: Point) -> Self {
        Self { p1, p2 }
    }

    pub fn from_coords(x1: Coord, y1: Coord, x2: Coord, y2: Coord) -> Self {
        Self::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    pub fn d(&self) -> Vector {
        self.p2 - self.p1
    }

    pub fn dx(&self) -> Coord {
        self.p2.x - self.p1.x
    }

    pub fn dy(&self) -> Coord {
        self.p2.y - self.p1.y
    }

    pub fn length(&self) -> f64 {
        self.d().length()
    }

    pub fn is_degenerate(&self) -> bool {
        self.p1 == self.p2
    }

    pub fn swapped(&self) -> Edge {
        Edge::new(self.p2, self.p1)
    }

    pub fn moved(&self, v: Vector) -> Edge {
        Edge::new(self.p1 + v, self.p2 + v)
    }

    pub fn transformed(&self, t: &ICplxTrans) -> Edge {
        Edge::new(t.apply(self.p1), t.apply(self.p2))
    }

    /// Side of `p` relative to the edge's line: 1 = left, -1 = right, 0 = on the line
    pub fn side_of(&self, p: Point) -> i32 {
        let c = self.d().cross(&(p - self.p1));
        c.signum() as i32
    }

    /// Signed distance of `p` from the edge's line (positive = left)
    pub fn distance(&self, p: Point) -> f64 {
        let l = self.length();
        if l == 0.0 {
            return self.p1.distance(&p);
        }
        self.d().cross(&(p - self.p1)) as f64 / l
    }

    /// Distance of `p` from the segment
    pub fn euclidean_distance(&self, p: Point) -> f64 {
        let d = self.d();
        let l2 = d.dot(&d);
        if l2 == 0 {
            return self.p1.distance(&p);
        }
        let t = (d.dot(&(p - self.p1)) as f64 / l2 as f64).clamp(0.0, 1.0);
        let x = self.p1.x as f64 + t * d.x as f64;
        let y = self.p1.y as f64 + t * d.y as f64;
        ((p.x as f64 - x).powi(2) + (p.y as f64 - y).powi(2)).sqrt()
    }

    /// True if `p` is on the segment (end points included)
    pub fn contains(&self, p: Point) -> bool {
        if self.is_degenerate() {
            return p == self.p1;
        }
        self.side_of(p) == 0 && {
            let d = self.d();
            let t = d.dot(&(p - self.p1));
            t >= 0 && t <= d.dot(&d)
        }
    }

    pub fn is_parallel(&self, other: &Edge) -> bool {
        self.d().cross(&other.d()) == 0
    }

    /// True if both edges lie on the same line
    pub fn is_collinear(&self, other: &Edge) -> bool {
        self.is_parallel(other) && self.side_of(other.p1) == 0
    }

    /// Intersection test for the two segments, touching included
    pub fn intersects(&self, other: &Edge) -> bool {
        let s1 = self.side_of(other.p1);
        let s2 = self.side_of(other.p2);
        let s3 = other.side_of(self.p1);
        let s4 = other.side_of(self.p2);
        if s1 == 0 && s2 == 0 {
            // collinear: check for overlap of the projections
            let bb = self.bbox();
            return bb.touches(&other.bbox());
        }
        s1 * s2 <= 0 && s3 * s4 <= 0
    }

    /// Intersection point of two non-parallel segments (rounded to the grid)
    pub fn intersect_point(&self, other: &Edge) -> Option<Point> {
        if self.is_degenerate() || other.is_degenerate() || self.is_parallel(other) {
            return None;
        }
        if !self.intersects(other) {
            return None;
        }
        let d1 = self.d();
        let d2 = other.d();
        let den = d1.cross(&d2) as f64;
        let t = (other.p1 - self.p1).cross(&d2) as f64 / den;
        Some(Point::from_f64(
            self.p1.x as f64 + t * d1.x as f64,
            self.p1.y as f64 + t * d1.y as f64,
        ))
    }

    /// Point at parameter `t` along the edge (0 = p1, 1 = p2), rounded
    pub fn at(&self, t: f64) -> Point {
        Point::from_f64(
            self.p1.x as f64 + t * self.dx() as f64,
            self.p1.y as f64 + t * self.dy() as f64,
        )
    }
}

impl Bounded for Edge {
    fn bbox(&self) -> Rect {
        Rect::from_points(self.p1, self.p2)
    }
}

/// A pair of edges, typically the two sides of a DRC violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EdgePair {
    pub first: Edge,
    pub second: Edge,
    /// Symmetric pairs are equal regardless of the order of their edges
    pub symmetric: bool,
}

impl EdgePair {
    pub fn new(first: Edge, second: Edge) -> Self {
        Self {
            first,
            second,
            symmetric: false,
        }
    }

    pub fn swapped(&self) -> EdgePair {
        EdgePair {
            first: self.second,
            second: self.first,
            symmetric: self.symmetric,
        }
    }

    pub fn lesser(&self) -> Edge {
        self.first.min(self.second)
    }

    pub fn greater(&self) -> Edge {
        self.first.max(self.second)
    }

    /// Canonical form: symmetric pairs are ordered, so that equal violations
    /// reported in different orders compare equal
    pub fn normalized(&self) -> EdgePair {
        if self.symmetric && self.second < self.first {
            self.swapped()
        } else {
            *self
        }
    }

    pub fn transformed(&self, t: &ICplxTrans) -> EdgePair {
        EdgePair {
            first: self.first.transformed(t),
            second: self.second.transformed(t),
            symmetric: self.symmetric,
        }
    }

    /// Minimum distance between the two edges
    pub fn distance(&self) -> f64 {
        if self.first.intersects(&self.second) {
            return 0.0;
        }
        [
            self.first.euclidean_distance(self.second.p1),
            self.first.euclidean_distance(self.second.p2),
            self.second.euclidean_distance(self.first.p1),
            self.second.euclidean_distance(self.first.p2),
        ]
        .into_iter()
        .fold(f64::MAX, f64::min)
    }

    /// The quadrilateral spanned by the two edges. Degenerate pairs are
    /// widened by `enl` so that the result has an area.
    pub fn to_polygon(&self, enl: Coord) -> Polygon {
        let pts = vec![self.first.p1, self.first.p2, self.second.p1, self.second.p2];
        let poly = Polygon::new(pts);
        if poly.area2() != 0 || enl <= 0 {
            return poly;
        }
        let bb = self.bbox().enlarged(enl, enl);
        Polygon::from_rect(&bb)
    }
}

impl Bounded for EdgePair {
    fn bbox(&self) -> Rect {
        self.first.bbox().extended(&self.second.bbox())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_side_and_distance() {
        let e = Edge::from_coords(0, 0, 10, 0);
        assert_eq!(e.side_of(Point::new(5, 3)), 1);
        assert_eq!(e.side_of(Point::new(5, -3)), -1);
        assert_eq!(e.side_of(Point::new(20, 0)), 0);
        assert!((e.distance(Point::new(5, -3)) + 3.0).abs() < 1e-9);
        assert!((e.euclidean_distance(Point::new(13, 4)) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_intersect_point() {
        let a = Edge::from_coords(0, 0, 10, 10);
        let b = Edge::from_coords(0, 10, 10, 0);
        assert_eq!(a.intersect_point(&b), Some(Point::new(5, 5)));
        let c = Edge::from_coords(20, 0, 30, 10);
        assert_eq!(a.intersect_point(&c), None);
        // touching at an end point
        let d = Edge::from_coords(10, 10, 20, 0);
        assert_eq!(a.intersect_point(&d), Some(Point::new(10, 10)));
    }

    #[test]
    fn test_edge_pair_normalization() {
        let a = Edge::from_coords(0, 0, 10, 0);
        let b = Edge::from_coords(10, 5, 0, 5);
        let mut ep = EdgePair::new(b, a);
        ep.symmetric = true;
        assert_eq!(ep.normalized().first, a);
        assert!((ep.distance() - 5.0).abs() < 1e-9);
    }
}
