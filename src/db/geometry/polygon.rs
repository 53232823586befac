//! Polygons with holes
//!
//! Hulls are normalized to clockwise orientation and holes to
//! counter-clockwise orientation, so the polygon's interior is always on the
//! right side of every directed edge.

use super::edge::Edge;
use super::trans::ICplxTrans;
use super::types::{Bounded, Point, Rect, Vector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Polygon {
    hull: Vec<Point>,
    holes: Vec<Vec<Point>>,
}

/// Twice the signed area of a closed ring (positive = counter-clockwise)
fn ring_area2(ring: &[Point]) -> i128 {
    let n = ring.len();
    if n < 3 {
        return 0;
    }
    let mut a: i128 = 0;
    for i in 0..n {
        let p = ring[i];
        let q = ring[(i + 1) % n];
        a += p.x as i128 * q.y as i128 - q.x as i128 * p.y as i128;
    }
    a
}

/// Removes duplicate and collinear points and orients the ring
fn normalize_ring(points: Vec<Point>, clockwise: bool) -> Vec<Point> {
    let mut pts: Vec<Point> = Vec::with_capacity(points.len());
    for p in points {
        if pts.last() != Some(&p) {
            pts.push(p);
        }
    }
    while pts.len() > 1 && pts.first() == pts.last() {
        pts.pop();
    }

    // drop collinear vertices until stable
    let mut changed = true;
    while changed && pts.len() >= 3 {
        changed = false;
        let n = pts.len();
        for i in 0..n {
            let prev = pts[(i + n - 1) % n];
            let cur = pts[i];
            let next = pts[(i + 1) % n];
            if (cur - prev).cross(&(next - cur)) == 0 {
                pts.remove(i);
                changed = true;
                break;
            }
        }
    }

    if pts.len() < 3 {
        return Vec::new();
    }

    let area = ring_area2(&pts);
    if (area > 0) == clockwise {
        pts.reverse();
    }
    pts
}

impl Polygon {
    /// Creates a polygon from a hull point list (any orientation)
    pub fn new(hull: Vec<Point>) -> Self {
        Self {
            hull: normalize_ring(hull, true),
            holes: Vec::new(),
        }
    }

    pub fn with_holes(hull: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        let hull = normalize_ring(hull, true);
        let holes = if hull.is_empty() {
            Vec::new()
        } else {
            holes
                .into_iter()
                .map(|h| normalize_ring(h, false))
                .filter(|h| !h.is_empty())
                .collect()
        };
        Self { hull, holes }
    }

    pub fn from_rect(r: &Rect) -> Self {
        if r.is_empty() || r.width() == 0 || r.height() == 0 {
            return Self::default();
        }
        Self {
            hull: r.corners().to_vec(),
            holes: Vec::new(),
        }
    }

    pub fn hull(&self) -> &[Point] {
        &self.hull
    }

    pub fn holes(&self) -> &[Vec<Point>] {
        &self.holes
    }

    pub fn is_empty(&self) -> bool {
        self.hull.is_empty()
    }

    pub fn vertices(&self) -> usize {
        self.hull.len() + self.holes.iter().map(|h| h.len()).sum::<usize>()
    }

    /// Twice the area (hull minus holes)
    pub fn area2(&self) -> i128 {
        let hull = ring_area2(&self.hull).abs();
        let holes: i128 = self.holes.iter().map(|h| ring_area2(h).abs()).sum();
        hull - holes
    }

    pub fn area(&self) -> f64 {
        self.area2() as f64 * 0.5
    }

    /// True if the polygon is an axis-aligned rectangle
    pub fn is_box(&self) -> bool {
        if self.hull.len() != 4 || !self.holes.is_empty() {
            return false;
        }
        let bb = self.bbox();
        self.hull
            .iter()
            .all(|p| (p.x == bb.left || p.x == bb.right) && (p.y == bb.bottom || p.y == bb.top))
    }

    /// All edges of hull and holes, oriented with the interior on the right
    pub fn edges(&self) -> impl Iterator<Item = Edge> + '_ {
        std::iter::once(&self.hull)
            .chain(self.holes.iter())
            .flat_map(|ring| {
                let n = ring.len();
                (0..n).map(move |i| Edge::new(ring[i], ring[(i + 1) % n]))
            })
    }

    pub fn transformed(&self, t: &ICplxTrans) -> Polygon {
        Polygon::with_holes(
            self.hull.iter().map(|p| t.apply(*p)).collect(),
            self.holes
                .iter()
                .map(|h| h.iter().map(|p| t.apply(*p)).collect())
                .collect(),
        )
    }

    pub fn moved(&self, v: Vector) -> Polygon {
        Polygon {
            hull: self.hull.iter().map(|p| *p + v).collect(),
            holes: self
                .holes
                .iter()
                .map(|h| h.iter().map(|p| *p + v).collect())
                .collect(),
        }
    }

    /// Detects self-intersecting ("odd") polygons: any two non-adjacent edges
    /// touching, or adjacent edges folding back onto each other.
    pub fn is_self_intersecting(&self) -> bool {
        let edges: Vec<Edge> = self.edges().collect();
        let mut ring_bounds = Vec::new();
        let mut start = 0;
        for ring in std::iter::once(&self.hull).chain(self.holes.iter()) {
            ring_bounds.push((start, start + ring.len()));
            start += ring.len();
        }
        let ring_of = |i: usize| ring_bounds.iter().position(|(s, e)| i >= *s && i < *e);

        for i in 0..edges.len() {
            for j in (i + 1)..edges.len() {
                let (a, b) = (&edges[i], &edges[j]);
                if !a.bbox().touches(&b.bbox()) {
                    continue;
                }
                let same_ring = ring_of(i) == ring_of(j);
                let adjacent = same_ring && {
                    let (s, e) = ring_bounds[ring_of(i).unwrap_or(0)];
                    let n = e - s;
                    j == i + 1 || (i == s && j == e - 1 && n > 2)
                };
                if adjacent {
                    // adjacent edges share one vertex; they only conflict when
                    // folding back onto each other
                    if a.is_collinear(b) && (a.d().dot(&b.d()) < 0) {
                        return true;
                    }
                    continue;
                }
                if a.intersects(b) {
                    return true;
                }
            }
        }
        false
    }
}

impl Bounded for Polygon {
    fn bbox(&self) -> Rect {
        let mut r = Rect::empty();
        for p in &self.hull {
            r.extend_point(*p);
        }
        r
    }
}
