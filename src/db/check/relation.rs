//! Edge relation filter
//!
//! Decides whether two edges violate a distance relation and returns the
//! violating parts as an edge pair. Polygon edges have the interior on their
//! right side; "outside" is the left side.

use crate::db::geometry::{Coord, Edge, EdgePair, Point};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-9;

/// Kind of distance relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EdgeRelation {
    /// Edges face each other through the interior
    Width,
    /// Edges face each other through the exterior
    #[default]
    Space,
    /// Interior-facing edges of two layers (overlap width)
    Overlap,
    /// First-layer edges inside second-layer polygons (enclosure)
    Inside,
}

/// How the distance is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Metrics {
    /// Distance to the segment, round at the end points
    #[default]
    Euclidean,
    /// Square zone extending the edge at its ends
    Square,
    /// Perpendicular distance within the edge's projection only
    Projection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Inside,
    Outside,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRelationFilter {
    pub relation: EdgeRelation,
    pub distance: Coord,
    pub metrics: Metrics,
    /// Edge pairs enclosing this angle (degrees) or more are ignored
    pub ignore_angle: f64,
    pub min_projection: Coord,
    pub max_projection: Coord,
    /// Report the full edges instead of the violating parts
    pub whole_edges: bool,
    /// Collinear, touching edges count as zero-distance violations
    pub include_zero: bool,
}

impl EdgeRelationFilter {
    pub fn new(relation: EdgeRelation, distance: Coord) -> Self {
        Self {
            relation,
            distance,
            metrics: Metrics::Euclidean,
            ignore_angle: 90.0,
            min_projection: 0,
            max_projection: Coord::MAX,
            whole_edges: false,
            include_zero: false,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_ignore_angle(mut self, angle: f64) -> Self {
        self.ignore_angle = angle;
        self
    }

    pub fn with_projection_limits(mut self, min: Coord, max: Coord) -> Self {
        self.min_projection = min;
        self.max_projection = max;
        self
    }

    pub fn with_whole_edges(mut self, f: bool) -> Self {
        self.whole_edges = f;
        self
    }

    pub fn with_include_zero(mut self, f: bool) -> Self {
        self.include_zero = f;
        self
    }

    /// Box enlargement for the interaction scanner
    pub fn enlargement(&self) -> Coord {
        self.distance.max(0)
    }

    /// Side of `a` on which `b` must lie, and side of `b` on which `a` must lie
    fn sides(&self) -> (Side, Side) {
        match self.relation {
            EdgeRelation::Width | EdgeRelation::Overlap => (Side::Inside, Side::Inside),
            EdgeRelation::Space => (Side::Outside, Side::Outside),
            EdgeRelation::Inside => (Side::Outside, Side::Inside),
        }
    }

    /// Tests `a` (first layer) against `b` (second layer). Distances are
    /// strictly below `distance` to count.
    pub fn check(&self, a: &Edge, b: &Edge) -> Option<EdgePair> {
        if a.is_degenerate() || b.is_degenerate() || self.distance <= 0 {
            return None;
        }

        // facing edges run anti-parallel, enclosing edges parallel
        let (da, db) = (a.d(), b.d());
        let dot = match self.relation {
            EdgeRelation::Inside => da.dot(&db),
            _ => -da.dot(&db),
        };
        let cos = dot as f64 / (a.length() * b.length());
        let angle = cos.clamp(-1.0, 1.0).acos().to_degrees();
        if angle >= self.ignore_angle - EPS {
            return None;
        }

        let (b_side, a_side) = self.sides();
        let (lb0, lb1) = self.zone_interval(a, b, b_side)?;
        let (la0, la1) = self.zone_interval(b, a, a_side)?;
        let a1 = Edge::new(a.at(la0), a.at(la1));
        let b1 = Edge::new(b.at(lb0), b.at(lb1));
        if a1.is_degenerate() && b1.is_degenerate() {
            return None;
        }

        if self.min_projection > 0 || self.max_projection < Coord::MAX {
            let p = projected_overlap(a, &a1, &b1);
            if p < self.min_projection as f64 || p >= self.max_projection as f64 {
                return None;
            }
        }

        if self.whole_edges {
            Some(EdgePair::new(*a, *b))
        } else {
            Some(EdgePair::new(a1, b1))
        }
    }

    /// Parameter interval of `b` inside the check zone of `a` on `side`
    fn zone_interval(&self, a: &Edge, b: &Edge, side: Side) -> Option<(f64, f64)> {
        let len = a.length();
        let (ux, uy) = (a.dx() as f64 / len, a.dy() as f64 / len);
        // left normal = outside
        let (nx, ny) = match side {
            Side::Outside => (-uy, ux),
            Side::Inside => (uy, -ux),
        };
        let local = |p: Point| {
            let (x, y) = ((p.x - a.p1.x) as f64, (p.y - a.p1.y) as f64);
            (x * ux + y * uy, x * nx + y * ny)
        };
        let (t0, s0) = local(b.p1);
        let (t1, s1) = local(b.p2);
        let (dt, ds) = (t1 - t0, s1 - s0);
        let d = self.distance as f64;

        // 0 < s < d (s >= 0 with include_zero)
        let mut range = Interval::unit();
        range = range.clip(s0, ds, 0.0, !self.include_zero, Bound::Lower)?;
        range = range.clip(s0, ds, d, true, Bound::Upper)?;

        let result = match self.metrics {
            Metrics::Projection => range
                .clip(t0, dt, 0.0, false, Bound::Lower)?
                .clip(t0, dt, len, false, Bound::Upper)?,
            Metrics::Square => range
                .clip(t0, dt, -d, true, Bound::Lower)?
                .clip(t0, dt, len + d, true, Bound::Upper)?,
            Metrics::Euclidean => {
                let slab = range
                    .clip(t0, dt, 0.0, false, Bound::Lower)
                    .and_then(|r| r.clip(t0, dt, len, false, Bound::Upper));
                let disc1 = disc_interval(t0, s0, dt, ds, 0.0, d).and_then(|r| r.intersect(&range));
                let disc2 = disc_interval(t0, s0, dt, ds, len, d).and_then(|r| r.intersect(&range));
                [slab, disc1, disc2]
                    .into_iter()
                    .flatten()
                    .reduce(|x, y| x.hull(&y))?
            }
        };
        (result.hi - result.lo > EPS).then_some((result.lo, result.hi))
    }
}

impl Default for EdgeRelationFilter {
    fn default() -> Self {
        Self::new(EdgeRelation::Space, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Lower,
    Upper,
}

/// Parameter interval on an edge
#[derive(Debug, Clone, Copy, PartialEq)]
struct Interval {
    lo: f64,
    hi: f64,
}

impl Interval {
    fn unit() -> Self {
        Self { lo: 0.0, hi: 1.0 }
    }

    /// Restricts to `v0 + λ dv > limit` (Lower) or `< limit` (Upper). Strict
    /// bounds only matter where the edge runs parallel to the limit.
    fn clip(self, v0: f64, dv: f64, limit: f64, strict: bool, bound: Bound) -> Option<Self> {
        let (v0, dv, limit) = match bound {
            Bound::Lower => (v0, dv, limit),
            Bound::Upper => (-v0, -dv, -limit),
        };
        if dv.abs() < EPS {
            let inside = if strict { v0 > limit + EPS } else { v0 >= limit - EPS };
            return inside.then_some(self);
        }
        let lambda = (limit - v0) / dv;
        let r = if dv > 0.0 {
            Self {
                lo: self.lo.max(lambda),
                hi: self.hi,
            }
        } else {
            Self {
                lo: self.lo,
                hi: self.hi.min(lambda),
            }
        };
        (r.hi > r.lo + EPS).then_some(r)
    }

    fn intersect(&self, other: &Interval) -> Option<Self> {
        let r = Self {
            lo: self.lo.max(other.lo),
            hi: self.hi.min(other.hi),
        };
        (r.hi > r.lo + EPS).then_some(r)
    }

    fn hull(&self, other: &Interval) -> Self {
        Self {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }
}

/// Parameters where `(t0 + λ dt, s0 + λ ds)` is closer than `r` to `(tc, 0)`
fn disc_interval(t0: f64, s0: f64, dt: f64, ds: f64, tc: f64, r: f64) -> Option<Interval> {
    let (x0, y0) = (t0 - tc, s0);
    let qa = dt * dt + ds * ds;
    let qb = 2.0 * (x0 * dt + y0 * ds);
    let qc = x0 * x0 + y0 * y0 - r * r;
    let disc = qb * qb - 4.0 * qa * qc;
    if qa < EPS || disc <= 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let i = Interval {
        lo: (-qb - sq) / (2.0 * qa),
        hi: (-qb + sq) / (2.0 * qa),
    };
    i.intersect(&Interval::unit())
}

/// Length of the common projection of `a1` and `b1` onto the line of `a`
fn projected_overlap(a: &Edge, a1: &Edge, b1: &Edge) -> f64 {
    let len = a.length();
    let (ux, uy) = (a.dx() as f64 / len, a.dy() as f64 / len);
    let t = |p: Point| (p.x - a.p1.x) as f64 * ux + (p.y - a.p1.y) as f64 * uy;
    let (a0, a1) = (t(a1.p1).min(t(a1.p2)), t(a1.p1).max(t(a1.p2)));
    let (b0, b1) = (t(b1.p1).min(t(b1.p2)), t(b1.p1).max(t(b1.p2)));
    (a1.min(b1) - a0.max(b0)).max(0.0)
}
