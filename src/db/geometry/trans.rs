//! Transformations
//!
//! `Trans` is an exact integer transformation: a rotation by a multiple of 90
//! degrees, an optional mirror at the x axis (applied first) and a
//! displacement. `ICplxTrans` adds a magnification on top.

use super::types::{Coord, Point, Rect, Vector};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Tolerance for fuzzy magnification comparisons.
///
/// Magnifications closer than this compare equal and hash identically. The
/// value is a tunable, not a derived error bound.
pub const MAG_EPSILON: f64 = 1e-6;

/// Simple orthogonal transformation: `p' = R(rot) * M(mirror) * p + disp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Trans {
    /// Counter-clockwise rotation in 90 degree steps (0..=3)
    pub rot: u8,
    /// Mirror at the x axis before rotating
    pub mirror: bool,
    pub disp: Vector,
}

impl Trans {
    pub fn new(rot: u8, mirror: bool, disp: Vector) -> Self {
        Self { rot: rot % 4, mirror, disp }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn displacement(v: Vector) -> Self {
        Self { rot: 0, mirror: false, disp: v }
    }

    pub fn is_unity(&self) -> bool {
        self.rot == 0 && !self.mirror && self.disp == Vector::default()
    }

    /// True if the linear part is the identity
    pub fn is_ortho_unity(&self) -> bool {
        self.rot == 0 && !self.mirror
    }

    pub fn apply_vector(&self, v: Vector) -> Vector {
        let (x, y) = if self.mirror { (v.x, -v.y) } else { (v.x, v.y) };
        match self.rot % 4 {
            0 => Vector::new(x, y),
            1 => Vector::new(-y, x),
            2 => Vector::new(-x, -y),
            _ => Vector::new(y, -x),
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(0, 0) + self.apply_vector(p.to_vector()) + self.disp
    }

    pub fn apply_rect(&self, r: &Rect) -> Rect {
        if r.is_empty() || r.is_world() {
            return *r;
        }
        Rect::from_points(self.apply(r.p1()), self.apply(r.p2()))
    }

    /// `self * other`: applies `other` first
    pub fn concat(&self, other: &Trans) -> Trans {
        let rot = if self.mirror {
            (self.rot + 4 - other.rot % 4) % 4
        } else {
            (self.rot + other.rot) % 4
        };
        Trans {
            rot,
            mirror: self.mirror ^ other.mirror,
            disp: self.apply_vector(other.disp) + self.disp,
        }
    }

    pub fn inverted(&self) -> Trans {
        let lin = Trans {
            rot: if self.mirror { self.rot } else { (4 - self.rot) % 4 },
            mirror: self.mirror,
            disp: Vector::default(),
        };
        Trans {
            disp: -lin.apply_vector(self.disp),
            ..lin
        }
    }

    /// Linear part only
    pub fn linear(&self) -> Trans {
        Trans {
            disp: Vector::default(),
            ..*self
        }
    }
}

/// Orthogonal transformation with magnification:
/// `p' = mag * R(rot) * M(mirror) * p + disp`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ICplxTrans {
    pub trans: Trans,
    pub mag: f64,
}

impl Default for ICplxTrans {
    fn default() -> Self {
        Self {
            trans: Trans::identity(),
            mag: 1.0,
        }
    }
}

impl From<Trans> for ICplxTrans {
    fn from(trans: Trans) -> Self {
        Self { trans, mag: 1.0 }
    }
}

impl PartialEq for ICplxTrans {
    fn eq(&self, other: &Self) -> bool {
        self.trans == other.trans && self.mag_key() == other.mag_key()
    }
}

impl Eq for ICplxTrans {}

impl Hash for ICplxTrans {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trans.hash(state);
        self.mag_key().hash(state);
    }
}

impl PartialOrd for ICplxTrans {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ICplxTrans {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.trans, self.mag_key()).cmp(&(other.trans, other.mag_key()))
    }
}

impl ICplxTrans {
    pub fn new(trans: Trans, mag: f64) -> Self {
        Self { trans, mag }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    /// Pure magnification (e.g. a database unit conversion)
    pub fn magnification(mag: f64) -> Self {
        Self {
            trans: Trans::identity(),
            mag,
        }
    }

    /// Quantized magnification used for equality and hashing
    pub fn mag_key(&self) -> i64 {
        (self.mag / MAG_EPSILON).round() as i64
    }

    pub fn is_mag(&self) -> bool {
        (self.mag - 1.0).abs() > MAG_EPSILON
    }

    pub fn is_unity(&self) -> bool {
        !self.is_mag() && self.trans.is_unity()
    }

    pub fn is_mirror(&self) -> bool {
        self.trans.mirror
    }

    pub fn disp(&self) -> Vector {
        self.trans.disp
    }

    fn scale_vector(&self, v: Vector) -> Vector {
        if self.is_mag() {
            Vector::new(
                (v.x as f64 * self.mag).round() as Coord,
                (v.y as f64 * self.mag).round() as Coord,
            )
        } else {
            v
        }
    }

    pub fn apply_vector(&self, v: Vector) -> Vector {
        self.scale_vector(self.trans.apply_vector(v))
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(0, 0) + self.apply_vector(p.to_vector()) + self.trans.disp
    }

    /// Applies the transformation without rounding
    pub fn apply_f64(&self, x: f64, y: f64) -> (f64, f64) {
        let (x, y) = if self.trans.mirror { (x, -y) } else { (x, y) };
        let (x, y) = match self.trans.rot % 4 {
            0 => (x, y),
            1 => (-y, x),
            2 => (-x, -y),
            _ => (y, -x),
        };
        (
            x * self.mag + self.trans.disp.x as f64,
            y * self.mag + self.trans.disp.y as f64,
        )
    }

    pub fn apply_rect(&self, r: &Rect) -> Rect {
        if r.is_empty() || r.is_world() {
            return *r;
        }
        Rect::from_points(self.apply(r.p1()), self.apply(r.p2()))
    }

    /// `self * other`: applies `other` first
    pub fn concat(&self, other: &ICplxTrans) -> ICplxTrans {
        let lin = self.trans.linear().concat(&other.trans.linear());
        ICplxTrans {
            trans: Trans {
                disp: self.apply_vector(other.trans.disp) + self.trans.disp,
                ..lin
            },
            mag: self.mag * other.mag,
        }
    }

    pub fn concat_trans(&self, other: &Trans) -> ICplxTrans {
        self.concat(&ICplxTrans::from(*other))
    }

    pub fn inverted(&self) -> ICplxTrans {
        let inv = self.trans.inverted();
        let mag = 1.0 / self.mag;
        let d = inv.disp;
        ICplxTrans {
            trans: Trans {
                disp: Vector::new(
                    (d.x as f64 * mag).round() as Coord,
                    (d.y as f64 * mag).round() as Coord,
                ),
                ..inv
            },
            mag,
        }
    }

    /// Linear part plus magnification, without displacement
    pub fn linear(&self) -> ICplxTrans {
        ICplxTrans {
            trans: self.trans.linear(),
            mag: self.mag,
        }
    }

    /// Conjugates an instance transformation so that it maps between spaces
    /// transformed by this transformation's linear part: the result `t'`
    /// satisfies `L * t = t' * L` where `L` is `self.linear()`.
    pub fn conjugate(&self, t: &Trans) -> Trans {
        let lin = self.trans.linear();
        let rot_part = lin.concat(&t.linear()).concat(&lin.inverted());
        Trans {
            disp: self.linear().apply_vector(t.disp),
            ..rot_part
        }
    }
}
