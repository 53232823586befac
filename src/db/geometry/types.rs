//! Core geometric primitives in integer database units
//!
//! Points, vectors and axis-aligned rectangles. All coordinates are integers
//! (`Coord`); floating point only appears in derived quantities like lengths.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Integer coordinate in database units
pub type Coord = i64;

/// Half extent of the "world" rectangle. Kept well below `i64::MAX` so that
/// translations and area computations of world-sized boxes cannot overflow.
pub const WORLD_EXTENT: Coord = 1 << 40;

/// A 2D point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

/// A 2D displacement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Vector {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Point from floating-point coordinates, rounded to the nearest grid point
    pub fn from_f64(x: f64, y: f64) -> Self {
        Self {
            x: x.round() as Coord,
            y: y.round() as Coord,
        }
    }

    pub fn to_vector(self) -> Vector {
        Vector::new(self.x, self.y)
    }

    pub fn distance(&self, other: &Point) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Vector {
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f64 {
        ((self.x as f64).powi(2) + (self.y as f64).powi(2)).sqrt()
    }

    /// Cross product (z component), computed in i128 to stay exact
    pub fn cross(&self, other: &Vector) -> i128 {
        self.x as i128 * other.y as i128 - self.y as i128 * other.x as i128
    }

    pub fn dot(&self, other: &Vector) -> i128 {
        self.x as i128 * other.x as i128 + self.y as i128 * other.y as i128
    }
}

impl Add<Vector> for Point {
    type Output = Point;
    fn add(self, v: Vector) -> Point {
        Point::new(self.x + v.x, self.y + v.y)
    }
}

impl Sub<Vector> for Point {
    type Output = Point;
    fn sub(self, v: Vector) -> Point {
        Point::new(self.x - v.x, self.y - v.y)
    }
}

impl Sub<Point> for Point {
    type Output = Vector;
    fn sub(self, p: Point) -> Vector {
        Vector::new(self.x - p.x, self.y - p.y)
    }
}

impl Add for Vector {
    type Output = Vector;
    fn add(self, v: Vector) -> Vector {
        Vector::new(self.x + v.x, self.y + v.y)
    }
}

impl Sub for Vector {
    type Output = Vector;
    fn sub(self, v: Vector) -> Vector {
        Vector::new(self.x - v.x, self.y - v.y)
    }
}

impl Neg for Vector {
    type Output = Vector;
    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y)
    }
}

impl Mul<Coord> for Vector {
    type Output = Vector;
    fn mul(self, f: Coord) -> Vector {
        Vector::new(self.x * f, self.y * f)
    }
}

/// Axis-aligned rectangle with closed boundaries.
///
/// The empty rectangle is represented by `left > right`; all operations treat
/// it as the neutral element of `extend` and the absorbing element of
/// `intersection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rect {
    pub left: Coord,
    pub bottom: Coord,
    pub right: Coord,
    pub top: Coord,
}

impl Default for Rect {
    fn default() -> Self {
        Self::empty()
    }
}

impl Rect {
    /// Rectangle from any two corners
    pub fn new(x1: Coord, y1: Coord, x2: Coord, y2: Coord) -> Self {
        Self {
            left: x1.min(x2),
            bottom: y1.min(y2),
            right: x1.max(x2),
            top: y1.max(y2),
        }
    }

    pub fn from_points(p1: Point, p2: Point) -> Self {
        Self::new(p1.x, p1.y, p2.x, p2.y)
    }

    pub const fn empty() -> Self {
        Self {
            left: 1,
            bottom: 1,
            right: -1,
            top: -1,
        }
    }

    pub const fn world() -> Self {
        Self {
            left: -WORLD_EXTENT,
            bottom: -WORLD_EXTENT,
            right: WORLD_EXTENT,
            top: WORLD_EXTENT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left > self.right || self.bottom > self.top
    }

    pub fn is_world(&self) -> bool {
        *self == Self::world()
    }

    pub fn width(&self) -> Coord {
        if self.is_empty() { 0 } else { self.right - self.left }
    }

    pub fn height(&self) -> Coord {
        if self.is_empty() { 0 } else { self.top - self.bottom }
    }

    /// Area as f64 (world-sized boxes would overflow integer arithmetic)
    pub fn area(&self) -> f64 {
        self.width() as f64 * self.height() as f64
    }

    pub fn p1(&self) -> Point {
        Point::new(self.left, self.bottom)
    }

    pub fn p2(&self) -> Point {
        Point::new(self.right, self.top)
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.left + (self.right - self.left) / 2,
            self.bottom + (self.top - self.bottom) / 2,
        )
    }

    pub fn contains(&self, p: Point) -> bool {
        !self.is_empty()
            && p.x >= self.left
            && p.x <= self.right
            && p.y >= self.bottom
            && p.y <= self.top
    }

    /// True if `other` lies completely inside this rectangle (boundaries included)
    pub fn contains_rect(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && other.left >= self.left
            && other.right <= self.right
            && other.bottom >= self.bottom
            && other.top <= self.top
    }

    /// Closed intersection test: shared boundaries count as interaction
    pub fn touches(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left <= other.right
            && other.left <= self.right
            && self.bottom <= other.top
            && other.bottom <= self.top
    }

    /// Open intersection test: the common area must be non-zero
    pub fn overlaps(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.left < other.right
            && other.left < self.right
            && self.bottom < other.top
            && other.bottom < self.top
    }

    /// Interaction test used by region queries: `overlaps` in overlapping
    /// mode, `touches` otherwise. Degenerate boxes (lines, points) have no
    /// area to overlap with and always use the touching test.
    pub fn interacts(&self, other: &Rect, overlapping: bool) -> bool {
        let degenerate = |r: &Rect| r.width() == 0 || r.height() == 0;
        if overlapping && !degenerate(self) && !degenerate(other) {
            self.overlaps(other)
        } else {
            self.touches(other)
        }
    }

    pub fn intersection(&self, other: &Rect) -> Rect {
        if self.is_empty() || other.is_empty() {
            return Rect::empty();
        }
        let r = Rect {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        };
        if r.is_empty() { Rect::empty() } else { r }
    }

    pub fn extended(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }

    pub fn extend_point(&mut self, p: Point) {
        if self.is_empty() {
            *self = Rect::new(p.x, p.y, p.x, p.y);
        } else {
            self.left = self.left.min(p.x);
            self.bottom = self.bottom.min(p.y);
            self.right = self.right.max(p.x);
            self.top = self.top.max(p.y);
        }
    }

    pub fn enlarged(&self, dx: Coord, dy: Coord) -> Rect {
        if self.is_empty() || self.is_world() {
            return *self;
        }
        let r = Rect {
            left: self.left - dx,
            bottom: self.bottom - dy,
            right: self.right + dx,
            top: self.top + dy,
        };
        if r.is_empty() { Rect::empty() } else { r }
    }

    pub fn moved(&self, v: Vector) -> Rect {
        if self.is_empty() || self.is_world() {
            return *self;
        }
        Rect {
            left: self.left + v.x,
            bottom: self.bottom + v.y,
            right: self.right + v.x,
            top: self.top + v.y,
        }
    }

    /// Corner points in clockwise order starting at the lower left
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.left, self.bottom),
            Point::new(self.left, self.top),
            Point::new(self.right, self.top),
            Point::new(self.right, self.bottom),
        ]
    }

    /// Envelope for R-tree queries
    pub fn envelope(&self) -> rstar::AABB<[Coord; 2]> {
        rstar::AABB::from_corners([self.left, self.bottom], [self.right, self.top])
    }
}

/// Anything with a bounding box
pub trait Bounded {
    fn bbox(&self) -> Rect;
}

impl Bounded for Rect {
    fn bbox(&self) -> Rect {
        *self
    }
}

impl Bounded for Point {
    fn bbox(&self) -> Rect {
        Rect::new(self.x, self.y, self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_vs_overlap() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        assert!(a.touches(&b));
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&Rect::new(5, 5, 15, 15)));
        assert!(!a.touches(&Rect::empty()));
    }

    #[test]
    fn test_intersection_and_extend() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 15, 5);
        assert_eq!(a.intersection(&b), Rect::new(5, 0, 10, 5));
        assert!(a.intersection(&Rect::new(20, 20, 30, 30)).is_empty());
        assert_eq!(Rect::empty().extended(&a), a);
        assert_eq!(a.extended(&b), Rect::new(0, -5, 15, 10));
    }

    #[test]
    fn test_world_is_stable() {
        let w = Rect::world();
        assert!(w.moved(Vector::new(100, 100)).is_world());
        assert!(w.contains_rect(&Rect::new(-1000, -1000, 1000, 1000)));
    }
}
