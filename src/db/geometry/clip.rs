//! Clipping and splitting
//!
//! Polygon clipping uses Sutherland-Hodgman against the four sides of the
//! clip rectangle, edges use Liang-Barsky. Both round intersection points to
//! the grid.

use super::edge::Edge;
use super::polygon::Polygon;
use super::types::{Bounded, Point, Rect};

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
    Bottom,
    Top,
}

fn inside(p: Point, side: Side, r: &Rect) -> bool {
    match side {
        Side::Left => p.x >= r.left,
        Side::Right => p.x <= r.right,
        Side::Bottom => p.y >= r.bottom,
        Side::Top => p.y <= r.top,
    }
}

fn cut(a: Point, b: Point, side: Side, r: &Rect) -> Point {
    let (ax, ay, bx, by) = (a.x as f64, a.y as f64, b.x as f64, b.y as f64);
    match side {
        Side::Left | Side::Right => {
            let x = if matches!(side, Side::Left) { r.left } else { r.right };
            let t = (x as f64 - ax) / (bx - ax);
            Point::new(x, (ay + t * (by - ay)).round() as i64)
        }
        Side::Bottom | Side::Top => {
            let y = if matches!(side, Side::Bottom) { r.bottom } else { r.top };
            let t = (y as f64 - ay) / (by - ay);
            Point::new((ax + t * (bx - ax)).round() as i64, y)
        }
    }
}

fn clip_ring(ring: &[Point], r: &Rect) -> Vec<Point> {
    let mut output: Vec<Point> = ring.to_vec();
    for side in [Side::Left, Side::Right, Side::Bottom, Side::Top] {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let n = input.len();
        for i in 0..n {
            let cur = input[i];
            let prev = input[(i + n - 1) % n];
            let cur_in = inside(cur, side, r);
            let prev_in = inside(prev, side, r);
            if cur_in {
                if !prev_in {
                    output.push(cut(prev, cur, side, r));
                }
                output.push(cur);
            } else if prev_in {
                output.push(cut(prev, cur, side, r));
            }
        }
    }
    output
}

/// Clips a polygon to a rectangle. Returns `None` if nothing remains.
pub fn clip_polygon(poly: &Polygon, r: &Rect) -> Option<Polygon> {
    if poly.is_empty() || r.is_empty() {
        return None;
    }
    let bb = poly.bbox();
    if r.contains_rect(&bb) {
        return Some(poly.clone());
    }
    if !r.overlaps(&bb) {
        return None;
    }
    let hull = clip_ring(poly.hull(), r);
    let holes: Vec<Vec<Point>> = poly
        .holes()
        .iter()
        .map(|h| clip_ring(h, r))
        .filter(|h| h.len() >= 3)
        .collect();
    let clipped = Polygon::with_holes(hull, holes);
    if clipped.is_empty() || clipped.area2() <= 0 {
        None
    } else {
        Some(clipped)
    }
}

/// Clips an edge to a rectangle (boundaries included). Degenerate results
/// are dropped unless the input edge was degenerate itself.
pub fn clip_edge(e: &Edge, r: &Rect) -> Option<Edge> {
    if r.is_empty() || !r.touches(&e.bbox()) {
        return None;
    }
    if r.contains_rect(&e.bbox()) {
        return Some(*e);
    }
    let (x0, y0) = (e.p1.x as f64, e.p1.y as f64);
    let (dx, dy) = (e.dx() as f64, e.dy() as f64);
    let mut t0 = 0.0f64;
    let mut t1 = 1.0f64;
    let checks = [
        (-dx, x0 - r.left as f64),
        (dx, r.right as f64 - x0),
        (-dy, y0 - r.bottom as f64),
        (dy, r.top as f64 - y0),
    ];
    for (p, q) in checks {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let t = q / p;
            if p < 0.0 {
                t0 = t0.max(t);
            } else {
                t1 = t1.min(t);
            }
        }
    }
    if t0 > t1 {
        return None;
    }
    let clipped = Edge::new(e.at(t0), e.at(t1));
    if clipped.is_degenerate() && !e.is_degenerate() {
        None
    } else {
        Some(clipped)
    }
}

/// Splits a polygon into two halves at the center of its bounding box,
/// cutting across the longer dimension
pub fn split_polygon(poly: &Polygon) -> Vec<Polygon> {
    let bb = poly.bbox();
    if bb.is_empty() {
        return Vec::new();
    }
    let c = bb.center();
    let (a, b) = if bb.width() >= bb.height() {
        (
            Rect::new(bb.left, bb.bottom, c.x, bb.top),
            Rect::new(c.x, bb.bottom, bb.right, bb.top),
        )
    } else {
        (
            Rect::new(bb.left, bb.bottom, bb.right, c.y),
            Rect::new(bb.left, c.y, bb.right, bb.top),
        )
    };
    [a, b]
        .iter()
        .filter_map(|r| clip_polygon(poly, r))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_triangle() {
        let tri = Polygon::new(vec![Point::new(0, 0), Point::new(20, 0), Point::new(0, 20)]);
        let c = clip_polygon(&tri, &Rect::new(0, 0, 10, 10)).expect("clipped polygon");
        // the corner (10,10) lies on the hypotenuse, so the result is a full square
        assert!(c.is_box());
        assert_eq!(c.area(), 100.0);
        assert!(clip_polygon(&tri, &Rect::new(30, 30, 40, 40)).is_none());
    }

    #[test]
    fn test_clip_edge() {
        let e = Edge::from_coords(-10, 5, 20, 5);
        assert_eq!(
            clip_edge(&e, &Rect::new(0, 0, 10, 10)),
            Some(Edge::from_coords(0, 5, 10, 5))
        );
        assert_eq!(clip_edge(&e, &Rect::new(0, 6, 10, 10)), None);
    }

    #[test]
    fn test_split_preserves_area() {
        let p = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 10),
            Point::new(10, 10),
            Point::new(10, 100),
            Point::new(0, 100),
        ]);
        let parts = split_polygon(&p);
        assert_eq!(parts.len(), 2);
        let total: i128 = parts.iter().map(|p| p.area2()).sum();
        assert_eq!(total, p.area2());
    }
}
