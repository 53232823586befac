//! Scanline trapezoid decomposition
//!
//! Merges a set of polygons (non-zero winding) and decomposes the union into
//! horizontal trapezoids. Each trapezoid is represented by its bounding box,
//! which makes the result a set of interior-disjoint rectangles covering the
//! merged area. Rectangles stacked on top of each other with identical x
//! extents are coalesced.

use super::edge::Edge;
use super::polygon::Polygon;
use super::types::{Coord, Rect};
use std::collections::BTreeMap;

struct ScanEdge {
    edge: Edge,
    /// +1 for upward edges, -1 for downward ones
    dir: i32,
}

impl ScanEdge {
    fn x_at(&self, y: f64) -> f64 {
        let e = &self.edge;
        let (x1, y1, x2, y2) = (e.p1.x as f64, e.p1.y as f64, e.p2.x as f64, e.p2.y as f64);
        x1 + (y - y1) * (x2 - x1) / (y2 - y1)
    }

    fn y_min(&self) -> Coord {
        self.edge.p1.y.min(self.edge.p2.y)
    }

    fn y_max(&self) -> Coord {
        self.edge.p1.y.max(self.edge.p2.y)
    }
}

/// Decomposes the union of `polygons` into interior-disjoint rectangles
pub fn decompose_to_boxes(polygons: &[Polygon]) -> Vec<Rect> {
    let edges: Vec<ScanEdge> = polygons
        .iter()
        .flat_map(|p| p.edges())
        .filter(|e| e.dy() != 0)
        .map(|e| ScanEdge {
            edge: e,
            dir: if e.dy() > 0 { 1 } else { -1 },
        })
        .collect();

    if edges.is_empty() {
        return Vec::new();
    }

    // band boundaries: all vertex heights plus crossing heights
    let mut ys: Vec<Coord> = edges
        .iter()
        .flat_map(|e| [e.edge.p1.y, e.edge.p2.y])
        .collect();
    for i in 0..edges.len() {
        for j in (i + 1)..edges.len() {
            let (a, b) = (&edges[i].edge, &edges[j].edge);
            if a.is_parallel(b) || !a.intersects(b) {
                continue;
            }
            let d1 = a.d();
            let d2 = b.d();
            let t = (b.p1 - a.p1).cross(&d2) as f64 / d1.cross(&d2) as f64;
            let y = a.p1.y as f64 + t * d1.y as f64;
            ys.push(y.floor() as Coord);
            ys.push(y.ceil() as Coord);
        }
    }
    ys.sort_unstable();
    ys.dedup();

    let mut result = Vec::new();
    // open boxes from the previous band keyed by their x extent
    let mut open: BTreeMap<(Coord, Coord), Rect> = BTreeMap::new();

    for band in ys.windows(2) {
        let (y0, y1) = (band[0], band[1]);
        let ym = (y0 as f64 + y1 as f64) * 0.5;

        let mut active: Vec<(f64, f64, f64, i32)> = edges
            .iter()
            .filter(|e| e.y_min() <= y0 && e.y_max() >= y1)
            .map(|e| (e.x_at(ym), e.x_at(y0 as f64), e.x_at(y1 as f64), e.dir))
            .collect();
        active.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut current: Vec<Rect> = Vec::new();
        let mut wc = 0;
        let mut start: Option<(f64, f64)> = None;
        for (_, xb, xt, dir) in active {
            let was_inside = wc != 0;
            wc += dir;
            let is_inside = wc != 0;
            if !was_inside && is_inside {
                start = Some((xb, xt));
            } else if was_inside && !is_inside {
                if let Some((sb, st)) = start.take() {
                    let left = sb.min(st).floor() as Coord;
                    let right = xb.max(xt).ceil() as Coord;
                    if right > left {
                        current.push(Rect::new(left, y0, right, y1));
                    }
                }
            }
        }

        // coalesce with boxes of the previous band
        let mut next_open = BTreeMap::new();
        for r in current {
            let key = (r.left, r.right);
            match open.remove(&key) {
                Some(prev) if prev.top == r.bottom => {
                    next_open.insert(key, Rect::new(prev.left, prev.bottom, r.right, r.top));
                }
                Some(prev) => {
                    result.push(prev);
                    next_open.insert(key, r);
                }
                None => {
                    next_open.insert(key, r);
                }
            }
        }
        result.extend(open.into_values());
        open = next_open;
    }
    result.extend(open.into_values());
    result.sort();
    result
}
