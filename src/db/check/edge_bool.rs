//! Edge boolean NOT

use crate::db::geometry::{Edge, Point};

/// The parts of `edge` not covered by any collinear edge of `others`.
///
/// The pieces keep the direction of `edge`. Non-collinear edges of `others`
/// are ignored.
pub fn edge_not(edge: &Edge, others: &[Edge]) -> Vec<Edge> {
    if edge.is_degenerate() {
        return Vec::new();
    }
    let d = edge.d();
    let len2 = d.dot(&d);
    let param = |p: Point| d.dot(&(p - edge.p1));

    // covered parameter ranges, with the points bounding them
    let mut covered: Vec<((i128, Point), (i128, Point))> = others
        .iter()
        .filter(|o| !o.is_degenerate() && edge.is_collinear(o))
        .filter_map(|o| {
            let (mut lo, mut hi) = ((param(o.p1), o.p1), (param(o.p2), o.p2));
            if hi.0 < lo.0 {
                std::mem::swap(&mut lo, &mut hi);
            }
            if lo.0 < 0 {
                lo = (0, edge.p1);
            }
            if hi.0 > len2 {
                hi = (len2, edge.p2);
            }
            (hi.0 > lo.0).then_some((lo, hi))
        })
        .collect();
    covered.sort_by_key(|(lo, _)| lo.0);

    let mut result = Vec::new();
    let mut pos = (0i128, edge.p1);
    for (lo, hi) in covered {
        if lo.0 > pos.0 {
            result.push(Edge::new(pos.1, lo.1));
        }
        if hi.0 > pos.0 {
            pos = hi;
        }
    }
    if pos.0 < len2 {
        result.push(Edge::new(pos.1, edge.p2));
    }
    result
}
