//! Edge-to-edge check state machine
//!
//! Candidate violations are collected in pass 0. A second pass is run when
//! shielding or negative output is requested: it discards shielded
//! violations and feeds the pseudo edges of the violations back so that
//! negative (uncancelled) edge material can be computed per edge. The
//! surviving violations are flushed when `prepare_next_pass` returns false.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::geometry::{Edge, EdgePair};

use super::edge_bool::edge_not;
use super::relation::EdgeRelationFilter;

/// Identity of an edge's origin: polygon and layer. The layer's lowest bit
/// distinguishes first and second input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EdgeTag {
    pub polygon: usize,
    pub layer: u8,
}

impl EdgeTag {
    pub fn new(polygon: usize, layer: u8) -> Self {
        Self { polygon, layer }
    }

    fn parity(&self) -> u8 {
        self.layer & 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    /// Skip pairs of edges from the same polygon
    pub different_polygons: bool,
    /// Only pair edges of different layer parity
    pub different_layers: bool,
    pub shielded: bool,
    /// Mark the produced edge pairs symmetric
    pub symmetric_edges: bool,
    pub has_edge_pair_output: bool,
    pub has_negative_edge_output: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            different_polygons: false,
            different_layers: false,
            shielded: false,
            symmetric_edges: false,
            has_edge_pair_output: true,
            has_negative_edge_output: false,
        }
    }
}

/// Sink for check results
pub trait CheckOutput {
    fn put(&mut self, ep: &EdgePair, intra_polygon: bool);

    fn put_negative(&mut self, _edge: &Edge, _layer: u8) {}
}

/// Collects everything a check delivers
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckResults {
    pub edge_pairs: Vec<(EdgePair, bool)>,
    pub negative: Vec<(Edge, u8)>,
}

impl CheckOutput for CheckResults {
    fn put(&mut self, ep: &EdgePair, intra_polygon: bool) {
        self.edge_pairs.push((*ep, intra_polygon));
    }

    fn put_negative(&mut self, edge: &Edge, layer: u8) {
        self.negative.push((*edge, layer));
    }
}

#[derive(Debug)]
pub struct Edge2EdgeCheck<O> {
    filter: EdgeRelationFilter,
    options: CheckOptions,
    output: O,
    pass: u32,
    flushed: bool,
    ep: Vec<EdgePair>,
    intra: Vec<bool>,
    discarded: Vec<bool>,
    /// Edge -> `2 * violation index + side` (0 = first, 1 = second)
    e2ep: BTreeMap<(Edge, EdgeTag), Vec<usize>>,
    pseudo: BTreeSet<(Edge, EdgeTag)>,
    first_pseudo: usize,
}

impl<O: CheckOutput> Edge2EdgeCheck<O> {
    pub fn new(filter: EdgeRelationFilter, output: O, options: CheckOptions) -> Self {
        Self {
            filter,
            options,
            output,
            pass: 0,
            flushed: false,
            ep: Vec::new(),
            intra: Vec::new(),
            discarded: Vec::new(),
            e2ep: BTreeMap::new(),
            pseudo: BTreeSet::new(),
            first_pseudo: 0,
        }
    }

    pub fn filter(&self) -> &EdgeRelationFilter {
        &self.filter
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    pub fn pass(&self) -> u32 {
        self.pass
    }

    /// Pseudo edges collected in pass 0 (only with negative output)
    pub fn pseudo_edges(&self) -> impl Iterator<Item = &(Edge, EdgeTag)> + '_ {
        self.pseudo.iter()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    /// Forgets all collected state and starts over at pass 0
    pub fn reset(&mut self) {
        self.pass = 0;
        self.flushed = false;
        self.ep.clear();
        self.intra.clear();
        self.discarded.clear();
        self.e2ep.clear();
        self.pseudo.clear();
        self.first_pseudo = 0;
    }

    fn considered(&self, t1: EdgeTag, t2: EdgeTag) -> bool {
        (!self.options.different_polygons || t1 != t2)
            && (!self.options.different_layers || t1.parity() != t2.parity())
    }

    /// Evaluates the relation with the first-layer edge first and records a
    /// violation. Returns its index.
    fn record(&mut self, mut e1: Edge, mut t1: EdgeTag, mut e2: Edge, mut t2: EdgeTag) -> Option<usize> {
        if t1.parity() > t2.parity() {
            std::mem::swap(&mut e1, &mut e2);
            std::mem::swap(&mut t1, &mut t2);
        }
        let mut ep = self.filter.check(&e1, &e2)?;
        ep.symmetric = self.options.symmetric_edges;
        let n = self.ep.len();
        self.ep.push(ep);
        self.intra.push(t1 == t2);
        self.e2ep.entry((e1, t1)).or_default().push(2 * n);
        self.e2ep.entry((e2, t2)).or_default().push(2 * n + 1);
        Some(n)
    }

    /// Two edges interact
    pub fn add(&mut self, e1: &Edge, t1: EdgeTag, e2: &Edge, t2: EdgeTag) {
        if self.pass == 0 {
            if !self.considered(t1, t2) {
                return;
            }
            let Some(n) = self.record(*e1, t1, *e2, t2) else {
                return;
            };
            if self.options.has_negative_edge_output {
                let ep = self.ep[n];
                let pseudo = [
                    Edge::new(ep.first.p1, ep.second.p2),
                    Edge::new(ep.second.p1, ep.first.p2),
                ];
                for pe in pseudo.into_iter().filter(|e| !e.is_degenerate()) {
                    self.pseudo.insert((pe, t1));
                    self.pseudo.insert((pe, t2));
                }
            }
            return;
        }

        if self.options.shielded {
            self.discard_shielded(e1, t1, e2, t2);
            self.discard_shielded(e2, t2, e1, t1);
        }

        if self.options.has_negative_edge_output {
            let pseudo1 = self.pseudo.contains(&(*e1, t1));
            let pseudo2 = self.pseudo.contains(&(*e2, t2));
            if pseudo1 != pseudo2 && self.considered(t1, t2) {
                self.record(*e1, t1, *e2, t2);
            }
        }
    }

    /// Discards violations of `e1` not shared with `e2` that `e2` separates
    fn discard_shielded(&mut self, e1: &Edge, t1: EdgeTag, e2: &Edge, t2: EdgeTag) {
        if self.pseudo.contains(&(*e2, t2)) {
            return;
        }
        let n1 = self.live_violations(e1, t1);
        let n2 = self.live_violations(e2, t2);
        for n in n1.difference(&n2) {
            if shields(&self.ep[*n].normalized(), e2) {
                self.discarded[*n] = true;
            }
        }
    }

    fn live_violations(&self, e: &Edge, t: EdgeTag) -> BTreeSet<usize> {
        self.e2ep
            .get(&(*e, t))
            .into_iter()
            .flatten()
            .map(|v| v / 2)
            .filter(|n| *n < self.first_pseudo && !self.discarded[*n])
            .collect()
    }

    /// All interactions of `edge` have been delivered
    pub fn finish(&mut self, edge: &Edge, tag: EdgeTag) {
        if self.pass != 1 || !self.options.has_negative_edge_output || self.pseudo.contains(&(*edge, tag)) {
            return;
        }
        let parts: Vec<Edge> = self
            .e2ep
            .get(&(*edge, tag))
            .into_iter()
            .flatten()
            .filter(|v| !self.discarded.get(*v / 2).copied().unwrap_or(false))
            .map(|v| {
                let ep = &self.ep[v / 2];
                if v % 2 == 0 { ep.first } else { ep.second }
            })
            .collect();
        if parts.is_empty() {
            self.output.put_negative(edge, tag.parity());
        } else if !parts.contains(edge) {
            for rest in edge_not(edge, &parts) {
                self.output.put_negative(&rest, tag.parity());
            }
        }
    }

    /// Advances the state machine. Returns true if another pass over the
    /// edges is required; false once the violations have been delivered.
    pub fn prepare_next_pass(&mut self) -> bool {
        if self.flushed {
            return false;
        }
        self.pass += 1;
        if self.pass == 1 {
            self.first_pseudo = self.ep.len();
            self.discarded = vec![false; self.ep.len()];
            let shield_pass = self.options.shielded && self.options.has_edge_pair_output && !self.ep.is_empty();
            if shield_pass || self.options.has_negative_edge_output {
                return true;
            }
        }
        if self.options.has_edge_pair_output {
            for n in 0..self.first_pseudo {
                if !self.discarded[n] {
                    self.output.put(&self.ep[n], self.intra[n]);
                }
            }
        }
        self.flushed = true;
        false
    }
}

/// True if `q` cuts through both connecting edges of the violation `ep`
fn shields(ep: &EdgePair, q: &Edge) -> bool {
    let c1 = Edge::new(ep.first.p1, ep.second.p2);
    let c2 = Edge::new(ep.second.p1, ep.first.p2);
    match (c1.intersect_point(q), c2.intersect_point(q)) {
        (Some(i1), Some(i2)) => i1 != i2 || (c1.side_of(q.p1) != 0 && c2.side_of(q.p2) != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::check::relation::{EdgeRelation, Metrics};

    fn e(x1: i64, y1: i64, x2: i64, y2: i64) -> Edge {
        Edge::from_coords(x1, y1, x2, y2)
    }

    fn space(distance: i64, options: CheckOptions) -> Edge2EdgeCheck<CheckResults> {
        Edge2EdgeCheck::new(
            EdgeRelationFilter::new(EdgeRelation::Space, distance),
            CheckResults::default(),
            options,
        )
    }

    #[test]
    fn test_single_pass_flush() {
        let mut check = space(20, CheckOptions::default());
        let (a, b) = (e(0, 0, 100, 0), e(100, 10, 0, 10));
        check.add(&a, EdgeTag::new(0, 0), &b, EdgeTag::new(1, 0));
        assert!(check.output().edge_pairs.is_empty());
        assert!(!check.prepare_next_pass());
        let out = check.into_output();
        assert_eq!(out.edge_pairs.len(), 1);
        assert_eq!(out.edge_pairs[0].0.first, a);
        assert!(!out.edge_pairs[0].1);
    }

    #[test]
    fn test_layer_order_and_different_layers() {
        let options = CheckOptions {
            different_layers: true,
            ..CheckOptions::default()
        };
        let mut check = space(20, options);
        let (a, b) = (e(0, 0, 100, 0), e(100, 10, 0, 10));
        // second-layer edge delivered first
        check.add(&b, EdgeTag::new(1, 1), &a, EdgeTag::new(0, 0));
        // same layer parity: skipped
        check.add(&a, EdgeTag::new(0, 0), &b, EdgeTag::new(2, 2));
        assert!(!check.prepare_next_pass());
        let out = check.into_output();
        assert_eq!(out.edge_pairs.len(), 1);
        assert_eq!(out.edge_pairs[0].0.first, a);
        assert_eq!(out.edge_pairs[0].0.second, b);
    }

    #[test]
    fn test_different_polygons() {
        let options = CheckOptions {
            different_polygons: true,
            ..CheckOptions::default()
        };
        let mut check = space(20, options);
        let tag = EdgeTag::new(0, 0);
        check.add(&e(0, 0, 100, 0), tag, &e(100, 10, 0, 10), tag);
        assert!(!check.prepare_next_pass());
        assert!(check.output().edge_pairs.is_empty());
    }

    #[test]
    fn test_shielding() {
        let options = CheckOptions {
            shielded: true,
            ..CheckOptions::default()
        };
        let mut check = space(20, options);
        let (a, b, s) = (e(0, 0, 100, 0), e(100, 10, 0, 10), e(0, 5, 100, 5));
        let (ta, tb, ts) = (EdgeTag::new(0, 0), EdgeTag::new(1, 0), EdgeTag::new(2, 1));
        check.add(&a, ta, &b, tb);
        check.add(&a, ta, &s, ts);
        check.add(&b, tb, &s, ts);
        assert!(check.prepare_next_pass());
        assert_eq!(check.pass(), 1);
        check.add(&a, ta, &b, tb);
        check.add(&a, ta, &s, ts);
        check.add(&b, tb, &s, ts);
        assert!(!check.prepare_next_pass());
        let out = check.into_output();
        assert!(out.edge_pairs.iter().all(|(ep, _)| !(ep.first == a && ep.second == b)));
    }

    #[test]
    fn test_negative_remainder() {
        let options = CheckOptions {
            has_negative_edge_output: true,
            ..CheckOptions::default()
        };
        let mut check = Edge2EdgeCheck::new(
            EdgeRelationFilter::new(EdgeRelation::Space, 20).with_metrics(Metrics::Projection),
            CheckResults::default(),
            options,
        );
        let (a, b) = (e(0, 0, 100, 0), e(150, 10, 50, 10));
        let (ta, tb) = (EdgeTag::new(0, 0), EdgeTag::new(1, 0));
        check.add(&a, ta, &b, tb);
        assert!(check.pseudo_edges().count() > 0);
        assert!(check.prepare_next_pass());
        check.finish(&a, ta);
        check.finish(&b, tb);
        assert!(!check.prepare_next_pass());
        let out = check.into_output();
        assert_eq!(out.edge_pairs.len(), 1);
        assert!(out.negative.contains(&(e(0, 0, 50, 0), 0)));
        assert!(out.negative.contains(&(e(150, 10, 100, 10), 0)));
    }

    #[test]
    fn test_reset() {
        let mut check = space(20, CheckOptions::default());
        check.add(&e(0, 0, 100, 0), EdgeTag::new(0, 0), &e(100, 10, 0, 10), EdgeTag::new(1, 0));
        check.reset();
        assert_eq!(check.pass(), 0);
        assert!(!check.prepare_next_pass());
        assert!(check.output().edge_pairs.is_empty());
    }
}
