//! Polygon-level driver for the edge-to-edge check

use crate::db::geometry::{Bounded, Edge, Polygon};
use crate::error::{DbError, DbResult};

use super::checker::{CheckOutput, Edge2EdgeCheck, EdgeTag};
use super::scanner::{BoxScanner, ScannerReceiver};

/// Collects polygon edges and runs them through the check passes
pub struct Poly2PolyCheck<'c, O> {
    check: &'c mut Edge2EdgeCheck<O>,
    edges: Vec<(Edge, EdgeTag)>,
}

struct Feed<'a, O>(&'a mut Edge2EdgeCheck<O>);

impl<O: CheckOutput> ScannerReceiver<(Edge, EdgeTag)> for Feed<'_, O> {
    fn add(&mut self, a: &(Edge, EdgeTag), b: &(Edge, EdgeTag)) {
        self.0.add(&a.0, a.1, &b.0, b.1);
    }

    fn finish(&mut self, a: &(Edge, EdgeTag)) {
        self.0.finish(&a.0, a.1);
    }
}

impl<'c, O: CheckOutput> Poly2PolyCheck<'c, O> {
    pub fn new(check: &'c mut Edge2EdgeCheck<O>) -> Self {
        Self {
            check,
            edges: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.edges.clear();
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn enter(&mut self, polygon: &Polygon, tag: EdgeTag) {
        self.edges
            .extend(polygon.edges().filter(|e| !e.is_degenerate()).map(|e| (e, tag)));
    }

    pub fn enter_edge(&mut self, edge: Edge, tag: EdgeTag) {
        if !edge.is_degenerate() {
            self.edges.push((edge, tag));
        }
    }

    /// Checks a polygon against itself
    pub fn single(&mut self, polygon: &Polygon, tag: EdgeTag) -> DbResult<()> {
        let options = self.check.options();
        if options.different_polygons || options.different_layers {
            return Err(DbError::SingleCheckNotAllowed);
        }
        self.clear();
        self.enter(polygon, tag);
        self.process();
        Ok(())
    }

    /// Runs all passes until the check has delivered its output
    pub fn process(&mut self) {
        let enl = self.check.filter().enlargement();
        loop {
            let mut scanner = BoxScanner::new();
            for (e, t) in &self.edges {
                scanner.insert(e.bbox(), (*e, *t));
            }
            if self.check.pass() > 0 {
                for (e, t) in self.check.pseudo_edges() {
                    scanner.insert(e.bbox(), (*e, *t));
                }
            }
            scanner.process(&mut Feed(&mut *self.check), enl);
            if !self.check.prepare_next_pass() {
                break;
            }
        }
    }
}
