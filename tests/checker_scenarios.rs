//! Edge-to-edge checker scenarios
//!
//! Canonical ordering, shielding, negative output and two-layer checks,
//! driven through the polygon-level entry point.

use deep_layout::db::check::{
    CheckOptions, CheckResults, Edge2EdgeCheck, EdgeRelation, EdgeRelationFilter, EdgeTag, Metrics,
    Poly2PolyCheck,
};
use deep_layout::db::geometry::{Edge, Polygon, Rect};

fn e(x1: i64, y1: i64, x2: i64, y2: i64) -> Edge {
    Edge::from_coords(x1, y1, x2, y2)
}

fn run_edges(filter: EdgeRelationFilter, options: CheckOptions, edges: &[(Edge, EdgeTag)]) -> CheckResults {
    let mut check = Edge2EdgeCheck::new(filter, CheckResults::default(), options);
    let mut pp = Poly2PolyCheck::new(&mut check);
    for (edge, tag) in edges {
        pp.enter_edge(*edge, *tag);
    }
    pp.process();
    check.into_output()
}

#[test]
fn test_unit_spaced_edges_canonical_order() {
    let a = e(0, 0, 100, 0);
    let b = e(100, 1, 0, 1);
    // second-layer edge entered first
    let out = run_edges(
        EdgeRelationFilter::new(EdgeRelation::Space, 2),
        CheckOptions::default(),
        &[(b, EdgeTag::new(1, 1)), (a, EdgeTag::new(0, 0))],
    );
    assert_eq!(out.edge_pairs.len(), 1);
    let (ep, intra) = out.edge_pairs[0];
    assert_eq!(ep.first, a);
    assert_eq!(ep.second, b);
    assert!(!intra);
}

#[test]
fn test_shield_suppresses_violation() {
    let a = e(0, 0, 100, 0);
    let b = e(100, 4, 0, 4);
    let shield = e(-10, 2, 110, 2);
    let edges = [
        (a, EdgeTag::new(0, 0)),
        (b, EdgeTag::new(1, 0)),
        (shield, EdgeTag::new(2, 1)),
    ];
    let filter = EdgeRelationFilter::new(EdgeRelation::Space, 5);

    let plain = run_edges(filter.clone(), CheckOptions::default(), &edges);
    assert!(plain.edge_pairs.iter().any(|(ep, _)| ep.first == a && ep.second == b));

    let options = CheckOptions {
        shielded: true,
        ..CheckOptions::default()
    };
    let shielded = run_edges(filter, options, &edges);
    assert!(!shielded.edge_pairs.iter().any(|(ep, _)| ep.first == a && ep.second == b));
    assert!(shielded.edge_pairs.len() < plain.edge_pairs.len());
}

#[test]
fn test_partial_shield_keeps_violation() {
    let a = e(0, 0, 100, 0);
    let b = e(100, 4, 0, 4);
    // covers only half of the gap
    let shield = e(-10, 2, 50, 2);
    let edges = [
        (a, EdgeTag::new(0, 0)),
        (b, EdgeTag::new(1, 0)),
        (shield, EdgeTag::new(2, 1)),
    ];
    let options = CheckOptions {
        shielded: true,
        ..CheckOptions::default()
    };
    let out = run_edges(EdgeRelationFilter::new(EdgeRelation::Space, 5), options, &edges);
    assert!(out.edge_pairs.iter().any(|(ep, _)| ep.first == a && ep.second == b));
}

#[test]
fn test_negative_output_conserves_edge() {
    let a = e(0, 0, 100, 0);
    let b = e(150, 10, 50, 10);
    let options = CheckOptions {
        has_negative_edge_output: true,
        ..CheckOptions::default()
    };
    let filter = EdgeRelationFilter::new(EdgeRelation::Space, 20).with_metrics(Metrics::Projection);
    let out = run_edges(filter, options, &[(a, EdgeTag::new(0, 0)), (b, EdgeTag::new(1, 0))]);

    assert_eq!(out.edge_pairs.len(), 1);
    let cancelled = out.edge_pairs[0].0.first;
    let remainder: Vec<Edge> = out
        .negative
        .iter()
        .map(|(edge, _)| *edge)
        .filter(|edge| edge.is_collinear(&a) && edge.p1.y == 0)
        .collect();
    assert_eq!(remainder, vec![e(0, 0, 50, 0)]);
    // remainder and cancelled part reconstruct the edge
    assert_eq!(remainder[0].p1, a.p1);
    assert_eq!(remainder[0].p2, cancelled.p1);
    assert_eq!(cancelled.p2, a.p2);
    assert!(out.negative.contains(&(e(150, 10, 100, 10), 0)));
}

#[test]
fn test_negative_without_violations_reports_whole_edges() {
    let options = CheckOptions {
        has_negative_edge_output: true,
        ..CheckOptions::default()
    };
    let edges = [(e(0, 0, 100, 0), EdgeTag::new(0, 0)), (e(100, 50, 0, 50), EdgeTag::new(1, 0))];
    let out = run_edges(EdgeRelationFilter::new(EdgeRelation::Space, 20), options, &edges);
    assert!(out.edge_pairs.is_empty());
    assert_eq!(out.negative.len(), 2);
}

#[test]
fn test_enclosure_between_layers() {
    let filter = EdgeRelationFilter::new(EdgeRelation::Inside, 10).with_metrics(Metrics::Projection);
    let options = CheckOptions {
        different_layers: true,
        ..CheckOptions::default()
    };
    let mut check = Edge2EdgeCheck::new(filter, CheckResults::default(), options);
    let mut pp = Poly2PolyCheck::new(&mut check);
    // enclosed by 5 on the left, by 50 elsewhere
    pp.enter(&Polygon::from_rect(&Rect::new(5, 50, 50, 100)), EdgeTag::new(0, 0));
    pp.enter(&Polygon::from_rect(&Rect::new(0, 0, 100, 150)), EdgeTag::new(1, 1));
    pp.process();
    let out = check.into_output();
    assert_eq!(out.edge_pairs.len(), 1);
    let ep = out.edge_pairs[0].0;
    assert_eq!(ep.first, e(5, 50, 5, 100));
    assert_eq!(ep.second, e(0, 50, 0, 100));
}

#[test]
fn test_symmetric_width_pairs() {
    let filter = EdgeRelationFilter::new(EdgeRelation::Width, 20);
    let options = CheckOptions {
        symmetric_edges: true,
        ..CheckOptions::default()
    };
    let mut check = Edge2EdgeCheck::new(filter, CheckResults::default(), options);
    Poly2PolyCheck::new(&mut check)
        .single(&Polygon::from_rect(&Rect::new(0, 0, 10, 100)), EdgeTag::new(0, 0))
        .expect("single polygon check");
    let out = check.into_output();
    assert_eq!(out.edge_pairs.len(), 1);
    assert!(out.edge_pairs[0].0.symmetric);
    assert!(out.edge_pairs[0].1);
}
