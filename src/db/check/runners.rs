//! Check runners on deep layers
//!
//! - Intra-polygon checks per cell of the working hierarchy (parallel)
//! - Flat checks of one layer or two layers against each other

use crate::db::cursor::RecursiveShapeIterator;
use crate::db::deep::DeepLayer;
use crate::db::geometry::{Edge, EdgePair, ICplxTrans, Polygon};
use crate::db::layout::{CellIndex, LayerIndex, Layout, Shape, ShapeEntry};
use crate::error::{DbError, DbResult};
use rayon::prelude::*;

use super::checker::{CheckResults, Edge2EdgeCheck, EdgeTag};
use super::poly_check::Poly2PolyCheck;
use super::settings::CheckSettings;

/// Result layers of a flat check
#[derive(Debug)]
pub struct FlatCheckOutput {
    pub edge_pairs: DeepLayer,
    /// Uncancelled edge parts of the first input, if requested
    pub negative: Option<DeepLayer>,
}

/// Checks every polygon of `input` against itself (width, notch). Runs per
/// cell of the working hierarchy, so the result stays hierarchical.
pub fn run_intra_polygon_check(input: &DeepLayer, settings: &CheckSettings) -> DbResult<DeepLayer> {
    let start = std::time::Instant::now();
    let threads = input.store()?.state().threads.max(1);

    let layer = input.layer();
    let cells: Vec<(CellIndex, Vec<Polygon>)> = input.with_layout(|l| {
        l.cell_indexes()
            .map(|ci| (ci, cell_polygons(l, ci, layer)))
            .filter(|(_, polys)| !polys.is_empty())
            .collect()
    })?;

    let filter = settings.filter();
    let mut options = settings.options();
    options.different_polygons = false;
    options.different_layers = false;
    options.has_negative_edge_output = false;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| DbError::WorkerPool(e.to_string()))?;

    let results: Vec<(CellIndex, Vec<EdgePair>)> = pool.install(|| {
        cells
            .par_iter()
            .map(|(ci, polys)| -> DbResult<(CellIndex, Vec<EdgePair>)> {
                let mut check = Edge2EdgeCheck::new(filter.clone(), CheckResults::default(), options);
                for (i, poly) in polys.iter().enumerate() {
                    Poly2PolyCheck::new(&mut check).single(poly, EdgeTag::new(i, 0))?;
                    check.reset();
                }
                let pairs = check.into_output().edge_pairs.into_iter().map(|(ep, _)| ep).collect();
                Ok((*ci, pairs))
            })
            .collect::<DbResult<Vec<_>>>()
    })?;

    let output = input.derived()?;
    let out_layer = output.layer();
    let count: usize = results.iter().map(|(_, p)| p.len()).sum();
    output.with_layout_mut(|l| {
        for (ci, pairs) in results {
            if let Some(shapes) = l.shapes_mut(ci, out_layer) {
                shapes.extend(pairs.into_iter().map(|ep| ShapeEntry::new(Shape::EdgePair(ep))));
            }
        }
    })?;

    log::info!(
        "[Check] Intra-polygon {:?} check on {} cells: {} violations in {:?}",
        settings.relation,
        cells.len(),
        count,
        start.elapsed()
    );
    Ok(output)
}

/// Flattens `input` (and `other`, as second layer) and checks all polygons
/// against each other. Results go into the top cell of `input`'s working
/// layout.
pub fn run_flat_check(
    input: &DeepLayer,
    other: Option<&DeepLayer>,
    settings: &CheckSettings,
) -> DbResult<FlatCheckOutput> {
    let start = std::time::Instant::now();
    let top = input.initial_cell()?;
    let dbu = input.with_layout(|l| l.dbu())?;
    let first = input.with_layout(|l| flat_polygons(l, top, input.layer(), &ICplxTrans::identity()))?;
    let second = match other {
        Some(o) => {
            let other_top = o.initial_cell()?;
            Some(o.with_layout(|l| {
                let scale = ICplxTrans::magnification(l.dbu() / dbu);
                flat_polygons(l, other_top, o.layer(), &scale)
            })?)
        }
        None => None,
    };

    let mut options = settings.options();
    options.different_layers = second.is_some();
    let mut check = Edge2EdgeCheck::new(settings.filter(), CheckResults::default(), options);
    {
        let mut pp = Poly2PolyCheck::new(&mut check);
        let mut index = 0;
        for (layer, polys) in std::iter::once((0u8, &first)).chain(second.iter().map(|p| (1u8, p))) {
            for poly in polys {
                pp.enter(poly, EdgeTag::new(index, layer));
                index += 1;
            }
        }
        pp.process();
    }
    let results = check.into_output();

    let edge_pairs = input.derived()?;
    let ep_layer = edge_pairs.layer();
    let count = results.edge_pairs.len();
    edge_pairs.with_layout_mut(|l| {
        if let Some(shapes) = l.shapes_mut(top, ep_layer) {
            shapes.extend(
                results
                    .edge_pairs
                    .iter()
                    .map(|(ep, _)| ShapeEntry::new(Shape::EdgePair(*ep))),
            );
        }
    })?;

    let negative = if settings.negative {
        let neg = input.derived()?;
        let neg_layer = neg.layer();
        let edges: Vec<Edge> = results
            .negative
            .iter()
            .filter(|(_, layer)| *layer == 0)
            .map(|(e, _)| *e)
            .collect();
        neg.with_layout_mut(|l| {
            if let Some(shapes) = l.shapes_mut(top, neg_layer) {
                shapes.extend(edges.into_iter().map(|e| ShapeEntry::new(Shape::Edge(e))));
            }
        })?;
        Some(neg)
    } else {
        None
    };

    log::info!(
        "[Check] Flat {:?} check ({} + {} polygons): {} violations in {:?}",
        settings.relation,
        first.len(),
        second.as_ref().map_or(0, Vec::len),
        count,
        start.elapsed()
    );
    Ok(FlatCheckOutput { edge_pairs, negative })
}

fn cell_polygons(layout: &Layout, cell: CellIndex, layer: LayerIndex) -> Vec<Polygon> {
    layout
        .shapes(cell, layer)
        .into_iter()
        .flat_map(|s| s.iter())
        .filter_map(|e| e.shape.to_polygon())
        .filter(|p| !p.is_empty())
        .collect()
}

fn flat_polygons(layout: &Layout, top: CellIndex, layer: LayerIndex, trans: &ICplxTrans) -> Vec<Polygon> {
    RecursiveShapeIterator::new(layout, top, layer)
        .iter()
        .filter_map(|s| s.transformed().to_polygon())
        .map(|p| if trans.is_unity() { p } else { p.transformed(trans) })
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::check::relation::EdgeRelation;
    use crate::db::deep::DeepShapeStore;
    use crate::db::geometry::{Rect, Trans, Vector};
    use crate::db::layout::{CellInstArray, LayerInfo};

    /// TOP holds two instances of A (100 x 10 box), 15 apart vertically
    fn sample() -> (Layout, CellIndex, LayerIndex) {
        let mut ly = Layout::new();
        let l = ly.insert_layer(LayerInfo::new("M1"));
        let top = ly.add_cell("TOP");
        let a = ly.add_cell("A");
        if let Some(s) = ly.shapes_mut(a, l) {
            s.insert(Shape::Box(Rect::new(0, 0, 100, 10)));
        }
        ly.insert_instance(top, CellInstArray::new(a, Trans::displacement(Vector::new(0, 0))));
        ly.insert_instance(top, CellInstArray::new(a, Trans::displacement(Vector::new(0, 25))));
        (ly, top, l)
    }

    #[test]
    fn test_intra_polygon_width_is_hierarchical() {
        let (ly, top, l) = sample();
        let store = DeepShapeStore::new();
        store.set_threads(2);
        let cursor = RecursiveShapeIterator::new(&ly, top, l);
        let dl = store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("deep layer");
        let out = run_intra_polygon_check(&dl, &CheckSettings::new(EdgeRelation::Width, 20))
            .expect("check");
        // one marker in A, none in TOP
        let counts = out
            .with_layout(|l| (l.shape_count(out.layer()), l.cells_count()))
            .expect("layout");
        assert_eq!(counts.0, 1);
        assert_eq!(counts.1, 2);
    }

    #[test]
    fn test_flat_space_check() {
        let (ly, top, l) = sample();
        let store = DeepShapeStore::new();
        let cursor = RecursiveShapeIterator::new(&ly, top, l);
        let dl = store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("deep layer");
        let mut settings = CheckSettings::new(EdgeRelation::Space, 20);
        settings.different_polygons = true;
        settings.negative = true;
        let out = run_flat_check(&dl, None, &settings).expect("check");
        let n = out.edge_pairs.with_layout(|l| l.shape_count(out.edge_pairs.layer())).expect("layout");
        assert_eq!(n, 1);
        let neg = out.negative.expect("negative layer");
        // all edges but the two facing ones survive completely
        let n = neg.with_layout(|l| l.shape_count(neg.layer())).expect("layout");
        assert_eq!(n, 6);
    }
}
