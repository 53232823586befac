//! Deep shape store lifecycle tests
//!
//! Reference counting, working layout reuse, state stack, flat layers and
//! delivery of results back into the source layout.

use deep_layout::db::cursor::RecursiveShapeIterator;
use deep_layout::db::deep::DeepShapeStore;
use std::collections::BTreeSet;

use deep_layout::db::geometry::{Bounded, ICplxTrans, Rect, Trans, Vector};
use deep_layout::db::layout::{CellIndex, CellInstArray, LayerIndex, LayerInfo, Layout, Shape, Shapes};
use deep_layout::DbError;

/// TOP: box on M1 and M2, two instances of A. A: box on M1.
fn source() -> (Layout, CellIndex, CellIndex, LayerIndex, LayerIndex) {
    let mut ly = Layout::new();
    let m1 = ly.insert_layer(LayerInfo::new("M1"));
    let m2 = ly.insert_layer(LayerInfo::new("M2"));
    let top = ly.add_cell("TOP");
    let a = ly.add_cell("A");
    if let Some(s) = ly.shapes_mut(top, m1) {
        s.insert(Shape::Box(Rect::new(0, 0, 50, 50)));
    }
    if let Some(s) = ly.shapes_mut(top, m2) {
        s.insert(Shape::Box(Rect::new(0, 0, 20, 20)));
    }
    if let Some(s) = ly.shapes_mut(a, m1) {
        s.insert(Shape::Box(Rect::new(0, 0, 10, 10)));
    }
    ly.insert_instance(top, CellInstArray::new(a, Trans::displacement(Vector::new(100, 0))));
    ly.insert_instance(top, CellInstArray::new(a, Trans::displacement(Vector::new(200, 0))));
    (ly, top, a, m1, m2)
}

fn layer_is_live(store: &DeepShapeStore, layout: usize, layer: LayerIndex) -> bool {
    store
        .working_layout(layout)
        .map(|w| w.read().layout.is_valid_layer(layer))
        .unwrap_or(false)
}

#[test]
fn test_reference_counting() {
    let (ly, top, _, m1, m2) = source();
    let store = DeepShapeStore::new();
    let c1 = RecursiveShapeIterator::new(&ly, top, m1);
    let c2 = RecursiveShapeIterator::new(&ly, top, m2);

    let d1 = store
        .create_polygon_layer(&c1, None, None, ICplxTrans::identity())
        .expect("M1 layer");
    let d2 = store
        .create_polygon_layer(&c2, None, None, ICplxTrans::identity())
        .expect("M2 layer");
    assert_eq!(d1.layout_index(), d2.layout_index());
    assert_eq!(store.layouts_count(), 1);
    let index = d1.layout_index();
    assert_eq!(store.layout_refs(index), 2);

    let d1b = d1.clone();
    assert_eq!(store.layer_refs(index, d1.layer()), 2);
    assert_eq!(d1b, d1);
    drop(d1b);
    assert_eq!(store.layer_refs(index, d1.layer()), 1);

    // the last handle of a layer removes the layer, not the layout
    let l1 = d1.layer();
    drop(d1);
    assert_eq!(store.layer_refs(index, l1), 0);
    assert!(!layer_is_live(&store, index, l1));
    assert!(store.has_layout(index));
    assert!(layer_is_live(&store, index, d2.layer()));

    drop(d2);
    assert!(!store.has_layout(index));
    assert_eq!(store.layouts_count(), 0);
}

#[test]
fn test_keep_layouts() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    store.set_keep_layouts(true);
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    let index = d.layout_index();
    drop(d);
    assert!(store.has_layout(index));
    assert_eq!(store.layout_refs(index), 0);
}

#[test]
fn test_signature_reuse() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let plain = RecursiveShapeIterator::new(&ly, top, m1);
    let windowed = RecursiveShapeIterator::new(&ly, top, m1).with_region(Rect::new(0, 0, 150, 50), true);

    let a = store
        .create_polygon_layer(&plain, None, None, ICplxTrans::identity())
        .expect("a");
    let b = store
        .create_polygon_layer(&windowed, None, None, ICplxTrans::identity())
        .expect("b");
    assert_eq!(a.layout_index(), b.layout_index());

    let scaled = store
        .create_polygon_layer(&plain, None, None, ICplxTrans::magnification(2.0))
        .expect("scaled");
    assert_ne!(scaled.layout_index(), a.layout_index());
    assert_eq!(store.layouts_count(), 2);
    assert!(!store.is_singular());
}

#[test]
fn test_new_generation_gets_new_layout() {
    let (mut ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let first = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("first");
    let extra = ly.add_cell("B");
    ly.insert_instance(top, CellInstArray::new(extra, Trans::identity()));
    let second = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("second");
    assert_ne!(first.layout_index(), second.layout_index());
}

#[test]
fn test_hierarchy_is_kept() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    let (cells, shapes) = d
        .with_layout(|l| (l.cells_count(), l.shape_count(d.layer())))
        .expect("layout");
    // TOP and A, one box each
    assert_eq!(cells, 2);
    assert_eq!(shapes, 2);
}

#[test]
fn test_detached_handle() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    drop(store);
    assert!(!d.is_valid());
    assert_eq!(d.store().err(), Some(DbError::Detached));
    assert_eq!(d.with_layout(|l| l.cells_count()).err(), Some(DbError::Detached));
    assert_eq!(d.derived().err(), Some(DbError::Detached));
}

#[test]
fn test_flat_layers_need_singular_store() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let flat = Shapes::from_shapes([Shape::Box(Rect::new(0, 0, 5, 5))]);

    let f1 = store
        .create_from_flat(&flat, ICplxTrans::identity())
        .expect("flat layer");
    let f2 = store
        .create_from_flat(&flat, ICplxTrans::identity())
        .expect("memoized flat layer");
    assert_eq!(f1, f2);
    assert!(store.is_singular());
    assert_eq!(f1.with_layout(|l| l.shape_count(f1.layer())).expect("layout"), 1);

    let _other = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::magnification(3.0))
        .expect("second layout");
    let other_flat = Shapes::from_shapes([Shape::Box(Rect::new(0, 0, 1, 1))]);
    assert_eq!(
        store.create_from_flat(&other_flat, ICplxTrans::identity()).err(),
        Some(DbError::NotSingular(2))
    );
}

#[test]
fn test_state_stack() {
    let store = DeepShapeStore::new();
    store.push_state();
    store.set_threads(8);
    store.set_max_vertex_count(64);
    assert_eq!(store.state().threads, 8);
    store.pop_state().expect("pop");
    assert_eq!(store.state().threads, 1);
    assert_eq!(store.state().max_vertex_count, 16);
    assert_eq!(store.pop_state(), Err(DbError::EmptyStateStack));
}

#[test]
fn test_breakout_cells() {
    let store = DeepShapeStore::new();
    store.add_breakout_cells(0, [3, 1]);
    store.add_breakout_cells(0, [2]);
    let cells = store.breakout_cells(0).expect("breakout cells");
    assert_eq!(cells.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    store.clear_breakout_cells(0);
    assert!(store.breakout_cells(0).is_none());
}

#[test]
fn test_insert_into_original() {
    let (mut ly, top, a, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = {
        let cursor = RecursiveShapeIterator::new(&ly, top, m1);
        store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("layer")
    };
    let out = ly.insert_layer(LayerInfo::new("OUT"));
    d.insert_into(&mut ly, top, out).expect("insert");
    // hierarchy is matched: A receives its own box, TOP its own
    assert_eq!(ly.shapes(a, out).map(|s| s.len()), Some(1));
    assert_eq!(ly.shapes(top, out).map(|s| s.len()), Some(1));
    assert_eq!(ly.cells_count(), 2);
}

#[test]
fn test_add_from_same_layout() {
    let (ly, top, _, m1, m2) = source();
    let store = DeepShapeStore::new();
    let d1 = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("m1");
    let d2 = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m2), None, None, ICplxTrans::identity())
        .expect("m2");
    assert_eq!(d1.layout_index(), d2.layout_index());
    let sum = d1.copy().expect("copy");
    sum.add_from(&d2).expect("add");
    let n = sum.with_layout(|l| l.shape_count(sum.layer())).expect("layout");
    assert_eq!(n, 3);
    assert_eq!(store.mapping_cache_len(), 0);
}

#[test]
fn test_add_from_scaled_layout() {
    let (ly, top, _, m1, m2) = source();
    let store = DeepShapeStore::new();
    let d1 = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("m1");
    // twice the resolution: a working layout of its own with half the dbu
    let d2 = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m2), None, None, ICplxTrans::magnification(2.0))
        .expect("m2");
    assert_ne!(d1.layout_index(), d2.layout_index());
    let d2_top = d2.initial_cell().expect("initial cell");
    let d2_box = d2
        .with_layout(|l| (l.dbu(), l.shapes(d2_top, d2.layer()).map(|s| s.bbox())))
        .expect("layout");
    assert!((d2_box.0 - 0.0005).abs() < 1e-12);
    assert_eq!(d2_box.1, Some(Rect::new(0, 0, 40, 40)));

    let sum = d1.copy().expect("copy");
    sum.add_from(&d2).expect("add");
    let top_cell = sum.initial_cell().expect("initial cell");
    let (cells, n, top_boxes) = sum
        .with_layout(|l| {
            let boxes: Vec<Rect> = l
                .shapes(top_cell, sum.layer())
                .map(|s| s.iter().map(|e| e.shape.bbox()).collect())
                .unwrap_or_default();
            (l.cells_count(), l.shape_count(sum.layer()), boxes)
        })
        .expect("layout");
    // the A instances match after scaling, no cells are added
    assert_eq!(cells, 2);
    assert_eq!(n, 3);
    assert!(top_boxes.contains(&Rect::new(0, 0, 50, 50)));
    assert!(top_boxes.contains(&Rect::new(0, 0, 20, 20)));
    assert_eq!(store.mapping_cache_len(), 1);

    // the cached mapping is reused
    sum.add_from(&d2).expect("add again");
    assert_eq!(sum.with_layout(|l| l.shape_count(sum.layer())).expect("layout"), 4);
    assert_eq!(store.mapping_cache_len(), 1);
}

#[test]
fn test_insert_into_original_with_clip_variant() {
    let (mut ly, top, a, m1, _) = source();
    let store = DeepShapeStore::new();
    // cuts the instance of A at (200, 0) in half
    let d = {
        let cursor = RecursiveShapeIterator::new(&ly, top, m1).with_region(Rect::new(0, 0, 205, 50), false);
        store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("layer")
    };
    let out = ly.insert_layer(LayerInfo::new("OUT"));
    d.insert_into(&mut ly, top, out).expect("insert");

    let names: Vec<&str> = ly.cell_indexes().map(|c| ly.cell_name(c)).collect();
    assert_eq!(names, vec!["TOP", "A", "A$VAR"]);
    let var = ly.cell_by_name("A$VAR").expect("variant copy");
    let instances = ly.cell(top).map(|c| c.instances().to_vec()).unwrap_or_default();
    assert_eq!(instances.len(), 2);
    assert_eq!(instances[0].cell, a);
    assert_eq!(instances[1].cell, var);
    assert_eq!(instances[1].trans.disp, Vector::new(200, 0));

    assert_eq!(ly.shapes(top, out).map(|s| s.len()), Some(1));
    assert_eq!(ly.shapes(a, out).map(|s| s.bbox()), Some(Rect::new(0, 0, 10, 10)));
    assert_eq!(ly.shapes(var, out).map(|s| s.bbox()), Some(Rect::new(0, 0, 5, 10)));
    // the copy keeps the source content of A
    assert_eq!(ly.shapes(var, m1).map(|s| s.len()), Some(1));

    // a second export reuses the mapping
    let out2 = ly.insert_layer(LayerInfo::new("OUT2"));
    d.insert_into(&mut ly, top, out2).expect("second insert");
    assert_eq!(ly.cells_count(), 3);
    assert_eq!(ly.shapes(var, out2).map(|s| s.len()), Some(1));
    assert_eq!(ly.shapes(a, out2).map(|s| s.len()), Some(1));
}

#[test]
fn test_mapping_to_original_explodes_arrays() {
    let mut ly = Layout::new();
    let m1 = ly.insert_layer(LayerInfo::new("M1"));
    let top = ly.add_cell("TOP");
    let a = ly.add_cell("A");
    if let Some(s) = ly.shapes_mut(a, m1) {
        s.insert(Shape::Box(Rect::new(0, 0, 10, 10)));
    }
    ly.insert_instance(
        top,
        CellInstArray::array(a, Trans::identity(), Vector::new(100, 0), Vector::new(0, 0), 3, 1),
    );
    let store = DeepShapeStore::new();
    let d = {
        let cursor = RecursiveShapeIterator::new(&ly, top, m1).with_region(Rect::new(0, 0, 205, 50), false);
        store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("layer")
    };
    let cm = store
        .cell_mapping_to_original(d.layout_index(), &mut ly, None)
        .expect("mapping");

    let var = ly.cell_by_name("A$VAR").expect("variant copy");
    let instances = ly.cell(top).map(|c| c.instances().to_vec()).unwrap_or_default();
    assert_eq!(instances.len(), 3);
    assert!(instances.iter().all(|i| !i.is_array()));
    let placed: Vec<(CellIndex, Vector)> = instances.iter().map(|i| (i.cell, i.trans.disp)).collect();
    assert_eq!(
        placed,
        vec![(a, Vector::new(0, 0)), (a, Vector::new(100, 0)), (var, Vector::new(200, 0))]
    );
    assert_eq!(cm.len(), 3);
    assert!(cm.table().values().any(|c| *c == var));
}

#[test]
fn test_mapping_to_original_deletes_superseded_cells() {
    let (mut ly, top, a, m1, _) = source();
    let store = DeepShapeStore::new();
    // both instances of A are clipped, differently
    let d = {
        let cursor = RecursiveShapeIterator::new(&ly, top, m1).with_region(Rect::new(0, 0, 205, 5), false);
        store
            .create_polygon_layer(&cursor, None, None, ICplxTrans::identity())
            .expect("layer")
    };
    let cm = store
        .cell_mapping_to_original(d.layout_index(), &mut ly, None)
        .expect("mapping");

    assert!(!ly.is_valid_cell(a));
    assert_eq!(ly.cells_count(), 3);
    let instances = ly.cell(top).map(|c| c.instances().to_vec()).unwrap_or_default();
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|i| i.cell != a && ly.cell_name(i.cell).starts_with("A$VAR")));
    assert!(cm.table().values().all(|c| ly.is_valid_cell(*c)));
}

#[test]
fn test_mapping_to_original_honors_exclusion() {
    let (mut ly, top, a, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    let working_a = d
        .with_layout(|l| l.cell_by_name("A"))
        .expect("layout")
        .expect("A in working layout");
    // A vanishes from the source, so the working A has no counterpart
    ly.delete_cell(a);

    let excluded: BTreeSet<CellIndex> = [working_a].into_iter().collect();
    let cm = store
        .cell_mapping_to_original(d.layout_index(), &mut ly, Some(&excluded))
        .expect("mapping");
    assert!(!cm.has_mapping(working_a));
    assert_eq!(ly.cells_count(), 1);

    let cm = store
        .cell_mapping_to_original(d.layout_index(), &mut ly, None)
        .expect("mapping");
    let new_a = cm.cell_mapping(working_a).expect("A recreated");
    assert_eq!(ly.cell_name(new_a), "A");
    assert_eq!(ly.cell(top).map(|c| c.instances().len()), Some(2));
}

#[test]
fn test_mapping_to_foreign_layout_fails() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    let mut other = Layout::new();
    other.add_cell("TOP");
    assert_eq!(
        store.cell_mapping_to_original(d.layout_index(), &mut other, None).err(),
        Some(DbError::NotOriginalLayout)
    );
}

#[test]
fn test_insert_edges_as_polygons() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let edges = store
        .create_edge_layer(&RecursiveShapeIterator::new(&ly, top, m1), true, ICplxTrans::identity())
        .expect("edge layer");

    let mut target = Layout::new();
    let tl = target.insert_layer(LayerInfo::new("OUT"));
    let out = target.add_cell("OUT");
    edges
        .insert_into_as_polygons(&mut target, out, tl, 2)
        .expect("insert");

    // TOP and a copy of A, four enlarged edges each
    assert_eq!(target.cells_count(), 2);
    assert_eq!(target.shape_count(tl), 8);
    let top_shapes = target.shapes(out, tl).expect("top shapes");
    assert_eq!(top_shapes.len(), 4);
    assert!(top_shapes.iter().all(|e| matches!(e.shape, Shape::Polygon(_))));
    assert_eq!(top_shapes.bbox(), Rect::new(-2, -2, 52, 52));
    let a_copy = target.cell_by_name("A").expect("A copy");
    assert_eq!(target.shapes(a_copy, tl).map(|s| s.bbox()), Some(Rect::new(-2, -2, 12, 12)));

    assert_eq!(
        edges.insert_into_as_polygons(&mut target, out, 99, 2).err(),
        Some(DbError::InvalidLayer(99))
    );
    assert_eq!(edges.insert_into(&mut target, 42, tl).err(), Some(DbError::InvalidCell(42)));
}

#[test]
fn test_mapping_cache_drops_stale_generations() {
    let (ly, top, _, m1, _) = source();
    let store = DeepShapeStore::new();
    let d = store
        .create_polygon_layer(&RecursiveShapeIterator::new(&ly, top, m1), None, None, ICplxTrans::identity())
        .expect("layer");
    let mut target = Layout::new();
    let tl = target.insert_layer(LayerInfo::new("OUT"));
    let out = target.add_cell("OUT");

    d.insert_into(&mut target, out, tl).expect("first insert");
    assert_eq!(store.mapping_cache_len(), 1);
    for i in 0..3 {
        target.add_cell(&format!("X{}", i));
        d.insert_into(&mut target, out, tl).expect("insert after change");
        assert_eq!(store.mapping_cache_len(), 1);
    }
    // the geometry mapping finds the A copy again
    assert_eq!(target.cells_count(), 2 + 3);
    assert_eq!(target.shape_count(tl), 4 * 2);
}
