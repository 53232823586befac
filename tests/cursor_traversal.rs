//! Recursive cursor traversal over a three-level hierarchy
//!
//! Pull and push delivery, region confinement through arrays and depth
//! limits.

use std::convert::Infallible;

use deep_layout::db::cursor::{ComplexRegion, CursorInfo, InstVisit, RecursiveShapeIterator, RecursiveShapeReceiver};
use deep_layout::db::geometry::{Bounded, ICplxTrans, Rect, Trans, Vector};
use deep_layout::db::layout::{CellIndex, CellInstArray, LayerIndex, LayerInfo, Layout, Shape, ShapeEntry};

/// TOP -> 3x3 array of MID (pitch 100) -> LEAF twice (at 0 and at 40, rotated)
fn chip() -> (Layout, CellIndex, LayerIndex) {
    let mut ly = Layout::new();
    let l = ly.insert_layer(LayerInfo::new("M1"));
    let top = ly.add_cell("TOP");
    let mid = ly.add_cell("MID");
    let leaf = ly.add_cell("LEAF");
    if let Some(s) = ly.shapes_mut(leaf, l) {
        s.insert(Shape::Box(Rect::new(0, 0, 10, 20)));
    }
    if let Some(s) = ly.shapes_mut(mid, l) {
        s.insert(Shape::Box(Rect::new(0, 80, 90, 90)));
    }
    ly.insert_instance(mid, CellInstArray::new(leaf, Trans::identity()));
    ly.insert_instance(mid, CellInstArray::new(leaf, Trans::new(1, false, Vector::new(60, 0))));
    ly.insert_instance(
        top,
        CellInstArray::array(mid, Trans::identity(), Vector::new(100, 0), Vector::new(0, 100), 3, 3),
    );
    (ly, top, l)
}

fn boxes(cursor: &RecursiveShapeIterator<'_>) -> Vec<Rect> {
    cursor.iter().map(|s| s.transformed().bbox()).collect()
}

#[derive(Default)]
struct Collect {
    boxes: Vec<Rect>,
    cells_entered: usize,
    arrays: usize,
}

impl RecursiveShapeReceiver for Collect {
    type Error = Infallible;

    fn enter_cell(
        &mut self,
        _info: &CursorInfo<'_>,
        _cell: CellIndex,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
    ) -> Result<(), Infallible> {
        self.cells_entered += 1;
        Ok(())
    }

    fn new_inst(
        &mut self,
        _info: &CursorInfo<'_>,
        inst: &CellInstArray,
        _always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
        _all: bool,
    ) -> Result<InstVisit, Infallible> {
        if inst.is_array() {
            self.arrays += 1;
        }
        Ok(InstVisit::All)
    }

    fn shape(
        &mut self,
        _info: &CursorInfo<'_>,
        entry: &ShapeEntry,
        _always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
    ) -> Result<(), Infallible> {
        self.boxes.push(entry.shape.bbox());
        Ok(())
    }
}

#[test]
fn test_flat_count() {
    let (ly, top, l) = chip();
    let c = RecursiveShapeIterator::new(&ly, top, l);
    // 9 MIDs with one own box and two leaves each
    assert_eq!(c.iter().count(), 27);
    let bbox = boxes(&c).into_iter().fold(Rect::empty(), |a, b| a.extended(&b));
    assert_eq!(bbox, Rect::new(0, 0, 290, 290));
}

#[test]
fn test_rotated_leaf() {
    let (ly, top, l) = chip();
    let c = RecursiveShapeIterator::new(&ly, top, l).with_region(Rect::new(40, 0, 60, 20), true);
    // LEAF rotated by 90 degrees at (60, 0): (40,0;60,10)
    assert_eq!(boxes(&c), vec![Rect::new(40, 0, 60, 10)]);
}

#[test]
fn test_region_inside_array() {
    let (ly, top, l) = chip();
    // the MID at (100,100) only
    let c = RecursiveShapeIterator::new(&ly, top, l).with_region(Rect::new(101, 101, 199, 199), true);
    let found = boxes(&c);
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|b| Rect::new(100, 100, 200, 200).contains_rect(b)));
}

#[test]
fn test_depth_window() {
    let (ly, top, l) = chip();
    let mut c = RecursiveShapeIterator::new(&ly, top, l);
    c.set_max_depth(1);
    assert_eq!(c.iter().count(), 9);
    c.set_min_depth(2);
    c.set_max_depth(usize::MAX);
    assert_eq!(c.iter().count(), 18);
    assert!(c.iter().all(|s| s.depth == 2));
}

#[test]
fn test_push_matches_pull() {
    let (ly, top, l) = chip();
    let mut c = RecursiveShapeIterator::new(&ly, top, l);
    let pulled = boxes(&c);
    let mut rx = Collect::default();
    c.push(&mut rx).expect("infallible");
    assert_eq!(rx.boxes.len(), pulled.len());
    // TOP + 9 MID + 18 LEAF
    assert_eq!(rx.cells_entered, 28);
    assert_eq!(rx.arrays, 1);
}

#[test]
fn test_confine_region_narrows() {
    let (ly, top, l) = chip();
    let mut c = RecursiveShapeIterator::new(&ly, top, l).with_region(Rect::new(0, 0, 150, 150), true);
    let wide = c.iter().count();
    c.confine_region(&Rect::new(0, 0, 50, 50));
    let narrow = c.iter().count();
    assert!(narrow <= wide);
    assert_eq!(narrow, 2);
}
