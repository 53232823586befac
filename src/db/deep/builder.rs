//! Hierarchy builder
//!
//! Mirrors the hierarchy seen by a cursor into a working layout. Target cells
//! are keyed by (source cell, clip box, complex clip boxes): a cell that is
//! only partially inside the search region becomes a separate clip variant.
//! Repeated build passes (one per derived layer) extend the same target
//! hierarchy.

use crate::db::cursor::{
    ComplexRegion, CursorInfo, InstVisit, RecursiveShapeIterator, RecursiveShapeReceiver,
};
use crate::db::geometry::{ICplxTrans, Rect, Trans};
use crate::db::layout::{
    ArrayRepetition, CellIndex, CellInstArray, LayerIndex, Layout, PropertiesId, ShapeEntry,
};
use crate::error::{DbError, DbResult};
use std::collections::{BTreeMap, BTreeSet};

use super::pipeline::{ShapePipeline, StageContext};

/// Identity of a target cell: source cell plus the clip it was built with
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipKey {
    pub cell: CellIndex,
    /// Clip box in source cell coordinates; `None` = whole cell
    pub clip: Option<Rect>,
    /// Complex region boxes in source cell coordinates
    pub complex: Option<Vec<Rect>>,
}

impl ClipKey {
    pub fn full(cell: CellIndex) -> Self {
        Self {
            cell,
            clip: None,
            complex: None,
        }
    }

    pub fn is_clipped(&self) -> bool {
        self.clip.is_some() || self.complex.is_some()
    }
}

/// Where a clip variant was placed, used to redirect instances when mapping
/// back into the source layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    /// Parent cell in the working layout
    pub parent: CellIndex,
    /// Parent cell in the source layout
    pub source_parent: CellIndex,
    /// Index of the instance array in the source parent
    pub inst_index: usize,
    /// Member transformation in the source parent
    pub member: Trans,
    /// Placed cell in the working layout
    pub child: CellIndex,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    source: CellIndex,
    target: CellIndex,
}

#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    source_uid: u64,
    initial_cell: Option<CellIndex>,
    cell_map: BTreeMap<ClipKey, CellIndex>,
    /// variant target cell -> source cell
    variants: BTreeMap<CellIndex, CellIndex>,
    placed: BTreeSet<(CellIndex, CellInstArray)>,
    placements: Vec<Placement>,
    target_layer: Option<LayerIndex>,
    pipeline: ShapePipeline,
    wants_all_cells: bool,
    cells_seen: BTreeSet<ClipKey>,
    stack: Vec<Frame>,
    pending: Option<(ClipKey, CellIndex)>,
    array_placed: bool,
}

impl HierarchyBuilder {
    /// Builder for hierarchies taken from the layout with id `source_uid`
    /// (0 for flat sources)
    pub fn new(source_uid: u64) -> Self {
        Self {
            source_uid,
            ..Default::default()
        }
    }

    pub fn source_uid(&self) -> u64 {
        self.source_uid
    }

    /// Target cell corresponding to the cursor's top cell
    pub fn initial_cell(&self) -> Option<CellIndex> {
        self.initial_cell
    }

    /// Source cell the initial cell was built from
    pub fn source_top(&self) -> Option<CellIndex> {
        let initial = self.initial_cell?;
        self.cell_map
            .iter()
            .find(|(k, t)| **t == initial && !k.is_clipped())
            .map(|(k, _)| k.cell)
    }

    pub fn set_initial_cell(&mut self, cell: CellIndex) {
        self.initial_cell = Some(cell);
    }

    pub fn target_layer(&self) -> Option<LayerIndex> {
        self.target_layer
    }

    pub fn set_target_layer(&mut self, layer: Option<LayerIndex>) {
        self.target_layer = layer;
    }

    /// Installs the shape pipeline for the next build passes
    pub fn set_shape_receiver(&mut self, pipeline: ShapePipeline) {
        self.pipeline = pipeline;
    }

    pub fn wants_all_cells(&self) -> bool {
        self.wants_all_cells
    }

    pub fn set_wants_all_cells(&mut self, f: bool) {
        self.wants_all_cells = f;
    }

    pub fn cell_map(&self) -> impl Iterator<Item = (&ClipKey, CellIndex)> + '_ {
        self.cell_map.iter().map(|(k, v)| (k, *v))
    }

    pub fn target_for(&self, key: &ClipKey) -> Option<CellIndex> {
        self.cell_map.get(key).copied()
    }

    pub fn map(&mut self, key: ClipKey, target: CellIndex) {
        self.cell_map.insert(key, target);
    }

    pub fn unmap(&mut self, key: &ClipKey) -> Option<CellIndex> {
        self.cell_map.remove(key)
    }

    pub fn is_variant(&self, target: CellIndex) -> bool {
        self.variants.contains_key(&target)
    }

    /// Source cell a variant was derived from
    pub fn variant_source(&self, target: CellIndex) -> Option<CellIndex> {
        self.variants.get(&target).copied()
    }

    /// The unclipped target cell of the variant's source cell, if it exists
    pub fn original_target_for_variant(&self, target: CellIndex) -> Option<CellIndex> {
        let source = self.variants.get(&target)?;
        self.cell_map.get(&ClipKey::full(*source)).copied()
    }

    pub fn register_variant(&mut self, target: CellIndex, source: CellIndex) {
        self.variants.insert(target, source);
    }

    pub fn unregister_variant(&mut self, target: CellIndex) {
        self.variants.remove(&target);
    }

    /// Placements of a working layout cell as recorded during building
    pub fn placements_of(&self, child: CellIndex) -> impl Iterator<Item = &Placement> + '_ {
        self.placements.iter().filter(move |p| p.child == child)
    }

    /// Runs one build pass: drives `cursor` and mirrors what it delivers into
    /// `target`
    pub fn build(&mut self, target: &mut Layout, cursor: &mut RecursiveShapeIterator<'_>) -> DbResult<()> {
        let mut pass = BuildPass {
            builder: self,
            target,
        };
        cursor.push(&mut pass)
    }
}

/// Instance transformation in the target hierarchy.
///
/// Target cells live in the source cell space mapped by the linear part of
/// the global transformation; the displacement only applies at the top.
fn target_trans(always: &ICplxTrans, t: &Trans) -> Trans {
    let c = always.conjugate(t);
    Trans {
        disp: c.disp + always.disp(),
        ..c
    }
}

struct BuildPass<'b> {
    builder: &'b mut HierarchyBuilder,
    target: &'b mut Layout,
}

impl BuildPass<'_> {
    fn translate_props(&mut self, info: &CursorInfo<'_>, id: PropertiesId) -> PropertiesId {
        if id == 0 {
            return 0;
        }
        match info.layout.and_then(|l| l.properties(id)) {
            Some(props) => self.target.properties_id(props),
            None => 0,
        }
    }

    fn parent(&self) -> DbResult<Frame> {
        self.builder
            .stack
            .last()
            .copied()
            .ok_or(DbError::InvalidCell(usize::MAX))
    }

    fn cell_for(&mut self, key: &ClipKey, info: &CursorInfo<'_>) -> CellIndex {
        if let Some(t) = self.builder.target_for(key) {
            if self.target.is_valid_cell(t) {
                return t;
            }
        }
        let name = info.layout.map_or("CELL", |l| l.cell_name(key.cell));
        let t = if key.is_clipped() {
            let t = self.target.add_cell(&format!("{}$CLIP_VAR", name));
            self.builder.variants.insert(t, key.cell);
            log::debug!(
                "[Builder] Clip variant {} for source cell {}",
                self.target.cell_name(t),
                name
            );
            t
        } else {
            self.target.add_cell(name)
        };
        self.builder.cell_map.insert(key.clone(), t);
        t
    }

    fn place(&mut self, parent: CellIndex, inst: CellInstArray) -> bool {
        if self.builder.placed.insert((parent, inst)) {
            self.target.insert_instance(parent, inst);
            true
        } else {
            false
        }
    }

    fn clip_key(
        info: &CursorInfo<'_>,
        cell: CellIndex,
        member: &Trans,
        region: &Rect,
        complex: Option<&ComplexRegion>,
    ) -> ClipKey {
        let cb = info.layout.map_or(Rect::empty(), |l| l.cell_bbox(cell));
        let member_bbox = member.apply_rect(&cb);
        let to_child = member.inverted();
        let clip = to_child
            .apply_rect(&region.intersection(&member_bbox))
            .intersection(&cb);
        let complex = complex
            .map(|c| c.reduced(&member_bbox, &to_child, &cb).boxes())
            .filter(|boxes| !(boxes.len() == 1 && boxes[0] == cb));
        ClipKey {
            cell,
            clip: (clip != cb).then_some(clip),
            complex,
        }
    }
}

impl RecursiveShapeReceiver for BuildPass<'_> {
    type Error = DbError;

    fn wants_all_cells(&self) -> bool {
        self.builder.wants_all_cells
    }

    fn begin(&mut self, info: &CursorInfo<'_>) -> DbResult<()> {
        let b = &mut *self.builder;
        b.cells_seen.clear();
        b.stack.clear();
        b.pending = None;
        b.array_placed = false;
        if b.initial_cell.is_some_and(|c| self.target.is_valid_cell(c)) {
            return Ok(());
        }
        let name = match (info.layout, info.top_cell) {
            (Some(l), Some(top)) => l.cell_name(top).to_string(),
            _ => "TOP".to_string(),
        };
        let ci = self.target.add_cell(&name);
        b.initial_cell = Some(ci);
        if let Some(top) = info.top_cell {
            b.cell_map.insert(ClipKey::full(top), ci);
        }
        Ok(())
    }

    fn end(&mut self, _info: &CursorInfo<'_>) {
        self.builder.stack.clear();
        self.builder.pending = None;
    }

    fn enter_cell(
        &mut self,
        info: &CursorInfo<'_>,
        cell: CellIndex,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
    ) -> DbResult<()> {
        let (key, target) = if info.depth == 0 {
            let initial = self
                .builder
                .initial_cell
                .ok_or(DbError::InvalidCell(cell))?;
            (ClipKey::full(cell), initial)
        } else {
            match self.builder.pending.take() {
                Some(p) => p,
                None => {
                    let key = ClipKey::full(cell);
                    let t = self.cell_for(&key, info);
                    (key, t)
                }
            }
        };
        self.builder.cells_seen.insert(key);
        self.builder.stack.push(Frame {
            source: cell,
            target,
        });
        Ok(())
    }

    fn leave_cell(&mut self, _info: &CursorInfo<'_>, _cell: CellIndex) -> DbResult<()> {
        self.builder.stack.pop();
        Ok(())
    }

    fn new_inst(
        &mut self,
        info: &CursorInfo<'_>,
        inst: &CellInstArray,
        always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
        all: bool,
    ) -> DbResult<InstVisit> {
        self.builder.array_placed = false;
        if !(all && inst.is_array()) {
            return Ok(InstVisit::All);
        }

        // completely inside: mirror the array as a whole
        let key = ClipKey::full(inst.cell);
        let child = self.cell_for(&key, info);
        let parent = self.parent()?;
        let prop_id = self.translate_props(info, inst.prop_id);
        let array = inst.array.map(|a| ArrayRepetition {
            a: always_apply.apply_vector(a.a),
            b: always_apply.apply_vector(a.b),
            ..a
        });
        self.place(
            parent.target,
            CellInstArray {
                cell: child,
                trans: target_trans(always_apply, &inst.trans),
                array,
                prop_id,
            },
        );
        self.builder.array_placed = true;
        if self.builder.cells_seen.contains(&key) {
            Ok(InstVisit::Skip)
        } else {
            Ok(InstVisit::OnlyFirst)
        }
    }

    fn new_inst_member(
        &mut self,
        info: &CursorInfo<'_>,
        inst: &CellInstArray,
        member: &Trans,
        always_apply: &ICplxTrans,
        region: &Rect,
        complex: Option<&ComplexRegion>,
        all: bool,
    ) -> DbResult<bool> {
        let key = if all {
            ClipKey::full(inst.cell)
        } else {
            Self::clip_key(info, inst.cell, member, region, complex)
        };
        let child = self.cell_for(&key, info);

        if !self.builder.array_placed {
            let parent = self.parent()?;
            let prop_id = self.translate_props(info, inst.prop_id);
            let placed = self.place(
                parent.target,
                CellInstArray {
                    cell: child,
                    trans: target_trans(always_apply, member),
                    array: None,
                    prop_id,
                },
            );
            if placed && key.is_clipped() {
                let inst_index = info
                    .layout
                    .and_then(|l| l.cell(parent.source))
                    .and_then(|c| c.instances().iter().position(|i| std::ptr::eq(i, inst)));
                if let Some(inst_index) = inst_index {
                    self.builder.placements.push(Placement {
                        parent: parent.target,
                        source_parent: parent.source,
                        inst_index,
                        member: *member,
                        child,
                    });
                }
            }
        }

        let descend = !self.builder.cells_seen.contains(&key);
        self.builder.pending = descend.then_some((key, child));
        Ok(descend)
    }

    fn shape(
        &mut self,
        info: &CursorInfo<'_>,
        entry: &ShapeEntry,
        always_apply: &ICplxTrans,
        region: &Rect,
        complex: Option<&ComplexRegion>,
    ) -> DbResult<()> {
        let Some(layer) = self.builder.target_layer else {
            return Ok(());
        };
        let cell = match self.builder.stack.last() {
            Some(f) => f.target,
            None => self
                .builder
                .initial_cell
                .ok_or(DbError::InvalidCell(usize::MAX))?,
        };
        let prop_id = self.translate_props(info, entry.prop_id);
        let ctx = StageContext { region, complex };
        let out = self.builder.pipeline.run(
            ShapeEntry::with_props(entry.shape.clone(), prop_id),
            &ctx,
            self.target,
        )?;
        if out.is_empty() {
            return Ok(());
        }
        let shapes = self
            .target
            .shapes_mut(cell, layer)
            .ok_or(DbError::InvalidCell(cell))?;
        if always_apply.is_unity() {
            shapes.extend(out);
        } else {
            shapes.extend(out.into_iter().map(|e| {
                ShapeEntry::with_props(e.shape.transformed(always_apply), e.prop_id)
            }));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::deep::pipeline::PipelineStage;
    use crate::db::geometry::{Bounded, Vector};
    use crate::db::layout::{LayerInfo, Shape};

    fn sample() -> (Layout, CellIndex, CellIndex, LayerIndex) {
        let mut ly = Layout::new();
        let l0 = ly.insert_layer(LayerInfo::new("L0"));
        let top = ly.add_cell("TOP");
        let a = ly.add_cell("A");
        if let Some(s) = ly.shapes_mut(a, l0) {
            s.insert(Shape::Box(Rect::new(0, 0, 10, 10)));
        }
        ly.insert_instance(top, CellInstArray::new(a, Trans::displacement(Vector::new(100, 0))));
        ly.insert_instance(
            top,
            CellInstArray::array(
                a,
                Trans::identity(),
                Vector::new(20, 0),
                Vector::new(0, 20),
                2,
                2,
            ),
        );
        (ly, top, a, l0)
    }

    fn build(
        source: &Layout,
        top: CellIndex,
        layer: LayerIndex,
        region: Rect,
        trans: ICplxTrans,
        builder: &mut HierarchyBuilder,
        target: &mut Layout,
    ) -> LayerIndex {
        let li = target.insert_layer(LayerInfo::default());
        builder.set_target_layer(Some(li));
        builder.set_shape_receiver(ShapePipeline::new().with_stage(PipelineStage::Clip));
        let mut cursor = RecursiveShapeIterator::new(source, top, layer).with_region(region, false);
        cursor.set_global_trans(trans);
        builder.build(target, &mut cursor).expect("build");
        li
    }

    fn flat_area(layout: &Layout, top: CellIndex, layer: LayerIndex) -> f64 {
        RecursiveShapeIterator::new(layout, top, layer)
            .iter()
            .map(|s| s.transformed().bbox().area())
            .sum()
    }

    #[test]
    fn test_mirrors_hierarchy_and_arrays() {
        let (src, top, _, l0) = sample();
        let mut b = HierarchyBuilder::new(src.uid());
        let mut t = Layout::new();
        let li = build(&src, top, l0, Rect::world(), ICplxTrans::identity(), &mut b, &mut t);
        let ttop = b.initial_cell().expect("initial cell");
        assert_eq!(t.cell_name(ttop), "TOP");
        let insts = t.cell(ttop).map(|c| c.instances().to_vec()).unwrap_or_default();
        assert_eq!(insts.len(), 2);
        assert!(insts.iter().any(|i| i.is_array()));
        assert_eq!(t.cells_count(), 2);
        assert_eq!(flat_area(&t, ttop, li), 5.0 * 100.0);
    }

    #[test]
    fn test_clip_variant() {
        let (src, top, a, l0) = sample();
        let mut b = HierarchyBuilder::new(src.uid());
        let mut t = Layout::new();
        let li = build(&src, top, l0, Rect::new(105, -10, 200, 200), ICplxTrans::identity(), &mut b, &mut t);
        let ttop = b.initial_cell().expect("initial cell");
        let variants: Vec<CellIndex> = b
            .cell_map()
            .filter(|(k, _)| k.is_clipped())
            .map(|(_, c)| c)
            .collect();
        assert_eq!(variants.len(), 1);
        assert!(b.is_variant(variants[0]));
        assert_eq!(b.variant_source(variants[0]), Some(a));
        assert_eq!(b.original_target_for_variant(variants[0]), None);
        assert_eq!(b.placements_of(variants[0]).count(), 1);
        assert_eq!(flat_area(&t, ttop, li), 50.0);

        // a second, unclipped pass adds the original cell
        let li2 = build(&src, top, l0, Rect::world(), ICplxTrans::identity(), &mut b, &mut t);
        assert!(b.original_target_for_variant(variants[0]).is_some());
        assert_eq!(flat_area(&t, ttop, li2), 500.0);
        assert_eq!(flat_area(&t, ttop, li), 50.0);
    }

    #[test]
    fn test_global_trans_is_conjugated() {
        let (src, top, _, l0) = sample();
        let mut b = HierarchyBuilder::new(src.uid());
        let mut t = Layout::new();
        let trans = ICplxTrans::new(Trans::new(1, false, Vector::new(5, 5)), 2.0);
        let li = build(&src, top, l0, Rect::world(), trans, &mut b, &mut t);
        let ttop = b.initial_cell().expect("initial cell");

        let mut expected: Vec<Rect> = RecursiveShapeIterator::new(&src, top, l0)
            .iter()
            .map(|s| trans.concat(&s.trans).apply_rect(&s.entry.shape.bbox()))
            .collect();
        let mut built: Vec<Rect> = RecursiveShapeIterator::new(&t, ttop, li)
            .iter()
            .map(|s| s.transformed().bbox())
            .collect();
        expected.sort();
        built.sort();
        assert_eq!(built, expected);
    }
}
