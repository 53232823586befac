//! Deep shape store and deep layers
//!
//! The store owns the working layouts. A working layout is created per cursor
//! signature (source layout, hierarchy generation, top cell, depth limits,
//! cell selection, global transformation) and shared by every layer derived
//! from that hierarchy. `DeepLayer` handles reference (layout, layer) pairs:
//! a layer is deleted when its last handle goes away, a working layout when
//! none of its layers is referenced any longer.
//!
//! Lock order: a slot lock may be held while taking the table lock, never
//! the other way round.

use crate::db::cursor::{CursorSignature, RecursiveShapeIterator};
use crate::db::geometry::{Coord, ICplxTrans, Trans};
use crate::db::layout::{
    CellIndex, CellInstArray, LayerIndex, LayerInfo, Layout, ShapeEntry, ShapeFlags, Shapes,
};
use crate::error::{DbError, DbResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Weak};

use super::builder::HierarchyBuilder;
use super::export::{copy_layer_shapes, ExportMode};
use super::mapping::CellMapping;
use super::pipeline::{PipelineStage, ShapePipeline};
use super::state::StoreState;

/// A layout built by the store together with the builder that mirrors the
/// source hierarchy into it
#[derive(Debug)]
pub struct WorkingLayout {
    pub layout: Layout,
    pub builder: HierarchyBuilder,
}

#[derive(Debug)]
struct LayoutSlot {
    working: Arc<RwLock<WorkingLayout>>,
    layer_refs: BTreeMap<LayerIndex, usize>,
    total_refs: usize,
    signature: Option<CursorSignature>,
}

/// Mapping cache key: (working layout, its generation, target uid, target
/// generation, target cell)
type MappingKey = (usize, u64, u64, u64, CellIndex);

#[derive(Debug, Default)]
struct StoreTable {
    state: StoreState,
    state_stack: Vec<StoreState>,
    keep_layouts: bool,
    slots: Vec<Option<LayoutSlot>>,
    layout_map: BTreeMap<CursorSignature, usize>,
    flat_memo: BTreeMap<(u64, ICplxTrans), (usize, LayerIndex)>,
    mapping_cache: BTreeMap<MappingKey, CellMapping>,
    breakout: BTreeMap<usize, BTreeSet<CellIndex>>,
}

impl StoreTable {
    fn slot(&self, index: usize) -> DbResult<&LayoutSlot> {
        self.slots
            .get(index)
            .and_then(|s| s.as_ref())
            .ok_or(DbError::InvalidLayout(index))
    }

    fn live_layouts(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    fn add_slot(&mut self, working: WorkingLayout, signature: Option<CursorSignature>) -> usize {
        let slot = LayoutSlot {
            working: Arc::new(RwLock::new(working)),
            layer_refs: BTreeMap::new(),
            total_refs: 0,
            signature: signature.clone(),
        };
        let index = match self.slots.iter().position(|s| s.is_none()) {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        };
        if let Some(sig) = signature {
            self.layout_map.insert(sig, index);
        }
        log::info!("[DeepStore] Created working layout #{}", index);
        index
    }

    fn add_ref(&mut self, layout: usize, layer: LayerIndex) {
        if let Some(Some(slot)) = self.slots.get_mut(layout) {
            *slot.layer_refs.entry(layer).or_insert(0) += 1;
            slot.total_refs += 1;
        }
    }

    fn forget_layout(&mut self, layout: usize) -> Option<LayoutSlot> {
        let slot = self.slots.get_mut(layout)?.take()?;
        if let Some(sig) = &slot.signature {
            self.layout_map.remove(sig);
        }
        self.flat_memo.retain(|_, (l, _)| *l != layout);
        self.mapping_cache.retain(|k, _| k.0 != layout);
        self.breakout.remove(&layout);
        log::info!("[DeepStore] Released working layout #{}", layout);
        Some(slot)
    }
}

pub(crate) struct StoreInner {
    table: Mutex<StoreTable>,
}

impl StoreInner {
    fn working(&self, layout: usize) -> DbResult<Arc<RwLock<WorkingLayout>>> {
        let table = self.table.lock();
        Ok(table.slot(layout)?.working.clone())
    }

    fn cached_mapping(&self, key: &MappingKey) -> Option<CellMapping> {
        self.table.lock().mapping_cache.get(key).cloned()
    }

    /// Stores a mapping. Entries for the same working layout, target layout
    /// and target cell with other generations are stale and dropped.
    fn cache_mapping(&self, key: MappingKey, cm: CellMapping) {
        let mut table = self.table.lock();
        table
            .mapping_cache
            .retain(|k, _| !(k.0 == key.0 && k.2 == key.2 && k.4 == key.4));
        table.mapping_cache.insert(key, cm);
    }

    fn add_ref(&self, layout: usize, layer: LayerIndex) {
        self.table.lock().add_ref(layout, layer);
    }

    fn remove_ref(&self, layout: usize, layer: LayerIndex) {
        let (layer_gone, released) = {
            let mut table = self.table.lock();
            let keep = table.keep_layouts;
            let Some(Some(slot)) = table.slots.get_mut(layout) else {
                return;
            };
            let mut layer_gone = false;
            if let Some(n) = slot.layer_refs.get_mut(&layer) {
                *n -= 1;
                if *n == 0 {
                    slot.layer_refs.remove(&layer);
                    layer_gone = true;
                }
            }
            slot.total_refs = slot.total_refs.saturating_sub(1);
            let working = slot.working.clone();
            let layout_gone = slot.total_refs == 0 && !keep;
            if layer_gone {
                table.flat_memo.retain(|_, v| *v != (layout, layer));
            }
            let released = if layout_gone {
                table.forget_layout(layout)
            } else {
                None
            };
            (layer_gone.then_some(working), released)
        };

        // the slot lock is taken outside the table lock
        if released.is_none() {
            if let Some(working) = layer_gone {
                working.write().layout.delete_layer(layer);
            }
        }
    }
}

/// Shared store of working layouts. Clones refer to the same store.
#[derive(Clone)]
pub struct DeepShapeStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for DeepShapeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.inner.table.lock();
        f.debug_struct("DeepShapeStore")
            .field("layouts", &table.live_layouts())
            .field("state", &table.state)
            .finish()
    }
}

impl Default for DeepShapeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeepShapeStore {
    pub fn new() -> Self {
        Self::with_state(StoreState::default())
    }

    pub fn with_state(state: StoreState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                table: Mutex::new(StoreTable {
                    state,
                    ..Default::default()
                }),
            }),
        }
    }

    // ---- state

    pub fn state(&self) -> StoreState {
        self.inner.table.lock().state.clone()
    }

    pub fn set_state(&self, state: StoreState) {
        self.inner.table.lock().state = state;
    }

    fn update_state(&self, f: impl FnOnce(&mut StoreState)) {
        f(&mut self.inner.table.lock().state);
    }

    pub fn set_threads(&self, n: usize) {
        self.update_state(|s| s.threads = n);
    }

    pub fn set_max_area_ratio(&self, r: f64) {
        self.update_state(|s| s.max_area_ratio = r);
    }

    pub fn set_max_vertex_count(&self, n: usize) {
        self.update_state(|s| s.max_vertex_count = n);
    }

    pub fn set_reject_odd_polygons(&self, f: bool) {
        self.update_state(|s| s.reject_odd_polygons = f);
    }

    pub fn set_text_enlargement(&self, e: Coord) {
        self.update_state(|s| s.text_enlargement = e);
    }

    pub fn set_text_property_name(&self, name: Option<String>) {
        self.update_state(|s| s.text_property_name = name);
    }

    pub fn set_subcircuit_hierarchy_for_nets(&self, f: bool) {
        self.update_state(|s| s.subcircuit_hierarchy_for_nets = f);
    }

    /// Saves the current state; `pop_state` restores it
    pub fn push_state(&self) {
        let mut table = self.inner.table.lock();
        let s = table.state.clone();
        table.state_stack.push(s);
    }

    pub fn pop_state(&self) -> DbResult<()> {
        let mut table = self.inner.table.lock();
        let s = table.state_stack.pop().ok_or(DbError::EmptyStateStack)?;
        table.state = s;
        Ok(())
    }

    // ---- queries

    /// Keeps working layouts alive without references (diagnostics)
    pub fn set_keep_layouts(&self, f: bool) {
        self.inner.table.lock().keep_layouts = f;
    }

    pub fn keep_layouts(&self) -> bool {
        self.inner.table.lock().keep_layouts
    }

    pub fn layouts_count(&self) -> usize {
        self.inner.table.lock().live_layouts()
    }

    pub fn is_singular(&self) -> bool {
        self.layouts_count() == 1
    }

    pub fn has_layout(&self, layout: usize) -> bool {
        self.inner.table.lock().slot(layout).is_ok()
    }

    /// Total number of layer references into a working layout
    pub fn layout_refs(&self, layout: usize) -> usize {
        self.inner
            .table
            .lock()
            .slot(layout)
            .map_or(0, |s| s.total_refs)
    }

    pub fn layer_refs(&self, layout: usize, layer: LayerIndex) -> usize {
        self.inner
            .table
            .lock()
            .slot(layout)
            .map_or(0, |s| s.layer_refs.get(&layer).copied().unwrap_or(0))
    }

    /// Direct access to a working layout
    pub fn working_layout(&self, layout: usize) -> DbResult<Arc<RwLock<WorkingLayout>>> {
        self.inner.working(layout)
    }

    // ---- breakout cells

    /// Cells of a working layout the local processor must not descend into
    pub fn add_breakout_cells(&self, layout: usize, cells: impl IntoIterator<Item = CellIndex>) {
        self.inner
            .table
            .lock()
            .breakout
            .entry(layout)
            .or_default()
            .extend(cells);
    }

    pub fn clear_breakout_cells(&self, layout: usize) {
        self.inner.table.lock().breakout.remove(&layout);
    }

    pub fn breakout_cells(&self, layout: usize) -> Option<BTreeSet<CellIndex>> {
        self.inner.table.lock().breakout.get(&layout).cloned()
    }

    // ---- layer creation

    /// Hierarchical polygon layer. `None` limits take the store defaults.
    pub fn create_polygon_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        max_area_ratio: Option<f64>,
        max_vertex_count: Option<usize>,
        trans: ICplxTrans,
    ) -> DbResult<DeepLayer> {
        let state = self.state();
        let mut flags = ShapeFlags::POLYGONS | ShapeFlags::BOXES;
        if state.text_enlargement >= 0 {
            flags = flags | ShapeFlags::TEXTS;
            if state.text_property_name.is_none() {
                log::warn!("[DeepStore] Text markers are created without the text string: no text property name set");
            }
        }
        let pipeline = ShapePipeline::new()
            .with_stage(PipelineStage::Clip)
            .with_stage(PipelineStage::TextMarkers {
                enlargement: state.text_enlargement,
                property_name: state.text_property_name.clone(),
            })
            .with_stage(PipelineStage::ReduceComplexity {
                max_area_ratio: max_area_ratio.unwrap_or(state.max_area_ratio),
                max_vertex_count: max_vertex_count.unwrap_or(state.max_vertex_count),
                reject_odd: state.reject_odd_polygons,
            });
        self.create_layer(cursor, trans, flags, pipeline)
    }

    /// Hierarchical edge layer: the edges of polygons if `as_edges`,
    /// otherwise the edge shapes of the source
    pub fn create_edge_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        as_edges: bool,
        trans: ICplxTrans,
    ) -> DbResult<DeepLayer> {
        let (flags, pipeline) = if as_edges {
            (
                ShapeFlags::POLYGONS | ShapeFlags::BOXES,
                ShapePipeline::new()
                    .with_stage(PipelineStage::EdgesFromPolygons)
                    .with_stage(PipelineStage::Clip),
            )
        } else {
            (
                ShapeFlags::EDGES,
                ShapePipeline::new().with_stage(PipelineStage::Clip),
            )
        };
        self.create_layer(cursor, trans, flags, pipeline)
    }

    pub fn create_edge_pair_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        trans: ICplxTrans,
    ) -> DbResult<DeepLayer> {
        let pipeline = ShapePipeline::new().with_stage(PipelineStage::Clip);
        self.create_layer(cursor, trans, ShapeFlags::EDGE_PAIRS, pipeline)
    }

    pub fn create_text_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        trans: ICplxTrans,
    ) -> DbResult<DeepLayer> {
        let pipeline = ShapePipeline::new().with_stage(PipelineStage::Clip);
        self.create_layer(cursor, trans, ShapeFlags::TEXTS, pipeline)
    }

    /// Builds a layer from a custom pipeline
    pub fn create_custom_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        trans: ICplxTrans,
        flags: ShapeFlags,
        pipeline: ShapePipeline,
    ) -> DbResult<DeepLayer> {
        self.create_layer(cursor, trans, flags, pipeline)
    }

    /// Deep layer for a flat shape collection, placed into the initial cell
    /// of the store's only working layout. Memoized per collection.
    pub fn create_from_flat(&self, shapes: &Shapes, trans: ICplxTrans) -> DbResult<DeepLayer> {
        let memo_key = (shapes.uid(), trans);
        let state;
        let working;
        let layout_index;
        {
            let mut table = self.inner.table.lock();
            let live = table.live_layouts();
            if live > 1 {
                return Err(DbError::NotSingular(live));
            }
            if let Some(&(l, layer)) = table.flat_memo.get(&memo_key) {
                table.add_ref(l, layer);
                return Ok(DeepLayer::adopt(&self.inner, l, layer));
            }
            layout_index = match table.slots.iter().position(|s| s.is_some()) {
                Some(i) => i,
                None => table.add_slot(
                    WorkingLayout {
                        layout: Layout::with_dbu(0.001 / trans.mag),
                        builder: HierarchyBuilder::new(0),
                    },
                    None,
                ),
            };
            working = table.slot(layout_index)?.working.clone();
            state = table.state.clone();
        }

        let layer = working.write().layout.insert_layer(LayerInfo::default());
        let dl = self.adopt_new(layout_index, layer);

        let mut flags = ShapeFlags::POLYGONS | ShapeFlags::BOXES;
        if state.text_enlargement >= 0 {
            flags = flags | ShapeFlags::TEXTS;
        }
        let pipeline = ShapePipeline::new()
            .with_stage(PipelineStage::TextMarkers {
                enlargement: state.text_enlargement,
                property_name: state.text_property_name.clone(),
            })
            .with_stage(PipelineStage::ReduceComplexity {
                max_area_ratio: state.max_area_ratio,
                max_vertex_count: state.max_vertex_count,
                reject_odd: state.reject_odd_polygons,
            });
        let mut cursor = RecursiveShapeIterator::from_shapes(shapes);
        cursor.set_global_trans(trans);
        cursor.set_shape_flags(flags);
        self.run_builder(&working, layer, pipeline, false, &mut cursor)?;

        self.inner
            .table
            .lock()
            .flat_memo
            .insert(memo_key, (layout_index, layer));
        Ok(dl)
    }

    /// Copy of a layer inside its working layout
    pub fn create_copy(&self, layer: &DeepLayer) -> DbResult<DeepLayer> {
        layer.copy()
    }

    fn adopt_new(&self, layout: usize, layer: LayerIndex) -> DeepLayer {
        self.inner.add_ref(layout, layer);
        DeepLayer::adopt(&self.inner, layout, layer)
    }

    fn layout_for(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
    ) -> DbResult<(usize, Arc<RwLock<WorkingLayout>>, bool)> {
        let sig = cursor.signature();
        let mut table = self.inner.table.lock();
        let wants_all = table.state.subcircuit_hierarchy_for_nets;
        if let Some(&index) = table.layout_map.get(&sig) {
            if let Ok(slot) = table.slot(index) {
                return Ok((index, slot.working.clone(), wants_all));
            }
        }
        let source_dbu = cursor.layout().map_or(0.001, |l| l.dbu());
        let working = WorkingLayout {
            layout: Layout::with_dbu(source_dbu / cursor.global_trans().mag),
            builder: HierarchyBuilder::new(cursor.layout().map_or(0, |l| l.uid())),
        };
        let index = table.add_slot(working, Some(sig));
        let working = table.slot(index)?.working.clone();
        Ok((index, working, wants_all))
    }

    fn create_layer(
        &self,
        cursor: &RecursiveShapeIterator<'_>,
        trans: ICplxTrans,
        flags: ShapeFlags,
        pipeline: ShapePipeline,
    ) -> DbResult<DeepLayer> {
        let mut cursor = cursor.clone();
        cursor.set_global_trans(trans.concat(&cursor.global_trans()));
        cursor.set_shape_flags(ShapeFlags(cursor.shape_flags().0 & flags.0));

        let (index, working, wants_all) = self.layout_for(&cursor)?;
        let layer = working.write().layout.insert_layer(LayerInfo::default());
        // dropping the handle on error releases the layer again
        let dl = self.adopt_new(index, layer);
        self.run_builder(&working, layer, pipeline, wants_all, &mut cursor)?;
        Ok(dl)
    }

    fn run_builder(
        &self,
        working: &RwLock<WorkingLayout>,
        layer: LayerIndex,
        pipeline: ShapePipeline,
        wants_all: bool,
        cursor: &mut RecursiveShapeIterator<'_>,
    ) -> DbResult<()> {
        let mut guard = working.write();
        let w = &mut *guard;
        w.builder.set_target_layer(Some(layer));
        w.builder.set_shape_receiver(pipeline);
        w.builder.set_wants_all_cells(wants_all);
        let result = w.builder.build(&mut w.layout, cursor);
        w.builder.set_target_layer(None);
        w.builder.set_shape_receiver(ShapePipeline::new());
        result
    }

    // ---- mapping

    /// Cached mapping from working layout `layout` into `target`/`target_cell`.
    /// Missing target cells are created. Exports into the source layout below
    /// the cursor's top cell reuse the builder's cell map.
    fn mapping_into(
        &self,
        layout: usize,
        working: &WorkingLayout,
        target: &mut Layout,
        target_cell: CellIndex,
    ) -> DbResult<CellMapping> {
        if !target.is_valid_cell(target_cell) {
            return Err(DbError::InvalidCell(target_cell));
        }
        let key = (
            layout,
            working.layout.hier_generation(),
            target.uid(),
            target.hier_generation(),
            target_cell,
        );
        if let Some(cm) = self.inner.cached_mapping(&key) {
            return Ok(cm);
        }
        let to_original = target.uid() == working.builder.source_uid()
            && working.builder.source_top() == Some(target_cell);
        let cm = if to_original {
            self.original_mapping(layout, working, target, None)?
        } else {
            let initial = working
                .builder
                .initial_cell()
                .ok_or(DbError::InvalidLayout(layout))?;
            let mut cm = CellMapping::new();
            cm.create_from_geometry_full(target, target_cell, &working.layout, initial);
            cm
        };
        let key = (key.0, key.1, key.2, target.hier_generation(), key.4);
        self.inner.cache_mapping(key, cm.clone());
        Ok(cm)
    }

    /// Number of cached cell mappings
    pub fn mapping_cache_len(&self) -> usize {
        self.inner.table.lock().mapping_cache.len()
    }

    /// Mapping from a working layout back into the layout it was built from.
    ///
    /// Unclipped cells map to their source cells. Clip variants get copies
    /// of their source cell (`<name>$VAR`) in `into`; the instances they were
    /// built from are redirected to the copies, exploding arrays where only
    /// some members are affected. Source cells left without any instance are
    /// deleted. Remaining working cells (except `excluded`) are created.
    pub fn cell_mapping_to_original(
        &self,
        layout: usize,
        into: &mut Layout,
        excluded: Option<&BTreeSet<CellIndex>>,
    ) -> DbResult<CellMapping> {
        let working = self.inner.working(layout)?;
        let w = working.read();
        self.original_mapping(layout, &w, into, excluded)
    }

    fn original_mapping(
        &self,
        layout: usize,
        w: &WorkingLayout,
        into: &mut Layout,
        excluded: Option<&BTreeSet<CellIndex>>,
    ) -> DbResult<CellMapping> {
        if w.builder.source_uid() != into.uid() {
            return Err(DbError::NotOriginalLayout);
        }
        let initial = w
            .builder
            .initial_cell()
            .ok_or(DbError::InvalidLayout(layout))?;

        let mut cm = CellMapping::new();
        let mut variants = Vec::new();
        for (key, target) in w.builder.cell_map() {
            if !into.is_valid_cell(key.cell) {
                continue;
            }
            if key.is_clipped() {
                variants.push((key.cell, target));
            } else {
                cm.map(target, key.cell);
            }
        }

        // variant copies, taken before any instance is redirected
        let mut variant_cells = BTreeMap::new();
        let mut copies = Vec::new();
        for (source_cell, target) in &variants {
            let name = format!("{}$VAR", into.cell_name(*source_cell));
            let copy = into.add_cell(&name);
            copies.push((*source_cell, copy));
            variant_cells.insert(*target, copy);
            cm.map(*target, copy);
        }
        for (source_cell, copy) in &copies {
            copy_cell_content(into, *source_cell, *copy);
        }

        // (into parent, instance index) -> [(member, new cell)]
        let mut redirects: BTreeMap<(CellIndex, usize), Vec<(Trans, CellIndex)>> =
            BTreeMap::new();
        for (target, copy) in &variant_cells {
            for p in w.builder.placements_of(*target) {
                let parent = variant_cells
                    .get(&p.parent)
                    .copied()
                    .unwrap_or(p.source_parent);
                redirects
                    .entry((parent, p.inst_index))
                    .or_default()
                    .push((p.member, *copy));
            }
        }

        let superseded: BTreeSet<CellIndex> = variants
            .iter()
            .map(|(c, _)| *c)
            .filter(|c| !into.parent_cells(*c).is_empty())
            .collect();
        let parents: BTreeSet<CellIndex> = redirects.keys().map(|(p, _)| *p).collect();
        for parent in parents {
            let Some(cell) = into.cell(parent) else {
                continue;
            };
            let mut instances = Vec::with_capacity(cell.instances().len());
            for (i, inst) in cell.instances().iter().enumerate() {
                let Some(rs) = redirects.get(&(parent, i)) else {
                    instances.push(*inst);
                    continue;
                };
                if inst.is_array() {
                    log::debug!(
                        "[DeepStore] Exploding array of {} ({} members) for variant mapping",
                        into.cell_name(inst.cell),
                        inst.size()
                    );
                }
                for m in inst.members() {
                    let cell = rs
                        .iter()
                        .find(|(member, _)| *member == m)
                        .map_or(inst.cell, |(_, c)| *c);
                    instances.push(CellInstArray {
                        cell,
                        trans: m,
                        array: None,
                        prop_id: inst.prop_id,
                    });
                }
            }
            into.set_instances(parent, instances);
        }

        for cell in superseded {
            if !into.parent_cells(cell).is_empty() {
                continue;
            }
            let stale: Vec<CellIndex> = cm
                .table()
                .iter()
                .filter(|(_, c)| **c == cell)
                .map(|(t, _)| *t)
                .collect();
            for t in stale {
                cm.unmap(t);
            }
            log::debug!("[DeepStore] Deleting superseded cell {}", into.cell_name(cell));
            into.delete_cell(cell);
        }

        cm.create_missing_mapping(into, &w.layout, initial, excluded);
        Ok(cm)
    }
}

/// Copies instances and shapes of `source` into `target` in the same layout
fn copy_cell_content(layout: &mut Layout, source: CellIndex, target: CellIndex) {
    let Some(cell) = layout.cell(source) else {
        return;
    };
    let instances = cell.instances().to_vec();
    let shapes: Vec<(LayerIndex, Vec<ShapeEntry>)> = cell
        .layers()
        .filter_map(|li| cell.shapes(li).map(|s| (li, s.iter().cloned().collect())))
        .collect();
    for inst in instances {
        layout.insert_instance(target, inst);
    }
    for (li, entries) in shapes {
        if let Some(s) = layout.shapes_mut(target, li) {
            s.extend(entries);
        }
    }
}

/// Handle to a layer of a working layout
#[derive(Debug)]
pub struct DeepLayer {
    store: Weak<StoreInner>,
    layout: usize,
    layer: LayerIndex,
}

impl std::fmt::Debug for StoreInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StoreInner")
    }
}

impl DeepLayer {
    /// Wraps an already counted reference
    fn adopt(store: &Arc<StoreInner>, layout: usize, layer: LayerIndex) -> Self {
        Self {
            store: Arc::downgrade(store),
            layout,
            layer,
        }
    }

    pub fn store(&self) -> DbResult<DeepShapeStore> {
        self.store
            .upgrade()
            .map(|inner| DeepShapeStore { inner })
            .ok_or(DbError::Detached)
    }

    pub fn layout_index(&self) -> usize {
        self.layout
    }

    pub fn layer(&self) -> LayerIndex {
        self.layer
    }

    /// True while the store exists and holds the layer
    pub fn is_valid(&self) -> bool {
        self.store()
            .map(|s| s.layer_refs(self.layout, self.layer) > 0)
            .unwrap_or(false)
    }

    fn working(&self) -> DbResult<Arc<RwLock<WorkingLayout>>> {
        let inner = self.store.upgrade().ok_or(DbError::Detached)?;
        inner.working(self.layout)
    }

    /// Read access to the working layout. Deep layers of the same layout
    /// must not be dropped inside `f`.
    pub fn with_layout<T>(&self, f: impl FnOnce(&Layout) -> T) -> DbResult<T> {
        let working = self.working()?;
        let guard = working.read();
        Ok(f(&guard.layout))
    }

    pub fn with_layout_mut<T>(&self, f: impl FnOnce(&mut Layout) -> T) -> DbResult<T> {
        let working = self.working()?;
        let mut guard = working.write();
        Ok(f(&mut guard.layout))
    }

    /// Top cell of the working layout
    pub fn initial_cell(&self) -> DbResult<CellIndex> {
        let working = self.working()?;
        let guard = working.read();
        guard
            .builder
            .initial_cell()
            .ok_or(DbError::InvalidLayout(self.layout))
    }

    /// New empty layer in the same working layout
    pub fn derived(&self) -> DbResult<DeepLayer> {
        let store = self.store()?;
        let working = store.inner.working(self.layout)?;
        let layer = working.write().layout.insert_layer(LayerInfo::default());
        Ok(store.adopt_new(self.layout, layer))
    }

    /// Derived layer with a copy of this layer's shapes
    pub fn copy(&self) -> DbResult<DeepLayer> {
        let dl = self.derived()?;
        dl.with_layout_mut(|l| l.copy_layer(self.layer, dl.layer))?;
        Ok(dl)
    }

    /// Adds the shapes of `other` to this layer. Layers of different working
    /// layouts are combined through a cached cell mapping.
    pub fn add_from(&self, other: &DeepLayer) -> DbResult<()> {
        let store = self.store()?;
        let other_store = other.store()?;
        let same_store = Arc::ptr_eq(&store.inner, &other_store.inner);
        if same_store && self.layout == other.layout {
            if self.layer != other.layer {
                self.with_layout_mut(|l| l.copy_layer(other.layer, self.layer))?;
            }
            return Ok(());
        }

        let target = store.inner.working(self.layout)?;
        let source = other_store.inner.working(other.layout)?;
        let self_first = (Arc::as_ptr(&store.inner) as usize, self.layout)
            < (Arc::as_ptr(&other_store.inner) as usize, other.layout);
        let (mut tg, sg) = if self_first {
            let t = target.write();
            let s = source.read();
            (t, s)
        } else {
            let s = source.read();
            let t = target.write();
            (t, s)
        };

        let source_initial = sg
            .builder
            .initial_cell()
            .ok_or(DbError::InvalidLayout(other.layout))?;
        let target_initial = tg
            .builder
            .initial_cell()
            .ok_or(DbError::InvalidLayout(self.layout))?;

        let key = (
            other.layout,
            sg.layout.hier_generation(),
            tg.layout.uid(),
            tg.layout.hier_generation(),
            target_initial,
        );
        let cm = match store.inner.cached_mapping(&key) {
            Some(cm) => cm,
            None => {
                let mut cm = CellMapping::new();
                cm.create_from_geometry_full(&mut tg.layout, target_initial, &sg.layout, source_initial);
                let key = (key.0, key.1, key.2, tg.layout.hier_generation(), key.4);
                store.inner.cache_mapping(key, cm.clone());
                cm
            }
        };
        copy_layer_shapes(&sg.layout, other.layer, &mut tg.layout, self.layer, &cm, ExportMode::AsIs, None);
        Ok(())
    }

    /// Copies the layer into `target_layer` of an external layout below
    /// `target_cell`. Text marker boxes become texts again.
    pub fn insert_into(&self, target: &mut Layout, target_cell: CellIndex, target_layer: LayerIndex) -> DbResult<()> {
        if !target.is_valid_layer(target_layer) {
            return Err(DbError::InvalidLayer(target_layer));
        }
        let store = self.store()?;
        let property = store.state().text_property_name;
        let working = store.inner.working(self.layout)?;
        let w = working.read();
        let cm = store.mapping_into(self.layout, &w, target, target_cell)?;
        copy_layer_shapes(&w.layout, self.layer, target, target_layer, &cm, ExportMode::AsIs, property.as_deref());
        Ok(())
    }

    /// Like `insert_into`, but every shape becomes a polygon. Edges, edge
    /// pairs and texts are enlarged by `enlargement`.
    pub fn insert_into_as_polygons(
        &self,
        target: &mut Layout,
        target_cell: CellIndex,
        target_layer: LayerIndex,
        enlargement: Coord,
    ) -> DbResult<()> {
        if !target.is_valid_layer(target_layer) {
            return Err(DbError::InvalidLayer(target_layer));
        }
        let store = self.store()?;
        let working = store.inner.working(self.layout)?;
        let w = working.read();
        let cm = store.mapping_into(self.layout, &w, target, target_cell)?;
        copy_layer_shapes(&w.layout, self.layer, target, target_layer, &cm, ExportMode::Polygons(enlargement), None);
        Ok(())
    }
}

impl Clone for DeepLayer {
    fn clone(&self) -> Self {
        if let Some(inner) = self.store.upgrade() {
            inner.add_ref(self.layout, self.layer);
        }
        Self {
            store: self.store.clone(),
            layout: self.layout,
            layer: self.layer,
        }
    }
}

impl Drop for DeepLayer {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.remove_ref(self.layout, self.layer);
        }
    }
}

impl PartialEq for DeepLayer {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.store, &other.store) && self.layout == other.layout && self.layer == other.layer
    }
}

impl Eq for DeepLayer {}
