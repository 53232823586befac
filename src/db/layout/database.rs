//! The hierarchical layout database

use crate::db::geometry::{Bounded, Rect};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use super::cell::{Cell, CellIndex, CellInstArray, LayerIndex};
use super::next_uid;
use super::shapes::{PropertiesId, Shapes};

/// Layer description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
}

impl LayerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A property set: name -> value
pub type PropertySet = BTreeMap<String, String>;

/// A hierarchical layout: cells, layers, instances and properties.
///
/// Every structural change (cells, instances) bumps the hierarchy
/// generation, which external caches use to detect staleness. Cell bounding
/// boxes are computed lazily and dropped on any mutation.
#[derive(Debug)]
pub struct Layout {
    uid: u64,
    dbu: f64,
    cells: Vec<Option<Cell>>,
    layers: Vec<Option<LayerInfo>>,
    properties: IndexSet<PropertySet>,
    hier_generation: u64,
    bboxes: OnceLock<Vec<Rect>>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new()
    }
}

impl Layout {
    pub fn new() -> Self {
        Self::with_dbu(0.001)
    }

    pub fn with_dbu(dbu: f64) -> Self {
        Self {
            uid: next_uid(),
            dbu,
            cells: Vec::new(),
            layers: Vec::new(),
            properties: IndexSet::new(),
            hier_generation: 0,
            bboxes: OnceLock::new(),
        }
    }

    /// Unique identity of this layout object
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn dbu(&self) -> f64 {
        self.dbu
    }

    pub fn set_dbu(&mut self, dbu: f64) {
        self.dbu = dbu;
    }

    pub fn hier_generation(&self) -> u64 {
        self.hier_generation
    }

    fn structure_changed(&mut self) {
        self.hier_generation += 1;
        self.bboxes = OnceLock::new();
    }

    // ---- cells

    pub fn add_cell(&mut self, name: &str) -> CellIndex {
        let name = self.unique_cell_name(name);
        self.cells.push(Some(Cell {
            name,
            ..Default::default()
        }));
        self.structure_changed();
        self.cells.len() - 1
    }

    /// `name` if unused, otherwise `name$1`, `name$2`, ...
    pub fn unique_cell_name(&self, name: &str) -> String {
        if self.cell_by_name(name).is_none() {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{}${}", name, n))
            .find(|n| self.cell_by_name(n).is_none())
            .unwrap_or_else(|| name.to_string())
    }

    pub fn cell(&self, ci: CellIndex) -> Option<&Cell> {
        self.cells.get(ci).and_then(|c| c.as_ref())
    }

    pub fn cell_name(&self, ci: CellIndex) -> &str {
        self.cell(ci).map(|c| c.name()).unwrap_or("")
    }

    pub fn rename_cell(&mut self, ci: CellIndex, name: &str) {
        let name = self.unique_cell_name(name);
        if let Some(Some(c)) = self.cells.get_mut(ci) {
            c.name = name;
        }
    }

    pub fn is_valid_cell(&self, ci: CellIndex) -> bool {
        self.cell(ci).is_some()
    }

    pub fn cell_by_name(&self, name: &str) -> Option<CellIndex> {
        self.cells
            .iter()
            .position(|c| c.as_ref().map(|c| c.name == name).unwrap_or(false))
    }

    /// Valid cell indexes in ascending order
    pub fn cell_indexes(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_some())
            .map(|(i, _)| i)
    }

    pub fn cells_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Deletes a cell and all instances pointing to it
    pub fn delete_cell(&mut self, ci: CellIndex) {
        if !self.is_valid_cell(ci) {
            return;
        }
        self.cells[ci] = None;
        for c in self.cells.iter_mut().flatten() {
            c.instances.retain(|i| i.cell != ci);
        }
        self.structure_changed();
    }

    // ---- instances

    pub fn insert_instance(&mut self, parent: CellIndex, inst: CellInstArray) {
        if !self.is_valid_cell(inst.cell) {
            return;
        }
        if let Some(Some(c)) = self.cells.get_mut(parent) {
            c.instances.push(inst);
            self.structure_changed();
        }
    }

    /// Replaces all instances of `parent`
    pub fn set_instances(&mut self, parent: CellIndex, instances: Vec<CellInstArray>) {
        if let Some(Some(c)) = self.cells.get_mut(parent) {
            c.instances = instances;
            self.structure_changed();
        }
    }

    /// Cells not instantiated anywhere, in index order
    pub fn top_cells(&self) -> Vec<CellIndex> {
        let called: BTreeSet<CellIndex> = self
            .cells
            .iter()
            .flatten()
            .flat_map(|c| c.instances.iter().map(|i| i.cell))
            .collect();
        self.cell_indexes().filter(|c| !called.contains(c)).collect()
    }

    pub fn top_cell(&self) -> Option<CellIndex> {
        self.top_cells().into_iter().next()
    }

    /// Direct children in order of first appearance
    pub fn child_cells(&self, ci: CellIndex) -> Vec<CellIndex> {
        let mut seen = BTreeSet::new();
        self.cell(ci)
            .map(|c| {
                c.instances
                    .iter()
                    .map(|i| i.cell)
                    .filter(|c| seen.insert(*c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn parent_cells(&self, ci: CellIndex) -> Vec<CellIndex> {
        self.cell_indexes()
            .filter(|p| {
                self.cell(*p)
                    .map(|c| c.instances.iter().any(|i| i.cell == ci))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// All cells reachable from `ci`, excluding `ci` itself
    pub fn called_cells(&self, ci: CellIndex) -> BTreeSet<CellIndex> {
        let mut result = BTreeSet::new();
        let mut todo = vec![ci];
        while let Some(c) = todo.pop() {
            for child in self.child_cells(c) {
                if result.insert(child) {
                    todo.push(child);
                }
            }
        }
        result
    }

    /// All cells, children before parents
    pub fn bottom_up(&self) -> Vec<CellIndex> {
        let mut order = Vec::new();
        let mut done = BTreeSet::new();
        for top in self.cell_indexes() {
            self.collect_bottom_up(top, &mut done, &mut order);
        }
        order
    }

    /// Post-order walk below `ci` with an explicit stack of (cell, children)
    fn collect_bottom_up(&self, ci: CellIndex, done: &mut BTreeSet<CellIndex>, order: &mut Vec<CellIndex>) {
        if !done.insert(ci) {
            return;
        }
        let mut stack = vec![(ci, self.child_cells(ci).into_iter())];
        while let Some((cell, children)) = stack.last_mut() {
            match children.next() {
                Some(child) => {
                    if done.insert(child) {
                        let grandchildren = self.child_cells(child).into_iter();
                        stack.push((child, grandchildren));
                    }
                }
                None => {
                    order.push(*cell);
                    stack.pop();
                }
            }
        }
    }

    /// Bounding box of a cell over all layers, including its children
    pub fn cell_bbox(&self, ci: CellIndex) -> Rect {
        let bboxes = self.bboxes.get_or_init(|| self.compute_bboxes());
        bboxes.get(ci).copied().unwrap_or_else(Rect::empty)
    }

    fn compute_bboxes(&self) -> Vec<Rect> {
        let mut boxes = vec![Rect::empty(); self.cells.len()];
        for ci in self.bottom_up() {
            let Some(cell) = self.cell(ci) else { continue };
            let mut r = cell
                .shapes
                .values()
                .fold(Rect::empty(), |r, s| r.extended(&s.bbox()));
            for inst in &cell.instances {
                r = r.extended(&inst.bbox_from(&boxes[inst.cell]));
            }
            boxes[ci] = r;
        }
        boxes
    }

    // ---- layers

    pub fn insert_layer(&mut self, info: LayerInfo) -> LayerIndex {
        if let Some(free) = self.layers.iter().position(|l| l.is_none()) {
            self.layers[free] = Some(info);
            return free;
        }
        self.layers.push(Some(info));
        self.layers.len() - 1
    }

    pub fn layer_info(&self, li: LayerIndex) -> Option<&LayerInfo> {
        self.layers.get(li).and_then(|l| l.as_ref())
    }

    pub fn is_valid_layer(&self, li: LayerIndex) -> bool {
        self.layer_info(li).is_some()
    }

    pub fn find_layer(&self, name: &str) -> Option<LayerIndex> {
        self.layers
            .iter()
            .position(|l| l.as_ref().map(|l| l.name == name).unwrap_or(false))
    }

    pub fn layer_indexes(&self) -> impl Iterator<Item = LayerIndex> + '_ {
        self.layers
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_some())
            .map(|(i, _)| i)
    }

    /// Deletes a layer and its shapes in all cells
    pub fn delete_layer(&mut self, li: LayerIndex) {
        if li < self.layers.len() {
            self.layers[li] = None;
        }
        for c in self.cells.iter_mut().flatten() {
            c.shapes.remove(&li);
        }
        self.bboxes = OnceLock::new();
    }

    /// Removes all shapes of a layer but keeps the layer
    pub fn clear_layer(&mut self, li: LayerIndex) {
        for c in self.cells.iter_mut().flatten() {
            c.shapes.remove(&li);
        }
        self.bboxes = OnceLock::new();
    }

    /// Copies the shapes of layer `src` into layer `dst` in every cell
    pub fn copy_layer(&mut self, src: LayerIndex, dst: LayerIndex) {
        for c in self.cells.iter_mut().flatten() {
            if let Some(s) = c.shapes.get(&src) {
                let entries: Vec<_> = s.iter().cloned().collect();
                c.shapes.entry(dst).or_default().extend(entries);
            }
        }
        self.bboxes = OnceLock::new();
    }

    // ---- shapes

    pub fn shapes(&self, ci: CellIndex, li: LayerIndex) -> Option<&Shapes> {
        self.cell(ci).and_then(|c| c.shapes(li))
    }

    /// Mutable shape container of a cell/layer, created on demand.
    /// Returns `None` for an invalid cell.
    pub fn shapes_mut(&mut self, ci: CellIndex, li: LayerIndex) -> Option<&mut Shapes> {
        self.bboxes = OnceLock::new();
        self.cells
            .get_mut(ci)
            .and_then(|c| c.as_mut())
            .map(|c| c.shapes.entry(li).or_default())
    }

    /// Total number of shapes on a layer over all cells (not flattened)
    pub fn shape_count(&self, li: LayerIndex) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter_map(|c| c.shapes(li))
            .map(|s| s.len())
            .sum()
    }

    // ---- properties

    /// Id for a property set; the empty set is id 0
    pub fn properties_id(&mut self, props: &PropertySet) -> PropertiesId {
        if props.is_empty() {
            return 0;
        }
        let (index, _) = self.properties.insert_full(props.clone());
        index + 1
    }

    pub fn properties(&self, id: PropertiesId) -> Option<&PropertySet> {
        if id == 0 {
            return None;
        }
        self.properties.get_index(id - 1)
    }
}
