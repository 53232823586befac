//! Recursive shape iterator
//!
//! Walks a cell hierarchy depth-first (pre-order), delivering the shapes of
//! the configured layer(s) in every visited cell, confined to a rectangular
//! or polygonal region. The traversal is driven either by pulling
//! (`at_end` / `shape` / `next`) or by pushing into a receiver.
//!
//! Configuration and traversal state are separate. Every configuration change
//! marks the traversal state dirty; the next observation rebuilds it.

use crate::db::geometry::{Bounded, ICplxTrans, Polygon, Rect, Trans};
use crate::db::layout::{
    CellIndex, LayerIndex, Layout, PropertiesId, PropertySet, Shape, ShapeEntry, ShapeFlags,
    Shapes,
};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::convert::Infallible;

use super::receiver::{CursorInfo, InstVisit, NullReceiver, RecursiveShapeReceiver};
use super::region::ComplexRegion;

#[derive(Debug, Clone, Copy)]
enum Source<'a> {
    None,
    Hier { layout: &'a Layout, top: CellIndex },
    Flat(&'a Shapes),
}

/// Filter on shape properties
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PropertySelector {
    /// Every entry must be present with the same value
    pub required: PropertySet,
    /// Deliver the shapes that do NOT match instead
    pub inverse: bool,
}

impl PropertySelector {
    pub fn new(required: PropertySet) -> Self {
        Self {
            required,
            inverse: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.inverse = !self.inverse;
        self
    }

    pub fn matches(&self, props: Option<&PropertySet>) -> bool {
        let hit = self
            .required
            .iter()
            .all(|(k, v)| props.and_then(|p| p.get(k)) == Some(v));
        hit != self.inverse
    }
}

/// Per-level cell state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellFrame {
    /// `None` when iterating a flat shape collection
    pub cell: Option<CellIndex>,
    /// Shapes of this cell are not delivered (the subtree is still visited)
    pub inactive: bool,
    /// The whole cell lies inside the search region
    pub all_of_instance: bool,
}

/// Identity of a cursor's source and hierarchy-shaping configuration.
///
/// Region, layers, shape flags and the property selector do not take part:
/// cursors that only differ in these build the same hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorSignature {
    pub source: u64,
    pub hier_generation: u64,
    pub top_cell: Option<CellIndex>,
    pub min_depth: usize,
    pub max_depth: usize,
    pub enabled: Vec<CellIndex>,
    pub disabled: Vec<CellIndex>,
    pub global_trans: ICplxTrans,
}

#[derive(Debug, Clone)]
struct CursorConfig<'a> {
    source: Source<'a>,
    layers: Vec<LayerIndex>,
    multi_layer: bool,
    max_depth: usize,
    min_depth: usize,
    shape_flags: ShapeFlags,
    prop_selector: Option<PropertySelector>,
    global_trans: ICplxTrans,
    region: Rect,
    /// Polygonal confinements; the effective region is their intersection
    complex: Vec<Vec<Polygon>>,
    enabled: BTreeSet<CellIndex>,
    disabled: BTreeSet<CellIndex>,
    overlapping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Validity {
    Dirty,
    Valid,
}

/// One hierarchy level currently descended into
#[derive(Debug, Clone)]
struct Level {
    frame: CellFrame,
    trans: ICplxTrans,
    region: Rect,
    complex: Option<ComplexRegion>,
    layer_pos: usize,
    candidates: Vec<usize>,
    shape_pos: usize,
    shapes_done: bool,
    inst_pos: usize,
    inst_open: bool,
    inst_mode: InstVisit,
    member_pos: usize,
}

impl Level {
    fn new(frame: CellFrame, trans: ICplxTrans, region: Rect, complex: Option<ComplexRegion>) -> Self {
        Self {
            frame,
            trans,
            region,
            complex,
            layer_pos: 0,
            candidates: Vec::new(),
            shape_pos: 0,
            shapes_done: false,
            inst_pos: 0,
            inst_open: false,
            inst_mode: InstVisit::All,
            member_pos: 0,
        }
    }
}

#[derive(Debug)]
struct TraversalState {
    validity: Validity,
    at_end: bool,
    levels: Vec<Level>,
}

impl Default for TraversalState {
    fn default() -> Self {
        Self {
            validity: Validity::Dirty,
            at_end: true,
            levels: Vec::new(),
        }
    }
}

fn infallible(r: Result<(), Infallible>) {
    if let Err(e) = r {
        match e {}
    }
}

impl<'a> CursorConfig<'a> {
    fn new(source: Source<'a>, layers: Vec<LayerIndex>, multi_layer: bool) -> Self {
        Self {
            source,
            layers,
            multi_layer,
            max_depth: usize::MAX,
            min_depth: 0,
            shape_flags: ShapeFlags::ALL,
            prop_selector: None,
            global_trans: ICplxTrans::identity(),
            region: Rect::world(),
            complex: Vec::new(),
            enabled: BTreeSet::new(),
            disabled: BTreeSet::new(),
            overlapping: false,
        }
    }

    fn layout(&self) -> Option<&'a Layout> {
        match self.source {
            Source::Hier { layout, .. } => Some(layout),
            _ => None,
        }
    }

    fn top_cell(&self) -> Option<CellIndex> {
        match self.source {
            Source::Hier { top, .. } => Some(top),
            _ => None,
        }
    }

    fn info(&self, depth: usize) -> CursorInfo<'a> {
        CursorInfo {
            layout: self.layout(),
            top_cell: self.top_cell(),
            depth,
            global_trans: self.global_trans,
        }
    }

    fn always_apply(&self, depth: usize) -> ICplxTrans {
        if depth == 0 {
            self.global_trans
        } else {
            self.global_trans.linear()
        }
    }

    fn layer_count(&self) -> usize {
        match self.source {
            Source::Hier { .. } => self.layers.len(),
            _ => 1,
        }
    }

    fn shapes_of(&self, cell: Option<CellIndex>, layer_pos: usize) -> Option<&'a Shapes> {
        match (self.source, cell) {
            (Source::Hier { layout, .. }, Some(ci)) => {
                let li = *self.layers.get(layer_pos)?;
                layout.shapes(ci, li)
            }
            (Source::Flat(shapes), _) => Some(shapes),
            _ => None,
        }
    }

    /// Decomposed polygonal region at the top level
    fn base_complex(&self) -> Option<ComplexRegion> {
        let mut factors = self.complex.iter().map(|p| ComplexRegion::from_polygons(p));
        let first = factors.next()?;
        let region = factors.fold(first, |acc, f| acc.intersected(&f));
        Some(region.confined(&self.region))
    }

    fn child_inactive(&self, parent_inactive: bool, cell: CellIndex) -> bool {
        if self.enabled.contains(&cell) {
            false
        } else if self.disabled.contains(&cell) {
            true
        } else {
            parent_inactive
        }
    }

    fn region_interacts(&self, level: &Level, r: &Rect) -> bool {
        level.region.interacts(r, self.overlapping)
            && level
                .complex
                .as_ref()
                .map_or(true, |c| c.interacts(r, self.overlapping))
    }

    fn region_covers(&self, level: &Level, r: &Rect) -> bool {
        level.region.contains_rect(r) && level.complex.as_ref().map_or(true, |c| c.covers(r))
    }

    fn start_shapes(&self, level: &mut Level, depth: usize) {
        level.candidates.clear();
        level.shape_pos = 0;
        if depth < self.min_depth || level.frame.inactive {
            return;
        }
        let Some(shapes) = self.shapes_of(level.frame.cell, level.layer_pos) else {
            return;
        };
        let layout = self.layout();
        let complex = level.complex.as_ref();
        let candidates: Vec<usize> = shapes
            .query(&level.region, self.overlapping)
            .into_iter()
            .filter(|&i| {
                let Some(e) = shapes.get(i) else { return false };
                self.shape_flags.intersects(e.shape.flag())
                    && self.prop_selector.as_ref().map_or(true, |s| {
                        s.matches(layout.and_then(|l| l.properties(e.prop_id)))
                    })
                    && complex.map_or(true, |c| c.interacts(&e.shape.bbox(), self.overlapping))
            })
            .collect();
        level.candidates = candidates;
    }

    fn init<R: RecursiveShapeReceiver>(
        &self,
        st: &mut TraversalState,
        rec: &mut R,
    ) -> Result<(), R::Error> {
        st.levels.clear();
        st.at_end = true;
        st.validity = Validity::Valid;

        let cell = match self.source {
            Source::None => return Ok(()),
            Source::Hier { layout, top } => {
                if !layout.is_valid_cell(top) {
                    return Ok(());
                }
                Some(top)
            }
            Source::Flat(_) => None,
        };
        if self.region.is_empty() {
            return Ok(());
        }
        let complex = self.base_complex();
        if complex.as_ref().is_some_and(|c| c.is_empty()) {
            return Ok(());
        }

        let frame = CellFrame {
            cell,
            inactive: cell.is_some_and(|c| self.child_inactive(false, c)),
            all_of_instance: self.region.is_world() && complex.is_none(),
        };
        let mut level = Level::new(frame, self.global_trans, self.region, complex);
        if let Some(ci) = cell {
            rec.enter_cell(&self.info(0), ci, &level.region, level.complex.as_ref())?;
        }
        self.start_shapes(&mut level, 0);
        st.levels.push(level);
        st.at_end = false;
        Ok(())
    }

    /// Moves forward until a shape is available or the traversal ends. The
    /// current candidate is accepted as is.
    fn advance<R: RecursiveShapeReceiver>(
        &self,
        st: &mut TraversalState,
        rec: &mut R,
    ) -> Result<(), R::Error> {
        loop {
            let depth = st.levels.len().saturating_sub(1);
            let Some(level) = st.levels.last_mut() else {
                st.at_end = true;
                return Ok(());
            };

            if !level.shapes_done {
                if level.shape_pos < level.candidates.len() {
                    return Ok(());
                }
                if level.layer_pos + 1 < self.layer_count() {
                    level.layer_pos += 1;
                    self.start_shapes(level, depth);
                    continue;
                }
                level.shapes_done = true;
            }

            if depth < self.max_depth {
                if let Some(mut child) = self.next_member(level, depth, rec)? {
                    if let Some(ci) = child.frame.cell {
                        rec.enter_cell(
                            &self.info(depth + 1),
                            ci,
                            &child.region,
                            child.complex.as_ref(),
                        )?;
                    }
                    self.start_shapes(&mut child, depth + 1);
                    st.levels.push(child);
                    continue;
                }
            }

            if let Some(done) = st.levels.pop() {
                if let Some(ci) = done.frame.cell {
                    rec.leave_cell(&self.info(depth), ci)?;
                }
            }
            if st.levels.is_empty() {
                st.at_end = true;
                return Ok(());
            }
        }
    }

    /// Finds the next instance member to descend into and builds its level
    fn next_member<R: RecursiveShapeReceiver>(
        &self,
        level: &mut Level,
        depth: usize,
        rec: &mut R,
    ) -> Result<Option<Level>, R::Error> {
        let Source::Hier { layout, .. } = self.source else {
            return Ok(None);
        };
        let Some(cell) = level.frame.cell.and_then(|ci| layout.cell(ci)) else {
            return Ok(None);
        };
        let info = self.info(depth);
        let always = self.always_apply(depth);
        let wants_all = rec.wants_all_cells();

        loop {
            let Some(inst) = cell.instances().get(level.inst_pos) else {
                return Ok(None);
            };
            let child_bbox = layout.cell_bbox(inst.cell);
            let visible = |level: &Level, r: &Rect| {
                wants_all
                    || (!child_bbox.is_empty()
                        && (level.frame.all_of_instance || self.region_interacts(level, r)))
            };

            if !level.inst_open {
                let inst_bbox = inst.bbox_from(&child_bbox);
                if !visible(&*level, &inst_bbox) {
                    level.inst_pos += 1;
                    continue;
                }
                let all = level.frame.all_of_instance || self.region_covers(level, &inst_bbox);
                let mode = rec.new_inst(
                    &info,
                    inst,
                    &always,
                    &level.region,
                    level.complex.as_ref(),
                    all,
                )?;
                if mode == InstVisit::Skip {
                    level.inst_pos += 1;
                    continue;
                }
                level.inst_mode = mode;
                level.inst_open = true;
                level.member_pos = 0;
            }

            let limit = match level.inst_mode {
                InstVisit::OnlyFirst => 1,
                _ => inst.size(),
            };
            let member = if level.member_pos < limit {
                inst.member(level.member_pos)
            } else {
                None
            };
            let Some(mt) = member else {
                level.inst_open = false;
                level.inst_pos += 1;
                continue;
            };
            level.member_pos += 1;

            let member_bbox = mt.apply_rect(&child_bbox);
            if !visible(&*level, &member_bbox) {
                continue;
            }
            let all = level.frame.all_of_instance || self.region_covers(level, &member_bbox);
            if !rec.new_inst_member(
                &info,
                inst,
                &mt,
                &always,
                &level.region,
                level.complex.as_ref(),
                all,
            )? {
                continue;
            }
            return Ok(Some(self.child_level(
                level,
                inst.cell,
                &mt,
                &member_bbox,
                &child_bbox,
                all,
            )));
        }
    }

    fn child_level(
        &self,
        parent: &Level,
        cell: CellIndex,
        member: &Trans,
        member_bbox: &Rect,
        child_bbox: &Rect,
        all: bool,
    ) -> Level {
        let frame = CellFrame {
            cell: Some(cell),
            inactive: self.child_inactive(parent.frame.inactive, cell),
            all_of_instance: all,
        };
        let trans = parent.trans.concat_trans(member);
        if all {
            return Level::new(frame, trans, Rect::world(), None);
        }
        let to_child = member.inverted();
        let region = to_child.apply_rect(&parent.region.intersection(member_bbox));
        let complex = parent
            .complex
            .as_ref()
            .map(|c| c.reduced(member_bbox, &to_child, child_bbox));
        Level::new(frame, trans, region, complex)
    }

    fn step<R: RecursiveShapeReceiver>(
        &self,
        st: &mut TraversalState,
        rec: &mut R,
    ) -> Result<(), R::Error> {
        if let Some(level) = st.levels.last_mut() {
            level.shape_pos += 1;
        }
        self.advance(st, rec)
    }

    fn current<'s>(&self, st: &'s TraversalState) -> Option<(&'a ShapeEntry, &'s Level)> {
        if st.at_end {
            return None;
        }
        let level = st.levels.last()?;
        let index = *level.candidates.get(level.shape_pos)?;
        let shapes = self.shapes_of(level.frame.cell, level.layer_pos)?;
        Some((shapes.get(index)?, level))
    }

    fn drive<R: RecursiveShapeReceiver>(
        &self,
        st: &mut TraversalState,
        rec: &mut R,
    ) -> Result<(), R::Error> {
        self.init(st, rec)?;
        self.advance(st, rec)?;
        while let Some((entry, level)) = self.current(st) {
            let depth = st.levels.len() - 1;
            rec.shape(
                &self.info(depth),
                entry,
                &self.always_apply(depth),
                &level.region,
                level.complex.as_ref(),
            )?;
            self.step(st, rec)?;
        }
        Ok(())
    }
}

/// Recursive shape iterator over a cell hierarchy or a flat shape collection
#[derive(Debug)]
pub struct RecursiveShapeIterator<'a> {
    config: CursorConfig<'a>,
    state: RefCell<TraversalState>,
}

impl Clone for RecursiveShapeIterator<'_> {
    /// Copies the configuration; the traversal restarts from the beginning
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            state: RefCell::new(TraversalState::default()),
        }
    }
}

impl PartialEq for RecursiveShapeIterator<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self.shape(), other.shape()) {
            (None, None) => true,
            (Some(a), Some(b)) => std::ptr::eq(a, b) && self.trans() == other.trans(),
            _ => false,
        }
    }
}

impl Default for RecursiveShapeIterator<'_> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<'a> RecursiveShapeIterator<'a> {
    fn from_config(config: CursorConfig<'a>) -> Self {
        Self {
            config,
            state: RefCell::new(TraversalState::default()),
        }
    }

    /// A cursor that is always at end
    pub fn empty() -> Self {
        Self::from_config(CursorConfig::new(Source::None, Vec::new(), false))
    }

    /// Iterates a flat shape collection
    pub fn from_shapes(shapes: &'a Shapes) -> Self {
        Self::from_config(CursorConfig::new(Source::Flat(shapes), Vec::new(), false))
    }

    /// Iterates one layer below `top`
    pub fn new(layout: &'a Layout, top: CellIndex, layer: LayerIndex) -> Self {
        Self::from_config(CursorConfig::new(
            Source::Hier { layout, top },
            vec![layer],
            false,
        ))
    }

    /// Iterates several layers below `top`, in the given order per cell
    pub fn with_layers(layout: &'a Layout, top: CellIndex, layers: Vec<LayerIndex>) -> Self {
        Self::from_config(CursorConfig::new(Source::Hier { layout, top }, layers, true))
    }

    pub fn with_region(mut self, region: Rect, overlapping: bool) -> Self {
        self.set_region(region);
        self.set_overlapping(overlapping);
        self
    }

    pub fn with_complex_region(mut self, polygons: Vec<Polygon>, overlapping: bool) -> Self {
        self.set_complex_region(polygons);
        self.set_overlapping(overlapping);
        self
    }

    fn invalidate(&mut self) {
        self.state.get_mut().validity = Validity::Dirty;
    }

    /// Forces the traversal to restart at the next observation
    pub fn reset(&mut self) {
        self.invalidate();
    }

    // ---- configuration

    pub fn layout(&self) -> Option<&'a Layout> {
        self.config.layout()
    }

    pub fn top_cell(&self) -> Option<CellIndex> {
        self.config.top_cell()
    }

    pub fn flat_shapes(&self) -> Option<&'a Shapes> {
        match self.config.source {
            Source::Flat(s) => Some(s),
            _ => None,
        }
    }

    pub fn layers(&self) -> &[LayerIndex] {
        &self.config.layers
    }

    pub fn multiple_layers(&self) -> bool {
        self.config.multi_layer
    }

    pub fn set_layer(&mut self, layer: LayerIndex) {
        if !self.config.multi_layer && self.config.layers == [layer] {
            return;
        }
        self.config.layers = vec![layer];
        self.config.multi_layer = false;
        self.invalidate();
    }

    pub fn set_layers(&mut self, layers: Vec<LayerIndex>) {
        if self.config.multi_layer && self.config.layers == layers {
            return;
        }
        self.config.layers = layers;
        self.config.multi_layer = true;
        self.invalidate();
    }

    /// Search region in top cell coordinates
    pub fn region(&self) -> Rect {
        self.config.region
    }

    pub fn has_complex_region(&self) -> bool {
        !self.config.complex.is_empty()
    }

    /// The polygonal confinements (their intersection is the region)
    pub fn complex_region(&self) -> &[Vec<Polygon>] {
        &self.config.complex
    }

    /// Rectangular region; drops any polygonal region
    pub fn set_region(&mut self, region: Rect) {
        if self.config.region == region && self.config.complex.is_empty() {
            return;
        }
        self.config.region = region;
        self.config.complex.clear();
        self.invalidate();
    }

    /// Polygonal region; a single box degenerates to a rectangular one
    pub fn set_complex_region(&mut self, polygons: Vec<Polygon>) {
        if polygons.len() == 1 && polygons[0].is_box() {
            let r = polygons[0].bbox();
            self.set_region(r);
            return;
        }
        let bbox = polygons
            .iter()
            .fold(Rect::empty(), |acc, p| acc.extended(&p.bbox()));
        if self.config.region == bbox && self.config.complex == [polygons.clone()] {
            return;
        }
        self.config.region = bbox;
        self.config.complex = vec![polygons];
        self.invalidate();
    }

    /// Intersects the current region with `r`
    pub fn confine_region(&mut self, r: &Rect) {
        let confined = self.config.region.intersection(r);
        if confined == self.config.region {
            return;
        }
        self.config.region = confined;
        self.invalidate();
    }

    /// Intersects the current region with a polygonal one
    pub fn confine_complex_region(&mut self, polygons: Vec<Polygon>) {
        let bbox = polygons
            .iter()
            .fold(Rect::empty(), |acc, p| acc.extended(&p.bbox()));
        let confined = self.config.region.intersection(&bbox);
        if confined == self.config.region && self.config.complex.contains(&polygons) {
            return;
        }
        self.config.region = confined;
        self.config.complex.push(polygons);
        self.invalidate();
    }

    pub fn overlapping(&self) -> bool {
        self.config.overlapping
    }

    pub fn set_overlapping(&mut self, overlapping: bool) {
        if self.config.overlapping != overlapping {
            self.config.overlapping = overlapping;
            self.invalidate();
        }
    }

    pub fn max_depth(&self) -> usize {
        self.config.max_depth
    }

    pub fn set_max_depth(&mut self, depth: usize) {
        if self.config.max_depth != depth {
            self.config.max_depth = depth;
            self.invalidate();
        }
    }

    pub fn min_depth(&self) -> usize {
        self.config.min_depth
    }

    pub fn set_min_depth(&mut self, depth: usize) {
        if self.config.min_depth != depth {
            self.config.min_depth = depth;
            self.invalidate();
        }
    }

    pub fn shape_flags(&self) -> ShapeFlags {
        self.config.shape_flags
    }

    pub fn set_shape_flags(&mut self, flags: ShapeFlags) {
        if self.config.shape_flags != flags {
            self.config.shape_flags = flags;
            self.invalidate();
        }
    }

    pub fn property_selector(&self) -> Option<&PropertySelector> {
        self.config.prop_selector.as_ref()
    }

    pub fn set_property_selector(&mut self, selector: Option<PropertySelector>) {
        if self.config.prop_selector != selector {
            self.config.prop_selector = selector;
            self.invalidate();
        }
    }

    pub fn global_trans(&self) -> ICplxTrans {
        self.config.global_trans
    }

    pub fn set_global_trans(&mut self, trans: ICplxTrans) {
        if self.config.global_trans != trans {
            self.config.global_trans = trans;
            self.invalidate();
        }
    }

    // ---- cell selection

    pub fn enabled_cells(&self) -> &BTreeSet<CellIndex> {
        &self.config.enabled
    }

    pub fn disabled_cells(&self) -> &BTreeSet<CellIndex> {
        &self.config.disabled
    }

    /// Enables the given cells; their subtrees inherit unless marked otherwise
    pub fn select_cells(&mut self, cells: &[CellIndex]) {
        let mut changed = false;
        for c in cells {
            changed |= self.config.enabled.insert(*c);
            changed |= self.config.disabled.remove(c);
        }
        if changed {
            self.invalidate();
        }
    }

    /// Disables the given cells; their subtrees inherit unless marked otherwise
    pub fn unselect_cells(&mut self, cells: &[CellIndex]) {
        let mut changed = false;
        for c in cells {
            changed |= self.config.disabled.insert(*c);
            changed |= self.config.enabled.remove(c);
        }
        if changed {
            self.invalidate();
        }
    }

    /// Marks every cell as enabled
    pub fn select_all_cells(&mut self) {
        if let Some(layout) = self.config.layout() {
            self.config.enabled = layout.cell_indexes().collect();
            self.config.disabled.clear();
            self.invalidate();
        }
    }

    /// Marks every cell as disabled
    pub fn unselect_all_cells(&mut self) {
        if let Some(layout) = self.config.layout() {
            self.config.disabled = layout.cell_indexes().collect();
            self.config.enabled.clear();
            self.invalidate();
        }
    }

    pub fn reset_selection(&mut self) {
        if !self.config.enabled.is_empty() || !self.config.disabled.is_empty() {
            self.config.enabled.clear();
            self.config.disabled.clear();
            self.invalidate();
        }
    }

    pub fn signature(&self) -> CursorSignature {
        let (source, hier_generation) = match self.config.source {
            Source::None => (0, 0),
            Source::Hier { layout, .. } => (layout.uid(), layout.hier_generation()),
            Source::Flat(shapes) => (shapes.uid(), 0),
        };
        CursorSignature {
            source,
            hier_generation,
            top_cell: self.config.top_cell(),
            min_depth: self.config.min_depth,
            max_depth: self.config.max_depth,
            enabled: self.config.enabled.iter().copied().collect(),
            disabled: self.config.disabled.iter().copied().collect(),
            global_trans: self.config.global_trans,
        }
    }

    // ---- pull-mode traversal

    fn ensure_valid(&self) {
        let mut st = self.state.borrow_mut();
        if st.validity == Validity::Dirty {
            infallible(self.config.init(&mut st, &mut NullReceiver));
            infallible(self.config.advance(&mut st, &mut NullReceiver));
        }
    }

    pub fn at_end(&self) -> bool {
        self.ensure_valid();
        self.state.borrow().at_end
    }

    /// The current shape in the coordinates of its cell; `None` at end
    pub fn shape(&self) -> Option<&'a ShapeEntry> {
        self.ensure_valid();
        let st = self.state.borrow();
        let entry = self.config.current(&st).map(|(e, _)| e);
        entry
    }

    pub fn prop_id(&self) -> PropertiesId {
        self.shape().map_or(0, |e| e.prop_id)
    }

    /// Transformation from the current cell into the result space
    /// (global transformation times the instance path)
    pub fn trans(&self) -> ICplxTrans {
        self.ensure_valid();
        let st = self.state.borrow();
        st.levels
            .last()
            .map_or(self.config.global_trans, |l| l.trans)
    }

    /// The transformation a push receiver is told to apply at this level
    pub fn always_apply(&self) -> ICplxTrans {
        self.config.always_apply(self.depth())
    }

    pub fn depth(&self) -> usize {
        self.ensure_valid();
        self.state.borrow().levels.len().saturating_sub(1)
    }

    pub fn cell_index(&self) -> Option<CellIndex> {
        self.cell_frame().and_then(|f| f.cell)
    }

    pub fn cell_frame(&self) -> Option<CellFrame> {
        self.ensure_valid();
        self.state.borrow().levels.last().map(|l| l.frame)
    }

    /// Search region in the current cell's coordinates
    pub fn local_region(&self) -> Rect {
        self.ensure_valid();
        self.state
            .borrow()
            .levels
            .last()
            .map_or(Rect::empty(), |l| l.region)
    }

    /// Layer of the current shape
    pub fn layer(&self) -> Option<LayerIndex> {
        if !self.config.multi_layer {
            return self.config.layers.first().copied();
        }
        self.ensure_valid();
        let st = self.state.borrow();
        let level = st.levels.last()?;
        self.config.layers.get(level.layer_pos).copied()
    }

    /// Moves to the next shape
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) {
        self.ensure_valid();
        let st = self.state.get_mut();
        if st.at_end {
            return;
        }
        infallible(self.config.step(st, &mut NullReceiver));
    }

    /// Snapshot iterator over the remaining traversal of a copy
    pub fn iter(&self) -> CursorShapes<'a> {
        self.clone().into_iter()
    }

    // ---- push-mode traversal

    /// Restarts the traversal and drives `receiver` through it. `end` is
    /// called exactly once, whether the traversal fails or not.
    pub fn push<R: RecursiveShapeReceiver>(&mut self, receiver: &mut R) -> Result<(), R::Error> {
        let info = self.config.info(0);
        let st = self.state.get_mut();
        st.validity = Validity::Dirty;
        let result = match receiver.begin(&info) {
            Ok(()) => self.config.drive(st, receiver),
            Err(e) => Err(e),
        };
        if result.is_err() {
            st.validity = Validity::Dirty;
        }
        receiver.end(&info);
        result
    }
}

/// A delivered shape together with its context
#[derive(Debug, Clone)]
pub struct IteratedShape<'a> {
    pub entry: &'a ShapeEntry,
    pub trans: ICplxTrans,
    pub cell: Option<CellIndex>,
    pub layer: Option<LayerIndex>,
    pub depth: usize,
}

impl IteratedShape<'_> {
    /// The shape in result space
    pub fn transformed(&self) -> Shape {
        self.entry.shape.transformed(&self.trans)
    }
}

/// Owning iterator adaptor for a cursor
#[derive(Debug)]
pub struct CursorShapes<'a> {
    cursor: RecursiveShapeIterator<'a>,
}

impl<'a> Iterator for CursorShapes<'a> {
    type Item = IteratedShape<'a>;

    fn next(&mut self) -> Option<IteratedShape<'a>> {
        let c = &mut self.cursor;
        let entry = c.shape()?;
        let item = IteratedShape {
            entry,
            trans: c.trans(),
            cell: c.cell_index(),
            layer: c.layer(),
            depth: c.depth(),
        };
        c.next();
        Some(item)
    }
}

impl<'a> IntoIterator for RecursiveShapeIterator<'a> {
    type Item = IteratedShape<'a>;
    type IntoIter = CursorShapes<'a>;

    fn into_iter(self) -> CursorShapes<'a> {
        CursorShapes { cursor: self }
    }
}
