//! Cell mapping between two layouts
//!
//! A mapping pairs cells of a source layout with cells of a target layout.
//! It is derived either from a single pair of top cells, from the placement
//! geometry of the two hierarchies, or completed by creating the missing
//! target cells.

use crate::db::geometry::{ICplxTrans, Trans, Vector};
use crate::db::layout::{CellIndex, CellInstArray, Layout};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// Occurrences kept per cell for the placement signature
const MAX_SIGNATURE_PLACEMENTS: usize = 4096;

/// Quantized placement of a cell occurrence relative to the mapping top cell
type PlacementKey = (u8, bool, i64, i64);

/// Placement signature: occurrence count and the sorted leading placements
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Signature {
    count: u64,
    placements: Vec<PlacementKey>,
}

/// Source cell -> target cell table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellMapping {
    table: BTreeMap<CellIndex, CellIndex>,
}

impl CellMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.table.clear();
    }

    pub fn map(&mut self, source: CellIndex, target: CellIndex) {
        self.table.insert(source, target);
    }

    pub fn unmap(&mut self, source: CellIndex) -> Option<CellIndex> {
        self.table.remove(&source)
    }

    pub fn has_mapping(&self, source: CellIndex) -> bool {
        self.table.contains_key(&source)
    }

    pub fn cell_mapping(&self, source: CellIndex) -> Option<CellIndex> {
        self.table.get(&source).copied()
    }

    pub fn table(&self) -> &BTreeMap<CellIndex, CellIndex> {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Maps just the two top cells
    pub fn create_single_mapping(&mut self, target_cell: CellIndex, source_cell: CellIndex) {
        self.clear();
        self.map(source_cell, target_cell);
    }

    /// Maps the top cells and every child cell whose placements relative to
    /// the top cell are identical in both layouts.
    ///
    /// Placements are compared in target database units. Where several
    /// target cells match, the one with the same name wins; otherwise the
    /// cell stays unmapped.
    pub fn create_from_geometry(
        &mut self,
        target: &Layout,
        target_cell: CellIndex,
        source: &Layout,
        source_cell: CellIndex,
    ) {
        self.create_single_mapping(target_cell, source_cell);

        let scale = source.dbu() / target.dbu();
        let target_sigs = placement_signatures(target, target_cell, 1.0);
        let source_sigs = placement_signatures(source, source_cell, scale);

        let mut by_sig: IndexMap<&Signature, Vec<CellIndex>> = IndexMap::new();
        for (cell, sig) in &target_sigs {
            if *cell != target_cell {
                by_sig.entry(sig).or_default().push(*cell);
            }
        }

        let mut taken = BTreeSet::new();
        for (cell, sig) in &source_sigs {
            if *cell == source_cell {
                continue;
            }
            let Some(candidates) = by_sig.get(sig) else {
                continue;
            };
            let free: Vec<CellIndex> = candidates
                .iter()
                .copied()
                .filter(|c| !taken.contains(c))
                .collect();
            let chosen = match free.as_slice() {
                [] => None,
                [single] => Some(*single),
                several => {
                    let name = source.cell_name(*cell);
                    let same_name = several.iter().copied().find(|c| target.cell_name(*c) == name);
                    if same_name.is_none() {
                        log::debug!(
                            "[CellMapping] {} has {} geometrically equivalent targets, skipped",
                            name,
                            several.len()
                        );
                    }
                    same_name
                }
            };
            if let Some(t) = chosen {
                taken.insert(t);
                self.map(*cell, t);
            }
        }
    }

    /// Geometry mapping completed by creating the missing target cells.
    /// Returns the new target cells.
    pub fn create_from_geometry_full(
        &mut self,
        target: &mut Layout,
        target_cell: CellIndex,
        source: &Layout,
        source_cell: CellIndex,
    ) -> Vec<CellIndex> {
        self.create_from_geometry(target, target_cell, source, source_cell);
        self.create_missing_mapping(target, source, source_cell, None)
    }

    /// Creates target cells for every unmapped cell below `source_cell`
    /// (except `excluded`) and replicates the instances pointing to them from
    /// mapped parents. Returns the new target cells.
    pub fn create_missing_mapping(
        &mut self,
        target: &mut Layout,
        source: &Layout,
        source_cell: CellIndex,
        excluded: Option<&BTreeSet<CellIndex>>,
    ) -> Vec<CellIndex> {
        let mut scope = source.called_cells(source_cell);
        scope.insert(source_cell);
        let is_excluded = |c: &CellIndex| excluded.is_some_and(|e| e.contains(c));

        let mut created = Vec::new();
        for cell in source.bottom_up().into_iter().rev() {
            if !scope.contains(&cell) || is_excluded(&cell) || self.has_mapping(cell) {
                continue;
            }
            let t = target.add_cell(source.cell_name(cell));
            self.map(cell, t);
            created.push((cell, t));
        }

        let scale = source.dbu() / target.dbu();
        for (cell, t) in &created {
            for parent in source.parent_cells(*cell) {
                if !scope.contains(&parent) {
                    continue;
                }
                let Some(target_parent) = self.cell_mapping(parent) else {
                    continue;
                };
                let Some(pc) = source.cell(parent) else {
                    continue;
                };
                for inst in pc.instances().iter().filter(|i| i.cell == *cell) {
                    target.insert_instance(target_parent, scaled_instance(inst, *t, scale));
                }
            }
        }

        created.into_iter().map(|(_, t)| t).collect()
    }
}

fn scale_vector(v: Vector, scale: f64) -> Vector {
    ICplxTrans::magnification(scale).apply_vector(v)
}

/// `inst` re-targeted to `cell` with displacements scaled by `scale`
pub(crate) fn scaled_instance(inst: &CellInstArray, cell: CellIndex, scale: f64) -> CellInstArray {
    let mut out = inst.with_cell(cell);
    out.trans.disp = scale_vector(inst.trans.disp, scale);
    if let Some(a) = out.array.as_mut() {
        a.a = scale_vector(a.a, scale);
        a.b = scale_vector(a.b, scale);
    }
    out
}

fn placement_key(t: &Trans, scale: f64) -> PlacementKey {
    let d = scale_vector(t.disp, scale);
    (t.rot, t.mirror, d.x, d.y)
}

/// Placement signatures of all cells below `top` (and `top` itself)
fn placement_signatures(layout: &Layout, top: CellIndex, scale: f64) -> BTreeMap<CellIndex, Signature> {
    let mut scope = layout.called_cells(top);
    scope.insert(top);

    let mut placements: BTreeMap<CellIndex, Vec<Trans>> = BTreeMap::new();
    let mut counts: BTreeMap<CellIndex, u64> = BTreeMap::new();
    placements.insert(top, vec![Trans::identity()]);
    counts.insert(top, 1);

    for cell in layout.bottom_up().into_iter().rev() {
        if !scope.contains(&cell) {
            continue;
        }
        let parent_count = counts.get(&cell).copied().unwrap_or(0);
        let parent_placements = placements.get(&cell).cloned().unwrap_or_default();
        let Some(c) = layout.cell(cell) else {
            continue;
        };
        for inst in c.instances() {
            *counts.entry(inst.cell).or_insert(0) += parent_count * inst.size() as u64;
            let child = placements.entry(inst.cell).or_default();
            'outer: for p in &parent_placements {
                for m in inst.members() {
                    if child.len() >= MAX_SIGNATURE_PLACEMENTS {
                        break 'outer;
                    }
                    child.push(p.concat(&m));
                }
            }
        }
    }

    scope
        .into_iter()
        .map(|cell| {
            let mut keys: Vec<PlacementKey> = placements
                .get(&cell)
                .map(|ps| ps.iter().map(|t| placement_key(t, scale)).collect())
                .unwrap_or_default();
            keys.sort_unstable();
            let sig = Signature {
                count: counts.get(&cell).copied().unwrap_or(0),
                placements: keys,
            };
            (cell, sig)
        })
        .collect()
}
