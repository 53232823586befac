//! Cells and cell instances

use crate::db::geometry::{Rect, Trans, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::shapes::{PropertiesId, Shapes};

pub type CellIndex = usize;
pub type LayerIndex = usize;

/// Regular array repetition: member `(i, j)` is displaced by `i * a + j * b`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayRepetition {
    pub a: Vector,
    pub b: Vector,
    pub na: u32,
    pub nb: u32,
}

/// A placement of a child cell, optionally as a regular array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellInstArray {
    pub cell: CellIndex,
    pub trans: Trans,
    pub array: Option<ArrayRepetition>,
    pub prop_id: PropertiesId,
}

impl CellInstArray {
    pub fn new(cell: CellIndex, trans: Trans) -> Self {
        Self {
            cell,
            trans,
            array: None,
            prop_id: 0,
        }
    }

    pub fn array(cell: CellIndex, trans: Trans, a: Vector, b: Vector, na: u32, nb: u32) -> Self {
        Self {
            cell,
            trans,
            array: Some(ArrayRepetition {
                a,
                b,
                na: na.max(1),
                nb: nb.max(1),
            }),
            prop_id: 0,
        }
    }

    pub fn is_array(&self) -> bool {
        self.array.is_some()
    }

    /// Number of members
    pub fn size(&self) -> usize {
        self.array
            .map(|a| a.na as usize * a.nb as usize)
            .unwrap_or(1)
    }

    /// Transformation of member `n` (in enumeration order)
    pub fn member(&self, n: usize) -> Option<Trans> {
        match self.array {
            None => (n == 0).then_some(self.trans),
            Some(a) => {
                if n >= self.size() {
                    return None;
                }
                let i = (n / a.nb as usize) as i64;
                let j = (n % a.nb as usize) as i64;
                Some(Trans {
                    disp: self.trans.disp + a.a * i + a.b * j,
                    ..self.trans
                })
            }
        }
    }

    /// All member transformations; `i` (along `a`) is the major index
    pub fn members(&self) -> impl Iterator<Item = Trans> + '_ {
        (0..self.size()).filter_map(move |n| self.member(n))
    }

    /// Bounding box of the whole array given the child cell's bounding box
    pub fn bbox_from(&self, child: &Rect) -> Rect {
        if child.is_empty() {
            return Rect::empty();
        }
        let r = self.trans.apply_rect(child);
        match self.array {
            None => r,
            Some(a) => {
                let da = a.a * (a.na as i64 - 1);
                let db = a.b * (a.nb as i64 - 1);
                r.extended(&r.moved(da))
                    .extended(&r.moved(db))
                    .extended(&r.moved(da + db))
            }
        }
    }

    pub fn with_cell(&self, cell: CellIndex) -> Self {
        Self { cell, ..*self }
    }
}

/// A cell: named container of per-layer shapes and child instances
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub(super) name: String,
    pub(super) shapes: BTreeMap<LayerIndex, Shapes>,
    pub(super) instances: Vec<CellInstArray>,
}

impl Cell {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shapes(&self, layer: LayerIndex) -> Option<&Shapes> {
        self.shapes.get(&layer)
    }

    pub fn instances(&self) -> &[CellInstArray] {
        &self.instances
    }

    /// Layers with at least one shape
    pub fn layers(&self) -> impl Iterator<Item = LayerIndex> + '_ {
        self.shapes
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(l, _)| *l)
    }

    pub fn is_leaf(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.shapes.values().all(|s| s.is_empty())
    }
}
