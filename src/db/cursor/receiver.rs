//! Push-mode receiver interface
//!
//! `RecursiveShapeIterator::push` drives a receiver through the hierarchy:
//! `begin`, then `enter_cell` / `new_inst` / `new_inst_member` / `shape` /
//! `leave_cell` in traversal order, and finally `end`. Receivers can prune the
//! traversal by answering `new_inst` and `new_inst_member`.

use crate::db::geometry::{ICplxTrans, Rect, Trans};
use crate::db::layout::{CellIndex, CellInstArray, Layout, ShapeEntry};
use std::convert::Infallible;

use super::region::ComplexRegion;

/// Receiver answer for a new instance array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstVisit {
    /// Enumerate every member
    All,
    /// Visit the first member only (the receiver handles the array as a whole)
    OnlyFirst,
    /// Skip the instance array entirely
    Skip,
}

/// Traversal context handed to receivers instead of the cursor itself
#[derive(Debug, Clone, Copy)]
pub struct CursorInfo<'a> {
    pub layout: Option<&'a Layout>,
    pub top_cell: Option<CellIndex>,
    /// Hierarchy level of the current cell (top cell = 0)
    pub depth: usize,
    pub global_trans: ICplxTrans,
}

/// Callbacks of a push-mode traversal.
///
/// `region` and `complex` always describe the search region in the
/// coordinate system of the cell being processed (the parent cell for
/// instance callbacks). A world `region` without `complex` means
/// "unconstrained". `always_apply` is the transformation the receiver must
/// apply on top of the cell-local coordinates: the global transformation at
/// the top level, its linear part below.
pub trait RecursiveShapeReceiver {
    type Error;

    /// Disables region pruning of instances: every cell is entered
    fn wants_all_cells(&self) -> bool {
        false
    }

    fn begin(&mut self, _info: &CursorInfo<'_>) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called exactly once per push, also after errors
    fn end(&mut self, _info: &CursorInfo<'_>) {}

    fn enter_cell(
        &mut self,
        _info: &CursorInfo<'_>,
        _cell: CellIndex,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn leave_cell(&mut self, _info: &CursorInfo<'_>, _cell: CellIndex) -> Result<(), Self::Error> {
        Ok(())
    }

    /// A new instance array in the current cell. `all` is true if the whole
    /// array lies inside the search region.
    #[allow(clippy::too_many_arguments)]
    fn new_inst(
        &mut self,
        _info: &CursorInfo<'_>,
        _inst: &CellInstArray,
        _always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
        _all: bool,
    ) -> Result<InstVisit, Self::Error> {
        Ok(InstVisit::All)
    }

    /// A member of the current instance array; return false to skip it
    #[allow(clippy::too_many_arguments)]
    fn new_inst_member(
        &mut self,
        _info: &CursorInfo<'_>,
        _inst: &CellInstArray,
        _member: &Trans,
        _always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
        _all: bool,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    fn shape(
        &mut self,
        info: &CursorInfo<'_>,
        entry: &ShapeEntry,
        always_apply: &ICplxTrans,
        region: &Rect,
        complex: Option<&ComplexRegion>,
    ) -> Result<(), Self::Error>;
}

/// Receiver that ignores everything; drives pull-mode traversal
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReceiver;

impl RecursiveShapeReceiver for NullReceiver {
    type Error = Infallible;

    fn shape(
        &mut self,
        _info: &CursorInfo<'_>,
        _entry: &ShapeEntry,
        _always_apply: &ICplxTrans,
        _region: &Rect,
        _complex: Option<&ComplexRegion>,
    ) -> Result<(), Infallible> {
        Ok(())
    }
}
