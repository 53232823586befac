//! Layout database module
//!
//! The hierarchical container the engine walks and builds: cells with
//! per-layer shapes, cell instance arrays, layers and property sets.
//!
//! # Submodules
//! - `shapes` - Shape kinds and per-layer shape containers
//! - `cell` - Cells and (arrayed) cell instances
//! - `database` - The `Layout` itself

mod shapes;
mod cell;
mod database;

use std::sync::atomic::{AtomicU64, Ordering};

pub use shapes::{PropertiesId, Shape, ShapeEntry, ShapeFlags, Shapes};

pub use cell::{ArrayRepetition, Cell, CellIndex, CellInstArray, LayerIndex};

pub use database::{LayerInfo, Layout, PropertySet};

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identity for layouts and shape collections
pub(crate) fn next_uid() -> u64 {
    NEXT_UID.fetch_add(1, Ordering::Relaxed)
}
