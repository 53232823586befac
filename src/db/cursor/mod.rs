//! Recursive hierarchy cursor
//!
//! Depth-first traversal of a cell hierarchy (or a flat shape collection)
//! under rectangular or polygonal confinement, with pull and push delivery.
//!
//! # Submodules
//! - `region` - Box-tree decomposition of polygonal search regions
//! - `receiver` - Push-mode receiver trait and traversal context
//! - `iterator` - The cursor itself

mod region;
mod receiver;
mod iterator;

pub use region::ComplexRegion;

pub use receiver::{CursorInfo, InstVisit, NullReceiver, RecursiveShapeReceiver};

pub use iterator::{
    CellFrame, CursorShapes, CursorSignature, IteratedShape, PropertySelector,
    RecursiveShapeIterator,
};
