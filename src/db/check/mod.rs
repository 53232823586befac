//! Spatial relationship checker
//!
//! Edge-based distance checks (width, space, overlap, enclosure) with
//! optional shielding and negative edge output.
//!
//! # Submodules
//! - `relation` - Edge relation filter (distance, metrics, angle)
//! - `scanner` - R-tree box scanner reporting interacting pairs
//! - `edge_bool` - Edge NOT for negative output
//! - `checker` - Two-pass edge-to-edge check state machine
//! - `poly_check` - Polygon driver feeding the scanner
//! - `settings` - Serializable check settings
//! - `runners` - Checks on deep layers

mod relation;
mod scanner;
mod edge_bool;
mod checker;
mod poly_check;
mod settings;
mod runners;

pub use relation::{EdgeRelation, EdgeRelationFilter, Metrics};

pub use scanner::{BoxScanner, ScannerReceiver};

pub use edge_bool::edge_not;

pub use checker::{CheckOptions, CheckOutput, CheckResults, Edge2EdgeCheck, EdgeTag};

pub use poly_check::Poly2PolyCheck;

pub use settings::CheckSettings;

pub use runners::{run_flat_check, run_intra_polygon_check, FlatCheckOutput};
