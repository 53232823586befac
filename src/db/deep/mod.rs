//! Canonical hierarchical shape store
//!
//! Deep layers keep shapes in a hierarchy mirrored from their source layout
//! instead of flattening them. The store owns the working layouts these
//! hierarchies are built into and counts the references to them.
//!
//! # Submodules
//! - `state` - Store options (`StoreState`)
//! - `pipeline` - Shape stages between cursor and builder
//! - `builder` - Hierarchy builder with clip variants
//! - `mapping` - Cell mapping between two layouts
//! - `export` - Copying working layout content into other layouts
//! - `store` - `DeepShapeStore` and `DeepLayer`

mod state;
mod pipeline;
mod builder;
mod mapping;
mod export;
mod store;

pub use state::StoreState;

pub use pipeline::{PipelineStage, ShapePipeline, ShapeStage, StageContext};

pub use builder::{ClipKey, HierarchyBuilder, Placement};

pub use mapping::CellMapping;

pub use export::ExportMode;

pub use store::{DeepLayer, DeepShapeStore, WorkingLayout};
