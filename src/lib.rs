//! Hierarchical geometry processing engine
//!
//! A recursive shape cursor over cell hierarchies, a canonical store of
//! derived hierarchical shape layers ("deep layers") and an edge-to-edge
//! spatial relationship checker for design rule checks.

pub mod config;
pub mod db;
pub mod error;

pub use config::EngineConfig;
pub use error::{DbError, DbResult};

pub use db::cursor::{RecursiveShapeIterator, RecursiveShapeReceiver};
pub use db::deep::{DeepLayer, DeepShapeStore, StoreState};
pub use db::check::{CheckOptions, Edge2EdgeCheck, EdgeRelationFilter, Poly2PolyCheck};
