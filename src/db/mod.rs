//! Layout database and the engines working on it
//!
//! # Submodules
//! - `geometry` - Integer geometry primitives and algorithms
//! - `layout` - Hierarchical layout database
//! - `cursor` - Recursive shape iterator
//! - `deep` - Canonical hierarchical shape store (deep layers)
//! - `check` - Edge-to-edge spatial relationship checker

pub mod geometry;
pub mod layout;
pub mod cursor;
pub mod deep;
pub mod check;
