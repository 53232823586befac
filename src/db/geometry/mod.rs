//! Geometry module
//!
//! Integer-coordinate geometric primitives and the algorithms built directly
//! on them.
//!
//! # Submodules
//! - `types` - Points, vectors and rectangles
//! - `trans` - Orthogonal transformations with optional magnification
//! - `edge` - Directed edges and edge pairs
//! - `polygon` - Polygons with holes
//! - `text` - Text annotations
//! - `clip` - Clipping of polygons and edges, polygon splitting
//! - `trapezoid` - Merge + trapezoid decomposition into disjoint boxes

mod types;
mod trans;
mod edge;
mod polygon;
mod text;
mod clip;
mod trapezoid;

pub use types::{Bounded, Coord, Point, Rect, Vector, WORLD_EXTENT};

pub use trans::{ICplxTrans, Trans, MAG_EPSILON};

pub use edge::{Edge, EdgePair};

pub use polygon::Polygon;

pub use text::Text;

pub use clip::{clip_edge, clip_polygon, split_polygon};

pub use trapezoid::decompose_to_boxes;
