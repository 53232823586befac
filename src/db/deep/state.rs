//! Store options

use crate::db::geometry::Coord;
use serde::{Deserialize, Serialize};

/// Options of a deep shape store.
///
/// A plain value: callers save and restore it with
/// `DeepShapeStore::push_state` / `pop_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreState {
    /// Worker threads for hierarchical operations
    pub threads: usize,
    /// Polygons whose bbox area exceeds `max_area_ratio * area` are split
    /// (0 disables the test)
    pub max_area_ratio: f64,
    /// Polygons with more vertices are split (0 disables the test)
    pub max_vertex_count: usize,
    /// Self-intersecting polygons are an error instead of being taken as is
    pub reject_odd_polygons: bool,
    /// Texts become marker boxes of this half size on polygon layers;
    /// negative values drop texts from polygon layers
    pub text_enlargement: Coord,
    /// Property name carrying the text string of a marker box
    pub text_property_name: Option<String>,
    /// Keep every cell in the working hierarchy, also outside the region
    pub subcircuit_hierarchy_for_nets: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            threads: 1,
            max_area_ratio: 3.0,
            max_vertex_count: 16,
            reject_odd_polygons: false,
            text_enlargement: -1,
            text_property_name: None,
            subcircuit_hierarchy_for_nets: false,
        }
    }
}
