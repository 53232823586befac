//! Check settings
//!
//! Serializable description of a distance check: the relation filter
//! parameters and the checker options in one value.

use crate::db::geometry::Coord;
use serde::{Deserialize, Serialize};

use super::checker::CheckOptions;
use super::relation::{EdgeRelation, EdgeRelationFilter, Metrics};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub relation: EdgeRelation,
    /// Violations are distances below this value (database units)
    pub distance: Coord,
    pub metrics: Metrics,
    /// Degrees
    pub ignore_angle: f64,
    pub min_projection: Coord,
    /// None means unlimited
    pub max_projection: Option<Coord>,
    pub whole_edges: bool,
    pub include_zero: bool,
    pub different_polygons: bool,
    pub shielded: bool,
    pub symmetric: bool,
    /// Also deliver the edge parts not involved in any violation
    pub negative: bool,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            relation: EdgeRelation::Space,
            distance: 0,
            metrics: Metrics::Euclidean,
            ignore_angle: 90.0,
            min_projection: 0,
            max_projection: None,
            whole_edges: false,
            include_zero: false,
            different_polygons: false,
            shielded: false,
            symmetric: false,
            negative: false,
        }
    }
}

impl CheckSettings {
    pub fn new(relation: EdgeRelation, distance: Coord) -> Self {
        Self {
            relation,
            distance,
            ..Self::default()
        }
    }

    pub fn filter(&self) -> EdgeRelationFilter {
        EdgeRelationFilter::new(self.relation, self.distance)
            .with_metrics(self.metrics)
            .with_ignore_angle(self.ignore_angle)
            .with_projection_limits(self.min_projection, self.max_projection.unwrap_or(Coord::MAX))
            .with_whole_edges(self.whole_edges)
            .with_include_zero(self.include_zero)
    }

    pub fn options(&self) -> CheckOptions {
        CheckOptions {
            different_polygons: self.different_polygons,
            different_layers: false,
            shielded: self.shielded,
            symmetric_edges: self.symmetric,
            has_edge_pair_output: true,
            has_negative_edge_output: self.negative,
        }
    }
}
