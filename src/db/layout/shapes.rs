//! Shape containers
//!
//! A `Shapes` container holds the shapes of one layer in one cell (or a flat
//! shape collection). It keeps insertion order and builds an R-tree over the
//! shape bounding boxes on demand for region queries.

use crate::db::geometry::{Bounded, Edge, EdgePair, ICplxTrans, Polygon, Rect, Text};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::ops::BitOr;
use std::sync::OnceLock;

use super::next_uid;

/// Property set identifier; 0 means "no properties"
pub type PropertiesId = usize;

/// A single shape of any kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Shape {
    Polygon(Polygon),
    Box(Rect),
    Edge(Edge),
    EdgePair(EdgePair),
    Text(Text),
}

impl Shape {
    pub fn flag(&self) -> ShapeFlags {
        match self {
            Shape::Polygon(_) => ShapeFlags::POLYGONS,
            Shape::Box(_) => ShapeFlags::BOXES,
            Shape::Edge(_) => ShapeFlags::EDGES,
            Shape::EdgePair(_) => ShapeFlags::EDGE_PAIRS,
            Shape::Text(_) => ShapeFlags::TEXTS,
        }
    }

    pub fn transformed(&self, t: &ICplxTrans) -> Shape {
        match self {
            Shape::Polygon(p) => Shape::Polygon(p.transformed(t)),
            Shape::Box(b) => Shape::Box(t.apply_rect(b)),
            Shape::Edge(e) => Shape::Edge(e.transformed(t)),
            Shape::EdgePair(ep) => Shape::EdgePair(ep.transformed(t)),
            Shape::Text(tx) => Shape::Text(tx.transformed(t)),
        }
    }

    /// Area-type shapes as polygon
    pub fn to_polygon(&self) -> Option<Polygon> {
        match self {
            Shape::Polygon(p) => Some(p.clone()),
            Shape::Box(b) => Some(Polygon::from_rect(b)),
            _ => None,
        }
    }

    pub fn is_area(&self) -> bool {
        matches!(self, Shape::Polygon(_) | Shape::Box(_))
    }
}

impl Bounded for Shape {
    fn bbox(&self) -> Rect {
        match self {
            Shape::Polygon(p) => p.bbox(),
            Shape::Box(b) => *b,
            Shape::Edge(e) => e.bbox(),
            Shape::EdgePair(ep) => ep.bbox(),
            Shape::Text(t) => t.bbox(),
        }
    }
}

/// A shape plus its property set id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeEntry {
    pub shape: Shape,
    pub prop_id: PropertiesId,
}

impl ShapeEntry {
    pub fn new(shape: Shape) -> Self {
        Self { shape, prop_id: 0 }
    }

    pub fn with_props(shape: Shape, prop_id: PropertiesId) -> Self {
        Self { shape, prop_id }
    }
}

/// Shape kind selection mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShapeFlags(pub u32);

impl ShapeFlags {
    pub const NONE: ShapeFlags = ShapeFlags(0);
    pub const POLYGONS: ShapeFlags = ShapeFlags(1);
    pub const BOXES: ShapeFlags = ShapeFlags(2);
    pub const EDGES: ShapeFlags = ShapeFlags(4);
    pub const EDGE_PAIRS: ShapeFlags = ShapeFlags(8);
    pub const TEXTS: ShapeFlags = ShapeFlags(16);
    pub const ALL: ShapeFlags = ShapeFlags(31);

    pub fn contains(&self, other: ShapeFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(&self, other: ShapeFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for ShapeFlags {
    fn default() -> Self {
        ShapeFlags::ALL
    }
}

impl BitOr for ShapeFlags {
    type Output = ShapeFlags;
    fn bitor(self, rhs: ShapeFlags) -> ShapeFlags {
        ShapeFlags(self.0 | rhs.0)
    }
}

/// R-tree entry pointing to a shape by position
#[derive(Clone, Debug)]
struct ShapeSlot {
    index: usize,
    bounds: AABB<[i64; 2]>,
}

impl RTreeObject for ShapeSlot {
    type Envelope = AABB<[i64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.bounds
    }
}

/// Ordered shape container with a lazily built spatial index
#[derive(Debug)]
pub struct Shapes {
    uid: u64,
    entries: Vec<ShapeEntry>,
    index: OnceLock<RTree<ShapeSlot>>,
}

impl Default for Shapes {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Shapes {
    /// The clone is a distinct collection with its own identity
    fn clone(&self) -> Self {
        Self {
            uid: next_uid(),
            entries: self.entries.clone(),
            index: OnceLock::new(),
        }
    }
}

impl Shapes {
    pub fn new() -> Self {
        Self {
            uid: next_uid(),
            entries: Vec::new(),
            index: OnceLock::new(),
        }
    }

    pub fn from_shapes(shapes: impl IntoIterator<Item = Shape>) -> Self {
        let mut s = Self::new();
        s.extend(shapes.into_iter().map(ShapeEntry::new));
        s
    }

    /// Identity of this collection
    pub fn uid(&self) -> u64 {
        self.uid
    }

    pub fn insert(&mut self, shape: Shape) {
        self.push(ShapeEntry::new(shape));
    }

    pub fn push(&mut self, entry: ShapeEntry) {
        self.index = OnceLock::new();
        self.entries.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ShapeEntry>) {
        self.index = OnceLock::new();
        self.entries.extend(entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&ShapeEntry> {
        self.entries.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ShapeEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.index = OnceLock::new();
        self.entries.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&ShapeEntry) -> bool) {
        self.index = OnceLock::new();
        self.entries.retain(f);
    }

    pub fn bbox(&self) -> Rect {
        self.entries
            .iter()
            .fold(Rect::empty(), |r, e| r.extended(&e.shape.bbox()))
    }

    fn tree(&self) -> &RTree<ShapeSlot> {
        self.index.get_or_init(|| {
            let slots = self
                .entries
                .iter()
                .enumerate()
                .filter_map(|(index, e)| {
                    let b = e.shape.bbox();
                    (!b.is_empty()).then(|| ShapeSlot {
                        index,
                        bounds: b.envelope(),
                    })
                })
                .collect();
            RTree::bulk_load(slots)
        })
    }

    /// Positions of the shapes whose bounding box interacts with `region`,
    /// in insertion order
    pub fn query(&self, region: &Rect, overlapping: bool) -> Vec<usize> {
        if region.is_empty() {
            return Vec::new();
        }
        if region.is_world() {
            return (0..self.entries.len()).collect();
        }
        let mut hits: Vec<usize> = self
            .tree()
            .locate_in_envelope_intersecting(&region.envelope())
            .map(|s| s.index)
            .filter(|i| self.entries[*i].shape.bbox().interacts(region, overlapping))
            .collect();
        hits.sort_unstable();
        hits
    }
}

impl<'a> IntoIterator for &'a Shapes {
    type Item = &'a ShapeEntry;
    type IntoIter = std::slice::Iter<'a, ShapeEntry>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
