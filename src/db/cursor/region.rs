//! Complex (polygonal) search regions
//!
//! A polygonal region is merged and decomposed into disjoint boxes once; the
//! boxes are kept in an R-tree so interaction tests against shape and instance
//! bounding boxes skip whole subtrees that lie outside the region.

use crate::db::geometry::{decompose_to_boxes, Polygon, Rect, Trans};
use rstar::{RTree, RTreeObject, AABB};

#[derive(Clone, Debug, PartialEq)]
struct RegionBox {
    rect: Rect,
}

impl RTreeObject for RegionBox {
    type Envelope = AABB<[i64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.rect.envelope()
    }
}

/// Box-tree decomposition of a polygonal region
#[derive(Clone, Debug)]
pub struct ComplexRegion {
    tree: RTree<RegionBox>,
    bbox: Rect,
}

impl ComplexRegion {
    /// Merges and decomposes the given polygons
    pub fn from_polygons(polygons: &[Polygon]) -> Self {
        Self::from_boxes(decompose_to_boxes(polygons))
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = Rect>) -> Self {
        let boxes: Vec<RegionBox> = boxes
            .into_iter()
            .filter(|r| !r.is_empty())
            .map(|rect| RegionBox { rect })
            .collect();
        let bbox = boxes
            .iter()
            .fold(Rect::empty(), |acc, b| acc.extended(&b.rect));
        Self {
            tree: RTree::bulk_load(boxes),
            bbox,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    /// All boxes in sorted order
    pub fn boxes(&self) -> Vec<Rect> {
        let mut v: Vec<Rect> = self.tree.iter().map(|b| b.rect).collect();
        v.sort_unstable();
        v
    }

    fn candidates<'a>(&'a self, r: &Rect) -> impl Iterator<Item = &'a Rect> + 'a {
        self.tree
            .locate_in_envelope_intersecting(&r.envelope())
            .map(|b| &b.rect)
    }

    /// True if `r` interacts with any box of the region
    pub fn interacts(&self, r: &Rect, overlapping: bool) -> bool {
        if r.is_empty() || !self.bbox.touches(r) {
            return false;
        }
        self.candidates(r).any(|b| b.interacts(r, overlapping))
    }

    /// True if `r` lies completely inside a single box of the region.
    ///
    /// This is a sufficient, not a necessary, test for containment: a box
    /// straddling two region boxes is reported as not covered.
    pub fn covers(&self, r: &Rect) -> bool {
        if r.is_empty() || !self.bbox.contains_rect(r) {
            return false;
        }
        self.candidates(r).any(|b| b.contains_rect(r))
    }

    /// Region boxes clipped to `r`, sorted
    pub fn clip_boxes(&self, r: &Rect) -> Vec<Rect> {
        if r.is_world() {
            return self.boxes();
        }
        let mut v: Vec<Rect> = self
            .candidates(r)
            .map(|b| b.intersection(r))
            .filter(|b| !b.is_empty())
            .collect();
        v.sort_unstable();
        v.dedup();
        v
    }

    /// The region confined to a rectangle
    pub fn confined(&self, r: &Rect) -> ComplexRegion {
        Self::from_boxes(self.clip_boxes(r))
    }

    /// Box-wise intersection of two regions
    pub fn intersected(&self, other: &ComplexRegion) -> ComplexRegion {
        let mut out = Vec::new();
        for a in self.tree.iter() {
            for b in other.candidates(&a.rect) {
                let r = a.rect.intersection(b);
                if r.width() > 0 && r.height() > 0 {
                    out.push(r);
                }
            }
        }
        Self::from_boxes(out)
    }

    /// Derives the region of a child cell: the boxes touching `window` (the
    /// instance member's bounding box in parent coordinates) are mapped into
    /// the child's space by `to_child` and clipped to the child's bounding
    /// box.
    pub fn reduced(&self, window: &Rect, to_child: &Trans, child_bbox: &Rect) -> ComplexRegion {
        Self::from_boxes(
            self.candidates(window)
                .filter(|b| b.touches(window))
                .map(|b| to_child.apply_rect(b))
                .map(|b| b.intersection(child_bbox))
                .filter(|b| !b.is_empty()),
        )
    }
}

impl PartialEq for ComplexRegion {
    fn eq(&self, other: &Self) -> bool {
        self.boxes() == other.boxes()
    }
}
