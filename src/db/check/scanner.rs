//! Box scanner
//!
//! Spatial join over bounding boxes using an R-tree. Every pair of objects
//! whose (enlarged) boxes touch is reported once, in ascending order of the
//! objects' insertion indexes. After the last pair involving an object has
//! been reported, the receiver's `finish` is called for it.

use crate::db::geometry::{Coord, Rect};
use rstar::{RTree, RTreeObject, AABB};

/// Receives the interactions found by a `BoxScanner`
pub trait ScannerReceiver<T> {
    fn add(&mut self, a: &T, b: &T);

    /// All interactions of `a` have been reported
    fn finish(&mut self, _a: &T) {}
}

#[derive(Debug, Clone, Copy)]
struct IndexedBox {
    bbox: Rect,
    index: usize,
}

impl RTreeObject for IndexedBox {
    type Envelope = AABB<[Coord; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.bbox.envelope()
    }
}

#[derive(Debug, Clone)]
pub struct BoxScanner<T> {
    items: Vec<(Rect, T)>,
}

impl<T> Default for BoxScanner<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> BoxScanner<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bbox: Rect, item: T) {
        self.items.push((bbox, item));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Reports all pairs whose boxes, each enlarged by `enl`, touch
    pub fn process<R: ScannerReceiver<T>>(&self, receiver: &mut R, enl: Coord) {
        let boxes: Vec<IndexedBox> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, (b, _))| !b.is_empty())
            .map(|(index, (b, _))| IndexedBox {
                bbox: b.enlarged(enl, enl),
                index,
            })
            .collect();
        let tree = RTree::bulk_load(boxes.clone());

        let mut finished = vec![false; self.items.len()];
        for ib in &boxes {
            let mut partners: Vec<usize> = tree
                .locate_in_envelope_intersecting(&ib.bbox.envelope())
                .map(|o| o.index)
                .filter(|j| *j > ib.index)
                .collect();
            partners.sort_unstable();
            let a = &self.items[ib.index].1;
            for j in partners {
                receiver.add(a, &self.items[j].1);
            }
            receiver.finish(a);
            finished[ib.index] = true;
        }

        // objects with empty boxes interact with nothing
        for (i, done) in finished.into_iter().enumerate() {
            if !done {
                receiver.finish(&self.items[i].1);
            }
        }
    }
}
