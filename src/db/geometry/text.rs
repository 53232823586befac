//! Text annotations

use super::trans::ICplxTrans;
use super::types::{Bounded, Point, Rect};
use serde::{Deserialize, Serialize};

/// A text label anchored at a point
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Text {
    pub string: String,
    pub pos: Point,
}

impl Text {
    pub fn new(string: impl Into<String>, pos: Point) -> Self {
        Self {
            string: string.into(),
            pos,
        }
    }

    pub fn transformed(&self, t: &ICplxTrans) -> Text {
        Text {
            string: self.string.clone(),
            pos: t.apply(self.pos),
        }
    }
}

impl Bounded for Text {
    fn bbox(&self) -> Rect {
        self.pos.bbox()
    }
}
