//! Shape pipeline between the cursor and the hierarchy builder
//!
//! Every shape delivered by the cursor runs through an ordered list of stages
//! in the coordinates of its source cell. The hierarchy builder transforms
//! the survivors and inserts them into the target cell.

use crate::db::cursor::ComplexRegion;
use crate::db::geometry::{clip_edge, clip_polygon, split_polygon, Bounded, Coord, Polygon, Rect};
use crate::db::layout::{Layout, PropertySet, Shape, ShapeEntry};
use crate::error::{DbError, DbResult};

/// Splitting recursion limit for complexity reduction
const MAX_SPLIT_DEPTH: usize = 32;

/// Region context of a delivered shape, in source cell coordinates
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'r> {
    pub region: &'r Rect,
    pub complex: Option<&'r ComplexRegion>,
}

impl StageContext<'_> {
    fn unconstrained(&self) -> bool {
        self.region.is_world() && self.complex.is_none()
    }
}

/// A user-supplied pipeline stage.
///
/// `target` is the layout being built; property ids of incoming shapes
/// already refer to its property repository.
pub trait ShapeStage: Send + Sync {
    fn process(
        &mut self,
        entry: ShapeEntry,
        ctx: &StageContext<'_>,
        target: &mut Layout,
        out: &mut Vec<ShapeEntry>,
    ) -> DbResult<()>;
}

/// One stage of the shape pipeline
pub enum PipelineStage {
    /// Clips area shapes and edges to the search region; drops texts and
    /// edge pairs outside of it
    Clip,
    /// Splits polygons that are too complex
    ReduceComplexity {
        max_area_ratio: f64,
        max_vertex_count: usize,
        reject_odd: bool,
    },
    /// Turns texts into marker boxes, optionally tagged with the text string
    TextMarkers {
        enlargement: Coord,
        property_name: Option<String>,
    },
    /// Replaces polygons and boxes by their edges
    EdgesFromPolygons,
    Custom(Box<dyn ShapeStage>),
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Clip => write!(f, "Clip"),
            PipelineStage::ReduceComplexity {
                max_area_ratio,
                max_vertex_count,
                reject_odd,
            } => write!(
                f,
                "ReduceComplexity({}, {}, {})",
                max_area_ratio, max_vertex_count, reject_odd
            ),
            PipelineStage::TextMarkers {
                enlargement,
                property_name,
            } => write!(f, "TextMarkers({}, {:?})", enlargement, property_name),
            PipelineStage::EdgesFromPolygons => write!(f, "EdgesFromPolygons"),
            PipelineStage::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// Ordered list of stages
#[derive(Debug, Default)]
pub struct ShapePipeline {
    stages: Vec<PipelineStage>,
}

impl ShapePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: PipelineStage) {
        self.stages.push(stage);
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Runs one shape through all stages
    pub fn run(
        &mut self,
        entry: ShapeEntry,
        ctx: &StageContext<'_>,
        target: &mut Layout,
    ) -> DbResult<Vec<ShapeEntry>> {
        let mut items = vec![entry];
        for stage in &mut self.stages {
            let mut next = Vec::with_capacity(items.len());
            for item in items {
                stage.apply(item, ctx, target, &mut next)?;
            }
            if next.is_empty() {
                return Ok(next);
            }
            items = next;
        }
        Ok(items)
    }
}

impl PipelineStage {
    fn apply(
        &mut self,
        entry: ShapeEntry,
        ctx: &StageContext<'_>,
        target: &mut Layout,
        out: &mut Vec<ShapeEntry>,
    ) -> DbResult<()> {
        match self {
            PipelineStage::Clip => {
                clip_entry(entry, ctx, out);
                Ok(())
            }
            PipelineStage::ReduceComplexity {
                max_area_ratio,
                max_vertex_count,
                reject_odd,
            } => reduce_entry(entry, *max_area_ratio, *max_vertex_count, *reject_odd, out),
            PipelineStage::TextMarkers {
                enlargement,
                property_name,
            } => {
                text_marker(entry, *enlargement, property_name.as_deref(), target, out);
                Ok(())
            }
            PipelineStage::EdgesFromPolygons => {
                match entry.shape.to_polygon() {
                    Some(poly) => out.extend(
                        poly.edges()
                            .map(|e| ShapeEntry::with_props(Shape::Edge(e), entry.prop_id)),
                    ),
                    None => out.push(entry),
                }
                Ok(())
            }
            PipelineStage::Custom(stage) => stage.process(entry, ctx, target, out),
        }
    }
}

/// The pieces of `r` inside the search region
fn clip_rects(r: &Rect, ctx: &StageContext<'_>) -> Vec<Rect> {
    let base = ctx.region.intersection(r);
    if base.is_empty() {
        return Vec::new();
    }
    match ctx.complex {
        None => vec![base],
        Some(c) => c.clip_boxes(&base),
    }
}

fn clip_entry(entry: ShapeEntry, ctx: &StageContext<'_>, out: &mut Vec<ShapeEntry>) {
    if ctx.unconstrained() {
        out.push(entry);
        return;
    }
    let bbox = entry.shape.bbox();
    let fully_inside =
        ctx.region.contains_rect(&bbox) && ctx.complex.map_or(true, |c| c.covers(&bbox));
    if fully_inside {
        out.push(entry);
        return;
    }
    let prop_id = entry.prop_id;
    let pieces = clip_rects(&bbox, ctx);
    match entry.shape {
        Shape::Box(b) => out.extend(
            pieces
                .iter()
                .map(|p| p.intersection(&b))
                .filter(|p| p.width() > 0 && p.height() > 0)
                .map(|p| ShapeEntry::with_props(Shape::Box(p), prop_id)),
        ),
        Shape::Polygon(poly) => out.extend(
            pieces
                .iter()
                .filter_map(|p| clip_polygon(&poly, p))
                .map(|p| ShapeEntry::with_props(Shape::Polygon(p), prop_id)),
        ),
        Shape::Edge(e) => {
            let mut parts: Vec<_> = pieces.iter().filter_map(|p| clip_edge(&e, p)).collect();
            parts.sort();
            parts.dedup();
            out.extend(
                parts
                    .into_iter()
                    .map(|p| ShapeEntry::with_props(Shape::Edge(p), prop_id)),
            );
        }
        Shape::EdgePair(_) | Shape::Text(_) => {
            if !pieces.is_empty() {
                out.push(ShapeEntry::with_props(entry.shape, prop_id));
            }
        }
    }
}

fn too_complex(poly: &Polygon, max_area_ratio: f64, max_vertex_count: usize) -> bool {
    if max_vertex_count > 0 && poly.vertices() > max_vertex_count {
        return true;
    }
    let area = poly.area();
    max_area_ratio > 0.0 && area > 0.0 && poly.bbox().area() / area > max_area_ratio
}

fn reduce_polygon(
    poly: Polygon,
    max_area_ratio: f64,
    max_vertex_count: usize,
    depth: usize,
    out: &mut Vec<Polygon>,
) {
    if depth >= MAX_SPLIT_DEPTH || !too_complex(&poly, max_area_ratio, max_vertex_count) {
        out.push(poly);
        return;
    }
    let parts = split_polygon(&poly);
    if parts.len() < 2 {
        out.push(poly);
        return;
    }
    for p in parts {
        reduce_polygon(p, max_area_ratio, max_vertex_count, depth + 1, out);
    }
}

fn reduce_entry(
    entry: ShapeEntry,
    max_area_ratio: f64,
    max_vertex_count: usize,
    reject_odd: bool,
    out: &mut Vec<ShapeEntry>,
) -> DbResult<()> {
    let Shape::Polygon(poly) = entry.shape else {
        out.push(entry);
        return Ok(());
    };
    if reject_odd && poly.is_self_intersecting() {
        let bb = poly.bbox();
        return Err(DbError::OddPolygon(format!(
            "polygon with {} vertices at ({},{};{},{})",
            poly.vertices(),
            bb.left,
            bb.bottom,
            bb.right,
            bb.top
        )));
    }
    if poly.area2() == 0 {
        return Ok(());
    }
    let mut parts = Vec::new();
    reduce_polygon(poly, max_area_ratio, max_vertex_count, 0, &mut parts);
    out.extend(
        parts
            .into_iter()
            .map(|p| ShapeEntry::with_props(Shape::Polygon(p), entry.prop_id)),
    );
    Ok(())
}

fn text_marker(
    entry: ShapeEntry,
    enlargement: Coord,
    property_name: Option<&str>,
    target: &mut Layout,
    out: &mut Vec<ShapeEntry>,
) {
    let Shape::Text(text) = &entry.shape else {
        out.push(entry);
        return;
    };
    if enlargement < 0 {
        return;
    }
    let marker = Rect::new(text.pos.x, text.pos.y, text.pos.x, text.pos.y)
        .enlarged(enlargement, enlargement);
    let prop_id = match property_name {
        Some(name) => {
            let mut props: PropertySet = target.properties(entry.prop_id).cloned().unwrap_or_default();
            props.insert(name.to_string(), text.string.clone());
            target.properties_id(&props)
        }
        None => entry.prop_id,
    };
    out.push(ShapeEntry::with_props(Shape::Box(marker), prop_id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::geometry::{Edge, Point, Text};

    fn ctx_for(region: &Rect) -> StageContext<'_> {
        StageContext {
            region,
            complex: None,
        }
    }

    #[test]
    fn test_clip_box_and_edge() {
        let region = Rect::new(0, 0, 10, 10);
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::Clip);
        let out = p
            .run(ShapeEntry::new(Shape::Box(Rect::new(5, 5, 20, 20))), &ctx_for(&region), &mut target)
            .expect("clip");
        assert_eq!(out, vec![ShapeEntry::new(Shape::Box(Rect::new(5, 5, 10, 10)))]);

        let out = p
            .run(ShapeEntry::new(Shape::Edge(Edge::from_coords(-5, 5, 5, 5))), &ctx_for(&region), &mut target)
            .expect("clip");
        assert_eq!(out, vec![ShapeEntry::new(Shape::Edge(Edge::from_coords(0, 5, 5, 5)))]);

        let out = p
            .run(ShapeEntry::new(Shape::Text(Text::new("x", Point::new(20, 20)))), &ctx_for(&region), &mut target)
            .expect("clip");
        assert!(out.is_empty());
    }

    #[test]
    fn test_clip_with_complex_region() {
        let region = Rect::new(0, 0, 30, 10);
        let complex = ComplexRegion::from_boxes([Rect::new(0, 0, 10, 10), Rect::new(20, 0, 30, 10)]);
        let ctx = StageContext {
            region: &region,
            complex: Some(&complex),
        };
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::Clip);
        let out = p
            .run(ShapeEntry::new(Shape::Box(Rect::new(5, 2, 25, 8))), &ctx, &mut target)
            .expect("clip");
        assert_eq!(
            out,
            vec![
                ShapeEntry::new(Shape::Box(Rect::new(5, 2, 10, 8))),
                ShapeEntry::new(Shape::Box(Rect::new(20, 2, 25, 8))),
            ]
        );
    }

    #[test]
    fn test_reduce_complexity_splits() {
        let comb = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 100),
            Point::new(90, 100),
            Point::new(90, 10),
            Point::new(10, 10),
            Point::new(10, 100),
            Point::new(0, 100),
        ]);
        let area = comb.area();
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::ReduceComplexity {
            max_area_ratio: 3.0,
            max_vertex_count: 16,
            reject_odd: false,
        });
        let world = Rect::world();
        let out = p
            .run(ShapeEntry::new(Shape::Polygon(comb)), &ctx_for(&world), &mut target)
            .expect("reduce");
        assert!(out.len() >= 2);
        let total: f64 = out
            .iter()
            .filter_map(|e| e.shape.to_polygon())
            .map(|p| p.area())
            .sum();
        assert_eq!(total, area);
    }

    #[test]
    fn test_reject_odd_polygon() {
        let bowtie = Polygon::new(vec![
            Point::new(0, 0),
            Point::new(10, 10),
            Point::new(10, 0),
            Point::new(0, 10),
        ]);
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::ReduceComplexity {
            max_area_ratio: 0.0,
            max_vertex_count: 0,
            reject_odd: true,
        });
        let world = Rect::world();
        let r = p.run(ShapeEntry::new(Shape::Polygon(bowtie)), &ctx_for(&world), &mut target);
        assert!(matches!(r, Err(DbError::OddPolygon(_))));
    }

    #[test]
    fn test_text_markers_carry_string() {
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::TextMarkers {
            enlargement: 1,
            property_name: Some("LABEL".into()),
        });
        let world = Rect::world();
        let out = p
            .run(ShapeEntry::new(Shape::Text(Text::new("VDD", Point::new(5, 5)))), &ctx_for(&world), &mut target)
            .expect("markers");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].shape, Shape::Box(Rect::new(4, 4, 6, 6)));
        let props = target.properties(out[0].prop_id).expect("text property");
        assert_eq!(props.get("LABEL").map(String::as_str), Some("VDD"));
    }

    #[test]
    fn test_edges_from_polygons() {
        let mut target = Layout::new();
        let mut p = ShapePipeline::new().with_stage(PipelineStage::EdgesFromPolygons);
        let world = Rect::world();
        let out = p
            .run(ShapeEntry::new(Shape::Box(Rect::new(0, 0, 10, 10))), &ctx_for(&world), &mut target)
            .expect("edges");
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|e| matches!(e.shape, Shape::Edge(_))));
    }
}
