//! Delivering working layout content into other layouts

use crate::db::geometry::{Bounded, Coord, EdgePair, ICplxTrans, Polygon, Text};
use crate::db::layout::{LayerIndex, Layout, PropertiesId, PropertySet, Shape, ShapeEntry};

use super::mapping::CellMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    /// Shapes keep their kind
    AsIs,
    /// Every shape becomes a polygon; edges, edge pairs and texts are
    /// enlarged by the given amount
    Polygons(Coord),
}

/// Copies `layer` of every mapped source cell into `target_layer` of the
/// corresponding target cell, scaling by the database unit ratio.
///
/// With `text_property`, boxes carrying that property turn back into texts
/// at their center (only in `AsIs` mode).
pub(crate) fn copy_layer_shapes(
    source: &Layout,
    layer: LayerIndex,
    target: &mut Layout,
    target_layer: LayerIndex,
    mapping: &CellMapping,
    mode: ExportMode,
    text_property: Option<&str>,
) {
    let scale = ICplxTrans::magnification(source.dbu() / target.dbu());
    for (&source_cell, &target_cell) in mapping.table() {
        let Some(shapes) = source.shapes(source_cell, layer) else {
            continue;
        };
        let mut out = Vec::with_capacity(shapes.len());
        for entry in shapes.iter() {
            let mut props = source.properties(entry.prop_id).cloned();
            let shape = if scale.is_unity() {
                entry.shape.clone()
            } else {
                entry.shape.transformed(&scale)
            };
            let shape = match mode {
                ExportMode::AsIs => text_from_marker(shape, props.as_mut(), text_property),
                ExportMode::Polygons(enl) => as_polygon(shape, enl),
            };
            let Some(shape) = shape else {
                continue;
            };
            let prop_id = translate(target, props.as_ref());
            out.push(ShapeEntry::with_props(shape, prop_id));
        }
        if let Some(s) = target.shapes_mut(target_cell, target_layer) {
            s.extend(out);
        }
    }
}

fn translate(target: &mut Layout, props: Option<&PropertySet>) -> PropertiesId {
    props.map_or(0, |p| target.properties_id(p))
}

fn text_from_marker(shape: Shape, props: Option<&mut PropertySet>, name: Option<&str>) -> Option<Shape> {
    let (Some(name), Some(props)) = (name, props) else {
        return Some(shape);
    };
    let is_marker = match &shape {
        Shape::Box(_) => true,
        Shape::Polygon(p) => p.is_box(),
        _ => false,
    };
    if !is_marker {
        return Some(shape);
    }
    match props.remove(name) {
        Some(string) => Some(Shape::Text(Text::new(string, shape.bbox().center()))),
        None => Some(shape),
    }
}

fn as_polygon(shape: Shape, enl: Coord) -> Option<Shape> {
    let poly = match shape {
        Shape::Polygon(p) => p,
        Shape::Box(r) => Polygon::from_rect(&r),
        Shape::Edge(e) => EdgePair::new(e, e.swapped()).to_polygon(enl),
        Shape::EdgePair(ep) => ep.to_polygon(enl),
        Shape::Text(t) => Polygon::from_rect(&t.bbox().enlarged(enl, enl)),
    };
    (!poly.is_empty()).then_some(Shape::Polygon(poly))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::geometry::{Edge, Point, Rect};
    use crate::db::layout::LayerInfo;

    fn source_with(shapes: Vec<ShapeEntry>) -> (Layout, LayerIndex, CellMapping, Layout, LayerIndex) {
        let mut src = Layout::with_dbu(0.001);
        let l = src.insert_layer(LayerInfo::default());
        let top = src.add_cell("TOP");
        if let Some(s) = src.shapes_mut(top, l) {
            s.extend(shapes);
        }
        let mut tgt = Layout::with_dbu(0.001);
        let tl = tgt.insert_layer(LayerInfo::new("OUT"));
        let ttop = tgt.add_cell("T");
        let mut cm = CellMapping::new();
        cm.create_single_mapping(ttop, top);
        (src, l, cm, tgt, tl)
    }

    #[test]
    fn test_markers_become_texts() {
        let mut props = PropertySet::new();
        props.insert("TEXT".to_string(), "VDD".to_string());
        props.insert("NET".to_string(), "1".to_string());
        let (mut src, l, cm, mut tgt, tl) = source_with(vec![]);
        let pid_src = src.properties_id(&props);
        let top = 0;
        if let Some(s) = src.shapes_mut(top, l) {
            s.push(ShapeEntry::with_props(Shape::Box(Rect::new(-2, -2, 2, 2)), pid_src));
            s.insert(Shape::Box(Rect::new(10, 10, 20, 20)));
        }
        copy_layer_shapes(&src, l, &mut tgt, tl, &cm, ExportMode::AsIs, Some("TEXT"));
        let shapes = tgt.shapes(0, tl).expect("shapes");
        assert_eq!(shapes.len(), 2);
        let text = shapes
            .iter()
            .find_map(|e| match &e.shape {
                Shape::Text(t) => Some((t.clone(), e.prop_id)),
                _ => None,
            })
            .expect("text");
        assert_eq!(text.0.string, "VDD");
        assert_eq!(text.0.pos, Point::new(0, 0));
        let remaining = tgt.properties(text.1).expect("remaining properties");
        assert_eq!(remaining.get("NET").map(String::as_str), Some("1"));
        assert!(!remaining.contains_key("TEXT"));
    }

    #[test]
    fn test_dbu_scaling_and_polygons() {
        let (src, l, cm, _, _) = source_with(vec![
            ShapeEntry::new(Shape::Box(Rect::new(0, 0, 10, 10))),
            ShapeEntry::new(Shape::Edge(Edge::from_coords(0, 0, 0, 10))),
        ]);
        let mut tgt = Layout::with_dbu(0.0005);
        let tl = tgt.insert_layer(LayerInfo::default());
        tgt.add_cell("T");
        copy_layer_shapes(&src, l, &mut tgt, tl, &cm, ExportMode::Polygons(1), None);
        let shapes = tgt.shapes(0, tl).expect("shapes");
        assert_eq!(shapes.len(), 2);
        assert!(shapes.iter().all(|e| matches!(e.shape, Shape::Polygon(_))));
        assert_eq!(shapes.bbox(), Rect::new(-1, -1, 20, 21));
    }
}
