//! CLI tool for running a distance check on a JSON layout description
//!
//! Usage:
//!   cargo run --release --bin drc_probe -- <layout.json> [options]
//!
//! Options:
//!   --config <file>     Engine configuration (store options, check settings)
//!   --layer <name>      Layer to check (default: first layer)
//!   --shielded          Enable shielding
//!   --negative          Also report edges not involved in violations
//!
//! Layout description:
//!   { "dbu": 0.001, "top": "TOP", "layers": ["M1"],
//!     "cells": [ { "name": "TOP",
//!                  "shapes": [ { "layer": "M1", "box": [0, 0, 100, 10] },
//!                              { "layer": "M1", "polygon": [[0, 20], [0, 30], [50, 30], [50, 20]] } ],
//!                  "instances": [ { "cell": "A", "x": 0, "y": 100, "rot": 1 } ] } ] }

use std::env;
use std::path::Path;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;

use deep_layout::db::check::{run_flat_check, CheckSettings};
use deep_layout::db::cursor::RecursiveShapeIterator;
use deep_layout::db::geometry::{Coord, ICplxTrans, Point, Polygon, Rect, Trans, Vector};
use deep_layout::db::layout::{CellInstArray, LayerInfo, Layout, Shape};
use deep_layout::{DeepShapeStore, EngineConfig};

#[derive(Debug, Deserialize)]
struct LayoutJson {
    #[serde(default = "default_dbu")]
    dbu: f64,
    top: Option<String>,
    layers: Vec<String>,
    cells: Vec<CellJson>,
}

fn default_dbu() -> f64 {
    0.001
}

#[derive(Debug, Deserialize)]
struct CellJson {
    name: String,
    #[serde(default)]
    shapes: Vec<ShapeJson>,
    #[serde(default)]
    instances: Vec<InstanceJson>,
}

#[derive(Debug, Deserialize)]
struct ShapeJson {
    layer: String,
    #[serde(rename = "box")]
    rect: Option<[Coord; 4]>,
    polygon: Option<Vec<[Coord; 2]>>,
}

#[derive(Debug, Deserialize)]
struct InstanceJson {
    cell: String,
    #[serde(default)]
    x: Coord,
    #[serde(default)]
    y: Coord,
    #[serde(default)]
    rot: u8,
    #[serde(default)]
    mirror: bool,
    array: Option<ArrayJson>,
}

#[derive(Debug, Deserialize)]
struct ArrayJson {
    a: [Coord; 2],
    b: [Coord; 2],
    na: u32,
    nb: u32,
}

fn load_layout(path: &Path) -> anyhow::Result<(Layout, String)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read layout file {}", path.display()))?;
    let desc: LayoutJson = serde_json::from_str(&text)
        .with_context(|| format!("Invalid layout description {}", path.display()))?;

    let mut layout = Layout::with_dbu(desc.dbu);
    for name in &desc.layers {
        layout.insert_layer(LayerInfo::new(name.as_str()));
    }
    for cell in &desc.cells {
        layout.add_cell(&cell.name);
    }

    for cell in &desc.cells {
        let ci = layout
            .cell_by_name(&cell.name)
            .ok_or_else(|| anyhow!("Cell {} vanished", cell.name))?;
        for shape in &cell.shapes {
            let li = layout
                .find_layer(&shape.layer)
                .ok_or_else(|| anyhow!("Cell {}: unknown layer {}", cell.name, shape.layer))?;
            let shape = match (&shape.rect, &shape.polygon) {
                (Some([l, b, r, t]), _) => Shape::Box(Rect::new(*l, *b, *r, *t)),
                (None, Some(pts)) => {
                    Shape::Polygon(Polygon::new(pts.iter().map(|[x, y]| Point::new(*x, *y)).collect()))
                }
                (None, None) => bail!("Cell {}: shape without geometry", cell.name),
            };
            if let Some(s) = layout.shapes_mut(ci, li) {
                s.insert(shape);
            }
        }
        for inst in &cell.instances {
            let child = layout
                .cell_by_name(&inst.cell)
                .ok_or_else(|| anyhow!("Cell {}: unknown child cell {}", cell.name, inst.cell))?;
            let trans = Trans::new(inst.rot, inst.mirror, Vector::new(inst.x, inst.y));
            let array = match &inst.array {
                Some(a) => CellInstArray::array(
                    child,
                    trans,
                    Vector::new(a.a[0], a.a[1]),
                    Vector::new(a.b[0], a.b[1]),
                    a.na,
                    a.nb,
                ),
                None => CellInstArray::new(child, trans),
            };
            layout.insert_instance(ci, array);
        }
    }

    let top = match desc.top {
        Some(t) => t,
        None => {
            let ci = layout.top_cell().ok_or_else(|| anyhow!("Layout has no unique top cell"))?;
            layout.cell_name(ci).to_string()
        }
    };
    Ok((layout, top))
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <layout.json> [options]", program);
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config <file>   Engine configuration (JSON)");
    eprintln!("  --layer <name>    Layer to check (default: first layer)");
    eprintln!("  --shielded        Enable shielding");
    eprintln!("  --negative        Report edges not involved in violations");
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage(&args[0]);
        return Ok(());
    }

    let layout_path = Path::new(&args[1]);
    let mut config_path: Option<String> = None;
    let mut layer_name: Option<String> = None;
    let mut shielded = false;
    let mut negative = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
                config_path = args.get(i).cloned();
            }
            "--layer" => {
                i += 1;
                layer_name = args.get(i).cloned();
            }
            "--shielded" => shielded = true,
            "--negative" => negative = true,
            other => {
                print_usage(&args[0]);
                bail!("Unknown option {}", other);
            }
        }
        i += 1;
    }

    let config = match &config_path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    let mut settings: CheckSettings = config.check.clone();
    settings.shielded |= shielded;
    settings.negative |= negative;
    if settings.distance <= 0 {
        bail!("Check distance must be positive (set check.distance in the configuration)");
    }

    let (layout, top_name) = load_layout(layout_path)?;
    let top = layout
        .cell_by_name(&top_name)
        .ok_or_else(|| anyhow!("Top cell {} not found", top_name))?;
    let layer = match &layer_name {
        Some(n) => layout.find_layer(n).ok_or_else(|| anyhow!("Layer {} not found", n))?,
        None => layout
            .layer_indexes()
            .next()
            .ok_or_else(|| anyhow!("Layout has no layers"))?,
    };

    let store = DeepShapeStore::with_state(config.store.clone());
    let cursor = RecursiveShapeIterator::new(&layout, top, layer);
    let deep = store.create_polygon_layer(&cursor, None, None, ICplxTrans::identity())?;
    let result = run_flat_check(&deep, None, &settings)?;

    let dbu = layout.dbu();
    let out_top = result.edge_pairs.initial_cell()?;
    let violations: Vec<Shape> = result.edge_pairs.with_layout(|l| {
        l.shapes(out_top, result.edge_pairs.layer())
            .map(|s| s.iter().map(|e| e.shape.clone()).collect())
            .unwrap_or_default()
    })?;

    println!(
        "{} {:?} violation(s) below {} ({} um) on {} in {}",
        violations.len(),
        settings.relation,
        settings.distance,
        settings.distance as f64 * dbu,
        layer_name.as_deref().unwrap_or("first layer"),
        top_name
    );
    for shape in &violations {
        if let Shape::EdgePair(ep) = shape {
            println!(
                "  ({},{};{},{}) / ({},{};{},{})  d={:.4} um",
                ep.first.p1.x,
                ep.first.p1.y,
                ep.first.p2.x,
                ep.first.p2.y,
                ep.second.p1.x,
                ep.second.p1.y,
                ep.second.p2.x,
                ep.second.p2.y,
                ep.distance() * dbu
            );
        }
    }

    if let Some(neg) = &result.negative {
        let edges: Vec<Shape> = neg.with_layout(|l| {
            l.shapes(out_top, neg.layer())
                .map(|s| s.iter().map(|e| e.shape.clone()).collect())
                .unwrap_or_default()
        })?;
        println!("{} edge(s) free of violations", edges.len());
        for shape in &edges {
            if let Shape::Edge(e) = shape {
                println!("  ({},{};{},{})", e.p1.x, e.p1.y, e.p2.x, e.p2.y);
            }
        }
    }
    Ok(())
}
