//! The canonical graph document and the normalizer that produces it.
//!
//! Persisted documents are untrusted: they come from older clients that used
//! the editor's original field names (`type`, `parentNode`, `style` geometry,
//! `data.label`, flat `data.notes`), from hand-edited exports, and from AI
//! output. [`normalize_graph`] is total over that input space. It never
//! fails; missing or corrupt fields degrade to per-field defaults, and a
//! document that is not even an object degrades to the empty default
//! document. Canonical documents round-trip unchanged, so normalizing twice
//! is the same as normalizing once.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::coerce::{coerce_non_empty_string, coerce_number, coerce_optional_string};
use crate::items::{Item, Note, fresh_id};

pub const DEFAULT_GRAPH_NAME: &str = "Untitled Graph";
pub const DEFAULT_GRAPH_KIND: &str = "note";

// Placement grid for nodes that arrive without coordinates.
const GRID_COLUMNS: usize = 4;
const GRID_SPACING_X: f64 = 220.0;
const GRID_SPACING_Y: f64 = 140.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

/// Optional placement on the 3D board view.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    Leaf,
    Group,
}

impl NodeKind {
    pub fn is_group(self) -> bool {
        matches!(self, NodeKind::Group)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    #[default]
    Smoothstep,
    Straight,
    Step,
    Bezier,
}

impl EdgeKind {
    fn parse(tag: &str) -> EdgeKind {
        match tag {
            "straight" => EdgeKind::Straight,
            "step" => EdgeKind::Step,
            // The editor's original "default" edge renders as a bezier.
            "bezier" | "default" => EdgeKind::Bezier,
            _ => EdgeKind::Smoothstep,
        }
    }
}

/// One node of the scene. `position` is local to the containing group when
/// `container_id` is set, absolute otherwise. Geometry is always concrete
/// after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    pub position: Point,
    pub size: Size,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub label: String,
    #[serde(default)]
    pub items: Vec<Item>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position3d: Option<Position3d>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub directed: bool,
    #[serde(default)]
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

fn default_kind() -> String {
    DEFAULT_GRAPH_KIND.to_string()
}

impl Graph {
    /// The empty document returned whenever nothing usable was persisted.
    pub fn default_for(kind: &str) -> Graph {
        let kind = kind.trim();
        Graph {
            name: DEFAULT_GRAPH_NAME.to_string(),
            kind: if kind.is_empty() {
                DEFAULT_GRAPH_KIND.to_string()
            } else {
                kind.to_string()
            },
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }
}

/// Geometry applied where documents are silent: default node sizes and the
/// margin a container keeps around its members. The values mirror the
/// editor's on-screen defaults, but nothing in the model depends on them.
#[derive(Debug, Clone, Copy)]
pub struct SceneDefaults {
    pub leaf_size: Size,
    pub group_size: Size,
    pub group_padding: f64,
}

impl Default for SceneDefaults {
    fn default() -> Self {
        Self {
            leaf_size: Size {
                width: 150.0,
                height: 52.0,
            },
            group_size: Size {
                width: 300.0,
                height: 180.0,
            },
            group_padding: 40.0,
        }
    }
}

/// Canonicalizes an untrusted document. `fallback_kind` fills the document
/// kind when the input does not carry one; it is also the kind of the default
/// document returned for inputs that are missing, not an object, or missing
/// their node/edge arrays.
pub fn normalize_graph(raw: Option<&Value>, fallback_kind: &str, defaults: &SceneDefaults) -> Graph {
    let Some(object) = raw.and_then(Value::as_object) else {
        return Graph::default_for(fallback_kind);
    };
    let Some(raw_nodes) = object.get("nodes").and_then(Value::as_array) else {
        return Graph::default_for(fallback_kind);
    };
    let Some(raw_edges) = object.get("edges").and_then(Value::as_array) else {
        return Graph::default_for(fallback_kind);
    };

    let name = coerce_non_empty_string(object.get("name"), DEFAULT_GRAPH_NAME);
    let mut kind = coerce_non_empty_string(object.get("kind"), fallback_kind);
    if kind.trim().is_empty() {
        kind = DEFAULT_GRAPH_KIND.to_string();
    }

    let mut seen_ids = HashSet::new();
    let nodes = raw_nodes
        .iter()
        .enumerate()
        .map(|(index, raw_node)| normalize_node(raw_node, index, &mut seen_ids, defaults))
        .collect();

    let edges = raw_edges
        .iter()
        .enumerate()
        .filter_map(|(index, raw_edge)| normalize_edge(raw_edge, index))
        .collect();

    Graph {
        name,
        kind,
        nodes,
        edges,
    }
}

/// Normalizes persisted text; unparseable JSON counts as an absent document.
pub fn normalize_json(text: &str, fallback_kind: &str, defaults: &SceneDefaults) -> Graph {
    let parsed = serde_json::from_str::<Value>(text).ok();
    normalize_graph(parsed.as_ref(), fallback_kind, defaults)
}

fn normalize_node(
    raw: &Value,
    index: usize,
    seen_ids: &mut HashSet<String>,
    defaults: &SceneDefaults,
) -> Node {
    let data = raw.get("data");
    let field = |key: &str| raw.get(key);
    let data_field = |key: &str| data.and_then(|value| value.get(key));

    let mut id = coerce_non_empty_string(field("id"), "");
    if id.is_empty() || seen_ids.contains(&id) {
        id = fresh_id("node");
    }
    seen_ids.insert(id.clone());

    let kind = node_kind(raw);

    let fallback_label = if kind.is_group() {
        format!("Group {}", index + 1)
    } else {
        format!("Node {}", index + 1)
    };
    let label = coerce_non_empty_string(field("label").or(data_field("label")), &fallback_label);

    let grid = grid_position(index);
    let position_value = field("position");
    let position = Point {
        x: coerce_number(position_value.and_then(|value| value.get("x")), grid.x),
        y: coerce_number(position_value.and_then(|value| value.get("y")), grid.y),
    };

    let size = normalize_size(raw, kind, defaults);

    let container_id = coerce_optional_string(field("containerId").or(field("parentNode")));

    let items = match field("items").or(data_field("items")).and_then(Value::as_array) {
        Some(raw_items) => normalize_items(raw_items),
        None => match data_field("notes").or(field("notes")).and_then(Value::as_array) {
            Some(raw_notes) => migrate_legacy_notes(raw_notes),
            None => Vec::new(),
        },
    };

    let progress = field("progress").or(data_field("progress")).and_then(|value| {
        let parsed = coerce_number(Some(value), f64::NAN);
        parsed.is_finite().then(|| parsed.clamp(0.0, 100.0))
    });

    let script_name = coerce_optional_string(field("scriptName").or(data_field("scriptName")));
    let node_notes = coerce_optional_string(field("nodeNotes").or(data_field("nodeNotes")));
    let position3d = field("position3d")
        .or(data_field("position3d"))
        .and_then(normalize_position3d);

    Node {
        id,
        kind,
        position,
        size,
        container_id,
        label,
        items,
        progress,
        script_name,
        position3d,
        node_notes,
    }
}

fn node_kind(raw: &Value) -> NodeKind {
    let tag = coerce_non_empty_string(raw.get("kind").or(raw.get("type")), "");
    if tag == "group" {
        NodeKind::Group
    } else {
        NodeKind::Leaf
    }
}

fn normalize_size(raw: &Value, kind: NodeKind, defaults: &SceneDefaults) -> Size {
    let size = raw.get("size");
    let style = raw.get("style");
    let width_value = size
        .and_then(|value| value.get("width"))
        .or(style.and_then(|value| value.get("width")))
        .or(raw.get("width"));
    let height_value = size
        .and_then(|value| value.get("height"))
        .or(style.and_then(|value| value.get("height")))
        .or(raw.get("height"));

    let fallback = if kind.is_group() {
        defaults.group_size
    } else {
        defaults.leaf_size
    };
    let mut size = Size {
        width: coerce_number(width_value, fallback.width),
        height: coerce_number(height_value, fallback.height),
    };
    if kind.is_group() {
        // Containers never keep zero or negative extents.
        if size.width <= 0.0 {
            size.width = defaults.group_size.width;
        }
        if size.height <= 0.0 {
            size.height = defaults.group_size.height;
        }
    } else {
        size.width = size.width.max(0.0);
        size.height = size.height.max(0.0);
    }
    size
}

fn normalize_items(raw_items: &[Value]) -> Vec<Item> {
    raw_items
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut id = coerce_non_empty_string(raw.get("id"), "");
            if id.is_empty() {
                id = fresh_id("item");
            }
            Item {
                id,
                title: coerce_non_empty_string(raw.get("title"), &format!("Item {}", index + 1)),
                notes: raw
                    .get("notes")
                    .and_then(Value::as_array)
                    .map(|notes| normalize_notes(notes))
                    .unwrap_or_default(),
                children: raw
                    .get("children")
                    .and_then(Value::as_array)
                    .map(|children| normalize_items(children))
                    .unwrap_or_default(),
            }
        })
        .collect()
}

fn normalize_notes(raw_notes: &[Value]) -> Vec<Note> {
    raw_notes
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut id = coerce_non_empty_string(raw.get("id"), "");
            if id.is_empty() {
                id = fresh_id("note");
            }
            Note {
                id,
                title: coerce_non_empty_string(raw.get("title"), &format!("Note {}", index + 1)),
                content: coerce_non_empty_string(raw.get("content"), ""),
            }
        })
        .collect()
}

/// Early documents stored a flat list of notes per node. Each becomes a
/// top-level item with no notes and no children, keeping its id and title.
fn migrate_legacy_notes(raw_notes: &[Value]) -> Vec<Item> {
    raw_notes
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            let mut id = coerce_non_empty_string(raw.get("id"), "");
            if id.is_empty() {
                id = fresh_id("item");
            }
            Item {
                id,
                title: coerce_non_empty_string(raw.get("title"), &format!("Item {}", index + 1)),
                notes: Vec::new(),
                children: Vec::new(),
            }
        })
        .collect()
}

fn normalize_position3d(raw: &Value) -> Option<Position3d> {
    if !raw.is_object() {
        return None;
    }
    Some(Position3d {
        x: coerce_number(raw.get("x"), 0.0),
        y: coerce_number(raw.get("y"), 0.0),
        z: coerce_number(raw.get("z"), 0.0),
    })
}

/// Edges with no usable endpoints carry no information and are dropped;
/// everything else is repaired in place. Endpoints are not checked against
/// the node list here, the editor renders dangling edges as disconnected.
fn normalize_edge(raw: &Value, index: usize) -> Option<Edge> {
    let source = coerce_non_empty_string(raw.get("source"), "");
    let target = coerce_non_empty_string(raw.get("target"), "");
    if source.is_empty() || target.is_empty() {
        return None;
    }

    let id = coerce_non_empty_string(raw.get("id"), &format!("edge-{index}"));
    let directed = match raw.get("directed").and_then(Value::as_bool) {
        Some(flag) => flag,
        // Legacy documents marked direction with an arrowhead marker.
        None => matches!(raw.get("markerEnd"), Some(marker) if !marker.is_null()),
    };
    let kind = match raw.get("kind").or(raw.get("type")) {
        Some(Value::String(tag)) => EdgeKind::parse(tag.trim()),
        _ => EdgeKind::default(),
    };

    Some(Edge {
        id,
        source,
        target,
        directed,
        kind,
    })
}

fn grid_position(index: usize) -> Point {
    Point {
        x: (index % GRID_COLUMNS) as f64 * GRID_SPACING_X,
        y: (index / GRID_COLUMNS) as f64 * GRID_SPACING_Y,
    }
}
