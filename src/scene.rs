//! Containment-aware geometry over a node collection.
//!
//! Node positions are stored relative to their containing group, so answering
//! "where is this node on screen" means walking the containment chain and
//! summing offsets. [`PositionResolver`] does that walk with memoization and
//! survives reference cycles in corrupt documents. The editing operations
//! ([`group_nodes`], [`detach_from_container`], [`remove_container`]) rewrite
//! containment while keeping every node's absolute position fixed, so nothing
//! jumps on screen when the hierarchy changes.

use std::collections::{HashMap, HashSet};

use crate::graph::{Node, NodeKind, Point, SceneDefaults, Size};
use crate::items::fresh_id;

/// Id lookup table over one node collection. Containment resolution goes
/// through this index instead of scanning the slice per hop.
pub struct NodeIndex<'a> {
    by_id: HashMap<&'a str, &'a Node>,
}

impl<'a> NodeIndex<'a> {
    pub fn new(nodes: &'a [Node]) -> Self {
        let mut by_id = HashMap::with_capacity(nodes.len());
        for node in nodes {
            by_id.insert(node.id.as_str(), node);
        }
        Self { by_id }
    }

    pub fn get(&self, id: &str) -> Option<&'a Node> {
        self.by_id.get(id).copied()
    }
}

/// An absolute rectangle in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn union(self, other: Rect) -> Rect {
        let min_x = self.x.min(other.x);
        let min_y = self.y.min(other.y);
        let max_x = (self.x + self.width).max(other.x + other.width);
        let max_y = (self.y + self.height).max(other.y + other.height);
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x,
            height: max_y - min_y,
        }
    }

    pub fn inflate(self, amount: f64) -> Rect {
        Rect {
            x: self.x - amount,
            y: self.y - amount,
            width: self.width + amount * 2.0,
            height: self.height + amount * 2.0,
        }
    }

    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }
}

/// Absolute-position resolution for one batch of lookups over one immutable
/// node collection. Results are memoized per resolver; build a new resolver
/// after editing nodes.
pub struct PositionResolver<'a> {
    index: &'a NodeIndex<'a>,
    cache: HashMap<String, Point>,
}

impl<'a> PositionResolver<'a> {
    pub fn new(index: &'a NodeIndex<'a>) -> Self {
        Self {
            index,
            cache: HashMap::new(),
        }
    }

    /// The node's position in scene coordinates. Nodes whose containment
    /// chain loops back on itself answer with their local position.
    pub fn absolute_position(&mut self, node: &Node) -> Point {
        let mut visiting = HashSet::new();
        self.resolve(node, &mut visiting).unwrap_or(node.position)
    }

    pub fn node_rect(&mut self, node: &Node) -> Rect {
        let origin = self.absolute_position(node);
        Rect {
            x: origin.x,
            y: origin.y,
            width: node.size.width,
            height: node.size.height,
        }
    }

    // `None` marks a walk that ran into a containment loop. Nothing along a
    // poisoned walk is cached; every node on the loop answers locally.
    fn resolve(&mut self, node: &Node, visiting: &mut HashSet<String>) -> Option<Point> {
        if let Some(cached) = self.cache.get(node.id.as_str()) {
            return Some(*cached);
        }
        if !visiting.insert(node.id.clone()) {
            return None;
        }

        let parent = node
            .container_id
            .as_deref()
            .and_then(|container| self.index.get(container));
        let absolute = match parent {
            // A dangling container reference renders at the root.
            None => node.position,
            Some(parent) => {
                let Some(origin) = self.resolve(parent, visiting) else {
                    visiting.remove(node.id.as_str());
                    return None;
                };
                Point {
                    x: origin.x + node.position.x,
                    y: origin.y + node.position.y,
                }
            }
        };

        visiting.remove(node.id.as_str());
        self.cache.insert(node.id.clone(), absolute);
        Some(absolute)
    }
}

/// Wraps `selection` in a container without moving anything on screen.
///
/// With `existing_group` set, that group is re-bounded around its current
/// members plus the selection; otherwise a fresh group node is created and
/// prepended (containers must precede their members in the collection).
/// Returns the updated collection and the container's id, or the input
/// untouched and `None` when there is nothing to do: empty selection, no
/// resolvable members, `existing_group` missing or not a group, or the
/// selection is a single group that contains nothing.
pub fn group_nodes(
    nodes: Vec<Node>,
    selection: &[String],
    existing_group: Option<&str>,
    defaults: &SceneDefaults,
) -> (Vec<Node>, Option<String>) {
    if selection.is_empty() {
        return (nodes, None);
    }

    let existing = match existing_group {
        Some(id) => match nodes.iter().find(|node| node.id == id) {
            Some(node) if node.kind.is_group() => Some(node.id.clone()),
            _ => return (nodes, None),
        },
        None => None,
    };

    let selected: HashSet<&str> = selection.iter().map(String::as_str).collect();
    let members: Vec<String> = nodes
        .iter()
        .filter(|node| {
            if existing.as_deref() == Some(node.id.as_str()) {
                return false;
            }
            selected.contains(node.id.as_str())
                || (existing.is_some() && node.container_id == existing)
        })
        .map(|node| node.id.clone())
        .collect();
    if members.is_empty() {
        return (nodes, None);
    }

    // Wrapping a lone empty group in another group achieves nothing.
    if existing.is_none() && members.len() == 1 {
        if let Some(only) = nodes.iter().find(|node| node.id == members[0]) {
            let occupied = nodes
                .iter()
                .any(|node| node.container_id.as_deref() == Some(only.id.as_str()));
            if only.kind.is_group() && !occupied {
                return (nodes, None);
            }
        }
    }

    // Resolve geometry against the unmodified collection before rewriting it.
    let mut absolutes = HashMap::new();
    let mut bounds: Option<Rect> = None;
    let group_parent_origin;
    {
        let index = NodeIndex::new(&nodes);
        let mut resolver = PositionResolver::new(&index);
        for id in &members {
            let Some(node) = index.get(id) else { continue };
            let rect = resolver.node_rect(node);
            absolutes.insert(id.clone(), Point { x: rect.x, y: rect.y });
            bounds = Some(match bounds {
                Some(current) => current.union(rect),
                None => rect,
            });
        }
        let existing_node = existing.as_deref().and_then(|id| index.get(id));
        if let Some(group) = existing_node {
            let rect = resolver.node_rect(group);
            bounds = Some(match bounds {
                Some(current) => current.union(rect),
                None => rect,
            });
        }
        // A re-bounded group keeps its own container; its new local position
        // is measured against that container's origin.
        group_parent_origin = existing_node
            .and_then(|group| group.container_id.as_deref())
            .and_then(|parent| index.get(parent))
            .map(|parent| resolver.absolute_position(parent));
    }

    let Some(bounds) = bounds else {
        return (nodes, None);
    };
    let bounds = bounds.inflate(defaults.group_padding);
    let origin = Point {
        x: bounds.x,
        y: bounds.y,
    };

    let group_id = existing.clone().unwrap_or_else(|| fresh_id("group"));
    let member_ids: HashSet<&str> = members.iter().map(String::as_str).collect();

    let mut nodes = nodes;
    for node in &mut nodes {
        if member_ids.contains(node.id.as_str()) {
            if let Some(absolute) = absolutes.get(&node.id) {
                node.position = Point {
                    x: absolute.x - origin.x,
                    y: absolute.y - origin.y,
                };
            }
            node.container_id = Some(group_id.clone());
        } else if node.id == group_id {
            let base = group_parent_origin.unwrap_or_default();
            node.position = Point {
                x: origin.x - base.x,
                y: origin.y - base.y,
            };
            node.size = Size {
                width: bounds.width,
                height: bounds.height,
            };
        }
    }

    if existing.is_none() {
        nodes.insert(
            0,
            Node {
                id: group_id.clone(),
                kind: NodeKind::Group,
                position: origin,
                size: Size {
                    width: bounds.width,
                    height: bounds.height,
                },
                container_id: None,
                label: "Group".to_string(),
                items: Vec::new(),
                progress: None,
                script_name: None,
                position3d: None,
                node_notes: None,
            },
        );
    }

    (nodes, Some(group_id))
}

/// Clears a node's container while keeping it visually in place: its local
/// position becomes the resolved absolute position. Unknown ids are a no-op.
pub fn detach_from_container(nodes: Vec<Node>, node_id: &str) -> Vec<Node> {
    let absolute = {
        let index = NodeIndex::new(&nodes);
        let mut resolver = PositionResolver::new(&index);
        index.get(node_id).map(|node| resolver.absolute_position(node))
    };
    let Some(absolute) = absolute else {
        return nodes;
    };

    let mut nodes = nodes;
    for node in &mut nodes {
        if node.id == node_id {
            node.position = absolute;
            node.container_id = None;
        }
    }
    nodes
}

/// Deletes a group node, first re-basing every member to absolute
/// coordinates so nothing moves or disappears with its container.
pub fn remove_container(nodes: Vec<Node>, group_id: &str) -> Vec<Node> {
    let absolutes: HashMap<String, Point> = {
        let index = NodeIndex::new(&nodes);
        let mut resolver = PositionResolver::new(&index);
        nodes
            .iter()
            .filter(|node| node.container_id.as_deref() == Some(group_id))
            .map(|node| (node.id.clone(), resolver.absolute_position(node)))
            .collect()
    };

    nodes
        .into_iter()
        .filter(|node| node.id != group_id)
        .map(|mut node| {
            if let Some(absolute) = absolutes.get(&node.id) {
                node.position = *absolute;
                node.container_id = None;
            }
            node
        })
        .collect()
}
