use anyhow::Result;
use serde_json::json;

use graphnotes::{
    Graph, Node, NodeIndex, Point, PositionResolver, SceneDefaults, detach_from_container,
    find_item, group_nodes, move_item_under, normalize_graph, normalize_json, remove_container,
};

fn normalize(value: &serde_json::Value) -> Graph {
    normalize_graph(Some(value), "note", &SceneDefaults::default())
}

fn absolute_of(nodes: &[Node], id: &str) -> Point {
    let index = NodeIndex::new(nodes);
    let mut resolver = PositionResolver::new(&index);
    let node = index.get(id).expect("node should exist");
    resolver.absolute_position(node)
}

#[test]
fn legacy_editor_document_normalizes_end_to_end() -> Result<()> {
    let graph = normalize(&json!({
        "name": "  Sprint Board ",
        "nodes": [
            {
                "id": "backlog",
                "type": "group",
                "position": { "x": "40", "y": 40 },
                "style": { "width": 500, "height": 320 },
            },
            {
                "id": "task-1",
                "type": "default",
                "parentNode": "backlog",
                "position": { "x": 20, "y": 30 },
                "data": {
                    "label": "Write docs",
                    "notes": [{ "id": "n1", "title": "Old note" }],
                    "progress": 250,
                },
            },
            { "position": { "x": 1, "y": 2 } },
        ],
        "edges": [
            { "source": "backlog", "target": "task-1", "markerEnd": { "type": "arrowclosed" } },
            { "source": "task-1" },
        ],
    }));

    assert_eq!(graph.name, "Sprint Board");
    assert_eq!(graph.kind, "note");

    let backlog = &graph.nodes[0];
    assert!(backlog.kind.is_group(), "legacy type 'group' should map to a group");
    assert_eq!(backlog.position, Point { x: 40.0, y: 40.0 });
    assert_eq!(backlog.size.width, 500.0);

    let task = &graph.nodes[1];
    assert_eq!(task.container_id.as_deref(), Some("backlog"));
    assert_eq!(task.label, "Write docs");
    assert_eq!(task.progress, Some(100.0), "progress should clamp to 100");
    assert_eq!(task.items.len(), 1, "flat notes should migrate to items");
    assert_eq!(task.items[0].id, "n1");
    assert_eq!(task.items[0].title, "Old note");
    assert!(task.items[0].notes.is_empty());
    assert!(task.items[0].children.is_empty());

    let anonymous = &graph.nodes[2];
    assert!(anonymous.id.starts_with("node-"), "missing ids should be assigned");
    assert_eq!(anonymous.label, "Node 3");

    assert_eq!(graph.edges.len(), 1, "edges without a target should be dropped");
    assert_eq!(graph.edges[0].id, "edge-0");
    assert!(graph.edges[0].directed, "an arrowhead marker should mean directed");

    Ok(())
}

#[test]
fn normalizing_twice_changes_nothing() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [
            { "id": "g", "type": "group" },
            { "id": "a", "parentNode": "g", "data": { "notes": [{ "title": "n" }] } },
            {},
        ],
        "edges": [{ "source": "g", "target": "a", "markerEnd": {} }],
    }));

    let serialized = serde_json::to_value(&graph)?;
    let again = normalize(&serialized);
    assert_eq!(graph, again, "canonical documents must round-trip unchanged");
    Ok(())
}

#[test]
fn containment_chain_resolves_to_summed_offsets() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [
            { "id": "c", "kind": "group", "position": { "x": 3, "y": 3 } },
            { "id": "b", "kind": "group", "containerId": "c", "position": { "x": 2, "y": 2 } },
            { "id": "a", "containerId": "b", "position": { "x": 1, "y": 1 } },
        ],
        "edges": [],
    }));

    assert_eq!(absolute_of(&graph.nodes, "a"), Point { x: 6.0, y: 6.0 });
    Ok(())
}

#[test]
fn containment_cycles_resolve_locally() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [
            { "id": "x", "containerId": "y", "position": { "x": 7, "y": 8 } },
            { "id": "y", "containerId": "x", "position": { "x": 1, "y": 1 } },
        ],
        "edges": [],
    }));

    assert_eq!(
        absolute_of(&graph.nodes, "x"),
        Point { x: 7.0, y: 8.0 },
        "a cycle should fall back to the node's own position"
    );
    Ok(())
}

#[test]
fn grouping_and_detaching_keep_nodes_in_place() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [
            { "id": "a", "position": { "x": 10, "y": 10 } },
            { "id": "b", "position": { "x": 240, "y": 180 } },
        ],
        "edges": [],
    }));
    let defaults = SceneDefaults::default();

    let before_a = absolute_of(&graph.nodes, "a");
    let before_b = absolute_of(&graph.nodes, "b");

    let (nodes, group_id) = group_nodes(
        graph.nodes,
        &["a".to_string(), "b".to_string()],
        None,
        &defaults,
    );
    let group_id = group_id.expect("grouping should produce a container");
    assert_eq!(absolute_of(&nodes, "a"), before_a);
    assert_eq!(absolute_of(&nodes, "b"), before_b);
    assert_eq!(nodes[0].id, group_id, "the container should lead the collection");

    let nodes = detach_from_container(nodes, "a");
    let a = nodes.iter().find(|node| node.id == "a").expect("a survives");
    assert!(a.container_id.is_none());
    assert_eq!(absolute_of(&nodes, "a"), before_a);
    assert_eq!(a.position, before_a, "detached nodes hold their absolute position");

    Ok(())
}

#[test]
fn removing_a_container_keeps_its_members() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [
            { "id": "g", "kind": "group", "position": { "x": 100, "y": 100 } },
            { "id": "a", "containerId": "g", "position": { "x": 10, "y": 20 } },
            { "id": "b", "containerId": "g", "position": { "x": 50, "y": 60 } },
        ],
        "edges": [],
    }));

    let before_a = absolute_of(&graph.nodes, "a");
    let before_b = absolute_of(&graph.nodes, "b");

    let nodes = remove_container(graph.nodes, "g");
    assert_eq!(nodes.len(), 2, "only the container should disappear");
    assert!(nodes.iter().all(|node| node.container_id.is_none()));
    assert_eq!(absolute_of(&nodes, "a"), before_a);
    assert_eq!(absolute_of(&nodes, "b"), before_b);

    Ok(())
}

#[test]
fn item_moves_are_exclusive_and_cycle_safe() -> Result<()> {
    let graph = normalize(&json!({
        "nodes": [{
            "id": "a",
            "items": [
                { "id": "p", "title": "P", "children": [
                    { "id": "q", "title": "Q", "children": [{ "id": "r", "title": "R" }] },
                ] },
                { "id": "s", "title": "S" },
            ],
        }],
        "edges": [],
    }));
    let items = graph.nodes.into_iter().next().expect("node exists").items;

    // Moving an item under its own descendant must be rejected outright.
    let (items, moved) = move_item_under(items, "p", "r");
    assert!(!moved, "p -> r would orphan the subtree");
    assert!(find_item(&items, "p").is_some());

    let (items, moved) = move_item_under(items, "q", "s");
    assert!(moved);
    let s = find_item(&items, "s").expect("s exists");
    assert_eq!(s.children.len(), 1);
    assert_eq!(s.children[0].id, "q");
    let p = find_item(&items, "p").expect("p exists");
    assert!(p.children.is_empty(), "q must leave its old parent");

    Ok(())
}

#[test]
fn garbage_text_becomes_the_default_document() -> Result<()> {
    let graph = normalize_json("definitely not json", "note", &SceneDefaults::default());
    assert_eq!(graph.name, "Untitled Graph");
    assert_eq!(graph.kind, "note");
    assert!(graph.nodes.is_empty());
    assert!(graph.edges.is_empty());
    Ok(())
}
