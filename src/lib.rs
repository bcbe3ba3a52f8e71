//! Hierarchical scene model for node/edge note graphs.
//!
//! The core is a set of pure transformations over persisted graph documents:
//! [`graph::normalize_graph`] canonicalizes untrusted JSON, [`scene`] resolves
//! containment chains into absolute coordinates and rewrites them when nodes
//! move between containers, and [`items`] manages the outline tree attached to
//! each node. Around that core sit a sqlite store, a zip exporter, an optional
//! AI document generator and (behind the `server` feature) the HTTP sync API.

pub mod coerce;
pub mod export;
pub mod generate;
pub mod graph;
pub mod items;
pub mod scene;
#[cfg(feature = "server")]
pub mod serve;
pub mod store;

pub use graph::{
    DEFAULT_GRAPH_KIND, DEFAULT_GRAPH_NAME, Edge, EdgeKind, Graph, Node, NodeKind, Point,
    Position3d, SceneDefaults, Size, normalize_graph, normalize_json,
};
pub use items::{
    Item, Note, clone_with_new_ids, find_item, fresh_id, move_item_under, remove_item, update_item,
};
pub use scene::{
    NodeIndex, PositionResolver, Rect, detach_from_container, group_nodes, remove_container,
};
pub use store::{GraphSummary, Store, StoreConfig, StoredGraph};
