//! The outline tree attached to each node: items with notes and child items.
//!
//! All operations take the tree by value and return the updated tree, so a
//! caller never observes a half-applied edit. Lookups are depth-first and the
//! first id match wins.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub children: Vec<Item>,
}

/// Short prefixed identifier for new nodes, edges, items and notes, e.g.
/// `item-9f8b21c4`.
pub fn fresh_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &id[..8])
}

/// Depth-first lookup; an item is found before its children.
pub fn find_item<'a>(tree: &'a [Item], id: &str) -> Option<&'a Item> {
    for item in tree {
        if item.id == id {
            return Some(item);
        }
        if let Some(found) = find_item(&item.children, id) {
            return Some(found);
        }
    }
    None
}

/// Replaces the first item matching `id` with `update(item)`. Returns the
/// tree and whether a match was found; a miss returns the tree unchanged.
pub fn update_item<F>(tree: Vec<Item>, id: &str, update: F) -> (Vec<Item>, bool)
where
    F: FnOnce(Item) -> Item,
{
    let mut pending = Some(update);
    let tree = apply_update(tree, id, &mut pending);
    let found = pending.is_none();
    (tree, found)
}

fn apply_update<F>(tree: Vec<Item>, id: &str, pending: &mut Option<F>) -> Vec<Item>
where
    F: FnOnce(Item) -> Item,
{
    tree.into_iter()
        .map(|mut item| {
            if pending.is_none() {
                return item;
            }
            if item.id == id {
                if let Some(update) = pending.take() {
                    item = update(item);
                }
                return item;
            }
            item.children = apply_update(std::mem::take(&mut item.children), id, pending);
            item
        })
        .collect()
}

/// Detaches the first item matching `id`, returning the remaining tree and
/// the removed subtree (children ride along with it).
pub fn remove_item(tree: Vec<Item>, id: &str) -> (Vec<Item>, Option<Item>) {
    let mut removed = None;
    let tree = detach_item(tree, id, &mut removed);
    (tree, removed)
}

fn detach_item(tree: Vec<Item>, id: &str, removed: &mut Option<Item>) -> Vec<Item> {
    let mut kept = Vec::with_capacity(tree.len());
    for mut item in tree {
        if removed.is_none() && item.id == id {
            *removed = Some(item);
            continue;
        }
        if removed.is_none() {
            item.children = detach_item(std::mem::take(&mut item.children), id, removed);
        }
        kept.push(item);
    }
    kept
}

/// Reparents `item_id` as the last child of `target_id`. The move is rejected
/// (tree returned unchanged, `false`) when either id is missing, the ids are
/// equal, or the target sits inside the moving subtree, which would orphan
/// the whole branch.
pub fn move_item_under(tree: Vec<Item>, item_id: &str, target_id: &str) -> (Vec<Item>, bool) {
    if item_id == target_id {
        return (tree, false);
    }
    let Some(moving) = find_item(&tree, item_id) else {
        return (tree, false);
    };
    if find_item(&moving.children, target_id).is_some() {
        return (tree, false);
    }
    if find_item(&tree, target_id).is_none() {
        return (tree, false);
    }

    let (tree, removed) = remove_item(tree, item_id);
    let Some(removed) = removed else {
        return (tree, false);
    };
    let mut pending = Some(removed);
    let tree = append_child(tree, target_id, &mut pending);
    let moved = pending.is_none();
    (tree, moved)
}

fn append_child(tree: Vec<Item>, target_id: &str, pending: &mut Option<Item>) -> Vec<Item> {
    tree.into_iter()
        .map(|mut item| {
            if pending.is_none() {
                return item;
            }
            if item.id == target_id {
                if let Some(child) = pending.take() {
                    item.children.push(child);
                }
                return item;
            }
            item.children = append_child(std::mem::take(&mut item.children), target_id, pending);
            item
        })
        .collect()
}

/// Deep-copies a tree, assigning fresh ids to every item and note. Used when
/// duplicating a node so the copy never aliases the original's ids.
pub fn clone_with_new_ids(tree: &[Item]) -> Vec<Item> {
    tree.iter()
        .map(|item| Item {
            id: fresh_id("item"),
            title: item.title.clone(),
            notes: item
                .notes
                .iter()
                .map(|note| Note {
                    id: fresh_id("note"),
                    title: note.title.clone(),
                    content: note.content.clone(),
                })
                .collect(),
            children: clone_with_new_ids(&item.children),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, children: Vec<Item>) -> Item {
        Item {
            id: id.to_string(),
            title: format!("Item {id}"),
            notes: Vec::new(),
            children,
        }
    }

    fn count_occurrences(tree: &[Item], id: &str) -> usize {
        tree.iter()
            .map(|entry| usize::from(entry.id == id) + count_occurrences(&entry.children, id))
            .sum()
    }

    #[test]
    fn find_is_depth_first() {
        let tree = vec![item("a", vec![item("b", vec![item("c", vec![])])]), item("d", vec![])];
        assert_eq!(find_item(&tree, "c").map(|found| found.id.as_str()), Some("c"));
        assert_eq!(find_item(&tree, "d").map(|found| found.id.as_str()), Some("d"));
        assert!(find_item(&tree, "missing").is_none());
    }

    #[test]
    fn update_replaces_nested_match() {
        let tree = vec![item("a", vec![item("b", vec![])])];
        let (tree, found) = update_item(tree, "b", |mut entry| {
            entry.title = "renamed".to_string();
            entry
        });
        assert!(found, "existing item should be updated");
        assert_eq!(tree[0].children[0].title, "renamed");
    }

    #[test]
    fn update_miss_leaves_tree_unchanged() {
        let tree = vec![item("a", vec![])];
        let before = tree.clone();
        let (tree, found) = update_item(tree, "zzz", |entry| entry);
        assert!(!found);
        assert_eq!(tree, before);
    }

    #[test]
    fn remove_detaches_subtree_with_children() {
        let tree = vec![item("a", vec![item("b", vec![item("c", vec![])])])];
        let (tree, removed) = remove_item(tree, "b");
        let removed = removed.expect("item b should be removed");
        assert_eq!(removed.children[0].id, "c");
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn remove_miss_returns_none() {
        let tree = vec![item("a", vec![])];
        let (tree, removed) = remove_item(tree, "zzz");
        assert!(removed.is_none());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn move_appends_as_last_child() {
        let tree = vec![item("p", vec![item("existing", vec![])]), item("q", vec![])];
        let (tree, moved) = move_item_under(tree, "q", "p");
        assert!(moved);
        assert_eq!(tree.len(), 1);
        let children: Vec<&str> = tree[0].children.iter().map(|child| child.id.as_str()).collect();
        assert_eq!(children, vec!["existing", "q"]);
    }

    #[test]
    fn move_is_exclusive() {
        let tree = vec![item("p", vec![item("q", vec![])]), item("r", vec![])];
        let (tree, moved) = move_item_under(tree, "q", "r");
        assert!(moved);
        assert_eq!(count_occurrences(&tree, "q"), 1);
        assert!(tree[0].children.is_empty(), "q should leave its old parent");
        assert_eq!(tree[1].children[0].id, "q");
    }

    #[test]
    fn move_rejects_self_target() {
        let tree = vec![item("p", vec![])];
        let (tree, moved) = move_item_under(tree, "p", "p");
        assert!(!moved);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn move_rejects_descendant_target() {
        let tree = vec![item("p", vec![item("q", vec![item("r", vec![])])])];
        let before = tree.clone();
        let (tree, moved) = move_item_under(tree, "p", "r");
        assert!(!moved, "moving an item under its own descendant must fail");
        assert_eq!(tree, before);
    }

    #[test]
    fn move_rejects_missing_endpoints() {
        let tree = vec![item("p", vec![]), item("q", vec![])];
        let (tree, moved) = move_item_under(tree, "ghost", "p");
        assert!(!moved);
        let (tree, moved) = move_item_under(tree, "p", "ghost");
        assert!(!moved);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn clone_assigns_fresh_ids_everywhere() {
        let mut source = item("a", vec![item("b", vec![])]);
        source.notes.push(Note {
            id: "n1".to_string(),
            title: "note".to_string(),
            content: "body".to_string(),
        });
        let copy = clone_with_new_ids(std::slice::from_ref(&source));

        assert_eq!(copy.len(), 1);
        assert_ne!(copy[0].id, source.id);
        assert_eq!(copy[0].title, source.title);
        assert_ne!(copy[0].notes[0].id, source.notes[0].id);
        assert_eq!(copy[0].notes[0].content, "body");
        assert_ne!(copy[0].children[0].id, source.children[0].id);
        assert_eq!(copy[0].children[0].title, source.children[0].title);
    }

    #[test]
    fn fresh_ids_carry_prefix_and_differ() {
        let first = fresh_id("item");
        let second = fresh_id("item");
        assert!(first.starts_with("item-"));
        assert_eq!(first.len(), "item-".len() + 8);
        assert_ne!(first, second);
    }
}
