//! Opening repertoire move tree.
//!
//! Nodes live in an id-keyed arena and reference each other by [`NodeId`].
//! Every editing operation returns a new tree; nodes that the edit does not
//! touch are shared with the previous tree (`Arc::ptr_eq` holds for them), so
//! only the edited node and its parent's child list are copied.

mod lines;
mod node;
mod path;

pub use lines::{
    extract_all_lines, extract_lines, extract_lines_with_start_marker, shuffled_order, Line,
};
pub use node::{Brush, MoveNode, Nag, NodeId, Shape};
pub use path::Cursor;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveTree {
    nodes: HashMap<NodeId, Arc<MoveNode>>,
    roots: Vec<NodeId>,
}

impl MoveTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks a node up by id. `None` when it does not exist (any more).
    pub fn get(&self, id: NodeId) -> Option<&MoveNode> {
        self.nodes.get(&id).map(Arc::as_ref)
    }

    pub fn get_shared(&self, id: NodeId) -> Option<&Arc<MoveNode>> {
        self.nodes.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MoveNode> {
        self.nodes.values().map(Arc::as_ref)
    }

    /// Children of `parent`, or the root-level moves for `None`.
    pub fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            None => &self.roots,
            Some(id) => self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[]),
        }
    }

    /// The continuation shown as "the" next move: the main-line child if one
    /// is flagged, otherwise the first child.
    pub fn main_child(&self, parent: Option<NodeId>) -> Option<NodeId> {
        let children = self.children_of(parent);
        children
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|n| n.is_main_line))
            .or_else(|| children.first().copied())
    }

    pub fn find_child_by_uci(&self, parent: Option<NodeId>, uci: &str) -> Option<NodeId> {
        self.children_of(parent)
            .iter()
            .copied()
            .find(|id| self.get(*id).is_some_and(|n| n.uci == uci))
    }

    /// Ids from the first move down to `id` inclusive; empty when not found.
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.get(node_id) {
                Some(node) => {
                    path.push(node_id);
                    current = node.parent;
                }
                None => return Vec::new(),
            }
        }
        path.reverse();
        path
    }

    /// True when the node and every ancestor carry the main-line flag.
    /// The root position (`None`) is on the main line by definition.
    pub fn is_on_main_line(&self, id: Option<NodeId>) -> bool {
        let mut current = id;
        while let Some(node_id) = current {
            match self.get(node_id) {
                Some(node) if node.is_main_line => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// `id` plus all of its descendants.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub fn leaf_count(&self) -> usize {
        self.iter().filter(|n| n.is_leaf()).count()
    }

    /// Appends `node` below the position at `parent_path` (root when empty).
    pub fn add_move(&self, parent_path: &[NodeId], node: MoveNode) -> Result<MoveTree> {
        let parent = match parent_path.last() {
            None => None,
            Some(last) => match self.node_at_path(parent_path) {
                Some(parent) => Some(parent.id),
                None => return Err(Error::NodeNotFound(*last)),
            },
        };
        let mut next = self.clone();
        next.insert(parent, node);
        Ok(next)
    }

    /// Removes `id` and its subtree. Unknown ids leave the tree as it was.
    pub fn delete_node(&self, id: NodeId) -> MoveTree {
        let Some(node) = self.get(id) else {
            return self.clone();
        };
        let parent = node.parent;
        let mut next = self.clone();
        for removed in self.subtree(id) {
            next.nodes.remove(&removed);
        }
        match parent {
            None => next.roots.retain(|r| *r != id),
            Some(parent_id) => {
                if let Some(parent) = next.nodes.get_mut(&parent_id) {
                    Arc::make_mut(parent).children.retain(|c| *c != id);
                }
            }
        }
        next
    }

    /// Flags `id` as main line and clears the flag on its siblings.
    /// Only this sibling group changes; ancestors are left alone.
    pub fn promote_to_main_line(&self, id: NodeId) -> MoveTree {
        let Some(node) = self.get(id) else {
            return self.clone();
        };
        let siblings = self.children_of(node.parent).to_vec();
        let mut next = self.clone();
        for sibling in siblings {
            let wanted = sibling == id;
            if let Some(entry) = next.nodes.get_mut(&sibling) {
                if entry.is_main_line != wanted {
                    Arc::make_mut(entry).is_main_line = wanted;
                }
            }
        }
        next
    }

    pub fn update_comment(&self, id: NodeId, comment: Option<String>) -> MoveTree {
        let comment = comment.filter(|c| !c.trim().is_empty());
        self.update(id, |node| node.comment = comment)
    }

    pub fn update_nags(&self, id: NodeId, nags: BTreeSet<Nag>) -> MoveTree {
        self.update(id, |node| node.nags = nags)
    }

    pub fn update_shapes(&self, id: NodeId, shapes: Vec<Shape>) -> MoveTree {
        self.update(id, |node| node.shapes = shapes)
    }

    fn update(&self, id: NodeId, apply: impl FnOnce(&mut MoveNode)) -> MoveTree {
        let mut next = self.clone();
        if let Some(entry) = next.nodes.get_mut(&id) {
            apply(Arc::make_mut(entry));
        }
        next
    }

    /// In-place insertion used by [`MoveTree::add_move`] and bulk builders.
    pub(crate) fn insert(&mut self, parent: Option<NodeId>, mut node: MoveNode) -> NodeId {
        let id = node.id;
        node.parent = parent;
        node.children.clear();
        node.is_main_line = self.children_of(parent).is_empty() && self.is_on_main_line(parent);

        match parent {
            None => self.roots.push(id),
            Some(parent_id) => {
                if let Some(entry) = self.nodes.get_mut(&parent_id) {
                    Arc::make_mut(entry).children.push(id);
                }
            }
        }
        self.nodes.insert(id, Arc::new(node));
        id
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut MoveNode> {
        self.nodes.get_mut(&id).map(Arc::make_mut)
    }
}

/// Nested, plain-data form of a node used for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NodeData {
    id: NodeId,
    san: String,
    uci: String,
    fen: String,
    #[serde(default)]
    is_main_line: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    nags: BTreeSet<Nag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    shapes: Vec<Shape>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeData>,
}

impl MoveTree {
    fn to_data(&self) -> Vec<NodeData> {
        fn build(tree: &MoveTree, id: NodeId) -> Option<NodeData> {
            let node = tree.get(id)?;
            Some(NodeData {
                id: node.id,
                san: node.san.clone(),
                uci: node.uci.clone(),
                fen: node.fen.clone(),
                is_main_line: node.is_main_line,
                comment: node.comment.clone(),
                nags: node.nags.clone(),
                shapes: node.shapes.clone(),
                children: node
                    .children
                    .iter()
                    .filter_map(|child| build(tree, *child))
                    .collect(),
            })
        }

        self.roots.iter().filter_map(|id| build(self, *id)).collect()
    }

    fn from_data(roots: Vec<NodeData>) -> Self {
        fn load(tree: &mut MoveTree, parent: Option<NodeId>, data: NodeData) {
            let id = data.id;
            let node = MoveNode {
                id,
                san: data.san,
                uci: data.uci,
                fen: data.fen,
                parent,
                children: data.children.iter().map(|c| c.id).collect(),
                is_main_line: data.is_main_line,
                comment: data.comment,
                nags: data.nags,
                shapes: data.shapes,
            };
            tree.nodes.insert(id, Arc::new(node));
            for child in data.children {
                load(tree, Some(id), child);
            }
        }

        let mut tree = MoveTree::new();
        tree.roots = roots.iter().map(|r| r.id).collect();
        for root in roots {
            load(&mut tree, None, root);
        }
        tree
    }
}

impl Serialize for MoveTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_data().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MoveTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<NodeData>::deserialize(deserializer).map(MoveTree::from_data)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn node(san: &str, uci: &str) -> MoveNode {
        MoveNode::new(san, uci, format!("fen-after-{}", uci))
    }

    /// Adds `node` below `parent` and returns the new tree plus the node id.
    pub(crate) fn push(
        tree: &MoveTree,
        parent: Option<NodeId>,
        node: MoveNode,
    ) -> (MoveTree, NodeId) {
        let id = node.id;
        let path = parent.map(|p| tree.path_to(p)).unwrap_or_default();
        (tree.add_move(&path, node).unwrap(), id)
    }

    fn assert_main_line_invariant(tree: &MoveTree) {
        let mut groups: Vec<&[NodeId]> = vec![tree.roots()];
        groups.extend(tree.iter().map(|n| n.children.as_slice()));
        for group in groups {
            let flagged = group
                .iter()
                .filter(|id| tree.get(**id).unwrap().is_main_line)
                .count();
            assert!(flagged <= 1, "sibling group with {} main-line nodes", flagged);
        }
    }

    #[test]
    fn test_first_move_on_main_line_becomes_main_line() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (tree, c5) = push(&tree, Some(e4), node("c5", "c7c5"));

        assert!(tree.get(e4).unwrap().is_main_line);
        assert!(tree.get(e5).unwrap().is_main_line);
        assert!(!tree.get(c5).unwrap().is_main_line);
        assert_eq!(tree.get(e4).unwrap().children, vec![e5, c5]);
    }

    #[test]
    fn test_first_child_of_variation_is_not_main_line() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, _e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (tree, c5) = push(&tree, Some(e4), node("c5", "c7c5"));
        let (tree, nf3) = push(&tree, Some(c5), node("Nf3", "g1f3"));

        assert!(!tree.get(nf3).unwrap().is_main_line);
        assert!(!tree.is_on_main_line(Some(nf3)));
    }

    #[test]
    fn test_promote_variation() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (tree, nf3) = push(&tree, Some(e5), node("Nf3", "g1f3"));
        let (tree, nc3) = push(&tree, Some(e5), node("Nc3", "b1c3"));

        let promoted = tree.promote_to_main_line(nc3);
        assert!(promoted.get(nc3).unwrap().is_main_line);
        assert!(!promoted.get(nf3).unwrap().is_main_line);
        assert_eq!(promoted.get(e5).unwrap().children, vec![nf3, nc3]);
        assert_main_line_invariant(&promoted);

        // untouched nodes are shared with the previous tree
        assert!(Arc::ptr_eq(
            tree.get_shared(e4).unwrap(),
            promoted.get_shared(e4).unwrap()
        ));
    }

    #[test]
    fn test_add_move_shares_unrelated_nodes() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (next, _) = push(&tree, Some(e5), node("Nf3", "g1f3"));

        assert!(Arc::ptr_eq(tree.get_shared(e4).unwrap(), next.get_shared(e4).unwrap()));
        assert!(!Arc::ptr_eq(tree.get_shared(e5).unwrap(), next.get_shared(e5).unwrap()));
        assert!(tree.get(e5).unwrap().is_leaf());
    }

    #[test]
    fn test_add_move_with_stale_path_fails() {
        let tree = MoveTree::new();
        let missing = NodeId::new();
        let result = tree.add_move(&[missing], node("e4", "e2e4"));
        assert!(matches!(result, Err(Error::NodeNotFound(id)) if id == missing));
    }

    #[test]
    fn test_delete_removes_whole_subtree() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (tree, nf3) = push(&tree, Some(e5), node("Nf3", "g1f3"));
        let (tree, c5) = push(&tree, Some(e4), node("c5", "c7c5"));

        let pruned = tree.delete_node(e5);
        assert!(!pruned.contains(e5));
        assert!(!pruned.contains(nf3));
        assert!(pruned.contains(c5));
        assert_eq!(pruned.get(e4).unwrap().children, vec![c5]);
        assert_eq!(pruned.len(), 2);
        assert!(pruned.iter().all(|n| !pruned.path_to(n.id).contains(&e5)));
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let tree = MoveTree::new();
        let (tree, _) = push(&tree, None, node("e4", "e2e4"));
        assert_eq!(tree.delete_node(NodeId::new()), tree);
    }

    #[test]
    fn test_delete_root_move() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, d4) = push(&tree, None, node("d4", "d2d4"));
        let pruned = tree.delete_node(e4);
        assert_eq!(pruned.roots(), &[d4]);
    }

    #[test]
    fn test_main_line_invariant_over_edit_sequence() {
        let mut tree = MoveTree::new();
        let mut ids = Vec::new();
        let (t, root) = push(&tree, None, node("e4", "e2e4"));
        tree = t;
        ids.push(root);
        for (i, uci) in ["e7e5", "c7c5", "e7e6", "c7c6"].iter().enumerate() {
            let (t, id) = push(&tree, Some(root), node(uci, uci));
            tree = t;
            ids.push(id);
            if i % 2 == 1 {
                tree = tree.promote_to_main_line(id);
            }
            assert_main_line_invariant(&tree);
        }
        tree = tree.delete_node(ids[4]);
        assert_main_line_invariant(&tree);
        tree = tree.promote_to_main_line(ids[1]);
        assert_main_line_invariant(&tree);
        assert!(tree.get(ids[1]).unwrap().is_main_line);
    }

    #[test]
    fn test_update_comment_and_nags() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let tree = tree.update_comment(e4, Some("Best by test".to_string()));
        let tree = tree.update_nags(e4, [Nag::GOOD_MOVE].into_iter().collect());
        let node = tree.get(e4).unwrap();
        assert_eq!(node.comment.as_deref(), Some("Best by test"));
        assert!(node.nags.contains(&Nag::GOOD_MOVE));

        let cleared = tree.update_comment(e4, Some("   ".to_string()));
        assert_eq!(cleared.get(e4).unwrap().comment, None);
    }

    #[test]
    fn test_path_to_and_missing() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        assert_eq!(tree.path_to(e5), vec![e4, e5]);
        assert!(tree.path_to(NodeId::new()).is_empty());
    }

    #[test]
    fn test_serde_round_trip_keeps_structure() {
        let tree = MoveTree::new();
        let (tree, e4) = push(&tree, None, node("e4", "e2e4"));
        let (tree, e5) = push(&tree, Some(e4), node("e5", "e7e5"));
        let (tree, c5) = push(&tree, Some(e4), node("c5", "c7c5"));
        let tree = tree.update_comment(c5, Some("Sicilian".to_string()));

        let json = serde_json::to_string(&tree).unwrap();
        let back: MoveTree = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tree);
        assert_eq!(back.get(c5).unwrap().parent, Some(e4));
        assert_eq!(back.main_child(Some(e4)), Some(e5));
    }
}
