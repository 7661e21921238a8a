//! Path addressing.
//!
//! A path is the sequence of node ids from the first move down to a target
//! node; the empty path is the starting position. Paths can go stale when the
//! tree is edited, so lookups return `None` and [`Cursor::revalidate`] falls
//! back to the closest ancestor that still exists.

use serde::{Deserialize, Serialize};
use shakmaty::Square;

use super::{MoveNode, MoveTree, NodeId};
use crate::board::BoardState;
use crate::error::Result;

impl MoveTree {
    /// Follows `path` segment by segment; `None` if any segment does not
    /// resolve to a child of the previous one. The empty path has no node.
    pub fn node_at_path(&self, path: &[NodeId]) -> Option<&MoveNode> {
        let mut parent = None;
        let mut found = None;
        for id in path {
            if !self.children_of(parent).contains(id) {
                return None;
            }
            found = self.get(*id);
            parent = Some(*id);
        }
        found
    }

    /// Longest prefix of `path` that still resolves.
    pub fn valid_prefix(&self, path: &[NodeId]) -> Vec<NodeId> {
        let mut parent = None;
        let mut valid = Vec::new();
        for id in path {
            if !self.children_of(parent).contains(id) {
                break;
            }
            valid.push(*id);
            parent = Some(*id);
        }
        valid
    }

    /// FEN at the end of `path`, or `root_fen` for the starting position.
    pub fn fen_at<'a>(&'a self, path: &[NodeId], root_fen: &'a str) -> Option<&'a str> {
        if path.is_empty() {
            return Some(root_fen);
        }
        self.node_at_path(path).map(|n| n.fen.as_str())
    }
}

/// The currently selected tree position of an editor or viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    path: Vec<NodeId>,
}

impl Cursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(path: Vec<NodeId>) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &[NodeId] {
        &self.path
    }

    pub fn is_at_start(&self) -> bool {
        self.path.is_empty()
    }

    /// `None` at the starting position or when the path went stale.
    pub fn current<'a>(&self, tree: &'a MoveTree) -> Option<&'a MoveNode> {
        tree.node_at_path(&self.path)
    }

    pub fn go_to(&mut self, tree: &MoveTree, id: NodeId) -> bool {
        let path = tree.path_to(id);
        if path.is_empty() {
            return false;
        }
        self.path = path;
        true
    }

    pub fn forward(&mut self, tree: &MoveTree) -> bool {
        match tree.main_child(self.path.last().copied()) {
            Some(child) => {
                self.path.push(child);
                true
            }
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        self.path.pop().is_some()
    }

    pub fn to_start(&mut self) {
        self.path.clear();
    }

    pub fn to_end(&mut self, tree: &MoveTree) {
        while self.forward(tree) {}
    }

    /// Trims a stale path back to its longest valid prefix.
    /// Returns `true` when anything was trimmed.
    pub fn revalidate(&mut self, tree: &MoveTree) -> bool {
        let valid = tree.valid_prefix(&self.path);
        let stale = valid.len() != self.path.len();
        if stale {
            tracing::debug!(
                dropped = self.path.len() - valid.len(),
                "cursor path went stale, falling back to ancestor"
            );
            self.path = valid;
        }
        stale
    }

    pub fn fen<'a>(&self, tree: &'a MoveTree, root_fen: &'a str) -> &'a str {
        tree.fen_at(&self.path, root_fen).unwrap_or(root_fen)
    }

    /// Squares of the move that led to the current position.
    pub fn last_move(&self, tree: &MoveTree) -> Option<(Square, Square)> {
        self.current(tree).and_then(MoveNode::squares)
    }

    /// Board collaborator positioned at the cursor, for check flags and
    /// legal-destination queries.
    pub fn board<B: BoardState>(&self, tree: &MoveTree, root_fen: &str) -> Result<B> {
        B::from_fen(self.fen(tree, root_fen))
    }
}
