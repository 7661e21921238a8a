//! Flattening the tree into drillable lines

use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;

use super::{MoveNode, MoveTree, NodeId};

/// One maximal sequence of moves to rehearse, played from `start_fen`.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub moves: Vec<Arc<MoveNode>>,
    pub start_fen: String,
    /// The fixed prefix leading up to a practice start marker.
    pub is_setup_line: bool,
}

impl Line {
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&MoveNode> {
        self.moves.get(index).map(Arc::as_ref)
    }

    pub fn ucis(&self) -> Vec<&str> {
        self.moves.iter().map(|m| m.uci.as_str()).collect()
    }

    pub fn sans(&self) -> Vec<&str> {
        self.moves.iter().map(|m| m.san.as_str()).collect()
    }

    /// Id of the last move, which identifies the line within its tree.
    pub fn leaf(&self) -> Option<NodeId> {
        self.moves.last().map(|m| m.id)
    }
}

/// Every root-to-leaf path, depth first with children in stored order, so
/// index 0 is the line through the first-played moves.
pub fn extract_all_lines(tree: &MoveTree, root_fen: &str) -> Vec<Line> {
    collect_from(tree, tree.roots(), Vec::new())
        .into_iter()
        .map(|moves| Line {
            moves,
            start_fen: root_fen.to_string(),
            is_setup_line: false,
        })
        .collect()
}

/// The setup line up to `entry`, followed by one line per path from the
/// entry's children to a leaf. Unknown entries yield no lines.
pub fn extract_lines_with_start_marker(
    tree: &MoveTree,
    root_fen: &str,
    entry: NodeId,
) -> Vec<Line> {
    let Some(entry_node) = tree.get_shared(entry) else {
        return Vec::new();
    };
    let setup: Vec<Arc<MoveNode>> = tree
        .path_to(entry)
        .into_iter()
        .filter_map(|id| tree.get_shared(id).cloned())
        .collect();

    let mut lines = vec![Line {
        moves: setup,
        start_fen: root_fen.to_string(),
        is_setup_line: true,
    }];
    lines.extend(
        collect_from(tree, &entry_node.children, Vec::new())
            .into_iter()
            .map(|moves| Line {
                moves,
                start_fen: entry_node.fen.clone(),
                is_setup_line: false,
            }),
    );
    lines
}

/// Lines for practice: split at `entry` when it names an existing node,
/// all lines otherwise.
pub fn extract_lines(tree: &MoveTree, root_fen: &str, entry: Option<NodeId>) -> Vec<Line> {
    match entry {
        Some(id) if tree.contains(id) => extract_lines_with_start_marker(tree, root_fen, id),
        Some(id) => {
            tracing::debug!(%id, "practice start marker not in tree, using all lines");
            extract_all_lines(tree, root_fen)
        }
        None => extract_all_lines(tree, root_fen),
    }
}

fn collect_from(
    tree: &MoveTree,
    children: &[NodeId],
    prefix: Vec<Arc<MoveNode>>,
) -> Vec<Vec<Arc<MoveNode>>> {
    let mut lines = Vec::new();
    let mut stack: Vec<(Vec<Arc<MoveNode>>, NodeId)> = children
        .iter()
        .rev()
        .map(|id| (prefix.clone(), *id))
        .collect();

    while let Some((mut path, id)) = stack.pop() {
        let Some(node) = tree.get_shared(id) else {
            continue;
        };
        path.push(Arc::clone(node));
        if node.is_leaf() {
            lines.push(path);
        } else {
            for child in node.children.iter().rev() {
                stack.push((path.clone(), *child));
            }
        }
    }
    lines
}

/// Fisher-Yates permutation of `0..len`.
pub fn shuffled_order<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order
}
