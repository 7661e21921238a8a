//! Opening study aggregate and editor operations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::board::{BoardState, MoveAttempt, ShakmatyBoard, Side, STANDARD_FEN};
use crate::error::{Error, Result};
use crate::tree::{extract_lines, Line, MoveNode, MoveTree, Nag, NodeId, Shape};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningStudy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The side the user rehearses.
    pub color: Side,
    pub root_fen: String,
    pub moves: MoveTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_start_node_id: Option<NodeId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OpeningStudy {
    /// A new, empty study. `root_fen` defaults to the standard position.
    pub fn new(name: impl Into<String>, color: Side, root_fen: Option<&str>) -> Result<Self> {
        let now = Utc::now();
        let study = Self {
            id: Uuid::new_v4().to_string(),
            name: name.into().trim().to_string(),
            description: String::new(),
            color,
            root_fen: root_fen.unwrap_or(STANDARD_FEN).trim().to_string(),
            moves: MoveTree::new(),
            practice_start_node_id: None,
            created_at: now,
            updated_at: now,
        };
        study.validate()?;
        Ok(study)
    }

    /// Checks the fields required before a save.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("study name is required".to_string()));
        }
        ShakmatyBoard::from_fen(&self.root_fen)?;
        if let Some(marker) = self.practice_start_node_id {
            if !self.moves.contains(marker) {
                return Err(Error::NodeNotFound(marker));
            }
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Plays `attempt` from the position at `path` and returns the path of
    /// the resulting node. An existing child with the same move is reused.
    pub fn play_move(&mut self, path: &[NodeId], attempt: &MoveAttempt) -> Result<Vec<NodeId>> {
        let fen = match path.last() {
            None => self.root_fen.clone(),
            Some(last) => self
                .moves
                .node_at_path(path)
                .map(|n| n.fen.clone())
                .ok_or(Error::NodeNotFound(*last))?,
        };

        let parent = path.last().copied();
        let mut next_path = path.to_vec();
        if let Some(existing) = self.moves.find_child_by_uci(parent, &attempt.uci()) {
            next_path.push(existing);
            return Ok(next_path);
        }

        let mut board = ShakmatyBoard::from_fen(&fen)?;
        let played = board.play(attempt)?;
        // promotions and castling may be spelled differently by the caller
        if let Some(existing) = self.moves.find_child_by_uci(parent, &played.uci) {
            next_path.push(existing);
            return Ok(next_path);
        }

        let node = MoveNode::new(played.san, played.uci, played.fen);
        let id = node.id;
        self.moves = self.moves.add_move(path, node)?;
        self.touch();
        next_path.push(id);
        Ok(next_path)
    }

    /// Removes `id` with its subtree, dropping the practice start marker if
    /// it was inside.
    pub fn delete_node(&mut self, id: NodeId) {
        if !self.moves.contains(id) {
            return;
        }
        if let Some(marker) = self.practice_start_node_id {
            if self.moves.subtree(id).contains(&marker) {
                self.practice_start_node_id = None;
            }
        }
        self.moves = self.moves.delete_node(id);
        self.touch();
    }

    pub fn promote_to_main_line(&mut self, id: NodeId) -> Result<()> {
        self.require(id)?;
        self.moves = self.moves.promote_to_main_line(id);
        self.touch();
        Ok(())
    }

    pub fn set_comment(&mut self, id: NodeId, comment: Option<String>) -> Result<()> {
        self.require(id)?;
        self.moves = self.moves.update_comment(id, comment);
        self.touch();
        Ok(())
    }

    pub fn set_nags(&mut self, id: NodeId, nags: BTreeSet<Nag>) -> Result<()> {
        self.require(id)?;
        self.moves = self.moves.update_nags(id, nags);
        self.touch();
        Ok(())
    }

    pub fn set_shapes(&mut self, id: NodeId, shapes: Vec<Shape>) -> Result<()> {
        self.require(id)?;
        self.moves = self.moves.update_shapes(id, shapes);
        self.touch();
        Ok(())
    }

    pub fn set_practice_start(&mut self, marker: Option<NodeId>) -> Result<()> {
        if let Some(id) = marker {
            self.require(id)?;
        }
        self.practice_start_node_id = marker;
        self.touch();
        Ok(())
    }

    /// Lines to practice, honouring the practice start marker.
    pub fn lines(&self) -> Vec<Line> {
        extract_lines(&self.moves, &self.root_fen, self.practice_start_node_id)
    }

    fn require(&self, id: NodeId) -> Result<()> {
        if self.moves.contains(id) {
            Ok(())
        } else {
            Err(Error::NodeNotFound(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(uci: &str) -> MoveAttempt {
        MoveAttempt::from_uci(uci).unwrap()
    }

    #[test]
    fn test_new_requires_name() {
        assert!(matches!(
            OpeningStudy::new("  ", Side::White, None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            OpeningStudy::new("Bad", Side::White, Some("garbage")),
            Err(Error::Fen(_))
        ));
        let study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        assert_eq!(study.root_fen, STANDARD_FEN);
        assert!(study.moves.is_empty());
    }

    #[test]
    fn test_play_move_builds_tree() {
        let mut study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        let path = study.play_move(&[], &attempt("e2e4")).unwrap();
        let path = study.play_move(&path, &attempt("e7e5")).unwrap();
        assert_eq!(path.len(), 2);

        let node = study.moves.node_at_path(&path).unwrap();
        assert_eq!(node.san, "e5");
        assert!(node.is_main_line);
        assert!(node.fen.starts_with("rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w"));
    }

    #[test]
    fn test_play_existing_move_navigates() {
        let mut study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        let first = study.play_move(&[], &attempt("e2e4")).unwrap();
        let again = study.play_move(&[], &attempt("e2e4")).unwrap();
        assert_eq!(first, again);
        assert_eq!(study.moves.len(), 1);
    }

    #[test]
    fn test_illegal_move_leaves_study_unchanged() {
        let mut study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        let before = study.clone();
        assert!(matches!(
            study.play_move(&[], &attempt("e2e5")),
            Err(Error::IllegalMove(_))
        ));
        assert_eq!(study, before);
    }

    #[test]
    fn test_delete_clears_marker_inside_subtree() {
        let mut study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        let path = study.play_move(&[], &attempt("e2e4")).unwrap();
        let path = study.play_move(&path, &attempt("e7e5")).unwrap();
        study.set_practice_start(Some(path[1])).unwrap();

        study.delete_node(path[0]);
        assert_eq!(study.practice_start_node_id, None);
        assert!(study.moves.is_empty());
        assert!(study.lines().is_empty());
    }

    #[test]
    fn test_marker_must_exist() {
        let mut study = OpeningStudy::new("Italian", Side::White, None).unwrap();
        assert!(matches!(
            study.set_practice_start(Some(NodeId::new())),
            Err(Error::NodeNotFound(_))
        ));
    }

    #[test]
    fn test_lines_with_marker() {
        let mut study = OpeningStudy::new("Open Games", Side::White, None).unwrap();
        let e4 = study.play_move(&[], &attempt("e2e4")).unwrap();
        let e5 = study.play_move(&e4, &attempt("e7e5")).unwrap();
        study.play_move(&e5, &attempt("g1f3")).unwrap();
        study.play_move(&e5, &attempt("b1c3")).unwrap();
        study.set_practice_start(Some(e5[1])).unwrap();

        let lines = study.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].is_setup_line);
        assert_eq!(lines[1].sans(), vec!["Nf3"]);
        assert_eq!(lines[2].sans(), vec!["Nc3"]);
    }

    #[test]
    fn test_json_round_trip() {
        let mut study = OpeningStudy::new("Italian", Side::Black, None).unwrap();
        let path = study.play_move(&[], &attempt("e2e4")).unwrap();
        study.set_comment(path[0], Some("King's pawn".into())).unwrap();
        let json = serde_json::to_string(&study).unwrap();
        let back: OpeningStudy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, study);
    }
}
