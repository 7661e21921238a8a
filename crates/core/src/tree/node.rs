//! Move nodes and their annotations

use serde::{Deserialize, Serialize};
use shakmaty::Square;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::board::{square_serde, MoveAttempt};

/// Opaque, stable identifier of a node; the addressing unit of paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Numeric annotation glyph as used in PGN (`$1` = `!`, `$4` = `??`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nag(pub u8);

impl Nag {
    pub const GOOD_MOVE: Nag = Nag(1);
    pub const MISTAKE: Nag = Nag(2);
    pub const BRILLIANT_MOVE: Nag = Nag(3);
    pub const BLUNDER: Nag = Nag(4);
    pub const SPECULATIVE_MOVE: Nag = Nag(5);
    pub const DUBIOUS_MOVE: Nag = Nag(6);

    pub fn symbol(self) -> Option<&'static str> {
        match self.0 {
            1 => Some("!"),
            2 => Some("?"),
            3 => Some("!!"),
            4 => Some("??"),
            5 => Some("!?"),
            6 => Some("?!"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Brush {
    Green,
    Red,
    Yellow,
    Blue,
}

impl Brush {
    pub fn letter(self) -> char {
        match self {
            Brush::Green => 'G',
            Brush::Red => 'R',
            Brush::Yellow => 'Y',
            Brush::Blue => 'B',
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'G' => Some(Brush::Green),
            'R' => Some(Brush::Red),
            'Y' => Some(Brush::Yellow),
            'B' => Some(Brush::Blue),
            _ => None,
        }
    }
}

/// Board overlay: a highlighted square, or an arrow when `dest` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    #[serde(with = "square_serde")]
    pub orig: Square,
    #[serde(default, with = "square_serde::option", skip_serializing_if = "Option::is_none")]
    pub dest: Option<Square>,
    pub brush: Brush,
}

impl Shape {
    pub fn square(orig: Square, brush: Brush) -> Self {
        Self {
            orig,
            dest: None,
            brush,
        }
    }

    pub fn arrow(orig: Square, dest: Square, brush: Brush) -> Self {
        Self {
            orig,
            dest: Some(dest),
            brush,
        }
    }
}

/// One ply of the repertoire.
///
/// `parent` and `children` hold ids into the owning [`MoveTree`]; the first
/// child is the one played first from this position.
///
/// [`MoveTree`]: super::MoveTree
#[derive(Debug, Clone, PartialEq)]
pub struct MoveNode {
    pub id: NodeId,
    pub san: String,
    pub uci: String,
    /// Position after this move.
    pub fen: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub is_main_line: bool,
    pub comment: Option<String>,
    pub nags: BTreeSet<Nag>,
    pub shapes: Vec<Shape>,
}

impl MoveNode {
    /// A detached node with a fresh id, ready to be added to a tree.
    pub fn new(san: impl Into<String>, uci: impl Into<String>, fen: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            san: san.into(),
            uci: uci.into(),
            fen: fen.into(),
            parent: None,
            children: Vec::new(),
            is_main_line: false,
            comment: None,
            nags: BTreeSet::new(),
            shapes: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn attempt(&self) -> Option<MoveAttempt> {
        MoveAttempt::from_uci(&self.uci)
    }

    /// Origin and destination squares, for last-move highlighting.
    pub fn squares(&self) -> Option<(Square, Square)> {
        self.attempt().map(|a| (a.from, a.to))
    }
}
