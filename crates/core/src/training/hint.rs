//! Progressive hints for the expected move

use serde::{Deserialize, Serialize};
use shakmaty::Square;

use crate::board::{square_serde, MoveAttempt};

/// How much of the expected move is revealed. Escalates one step per wrong
/// attempt on the same move and drops back to `None` on a correct one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintLevel {
    #[default]
    None,
    /// Highlight the piece to move.
    Piece,
    /// Highlight the destination square too.
    Destination,
    /// Draw the full move arrow.
    Arrow,
}

impl HintLevel {
    /// Next level, saturating at `cap`.
    pub fn escalate(self, cap: HintLevel) -> HintLevel {
        let next = match self {
            HintLevel::None => HintLevel::Piece,
            HintLevel::Piece => HintLevel::Destination,
            HintLevel::Destination | HintLevel::Arrow => HintLevel::Arrow,
        };
        next.min(cap).max(self.min(cap))
    }
}

/// What the board should reveal for the current hint level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hint {
    pub level: HintLevel,
    #[serde(default, with = "square_serde::option", skip_serializing_if = "Option::is_none")]
    pub from: Option<Square>,
    #[serde(default, with = "square_serde::option", skip_serializing_if = "Option::is_none")]
    pub to: Option<Square>,
    pub arrow: bool,
}

impl Hint {
    pub fn none() -> Self {
        Self {
            level: HintLevel::None,
            from: None,
            to: None,
            arrow: false,
        }
    }

    pub fn reveal(level: HintLevel, expected: &MoveAttempt) -> Self {
        Self {
            level,
            from: (level >= HintLevel::Piece).then_some(expected.from),
            to: (level >= HintLevel::Destination).then_some(expected.to),
            arrow: level >= HintLevel::Arrow,
        }
    }
}
