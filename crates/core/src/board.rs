//! Board-state oracle used by the editor and the practice modes.
//!
//! The rest of the crate never reasons about chess rules directly; it asks a
//! [`BoardState`] whether a move is legal, plays it, and reads back SAN, UCI
//! and the resulting FEN.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};

use crate::error::{Error, Result};

/// FEN of the standard initial position.
pub const STANDARD_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// The side a study is rehearsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

/// A move as entered by the user: origin, destination and optional promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveAttempt {
    pub from: Square,
    pub to: Square,
    pub promotion: Option<Role>,
}

impl MoveAttempt {
    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, role: Role) -> Self {
        self.promotion = Some(role);
        self
    }

    /// Parses `e2e4` / `e7e8q` style notation.
    pub fn from_uci(uci: &str) -> Option<Self> {
        match uci.trim().parse::<UciMove>().ok()? {
            UciMove::Normal {
                from,
                to,
                promotion,
            } => Some(Self {
                from,
                to,
                promotion,
            }),
            _ => None,
        }
    }

    /// The comparison key used for move validation.
    pub fn uci(&self) -> String {
        match self.promotion {
            Some(role) => format!("{}{}{}", self.from, self.to, role.char()),
            None => format!("{}{}", self.from, self.to),
        }
    }

    fn to_uci_move(self) -> UciMove {
        UciMove::Normal {
            from: self.from,
            to: self.to,
            promotion: self.promotion,
        }
    }
}

/// Everything the caller learns from a successfully applied move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedMove {
    pub san: String,
    pub uci: String,
    /// Position after the move.
    pub fen: String,
    #[serde(with = "square_serde")]
    pub from: Square,
    #[serde(with = "square_serde")]
    pub to: Square,
    pub is_capture: bool,
    pub is_castle: bool,
    pub is_promotion: bool,
    pub is_check: bool,
    pub is_checkmate: bool,
}

/// Rules oracle contract.
pub trait BoardState: Sized {
    fn from_fen(fen: &str) -> Result<Self>;
    fn set_fen(&mut self, fen: &str) -> Result<()>;
    fn fen(&self) -> String;
    fn turn(&self) -> Side;
    fn is_check(&self) -> bool;
    fn is_checkmate(&self) -> bool;
    fn is_legal(&self, attempt: &MoveAttempt) -> bool;
    /// Applies a legal move. An illegal attempt leaves the position untouched.
    fn play(&mut self, attempt: &MoveAttempt) -> Result<PlayedMove>;
    fn legal_destinations(&self, from: Square) -> Vec<Square>;
}

/// [`BoardState`] backed by shakmaty's standard chess rules.
#[derive(Debug, Clone, Default)]
pub struct ShakmatyBoard {
    position: Chess,
}

impl ShakmatyBoard {
    pub fn position(&self) -> &Chess {
        &self.position
    }

    /// Legal destinations for every origin square that has any.
    pub fn all_destinations(&self) -> Vec<(Square, Vec<Square>)> {
        Square::ALL
            .into_iter()
            .map(|from| (from, self.legal_destinations(from)))
            .filter(|(_, dests)| !dests.is_empty())
            .collect()
    }
}

impl BoardState for ShakmatyBoard {
    fn from_fen(fen: &str) -> Result<Self> {
        Ok(Self {
            position: parse_fen(fen)?,
        })
    }

    fn set_fen(&mut self, fen: &str) -> Result<()> {
        self.position = parse_fen(fen)?;
        Ok(())
    }

    fn fen(&self) -> String {
        format_fen(&self.position)
    }

    fn turn(&self) -> Side {
        self.position.turn().into()
    }

    fn is_check(&self) -> bool {
        self.position.is_check()
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }

    fn is_legal(&self, attempt: &MoveAttempt) -> bool {
        attempt.to_uci_move().to_move(&self.position).is_ok()
    }

    fn play(&mut self, attempt: &MoveAttempt) -> Result<PlayedMove> {
        let m = attempt
            .to_uci_move()
            .to_move(&self.position)
            .map_err(|_| Error::IllegalMove(attempt.uci()))?;
        let (played, next) = play_move(&self.position, m)?;
        self.position = next;
        Ok(played)
    }

    fn legal_destinations(&self, from: Square) -> Vec<Square> {
        let mut squares: Vec<Square> = self
            .position
            .legal_moves()
            .iter()
            .filter_map(|m| match m.clone().to_uci(CastlingMode::Standard) {
                UciMove::Normal { from: origin, to, .. } if origin == from => Some(to),
                _ => None,
            })
            .collect();
        squares.sort();
        squares.dedup();
        squares
    }
}

pub(crate) fn parse_fen(fen: &str) -> Result<Chess> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| Error::Fen(format!("{}: {}", fen, e)))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| Error::Fen(format!("{}: {}", fen, e)))
}

pub(crate) fn format_fen(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

/// Plays an already-legal move and describes it.
pub(crate) fn play_move(position: &Chess, m: Move) -> Result<(PlayedMove, Chess)> {
    let uci = m.clone().to_uci(CastlingMode::Standard);
    let (from, to) = match uci {
        UciMove::Normal { from, to, .. } => (from, to),
        _ => return Err(Error::IllegalMove(uci.to_string())),
    };
    let san = San::from_move(position, m.clone());
    let is_capture = m.is_capture();
    let is_castle = m.is_castle();
    let is_promotion = m.is_promotion();

    let next = position
        .clone()
        .play(m)
        .map_err(|e| Error::IllegalMove(e.to_string()))?;

    let is_checkmate = next.is_checkmate();
    let is_check = next.is_check();
    let suffix = if is_checkmate {
        "#"
    } else if is_check {
        "+"
    } else {
        ""
    };

    let played = PlayedMove {
        san: format!("{}{}", san, suffix),
        uci: uci.to_string(),
        fen: format_fen(&next),
        from,
        to,
        is_capture,
        is_castle,
        is_promotion,
        is_check,
        is_checkmate,
    };
    Ok((played, next))
}

/// Serde adapters for shakmaty squares, written as `e4`.
pub(crate) mod square_serde {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use shakmaty::Square;

    pub fn serialize<S: Serializer>(square: &Square, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(square)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Square, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(|_| D::Error::custom(format!("invalid square: {}", text)))
    }

    pub mod option {
        use serde::de::Error as _;
        use serde::{Deserialize, Deserializer, Serializer};
        use shakmaty::Square;

        pub fn serialize<S: Serializer>(
            square: &Option<Square>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match square {
                Some(square) => serializer.collect_str(square),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Square>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => text
                    .parse()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid square: {}", text))),
                None => Ok(None),
            }
        }
    }
}
