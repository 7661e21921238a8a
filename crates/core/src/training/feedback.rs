//! Move-sound classification for the feedback sink

use serde::{Deserialize, Serialize};

use crate::board::PlayedMove;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveSound {
    Move,
    Capture,
    Castle,
    Check,
    Promotion,
    Wrong,
}

/// Derives the sound from the move flags. A move that gives check sounds as
/// a check whatever else it does.
pub fn classify(played: &PlayedMove) -> MoveSound {
    if played.is_check {
        MoveSound::Check
    } else if played.is_promotion {
        MoveSound::Promotion
    } else if played.is_castle {
        MoveSound::Castle
    } else if played.is_capture {
        MoveSound::Capture
    } else {
        MoveSound::Move
    }
}
