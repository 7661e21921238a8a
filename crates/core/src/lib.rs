//! Opening Repertoire Core Library
//!
//! Move-tree model, line extraction and practice state machines for
//! building and drilling chess opening repertoires.

pub mod board;
pub mod config;
pub mod error;
pub mod parser;
pub mod storage;
pub mod study;
pub mod training;
pub mod tree;

pub use board::{BoardState, MoveAttempt, PlayedMove, ShakmatyBoard, Side, STANDARD_FEN};
pub use config::PracticeConfig;
pub use error::{Error, Result};
pub use parser::{export_pgn, import_pgn, import_pgn_file};
pub use storage::{Database, KeyValueStore, MemoryStore, RepertoireStore};
pub use study::OpeningStudy;
pub use training::{
    DrillStats, HintLevel, MistakeLedger, MistakeRecord, PracticeEvent, PracticeProgress,
    PracticeSession, PracticeState, ReviewSession, Scheduled, SpeedDrill, Transition,
};
pub use tree::{Cursor, Line, MoveNode, MoveTree, Nag, NodeId, Shape};
