//! Error types for repertoire-core

use thiserror::Error;

use crate::tree::NodeId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid position: {0}")]
    Fen(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("PGN parsing error: {0}")]
    Pgn(String),
}

pub type Result<T> = std::result::Result<T, Error>;
