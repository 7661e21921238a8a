//! PGN import and export

mod annotations;
mod export;
mod pgn;

pub use annotations::{format_shapes, parse_comment};
pub use export::export_pgn;
pub use pgn::{import_pgn, import_pgn_file};
