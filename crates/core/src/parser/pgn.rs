//! PGN import into opening studies

use pgn_reader::{Nag as PgnNag, RawComment, RawTag, SanPlus, Skip, Visitor};
use shakmaty::Chess;
use std::fs;
use std::io::Cursor;
use std::ops::ControlFlow;
use std::path::Path;

use super::annotations::parse_comment;
use crate::board::{format_fen, parse_fen, play_move, Side, STANDARD_FEN};
use crate::error::{Error, Result};
use crate::study::OpeningStudy;
use crate::tree::{MoveNode, MoveTree, Nag, NodeId};

#[derive(Default)]
struct GameTags {
    event: Option<String>,
    white: Option<String>,
    black: Option<String>,
    fen: Option<String>,
}

/// A position reached while walking the movetext.
#[derive(Clone)]
struct Spot {
    node: Option<NodeId>,
    position: Chess,
}

struct GameMoves {
    tags: GameTags,
    root_fen: String,
    tree: MoveTree,
    current: Spot,
    /// Position before the last move, where a variation branches off.
    previous: Spot,
    stack: Vec<(Spot, Spot)>,
    /// Depth at which an unplayable move was met; input is ignored until
    /// that variation closes.
    dead_at: Option<usize>,
    description: Vec<String>,
}

impl GameMoves {
    fn is_dead(&self) -> bool {
        self.dead_at.is_some()
    }
}

struct StudyBuilder {
    color: Side,
}

impl Visitor for StudyBuilder {
    type Tags = GameTags;
    type Movetext = GameMoves;
    type Output = Result<OpeningStudy>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(GameTags::default())
    }

    fn tag(
        &mut self,
        tags: &mut Self::Tags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let name_str = String::from_utf8_lossy(name);
        let value_str = value.decode_utf8_lossy().trim().to_string();
        if value_str.is_empty() || value_str == "?" {
            return ControlFlow::Continue(());
        }

        match name_str.as_ref() {
            "Event" => tags.event = Some(value_str),
            "White" => tags.white = Some(value_str),
            "Black" => tags.black = Some(value_str),
            "FEN" => tags.fen = Some(value_str),
            _ => {}
        }

        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        let position = match tags.fen.as_deref() {
            Some(fen) => match parse_fen(fen) {
                Ok(position) => position,
                Err(e) => return ControlFlow::Break(Err(e)),
            },
            None => Chess::default(),
        };
        let root_fen = match tags.fen {
            Some(_) => format_fen(&position),
            None => STANDARD_FEN.to_string(),
        };
        let root = Spot {
            node: None,
            position,
        };

        ControlFlow::Continue(GameMoves {
            tags,
            root_fen,
            tree: MoveTree::new(),
            current: root.clone(),
            previous: root,
            stack: Vec::new(),
            dead_at: None,
            description: Vec::new(),
        })
    }

    fn san(&mut self, movetext: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        if movetext.is_dead() {
            return ControlFlow::Continue(());
        }

        let played = san
            .san
            .to_move(&movetext.current.position)
            .map_err(|e| Error::IllegalMove(format!("{}: {}", san, e)))
            .and_then(|m| play_move(&movetext.current.position, m));

        match played {
            Ok((played, position)) => {
                let parent = movetext.current.node;
                let id = match movetext.tree.find_child_by_uci(parent, &played.uci) {
                    Some(existing) => existing,
                    None => movetext
                        .tree
                        .insert(parent, MoveNode::new(played.san, played.uci, played.fen)),
                };
                movetext.previous = movetext.current.clone();
                movetext.current = Spot {
                    node: Some(id),
                    position,
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "unplayable move in PGN, dropping the rest of the line");
                movetext.dead_at = Some(movetext.stack.len());
            }
        }

        ControlFlow::Continue(())
    }

    fn nag(&mut self, movetext: &mut Self::Movetext, nag: PgnNag) -> ControlFlow<Self::Output> {
        if movetext.is_dead() {
            return ControlFlow::Continue(());
        }
        if let Some(node) = movetext.current.node.and_then(|id| movetext.tree.node_mut(id)) {
            node.nags.insert(Nag(nag.0));
        }
        ControlFlow::Continue(())
    }

    fn comment(
        &mut self,
        movetext: &mut Self::Movetext,
        comment: RawComment<'_>,
    ) -> ControlFlow<Self::Output> {
        if movetext.is_dead() {
            return ControlFlow::Continue(());
        }
        let raw = String::from_utf8_lossy(comment.as_bytes());
        let (text, shapes) = parse_comment(&raw);

        match movetext.current.node.and_then(|id| movetext.tree.node_mut(id)) {
            Some(node) => {
                if !text.is_empty() {
                    node.comment = Some(match node.comment.take() {
                        Some(existing) => format!("{} {}", existing, text),
                        None => text,
                    });
                }
                node.shapes.extend(shapes);
            }
            None if !text.is_empty() => movetext.description.push(text),
            None => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_variation(
        &mut self,
        movetext: &mut Self::Movetext,
    ) -> ControlFlow<Self::Output, Skip> {
        if movetext.is_dead() {
            return ControlFlow::Continue(Skip(true));
        }
        movetext
            .stack
            .push((movetext.current.clone(), movetext.previous.clone()));
        movetext.current = movetext.previous.clone();
        ControlFlow::Continue(Skip(false))
    }

    fn end_variation(&mut self, movetext: &mut Self::Movetext) -> ControlFlow<Self::Output> {
        if let Some((current, previous)) = movetext.stack.pop() {
            movetext.current = current;
            movetext.previous = previous;
            if movetext.dead_at.is_some_and(|depth| depth > movetext.stack.len()) {
                movetext.dead_at = None;
            }
        }
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, movetext: Self::Movetext) -> Self::Output {
        let tags = movetext.tags;
        let name = tags
            .event
            .or_else(|| match (tags.white, tags.black) {
                (Some(white), Some(black)) => Some(format!("{} - {}", white, black)),
                _ => None,
            })
            .unwrap_or_else(|| "Imported study".to_string());

        let mut study = OpeningStudy::new(name, self.color, Some(&movetext.root_fen))?;
        study.description = movetext.description.join(" ");
        study.moves = movetext.tree;
        Ok(study)
    }
}

pub fn import_pgn_file<P: AsRef<Path>>(path: P, color: Side) -> Result<Vec<OpeningStudy>> {
    let contents = fs::read_to_string(path)?;
    import_pgn(&contents, color)
}

/// One study per game. Games that fail to import are skipped; the call
/// fails only when none succeeds.
pub fn import_pgn(pgn: &str, color: Side) -> Result<Vec<OpeningStudy>> {
    let mut builder = StudyBuilder { color };
    let mut studies = Vec::new();
    let mut first_error = None;

    let cursor = Cursor::new(pgn.as_bytes());
    let mut reader = pgn_reader::Reader::new(cursor);

    loop {
        match reader.read_game(&mut builder) {
            Ok(Some(Ok(study))) => studies.push(study),
            Ok(Some(Err(e))) => {
                tracing::warn!(error = %e, "skipping PGN game");
                first_error.get_or_insert(e);
            }
            Ok(None) => break,
            Err(e) => return Err(Error::Pgn(e.to_string())),
        }
    }

    if studies.is_empty() {
        return Err(first_error.unwrap_or_else(|| Error::Pgn("no valid games found".to_string())));
    }
    tracing::info!(count = studies.len(), "imported PGN");
    Ok(studies)
}
