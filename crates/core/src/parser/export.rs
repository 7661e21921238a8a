//! PGN export of opening studies

use std::fmt::Write as _;

use super::annotations::format_shapes;
use crate::board::STANDARD_FEN;
use crate::study::OpeningStudy;
use crate::tree::{MoveNode, MoveTree, NodeId};

/// Renders the study as a single PGN game with nested variations. At each
/// position the main-line child is written first.
pub fn export_pgn(study: &OpeningStudy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[Event \"{}\"]", escape(&study.name));
    let _ = writeln!(out, "[Site \"?\"]");
    let _ = writeln!(out, "[Date \"{}\"]", study.created_at.format("%Y.%m.%d"));
    let _ = writeln!(out, "[White \"?\"]");
    let _ = writeln!(out, "[Black \"?\"]");
    let _ = writeln!(out, "[Result \"*\"]");
    if study.root_fen != STANDARD_FEN {
        let _ = writeln!(out, "[SetUp \"1\"]");
        let _ = writeln!(out, "[FEN \"{}\"]", study.root_fen);
    }
    out.push('\n');

    let mut tokens = Vec::new();
    if !study.description.trim().is_empty() {
        tokens.push(format!("{{ {} }}", study.description.trim()));
    }
    write_position(&study.moves, None, &study.root_fen, true, &mut tokens);
    tokens.push("*".to_string());

    out.push_str(&wrap(&tokens, 80));
    out.push('\n');
    out
}

/// Writes the continuation from the position after `parent`.
fn write_position(
    tree: &MoveTree,
    parent: Option<NodeId>,
    fen_before: &str,
    mut force_number: bool,
    tokens: &mut Vec<String>,
) {
    let mut parent = parent;
    let mut fen_before = fen_before.to_string();
    loop {
        let Some(main_id) = tree.main_child(parent) else {
            return;
        };
        let Some(main) = tree.get(main_id) else {
            return;
        };

        write_move(main, &fen_before, force_number, tokens);
        force_number = main.comment.is_some() || !main.shapes.is_empty();

        for sibling in tree.children_of(parent).iter().filter(|id| **id != main_id) {
            let Some(node) = tree.get(*sibling) else {
                continue;
            };
            tokens.push("(".to_string());
            write_move(node, &fen_before, true, tokens);
            let forced = node.comment.is_some() || !node.shapes.is_empty();
            write_position(tree, Some(node.id), &node.fen, forced, tokens);
            tokens.push(")".to_string());
            force_number = true;
        }

        parent = Some(main_id);
        fen_before = main.fen.clone();
    }
}

fn write_move(node: &MoveNode, fen_before: &str, force_number: bool, tokens: &mut Vec<String>) {
    let (number, white_to_move) = move_number(fen_before);
    if white_to_move {
        tokens.push(format!("{}.", number));
    } else if force_number {
        tokens.push(format!("{}...", number));
    }
    tokens.push(node.san.clone());
    tokens.extend(node.nags.iter().map(|nag| format!("${}", nag.0)));

    let shapes = format_shapes(&node.shapes);
    let comment = node.comment.as_deref().unwrap_or("").trim();
    let body = match (comment.is_empty(), shapes.is_empty()) {
        (true, true) => return,
        (false, true) => comment.to_string(),
        (true, false) => shapes,
        (false, false) => format!("{} {}", comment, shapes),
    };
    tokens.push(format!("{{ {} }}", body.replace('}', ")")));
}

/// Full-move number and side to move from a FEN's last fields.
fn move_number(fen: &str) -> (u32, bool) {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let white = fields.get(1).map_or(true, |side| *side != "b");
    let number = fields.get(5).and_then(|n| n.parse().ok()).unwrap_or(1);
    (number, white)
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn wrap(tokens: &[String], width: usize) -> String {
    let mut out = String::new();
    let mut line_len = 0;
    for token in tokens {
        let glue = match token.as_str() {
            ")" => "",
            _ if out.ends_with('(') => "",
            _ => " ",
        };
        if line_len > 0 && line_len + glue.len() + token.len() > width {
            out.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            out.push_str(glue);
            line_len += glue.len();
        }
        out.push_str(token);
        line_len += token.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{MoveAttempt, Side};
    use crate::parser::import_pgn;
    use crate::tree::{Brush, Nag, Shape};
    use shakmaty::Square;

    fn attempt(uci: &str) -> MoveAttempt {
        MoveAttempt::from_uci(uci).unwrap()
    }

    fn study() -> OpeningStudy {
        let mut study = OpeningStudy::new("Open \"Games\"", Side::White, None).unwrap();
        let e4 = study.play_move(&[], &attempt("e2e4")).unwrap();
        let e5 = study.play_move(&e4, &attempt("e7e5")).unwrap();
        let nf3 = study.play_move(&e5, &attempt("g1f3")).unwrap();
        study.play_move(&nf3, &attempt("b8c6")).unwrap();
        let c5 = study.play_move(&e4, &attempt("c7c5")).unwrap();
        study.set_comment(c5[1], Some("Sicilian".into())).unwrap();
        study
            .set_nags(nf3[2], [Nag::GOOD_MOVE].into_iter().collect())
            .unwrap();
        study
            .set_shapes(nf3[2], vec![Shape::arrow(Square::G1, Square::F3, Brush::Green)])
            .unwrap();
        study
    }

    #[test]
    fn test_movetext_with_variation() {
        let pgn = export_pgn(&study());
        assert!(pgn.starts_with("[Event \"Open \\\"Games\\\"\"]\n"));
        assert!(!pgn.contains("[FEN"));
        assert!(pgn.contains(
            "1. e4 e5 (1... c5 { Sicilian }) 2. Nf3 $1 { [%cal Gg1f3] } 2... Nc6 *"
        ));
    }

    #[test]
    fn test_promoted_variation_written_first() {
        let mut study = study();
        let c5 = study.moves.get(study.moves.roots()[0]).unwrap().children[1];
        study.promote_to_main_line(c5).unwrap();
        let pgn = export_pgn(&study);
        assert!(pgn.contains("1. e4 c5 { Sicilian } (1... e5 2. Nf3"));
    }

    #[test]
    fn test_custom_start_position_and_black_to_move() {
        let fen = "4k3/8/8/8/8/8/4P3/4K3 b - - 0 12";
        let mut study = OpeningStudy::new("Ending", Side::Black, Some(fen)).unwrap();
        let kd7 = study.play_move(&[], &attempt("e8d7")).unwrap();
        study.play_move(&kd7, &attempt("e2e4")).unwrap();
        let pgn = export_pgn(&study);
        assert!(pgn.contains("[FEN \"4k3/8/8/8/8/8/4P3/4K3 b - - 0 12\"]"));
        assert!(pgn.contains("12... Kd7 13. e4 *"));
    }

    #[test]
    fn test_export_then_import_keeps_tree_shape() {
        let original = study();
        let imported = import_pgn(&export_pgn(&original), Side::White).unwrap().remove(0);
        let sans = |s: &OpeningStudy| -> Vec<Vec<String>> {
            s.lines()
                .iter()
                .map(|l| l.sans().iter().map(|x| x.to_string()).collect())
                .collect()
        };
        assert_eq!(sans(&imported), sans(&original));
        assert_eq!(imported.moves.len(), original.moves.len());
    }
}
