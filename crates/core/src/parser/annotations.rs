//! `[%cal ...]` / `[%csl ...]` shape commands embedded in PGN comments

use shakmaty::Square;

use crate::tree::{Brush, Shape};

/// Splits a comment into its free text and the shapes it draws.
/// Malformed entries are dropped.
pub fn parse_comment(comment: &str) -> (String, Vec<Shape>) {
    let mut text = String::new();
    let mut shapes = Vec::new();
    let mut rest = comment;

    while let Some(start) = rest.find("[%") {
        text.push_str(&rest[..start]);
        let Some(len) = rest[start..].find(']') else {
            text.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let command = &rest[start + 2..start + len];
        rest = &rest[start + len + 1..];

        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or_default();
        let args = parts.next().unwrap_or_default();
        match name {
            "csl" | "cal" => shapes.extend(args.split(',').filter_map(|s| parse_shape(s.trim()))),
            // clock, eval and other commands are not kept
            _ => {}
        }
    }
    text.push_str(rest);

    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (text, shapes)
}

fn parse_shape(entry: &str) -> Option<Shape> {
    let mut chars = entry.chars();
    let brush = Brush::from_letter(chars.next()?)?;
    let squares = chars.as_str();
    if !squares.is_ascii() {
        return None;
    }
    match squares.len() {
        2 => Some(Shape::square(squares.parse::<Square>().ok()?, brush)),
        4 => Some(Shape::arrow(
            squares[..2].parse::<Square>().ok()?,
            squares[2..].parse::<Square>().ok()?,
            brush,
        )),
        _ => None,
    }
}

/// Shape commands for a comment, squares first; empty without shapes.
pub fn format_shapes(shapes: &[Shape]) -> String {
    let squares: Vec<String> = shapes
        .iter()
        .filter(|s| s.dest.is_none())
        .map(|s| format!("{}{}", s.brush.letter(), s.orig))
        .collect();
    let arrows: Vec<String> = shapes
        .iter()
        .filter_map(|s| s.dest.map(|dest| format!("{}{}{}", s.brush.letter(), s.orig, dest)))
        .collect();

    let mut out = Vec::new();
    if !squares.is_empty() {
        out.push(format!("[%csl {}]", squares.join(",")));
    }
    if !arrows.is_empty() {
        out.push(format!("[%cal {}]", arrows.join(",")));
    }
    out.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_comment() {
        let (text, shapes) =
            parse_comment("Main idea [%csl Gd4,Rf7] pressure [%cal Gc4f7] [%clk 0:05:00]");
        assert_eq!(text, "Main idea pressure");
        assert_eq!(
            shapes,
            vec![
                Shape::square(Square::D4, Brush::Green),
                Shape::square(Square::F7, Brush::Red),
                Shape::arrow(Square::C4, Square::F7, Brush::Green),
            ]
        );
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let (text, shapes) = parse_comment("[%cal Xe2e4,Ge2,Bz9a1] [%csl");
        assert_eq!(text, "[%csl");
        assert_eq!(shapes, vec![Shape::square(Square::E2, Brush::Green)]);
    }

    #[test]
    fn test_format_shapes() {
        let shapes = vec![
            Shape::arrow(Square::E2, Square::E4, Brush::Blue),
            Shape::square(Square::D5, Brush::Yellow),
        ];
        assert_eq!(format_shapes(&shapes), "[%csl Yd5] [%cal Be2e4]");
        assert_eq!(format_shapes(&[]), "");
        let (_, back) = parse_comment(&format_shapes(&shapes));
        assert_eq!(back.len(), 2);
    }
}
