//! Board rendering.

use super::types::Square;
use std::io::Write;
use tracing::{instrument, warn};

/// Visual collaborator. Consumes only the position string and owns all
/// visual state.
pub trait BoardRenderer {
    /// Draws `position`, marking `highlights` as reachable squares.
    fn render(&mut self, position: &str, highlights: &[Square]);
}

/// Expands the piece-placement field of a FEN string into rows of piece
/// letters (`.` for empty), rank 8 first.
fn placement_rows(position: &str) -> Option<Vec<Vec<char>>> {
    let placement = position.split_whitespace().next()?;
    let rows: Vec<&str> = placement.split('/').collect();
    if rows.len() != 8 {
        return None;
    }

    rows.iter()
        .map(|row| {
            let mut cells: Vec<char> = Vec::with_capacity(8);
            for c in row.chars() {
                match c.to_digit(10) {
                    Some(n @ 1..=8) => cells.extend(std::iter::repeat_n('.', n as usize)),
                    Some(_) => return None,
                    None if "pnbrqkPNBRQK".contains(c) => cells.push(c),
                    None => return None,
                }
            }
            (cells.len() == 8).then_some(cells)
        })
        .collect()
}

/// Returns the FEN letter of the piece on `square`, if any.
#[instrument(skip(position), fields(square = %square))]
pub fn piece_at(position: &str, square: Square) -> Option<char> {
    let rows = placement_rows(position)?;
    let cell = rows[7 - square.rank() as usize][square.file() as usize];
    (cell != '.').then_some(cell)
}

/// Formats the piece-placement field of a FEN string as an 8x8 text board,
/// rank 8 at the top. Highlighted empty squares show `*`.
///
/// Returns `None` if the placement field is malformed.
#[instrument(skip(highlights))]
pub fn board_text(position: &str, highlights: &[Square]) -> Option<String> {
    let rows = placement_rows(position)?;

    let mut out = String::new();
    for (row_index, cells) in rows.iter().enumerate() {
        let rank = 7 - row_index as u8;
        out.push_str(&format!("{} ", rank + 1));
        for (file, cell) in cells.iter().enumerate() {
            let marked = Square::new(file as u8, rank)
                .map(|sq| highlights.contains(&sq))
                .unwrap_or(false);
            let glyph = if marked && *cell == '.' { '*' } else { *cell };
            out.push(' ');
            out.push(glyph);
        }
        out.push('\n');
    }
    out.push_str("   a b c d e f g h");
    Some(out)
}

/// Renders the board as text to any writer.
#[derive(Debug)]
pub struct TextRenderer<W> {
    out: W,
}

impl<W: Write> TextRenderer<W> {
    /// Creates a renderer writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consumes the renderer, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> BoardRenderer for TextRenderer<W> {
    #[instrument(skip(self, highlights))]
    fn render(&mut self, position: &str, highlights: &[Square]) {
        let Some(text) = board_text(position, highlights) else {
            warn!("Cannot draw malformed position");
            return;
        };
        if let Err(e) = writeln!(self.out, "{}", text).and_then(|_| self.out.flush()) {
            warn!(error = %e, "Failed to write board");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::chess::validator::STARTING_FEN;

    #[test]
    fn starting_board_has_black_on_top() {
        let text = board_text(STARTING_FEN, &[]).expect("valid placement");
        let first = text.lines().next().expect("rank 8");
        assert_eq!(first, "8  r n b q k b n r");
        assert!(text.contains("1  R N B Q K B N R"));
    }

    #[test]
    fn highlights_mark_empty_squares() {
        let targets = ["e3".parse().unwrap(), "e4".parse().unwrap()];
        let text = board_text(STARTING_FEN, &targets).expect("valid placement");
        assert!(text.contains("4  . . . . * . . ."));
        assert!(text.contains("3  . . . . * . . ."));
    }

    #[test]
    fn piece_lookup_reads_placement() {
        assert_eq!(piece_at(STARTING_FEN, "e1".parse().unwrap()), Some('K'));
        assert_eq!(piece_at(STARTING_FEN, "d8".parse().unwrap()), Some('q'));
        assert_eq!(piece_at(STARTING_FEN, "e4".parse().unwrap()), None);
    }

    #[test]
    fn malformed_placement_is_rejected() {
        assert!(board_text("8/8/8 w - - 0 1", &[]).is_none());
        assert!(board_text("9/8/8/8/8/8/8/8 w - - 0 1", &[]).is_none());
    }
}
