//! Source position tracking for lexer output.
//!
//! The lexer hands every consumed span to a [`PositionTracker`], which turns
//! it into a [`Token`] carrying zero-based (row, col) start/end coordinates.
//! Rows and columns advance by counting newline-delimited segments within the
//! consumed content: every newline crossed bumps the row and resets the column
//! to 0, and the final segment's length accumulates onto the column. `\r\n`,
//! `\r` and `\n` each count as a single newline.

use serde::{Deserialize, Serialize};

/// A zero-based (row, col) coordinate into the source text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub row: usize,
    pub col: usize,
}

impl Pos {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One matched span of source text with its start/end coordinates.
///
/// Tokens are immutable once produced; `end` is the position just past the
/// last character of `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub content: String,
    pub start: Pos,
    pub end: Pos,
}

/// Stateful row/col counter that converts consumed spans into tokens.
///
/// The tracker is the only stateful piece of position handling: it remembers
/// where the previous span ended so consecutive [`advance`](Self::advance)
/// calls produce contiguous coordinates.
#[derive(Debug, Default)]
pub struct PositionTracker {
    row: usize,
    col: usize,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes `content` and returns its token, advancing the tracker to the
    /// position just past it.
    pub fn advance(&mut self, content: &str) -> Token {
        let start = Pos::new(self.row, self.col);

        let (newlines, last_segment_len) = measure(content);
        if newlines > 0 {
            self.row += newlines;
            self.col = 0;
        }
        self.col += last_segment_len;

        Token {
            content: content.to_string(),
            start,
            end: Pos::new(self.row, self.col),
        }
    }

    /// Rewinds to the origin; required between independent inputs.
    pub fn reset(&mut self) {
        self.row = 0;
        self.col = 0;
    }
}

/// Counts newlines in `content` and the char length of the segment after the
/// last newline. `\r\n` is one newline, as are lone `\r` and `\n`.
fn measure(content: &str) -> (usize, usize) {
    let mut newlines = 0;
    let mut last_segment_len = 0;
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                newlines += 1;
                last_segment_len = 0;
            }
            '\n' => {
                newlines += 1;
                last_segment_len = 0;
            }
            _ => last_segment_len += 1,
        }
    }

    (newlines, last_segment_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_single_line_advance() {
        let mut tracker = PositionTracker::new();
        let token = tracker.advance("hello");
        assert_eq!(token.content, "hello");
        assert_eq!(token.start, Pos::new(0, 0));
        assert_eq!(token.end, Pos::new(0, 5));

        let token = tracker.advance("  ");
        assert_eq!(token.start, Pos::new(0, 5));
        assert_eq!(token.end, Pos::new(0, 7));
    }

    #[test]
    fn test_newline_resets_column() {
        let mut tracker = PositionTracker::new();
        let token = tracker.advance("ab\ncd");
        assert_eq!(token.start, Pos::new(0, 0));
        assert_eq!(token.end, Pos::new(1, 2));

        let token = tracker.advance("e");
        assert_eq!(token.start, Pos::new(1, 2));
        assert_eq!(token.end, Pos::new(1, 3));
    }

    #[rstest]
    #[case("a\nb", 1)]
    #[case("a\rb", 1)]
    #[case("a\r\nb", 1)]
    #[case("a\n\rb", 2)]
    #[case("a\r\n\nb", 2)]
    fn test_newline_flavors(#[case] content: &str, #[case] expected_rows: usize) {
        let mut tracker = PositionTracker::new();
        let token = tracker.advance(content);
        assert_eq!(token.end.row, expected_rows);
        assert_eq!(token.end.col, 1);
    }

    #[test]
    fn test_trailing_newline_lands_on_next_row() {
        let mut tracker = PositionTracker::new();
        let token = tracker.advance("ab\n");
        assert_eq!(token.end, Pos::new(1, 0));
    }

    #[test]
    fn test_reset() {
        let mut tracker = PositionTracker::new();
        tracker.advance("a\nbc");
        tracker.reset();
        let token = tracker.advance("x");
        assert_eq!(token.start, Pos::new(0, 0));
    }
}
