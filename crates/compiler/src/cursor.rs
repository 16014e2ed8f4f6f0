//! Character cursor over the raw source
//!
//! Hands out one logical character at a time while keeping line/column
//! bookkeeping, and can step back over characters it already produced.
//! `\r\n` is folded into a single `\n`; a `\r` on its own is an error.
//! End of input is `Ok(None)`, not an error.

use crate::error::{ErrorKind, ParseError, Result};

/// Scan position. `offset` is a char index into the source, at most its
/// length. `line` and `column` are 1-based and describe the next character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePosition {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub const START: SourcePosition = SourcePosition {
        offset: 0,
        line: 1,
        column: 1,
    };
}

pub struct SourceCursor {
    chars: Vec<char>,
    pos: SourcePosition,
}

impl SourceCursor {
    pub fn new(source: &str) -> Self {
        SourceCursor {
            chars: source.chars().collect(),
            pos: SourcePosition::START,
        }
    }

    pub fn position(&self) -> SourcePosition {
        self.pos
    }

    pub fn line(&self) -> usize {
        self.pos.line
    }

    pub fn column(&self) -> usize {
        self.pos.column
    }

    pub fn offset(&self) -> usize {
        self.pos.offset
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.pos.offset >= self.chars.len()
    }

    /// The next logical character without consuming it. A `\r\n` pair
    /// reads as `\n`; a lone `\r` reads as itself.
    pub fn peek(&self) -> Option<char> {
        match self.chars.get(self.pos.offset) {
            Some('\r') if self.chars.get(self.pos.offset + 1) == Some(&'\n') => Some('\n'),
            other => other.copied(),
        }
    }

    pub fn advance(&mut self) -> Result<Option<char>> {
        let Some(&c) = self.chars.get(self.pos.offset) else {
            return Ok(None);
        };
        match c {
            '\r' => {
                if self.chars.get(self.pos.offset + 1) != Some(&'\n') {
                    return Err(ParseError::new(
                        ErrorKind::LineEndingError,
                        self.pos.line,
                        self.pos.column,
                        "carriage return without line feed",
                    ));
                }
                self.pos.offset += 2;
                self.pos.line += 1;
                self.pos.column = 1;
                Ok(Some('\n'))
            }
            '\n' => {
                self.pos.offset += 1;
                self.pos.line += 1;
                self.pos.column = 1;
                Ok(Some('\n'))
            }
            c => {
                self.pos.offset += 1;
                self.pos.column += 1;
                Ok(Some(c))
            }
        }
    }

    /// Step back over `n` logical characters. Never moves before the start.
    pub fn retreat(&mut self, n: usize) {
        for _ in 0..n {
            if self.pos.offset == 0 {
                return;
            }
            let prev = self.chars[self.pos.offset - 1];
            if prev == '\n' {
                self.pos.offset -= 1;
                if self.pos.offset > 0 && self.chars[self.pos.offset - 1] == '\r' {
                    self.pos.offset -= 1;
                }
                self.pos.line -= 1;
                self.pos.column = self.column_of(self.pos.offset);
            } else {
                self.pos.offset -= 1;
                self.pos.column -= 1;
            }
        }
    }

    /// Rewind to a position this cursor produced earlier.
    pub fn rewind_to(&mut self, mark: SourcePosition) {
        if mark.offset <= self.pos.offset {
            let mut count = 0;
            let mut at = mark.offset;
            while at < self.pos.offset {
                at += if self.chars[at] == '\r' && self.chars.get(at + 1) == Some(&'\n') {
                    2
                } else {
                    1
                };
                count += 1;
            }
            self.retreat(count);
        }
    }

    /// Column (1-based) of the character at `offset`, counting logical
    /// characters from the start of its line.
    fn column_of(&self, offset: usize) -> usize {
        let line_start = self.chars[..offset]
            .iter()
            .rposition(|c| *c == '\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        offset - line_start + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cursor: &mut SourceCursor) -> Vec<char> {
        let mut out = Vec::new();
        while let Some(c) = cursor.advance().unwrap() {
            out.push(c);
        }
        out
    }

    #[test]
    fn test_advance_tracks_lines_and_columns() {
        let mut cursor = SourceCursor::new("ab\ncd");
        cursor.advance().unwrap();
        cursor.advance().unwrap();
        assert_eq!((cursor.line(), cursor.column()), (1, 3));
        assert_eq!(cursor.advance().unwrap(), Some('\n'));
        assert_eq!((cursor.line(), cursor.column()), (2, 1));
    }

    #[test]
    fn test_end_of_input_is_not_an_error() {
        let mut cursor = SourceCursor::new("x");
        assert_eq!(cursor.advance().unwrap(), Some('x'));
        assert_eq!(cursor.advance().unwrap(), None);
        assert_eq!(cursor.advance().unwrap(), None);
        assert_eq!(cursor.offset(), cursor.len());
    }

    #[test]
    fn test_crlf_folds_to_single_newline() {
        let mut cursor = SourceCursor::new("a\r\nb");
        assert_eq!(drain(&mut cursor), vec!['a', '\n', 'b']);
        assert_eq!(cursor.line(), 2);
    }

    #[test]
    fn test_lone_carriage_return_is_an_error() {
        let mut cursor = SourceCursor::new("a\rb");
        cursor.advance().unwrap();
        let err = cursor.advance().unwrap_err();
        assert_eq!(err.kind, ErrorKind::LineEndingError);
        assert_eq!((err.line, err.column), (1, 2));
    }

    #[test]
    fn test_retreat_never_moves_before_start() {
        let mut cursor = SourceCursor::new("ab");
        cursor.advance().unwrap();
        cursor.retreat(10);
        assert_eq!(cursor.position(), SourcePosition::START);
    }

    #[test]
    fn test_retreat_then_advance_is_idempotent() {
        let source = "ab\r\ncd\nefg\r\n\nh";
        for consumed in 0..=11 {
            for n in 0..=consumed {
                let mut cursor = SourceCursor::new(source);
                let mut seen = Vec::new();
                let mut positions = Vec::new();
                for _ in 0..consumed {
                    positions.push(cursor.position());
                    if let Some(c) = cursor.advance().unwrap() {
                        seen.push(c);
                    }
                }
                let end = cursor.position();
                cursor.retreat(n);
                let mut replay = Vec::new();
                for i in 0..n {
                    let idx = seen.len().saturating_sub(n) + i;
                    if idx < positions.len() {
                        assert_eq!(cursor.position(), positions[idx]);
                    }
                    if let Some(c) = cursor.advance().unwrap() {
                        replay.push(c);
                    }
                }
                assert_eq!(replay, seen[seen.len().saturating_sub(n)..].to_vec());
                assert_eq!(cursor.position(), end);
            }
        }
    }

    #[test]
    fn test_rewind_to_mark() {
        let mut cursor = SourceCursor::new("one\r\ntwo");
        cursor.advance().unwrap();
        let mark = cursor.position();
        for _ in 0..5 {
            cursor.advance().unwrap();
        }
        cursor.rewind_to(mark);
        assert_eq!(cursor.position(), mark);
    }
}
