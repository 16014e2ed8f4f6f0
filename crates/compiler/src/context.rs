//! Per-parse mutable state
//!
//! One [`ParserContext`] is created for each parse run and passed by `&mut`
//! into every skipper, scanner and grammar function. Nothing here is shared
//! between runs or dialects.

use crate::cursor::{SourceCursor, SourcePosition};
use crate::emitter::Emitter;
use crate::error::{ErrorKind, ParseError, Result};
use crate::rules::{COMMENT_SLOTS, Dialect, DialectRules};

/// Saved scan state for one token of lookahead.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    pos: SourcePosition,
    paren_depth: usize,
    crossed_newline: bool,
}

pub struct ParserContext {
    cursor: SourceCursor,
    rules: &'static DialectRules,
    file: String,
    /// Open block comments, one counter per comment style.
    pub comment_depth: [usize; COMMENT_SLOTS],
    /// Open parentheses seen by the skipper.
    pub paren_depth: usize,
    /// Whether the last skip crossed a line break.
    pub crossed_newline: bool,
    pub emitter: Emitter,
}

impl ParserContext {
    pub fn new(dialect: Dialect, source: &str, file: impl Into<String>) -> Self {
        ParserContext {
            cursor: SourceCursor::new(source),
            rules: dialect.rules(),
            file: file.into(),
            comment_depth: [0; COMMENT_SLOTS],
            paren_depth: 0,
            crossed_newline: false,
            emitter: Emitter::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.rules.dialect
    }

    pub fn rules(&self) -> &'static DialectRules {
        self.rules
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn advance(&mut self) -> Result<Option<char>> {
        self.cursor.advance()
    }

    pub fn retreat(&mut self, n: usize) {
        self.cursor.retreat(n);
    }

    /// The next character, without consuming it.
    pub fn lookahead(&self) -> Option<char> {
        self.cursor.peek()
    }

    pub fn position(&self) -> SourcePosition {
        self.cursor.position()
    }

    pub fn at_end(&self) -> bool {
        self.cursor.at_end()
    }

    pub fn mark(&self) -> Mark {
        Mark {
            pos: self.cursor.position(),
            paren_depth: self.paren_depth,
            crossed_newline: self.crossed_newline,
        }
    }

    pub fn reset(&mut self, mark: Mark) {
        self.cursor.rewind_to(mark.pos);
        self.paren_depth = mark.paren_depth;
        self.crossed_newline = mark.crossed_newline;
    }

    /// Consume `expected` if the input continues with exactly that text.
    pub fn matches_ahead(&mut self, expected: &str) -> Result<bool> {
        let start = self.cursor.position();
        for want in expected.chars() {
            if self.cursor.peek() == Some(want) {
                self.advance()?;
            } else {
                self.cursor.rewind_to(start);
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn error(&self, kind: ErrorKind, message: impl Into<String>) -> ParseError {
        self.error_at(kind, self.position(), message)
    }

    pub fn error_at(
        &self,
        kind: ErrorKind,
        pos: SourcePosition,
        message: impl Into<String>,
    ) -> ParseError {
        ParseError::new(kind, pos.line, pos.column, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_reset_restore_scan_state() {
        let mut ctx = ParserContext::new(Dialect::Lisp, "(a\nb)", "t.lisp");
        let mark = ctx.mark();
        ctx.advance().unwrap();
        ctx.paren_depth = 1;
        ctx.crossed_newline = true;
        ctx.reset(mark);
        assert_eq!(ctx.position().offset, 0);
        assert_eq!(ctx.paren_depth, 0);
        assert!(!ctx.crossed_newline);
        assert_eq!(ctx.lookahead(), Some('('));
    }

    #[test]
    fn test_matches_ahead_consumes_only_on_match() {
        let mut ctx = ParserContext::new(Dialect::Pascal, "(*x", "t.pas");
        assert!(!ctx.matches_ahead("(x").unwrap());
        assert_eq!(ctx.position().offset, 0);
        assert!(ctx.matches_ahead("(*").unwrap());
        assert_eq!(ctx.position().column, 3);
    }
}
