//! Token scanner
//!
//! Builds tokens on top of the skipper: identifiers, numbers, string
//! literals, single-character operators and punctuation. One token of
//! lookahead is available through [`peek_token`], which restores the
//! cursor and the skipper's counters afterwards.

use crate::context::ParserContext;
use crate::cursor::SourcePosition;
use crate::error::{ErrorKind, Result};
use crate::rules::QuoteStyle;
use crate::skipper::skip;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    /// Numeric literal, kept as written.
    Number(String),
    /// String literal with escapes already decoded.
    StringLiteral(String),
    Operator(char),
    Punctuation(char),
    EndOfInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePosition,
    /// A line break separated this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    /// Case-insensitive identifier comparison.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(s) if s.eq_ignore_ascii_case(word))
    }

    pub fn is_op(&self, op: char) -> bool {
        self.kind == TokenKind::Operator(op)
    }

    pub fn is_punct(&self, p: char) -> bool {
        self.kind == TokenKind::Punctuation(p)
    }

    pub fn is_end(&self) -> bool {
        self.kind == TokenKind::EndOfInput
    }

    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Identifier(s) => write!(f, "'{}'", s),
            TokenKind::Number(s) => write!(f, "number {}", s),
            TokenKind::StringLiteral(s) => write!(f, "string \"{}\"", s),
            TokenKind::Operator(c) | TokenKind::Punctuation(c) => write!(f, "'{}'", c),
            TokenKind::EndOfInput => write!(f, "end of input"),
        }
    }
}

const PUNCTUATION: &str = "(),;:.[]{}";

pub fn next_token(ctx: &mut ParserContext) -> Result<Token> {
    let Some(c) = skip(ctx)? else {
        return Ok(Token {
            kind: TokenKind::EndOfInput,
            pos: ctx.position(),
            newline_before: ctx.crossed_newline,
        });
    };
    let newline_before = ctx.crossed_newline;
    let rules = ctx.rules();

    // The skipper never returns a line break, so the start is one column back.
    let here = ctx.position();
    let pos = SourcePosition {
        offset: here.offset - 1,
        line: here.line,
        column: here.column - 1,
    };

    let kind = if c.is_alphabetic() || c == '_' {
        ctx.retreat(1);
        TokenKind::Identifier(scan_identifier(ctx)?)
    } else if c.is_ascii_digit() {
        ctx.retreat(1);
        TokenKind::Number(scan_number(ctx)?)
    } else if (c == '"' && rules.quote == QuoteStyle::Double)
        || (c == '\'' && rules.quote == QuoteStyle::Single)
    {
        ctx.retreat(1);
        TokenKind::StringLiteral(scan_string(ctx)?)
    } else if rules.is_operator(c) {
        TokenKind::Operator(c)
    } else if PUNCTUATION.contains(c) {
        TokenKind::Punctuation(c)
    } else {
        return Err(ctx.error_at(
            ErrorKind::UnexpectedCharacter,
            pos,
            format!("unexpected character '{}'", c),
        ));
    };

    Ok(Token {
        kind,
        pos,
        newline_before,
    })
}

/// Return the next token without consuming it.
pub fn peek_token(ctx: &mut ParserContext) -> Result<Token> {
    let mark = ctx.mark();
    let token = next_token(ctx);
    ctx.reset(mark);
    token
}

pub fn scan_identifier(ctx: &mut ParserContext) -> Result<String> {
    let extra = ctx.rules().ident_extra;
    let start = ctx.position();
    let mut out = String::new();
    match ctx.advance()? {
        Some(c) if c.is_alphabetic() || c == '_' => out.push(c),
        _ => {
            return Err(ctx.error_at(
                ErrorKind::UnexpectedCharacter,
                start,
                "expected an identifier",
            ));
        }
    }
    while let Some(c) = ctx.lookahead() {
        if c.is_alphanumeric() || c == '_' || extra.contains(c) {
            out.push(c);
            ctx.advance()?;
        } else {
            break;
        }
    }
    Ok(out)
}

/// Digits with at most one decimal point. A point only belongs to the
/// number when a digit follows it.
pub fn scan_number(ctx: &mut ParserContext) -> Result<String> {
    let mut out = String::new();
    let mut seen_point = false;
    while let Some(c) = ctx.lookahead() {
        if c.is_ascii_digit() {
            out.push(c);
            ctx.advance()?;
        } else if c == '.' {
            let at = ctx.position();
            ctx.advance()?;
            let digit_follows = ctx.lookahead().is_some_and(|d| d.is_ascii_digit());
            if !digit_follows {
                ctx.retreat(1);
                break;
            }
            if seen_point {
                return Err(ctx.error_at(
                    ErrorKind::NumberSyntaxError,
                    at,
                    format!("second decimal point in number {}", out),
                ));
            }
            seen_point = true;
            out.push('.');
        } else {
            break;
        }
    }
    if out.is_empty() {
        return Err(ctx.error(ErrorKind::NumberSyntaxError, "expected a number"));
    }
    Ok(out)
}

/// Scan a string literal starting at its opening quote.
pub fn scan_string(ctx: &mut ParserContext) -> Result<String> {
    match ctx.rules().quote {
        QuoteStyle::Double => scan_double_quoted(ctx),
        QuoteStyle::Single => scan_single_quoted(ctx),
    }
}

fn scan_double_quoted(ctx: &mut ParserContext) -> Result<String> {
    let start = ctx.position();
    ctx.advance()?;
    let mut out = String::new();
    loop {
        let Some(c) = ctx.advance()? else {
            return Err(unterminated(ctx, start));
        };
        match c {
            '"' => break,
            '\n' => return Err(unterminated(ctx, start)),
            '\\' => {
                let at = ctx.position();
                let decoded = match ctx.advance()? {
                    Some('\\') => '\\',
                    Some('t') => '\t',
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('a') => '\u{7}',
                    Some('"') => '"',
                    None => return Err(unterminated(ctx, start)),
                    Some(other) => {
                        return Err(ctx.error_at(
                            ErrorKind::EscapeSignError,
                            at,
                            format!("unknown escape '\\{}'", other.escape_debug()),
                        ));
                    }
                };
                out.push(decoded);
            }
            c => out.push(c),
        }
    }

    // `"a" + "b"` joins into one literal at scan time.
    let mark = ctx.mark();
    if ctx.lookahead() == Some('+') || ctx.lookahead().is_some_and(char::is_whitespace) {
        if matches!(skip(ctx), Ok(Some('+'))) && matches!(skip(ctx), Ok(Some('"'))) {
            ctx.retreat(1);
            out.push_str(&scan_double_quoted(ctx)?);
            return Ok(out);
        }
        ctx.reset(mark);
    }
    Ok(out)
}

fn scan_single_quoted(ctx: &mut ParserContext) -> Result<String> {
    let start = ctx.position();
    ctx.advance()?;
    let mut out = String::new();
    loop {
        match ctx.advance()? {
            None | Some('\n') => return Err(unterminated(ctx, start)),
            Some('\'') => {
                if ctx.lookahead() == Some('\'') {
                    ctx.advance()?;
                    out.push('\'');
                } else {
                    return Ok(out);
                }
            }
            Some(c) => out.push(c),
        }
    }
}

fn unterminated(ctx: &ParserContext, start: SourcePosition) -> crate::error::ParseError {
    ctx.error_at(
        ErrorKind::StringNotTerminated,
        start,
        "string literal is not terminated",
    )
}
