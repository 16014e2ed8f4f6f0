//! Dialect grammars
//!
//! Each dialect is a recursive-descent parser that pulls tokens through the
//! scanner and writes host script through the context's emitter.

pub mod basic;
pub mod dbase;
pub mod lisp;
pub mod pascal;

use crate::context::ParserContext;
use crate::error::{ErrorKind, ParseError, Result};
use crate::rules::Dialect;
use crate::scanner::{Token, TokenKind, next_token};
use relic_runtime::{Builtin, is_reserved};

/// Run the grammar for the context's dialect to completion.
pub fn parse(ctx: &mut ParserContext) -> Result<()> {
    match ctx.dialect() {
        Dialect::DBase => dbase::parse(ctx),
        Dialect::Pascal => pascal::parse(ctx),
        Dialect::Basic => basic::parse(ctx),
        Dialect::Lisp => lisp::parse(ctx),
    }
}

/// Map a source identifier to a host variable name. Source dialects are
/// case-insensitive; names the host reserves, uses for builtins, or calls
/// as the entry point get a trailing underscore.
pub(crate) fn host_name(ident: &str) -> String {
    let mut name = ident.to_ascii_lowercase();
    if is_reserved(&name) || Builtin::lookup(&name).is_some() || name == "main" {
        name.push('_');
    }
    name
}

/// Like [`host_name`] for attribute names, which never shadow builtins.
pub(crate) fn attr_name(ident: &str) -> String {
    let mut name = ident.to_ascii_lowercase();
    if is_reserved(&name) {
        name.push('_');
    }
    name
}

pub(crate) fn unexpected(token: &Token, expected: &str) -> ParseError {
    ParseError::new(
        ErrorKind::UnexpectedToken,
        token.pos.line,
        token.pos.column,
        format!("expected {}, found {}", expected, token.kind),
    )
}

pub(crate) fn error_at(token: &Token, kind: ErrorKind, message: impl Into<String>) -> ParseError {
    ParseError::new(kind, token.pos.line, token.pos.column, message)
}

pub(crate) fn expect_punct(ctx: &mut ParserContext, c: char) -> Result<Token> {
    let token = next_token(ctx)?;
    if token.is_punct(c) {
        Ok(token)
    } else {
        Err(unexpected(&token, &format!("'{}'", c)))
    }
}

pub(crate) fn expect_op(ctx: &mut ParserContext, c: char) -> Result<Token> {
    let token = next_token(ctx)?;
    if token.is_op(c) {
        Ok(token)
    } else {
        Err(unexpected(&token, &format!("'{}'", c)))
    }
}

pub(crate) fn expect_word(ctx: &mut ParserContext, word: &str) -> Result<Token> {
    let token = next_token(ctx)?;
    if token.is_word(word) {
        Ok(token)
    } else {
        Err(unexpected(&token, &word.to_ascii_uppercase()))
    }
}

/// An identifier that is not one of the dialect's reserved words.
pub(crate) fn expect_name(ctx: &mut ParserContext, what: &str) -> Result<(String, Token)> {
    let token = next_token(ctx)?;
    match &token.kind {
        TokenKind::Identifier(word) if ctx.rules().is_keyword(word) => Err(error_at(
            &token,
            ErrorKind::KeywordNotAllowedHere,
            format!("'{}' is a keyword and cannot be used as {}", word, what),
        )),
        TokenKind::Identifier(word) => Ok((word.clone(), token)),
        _ => Err(unexpected(&token, what)),
    }
}

/// `expr - 1`, folded when `expr` is an integer literal. Converts the
/// 1-based screen coordinates of the source dialects.
pub(crate) fn minus_one(expr: &str) -> String {
    match expr.parse::<i64>().ok().and_then(|n| n.checked_sub(1)) {
        Some(n) => n.to_string(),
        None if expr.contains(' ') => format!("({}) - 1", expr),
        None => format!("{} - 1", expr),
    }
}

/// Every `(` the skipper saw must have been closed.
pub(crate) fn check_parens(ctx: &ParserContext) -> Result<()> {
    if ctx.paren_depth != 0 {
        return Err(ctx.error(
            ErrorKind::StructuralImbalance,
            format!("{} unclosed '(' at end of input", ctx.paren_depth),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_name_mangles_reserved_and_builtins() {
        assert_eq!(host_name("Total"), "total");
        assert_eq!(host_name("PASS"), "pass_");
        assert_eq!(host_name("len"), "len_");
        assert_eq!(host_name("Main"), "main_");
        assert_eq!(attr_name("Left"), "left");
        assert_eq!(attr_name("class"), "class_");
    }

    #[test]
    fn test_minus_one() {
        assert_eq!(minus_one("5"), "4");
        assert_eq!(minus_one("row"), "row - 1");
        assert_eq!(minus_one("a + b"), "(a + b) - 1");
        assert_eq!(
            minus_one("-9223372036854775808"),
            "-9223372036854775808 - 1"
        );
    }

    #[test]
    fn test_expect_name_rejects_keywords() {
        let mut ctx = ParserContext::new(Dialect::DBase, "endif", "t");
        let err = expect_name(&mut ctx, "a variable").unwrap_err();
        assert_eq!(err.kind, ErrorKind::KeywordNotAllowedHere);
    }
}
