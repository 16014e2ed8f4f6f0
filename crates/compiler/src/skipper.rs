//! Whitespace and comment skipping
//!
//! [`skip`] consumes whitespace and comments according to the active
//! dialect's rules and returns the next significant character. It also
//! keeps the parenthesis depth: `(` increments it, `)` decrements it and
//! underflow is fatal.

use crate::context::ParserContext;
use crate::cursor::SourcePosition;
use crate::error::{ErrorKind, Result};
use crate::rules::BlockComment;

pub fn skip(ctx: &mut ParserContext) -> Result<Option<char>> {
    ctx.crossed_newline = false;
    let rules = ctx.rules();

    loop {
        let start = ctx.position();
        let Some(c) = ctx.advance()? else {
            return Ok(None);
        };

        if c == '\n' {
            ctx.crossed_newline = true;
            continue;
        }
        if c.is_whitespace() {
            continue;
        }
        if line_comment(ctx, c)? {
            continue;
        }
        if let Some(comment) = block_comment_open(ctx, c)? {
            block_comment(ctx, comment, start)?;
            continue;
        }

        match c {
            '(' => ctx.paren_depth += 1,
            ')' => {
                if ctx.paren_depth == 0 {
                    return Err(ctx.error_at(
                        ErrorKind::ParenUnderflow,
                        start,
                        "')' without a matching '('",
                    ));
                }
                ctx.paren_depth -= 1;
            }
            '{' | '}' if !rules.braces_allowed => {
                return Err(ctx.error_at(
                    ErrorKind::UnexpectedCharacter,
                    start,
                    format!("'{}' is reserved in the {} dialect", c, rules.dialect),
                ));
            }
            _ => {}
        }
        return Ok(Some(c));
    }
}

/// If `c` starts a line comment, consume it up to (not including) the
/// line break.
fn line_comment(ctx: &mut ParserContext, c: char) -> Result<bool> {
    for opener in ctx.rules().line_comments {
        if opener.starts_with(c) && ctx.matches_ahead(&opener[c.len_utf8()..])? {
            while let Some(next) = ctx.lookahead() {
                if next == '\n' {
                    break;
                }
                ctx.advance()?;
            }
            return Ok(true);
        }
    }
    Ok(false)
}

fn block_comment_open(ctx: &mut ParserContext, c: char) -> Result<Option<&'static BlockComment>> {
    for comment in ctx.rules().block_comments {
        if comment.open.starts_with(c) && ctx.matches_ahead(&comment.open[c.len_utf8()..])? {
            return Ok(Some(comment));
        }
    }
    Ok(None)
}

/// Consume a block comment whose opener has already been read.
fn block_comment(
    ctx: &mut ParserContext,
    comment: &BlockComment,
    start: SourcePosition,
) -> Result<()> {
    ctx.comment_depth[comment.slot] = 1;
    loop {
        let Some(c) = ctx.advance()? else {
            return Err(ctx.error_at(
                ErrorKind::UnterminatedComment,
                start,
                format!("comment opened with '{}' is never closed", comment.open),
            ));
        };
        if comment.close.starts_with(c) && ctx.matches_ahead(&comment.close[c.len_utf8()..])? {
            ctx.comment_depth[comment.slot] -= 1;
            if ctx.comment_depth[comment.slot] == 0 {
                return Ok(());
            }
        } else if comment.nests
            && comment.open.starts_with(c)
            && ctx.matches_ahead(&comment.open[c.len_utf8()..])?
        {
            ctx.comment_depth[comment.slot] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Dialect;

    fn significant(dialect: Dialect, source: &str) -> Result<String> {
        let mut ctx = ParserContext::new(dialect, source, "test");
        let mut out = String::new();
        while let Some(c) = skip(&mut ctx)? {
            out.push(c);
        }
        Ok(out)
    }

    #[test]
    fn test_dbase_line_comments() {
        let src = "** banner\nA && trailing\nB // also\nC # directive\n";
        assert_eq!(significant(Dialect::DBase, src).unwrap(), "ABC");
    }

    #[test]
    fn test_dbase_block_comment_does_not_nest() {
        assert_eq!(
            significant(Dialect::DBase, "A /* x /* y */ B").unwrap(),
            "AB"
        );
    }

    #[test]
    fn test_single_slash_and_star_are_significant() {
        assert_eq!(significant(Dialect::DBase, "a / b * c").unwrap(), "a/b*c");
    }

    #[test]
    fn test_pascal_nested_braces() {
        let src = "A { outer { inner } still } B";
        assert_eq!(significant(Dialect::Pascal, src).unwrap(), "AB");
    }

    #[test]
    fn test_pascal_nested_paren_star() {
        let src = "A (* x (* y *) z *) B";
        assert_eq!(significant(Dialect::Pascal, src).unwrap(), "AB");
    }

    #[test]
    fn test_pascal_styles_count_independently() {
        // `(*` inside a brace comment does not need its own close.
        let src = "A { (* } B";
        assert_eq!(significant(Dialect::Pascal, src).unwrap(), "AB");
    }

    #[test]
    fn test_unterminated_brace_comment_reports_start() {
        let src = "PROGRAM x;\n  { never closed\n\nBEGIN END.";
        let err = significant(Dialect::Pascal, src).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedComment);
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_unterminated_nested_comment() {
        let err = significant(Dialect::Pascal, "{ a { b } ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedComment);
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_paren_underflow() {
        let err = significant(Dialect::DBase, "(a))").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParenUnderflow);
        assert_eq!((err.line, err.column), (1, 4));
    }

    #[test]
    fn test_paren_depth_tracked() {
        let mut ctx = ParserContext::new(Dialect::Lisp, "((a", "t");
        while skip(&mut ctx).unwrap().is_some() {}
        assert_eq!(ctx.paren_depth, 2);
    }

    #[test]
    fn test_braces_rejected_outside_pascal() {
        let err = significant(Dialect::DBase, "a { b").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter);
    }

    #[test]
    fn test_lisp_semicolon_comment() {
        assert_eq!(
            significant(Dialect::Lisp, "(a ; comment )\n b)").unwrap(),
            "(ab)"
        );
    }

    #[test]
    fn test_crossed_newline_flag() {
        let mut ctx = ParserContext::new(Dialect::DBase, "a\n  b c", "t");
        skip(&mut ctx).unwrap();
        assert!(!ctx.crossed_newline);
        skip(&mut ctx).unwrap();
        assert!(ctx.crossed_newline);
        skip(&mut ctx).unwrap();
        assert!(!ctx.crossed_newline);
    }

    #[test]
    fn test_whitespace_insertion_is_transparent() {
        // Inserting and removing a blank at any whitespace-legal position
        // leaves the significant character stream unchanged.
        let src = "SET COLOR TO w+/b && note\n@ 5,10 SAY \"hi\" /* c */\n";
        let baseline = significant(Dialect::DBase, src).unwrap();
        let chars: Vec<char> = src.chars().collect();
        for i in 0..=chars.len() {
            let at_boundary = i == 0
                || i == chars.len()
                || chars[i - 1].is_whitespace()
                || chars[i].is_whitespace();
            if !at_boundary {
                continue;
            }
            let mut inserted = chars.clone();
            inserted.insert(i, ' ');
            let with_blank: String = inserted.iter().collect();
            let mut removed = inserted.clone();
            removed.remove(i);
            let restored: String = removed.iter().collect();
            assert_eq!(significant(Dialect::DBase, &restored).unwrap(), baseline);
            assert_eq!(significant(Dialect::DBase, &with_blank).unwrap(), baseline);
        }
    }
}
