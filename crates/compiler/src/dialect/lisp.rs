//! LISP-like dialect
//!
//! The reader turns scanner tokens into [`Sexp`] trees; the translator then
//! walks the top-level forms. `defun` forms become host functions in the
//! header, everything else runs in `main()`. Names assigned with `setq` at
//! top level are declared as globals so functions can see them.

use std::collections::HashSet;

use relic_runtime::quote;
use tracing::debug;

use super::{check_parens, host_name, unexpected};
use crate::context::ParserContext;
use crate::cursor::SourcePosition;
use crate::emitter::Segment;
use crate::error::{ErrorKind, ParseError, Result};
use crate::scanner::{Token, TokenKind, next_token};

#[derive(Debug, Clone, PartialEq)]
pub enum Sexp {
    Symbol(String, SourcePosition),
    Number(String, SourcePosition),
    Str(String, SourcePosition),
    List(Vec<Sexp>, SourcePosition),
}

impl Sexp {
    pub fn pos(&self) -> SourcePosition {
        match self {
            Sexp::Symbol(_, pos) | Sexp::Number(_, pos) | Sexp::Str(_, pos) | Sexp::List(_, pos) => {
                *pos
            }
        }
    }

    fn symbol(&self) -> Option<&str> {
        match self {
            Sexp::Symbol(s, _) => Some(s),
            _ => None,
        }
    }

    /// `(head ...)` with a symbol head.
    fn head(&self) -> Option<&str> {
        match self {
            Sexp::List(items, _) => items.first().and_then(Sexp::symbol),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            Sexp::Symbol(s, _) => format!("'{}'", s),
            Sexp::Number(n, _) => format!("number {}", n),
            Sexp::Str(s, _) => format!("string \"{}\"", s),
            Sexp::List(..) => "a list".to_string(),
        }
    }
}

/// Forms that only make sense as statements.
const STATEMENT_FORMS: &[&str] = &[
    "print", "goto", "color", "cls", "setq", "while", "progn", "defun", "if",
];

pub fn parse(ctx: &mut ParserContext) -> Result<()> {
    let forms = read_all(ctx)?;
    debug!(forms = forms.len(), file = ctx.file(), "read LISP forms");
    Translator { ctx }.translate(&forms)
}

/// Read every top-level form.
pub fn read_all(ctx: &mut ParserContext) -> Result<Vec<Sexp>> {
    let mut forms = Vec::new();
    loop {
        let token = next_token(ctx)?;
        if token.is_end() {
            break;
        }
        forms.push(read_datum(ctx, token)?);
    }
    check_parens(ctx)?;
    Ok(forms)
}

fn read_datum(ctx: &mut ParserContext, token: Token) -> Result<Sexp> {
    let pos = token.pos;
    let datum = match token.kind {
        TokenKind::Punctuation('(') => {
            let mut items = Vec::new();
            loop {
                let next = next_token(ctx)?;
                if next.is_punct(')') {
                    break;
                }
                if next.is_end() {
                    return Err(ParseError::new(
                        ErrorKind::StructuralImbalance,
                        pos.line,
                        pos.column,
                        "'(' is never closed",
                    ));
                }
                items.push(read_datum(ctx, next)?);
            }
            Sexp::List(items, pos)
        }
        TokenKind::Identifier(word) => Sexp::Symbol(word.to_ascii_lowercase(), pos),
        TokenKind::Number(n) => Sexp::Number(n, pos),
        TokenKind::StringLiteral(s) => Sexp::Str(s, pos),
        TokenKind::Operator('-') if ctx.lookahead().is_some_and(|c| c.is_ascii_digit()) => {
            let number = next_token(ctx)?;
            match number.kind {
                TokenKind::Number(n) => Sexp::Number(format!("-{}", n), pos),
                _ => return Err(unexpected(&number, "a number")),
            }
        }
        TokenKind::Operator(c @ ('/' | '<' | '>')) if ctx.lookahead() == Some('=') => {
            ctx.advance()?;
            Sexp::Symbol(format!("{}=", c), pos)
        }
        TokenKind::Operator(c) => Sexp::Symbol(c.to_string(), pos),
        _ => return Err(unexpected(&token, "a form")),
    };
    Ok(datum)
}

/// Host name for a LISP symbol: `-` becomes `_`, and `?`, `!`, `*` get
/// spelled out.
fn lisp_name(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for c in symbol.chars() {
        match c {
            '-' => out.push('_'),
            '?' => out.push_str("_p"),
            '!' => out.push_str("_x"),
            '*' => out.push_str("_star"),
            c => out.push(c),
        }
    }
    host_name(&out)
}

fn error_at(pos: SourcePosition, kind: ErrorKind, message: impl Into<String>) -> ParseError {
    ParseError::new(kind, pos.line, pos.column, message)
}

fn syntax(pos: SourcePosition, message: impl Into<String>) -> ParseError {
    error_at(pos, ErrorKind::SyntaxError, message)
}

fn arity(pos: SourcePosition, name: &str, args: &[Sexp], expected: usize) -> Result<()> {
    if args.len() != expected {
        return Err(syntax(
            pos,
            format!(
                "'{}' takes {} argument{}, found {}",
                name,
                expected,
                if expected == 1 { "" } else { "s" },
                args.len()
            ),
        ));
    }
    Ok(())
}

/// Names `setq` assigns outside any `defun`, in first-assignment order.
fn collect_globals<'f>(form: &'f Sexp, seen: &mut HashSet<&'f str>, out: &mut Vec<&'f str>) {
    let Sexp::List(items, _) = form else {
        return;
    };
    match form.head() {
        Some("defun") => {}
        Some("setq") => {
            for pair in items[1..].chunks(2) {
                if let Some(name) = pair[0].symbol()
                    && seen.insert(name)
                {
                    out.push(name);
                }
                if let Some(value) = pair.get(1) {
                    collect_globals(value, seen, out);
                }
            }
        }
        _ => {
            for item in items {
                collect_globals(item, seen, out);
            }
        }
    }
}

struct Translator<'a> {
    ctx: &'a mut ParserContext,
}

impl Translator<'_> {
    fn emit(&mut self, text: impl Into<String>) {
        self.ctx.emitter.emit(text);
    }

    fn indent(&mut self) {
        self.ctx.emitter.indent();
    }

    fn dedent(&mut self) {
        self.ctx.emitter.dedent();
    }

    fn translate(mut self, forms: &[Sexp]) -> Result<()> {
        self.ctx.emitter.select(Segment::Header);
        let mut seen = HashSet::new();
        let mut globals = Vec::new();
        for form in forms {
            collect_globals(form, &mut seen, &mut globals);
        }
        for name in globals {
            if self.ctx.rules().is_keyword(name) {
                continue;
            }
            self.emit(format!("{} = None", lisp_name(name)));
        }

        self.ctx.emitter.select(Segment::Body);
        self.emit("def main():");
        self.indent();
        let mut main_empty = true;
        for form in forms {
            if form.head() == Some("defun") {
                self.ctx.emitter.select(Segment::Header);
                self.defun(form)?;
                self.ctx.emitter.select(Segment::Body);
            } else {
                self.statement(form)?;
                main_empty = false;
            }
        }
        if main_empty {
            self.emit("pass");
        }
        self.dedent();
        Ok(())
    }

    fn defun(&mut self, form: &Sexp) -> Result<()> {
        let Sexp::List(items, pos) = form else {
            return Ok(());
        };
        let args = &items[1..];
        let (Some(name), Some(params)) = (args.first(), args.get(1)) else {
            return Err(syntax(*pos, "'defun' needs a name and a parameter list"));
        };
        let name = self.definable(name, "a function name")?;
        let Sexp::List(params, _) = params else {
            return Err(syntax(
                params.pos(),
                format!("expected a parameter list, found {}", params.describe()),
            ));
        };
        let mut host_params = Vec::with_capacity(params.len());
        for param in params {
            host_params.push(self.definable(param, "a parameter")?);
        }

        self.emit(format!("def {}({}):", name, host_params.join(", ")));
        self.indent();
        match args[2..].split_last() {
            None => self.emit("return None"),
            Some((last, init)) => {
                for form in init {
                    self.statement(form)?;
                }
                self.tail(last)?;
            }
        }
        self.dedent();
        Ok(())
    }

    /// A symbol that may be bound by `defun`, a parameter list or `setq`.
    fn definable(&self, form: &Sexp, what: &str) -> Result<String> {
        match form {
            Sexp::Symbol(s, pos) if self.ctx.rules().is_keyword(s) => Err(error_at(
                *pos,
                ErrorKind::KeywordNotAllowedHere,
                format!("'{}' is a keyword and cannot be used as {}", s, what),
            )),
            Sexp::Symbol(s, _) if s.starts_with(|c: char| c.is_alphabetic() || c == '_') => {
                Ok(lisp_name(s))
            }
            other => Err(syntax(
                other.pos(),
                format!("expected {}, found {}", what, other.describe()),
            )),
        }
    }

    /// The last form of a function body: its value is returned.
    fn tail(&mut self, form: &Sexp) -> Result<()> {
        match form {
            Sexp::List(items, pos) => match form.head() {
                Some("if") => self.if_form(*pos, &items[1..], true),
                Some("progn") => match items[1..].split_last() {
                    None => {
                        self.emit("return None");
                        Ok(())
                    }
                    Some((last, init)) => {
                        for form in init {
                            self.statement(form)?;
                        }
                        self.tail(last)
                    }
                },
                Some("setq") => {
                    self.statement(form)?;
                    let last = items[1..].chunks(2).last().and_then(|p| p[0].symbol());
                    match last {
                        Some(name) => self.emit(format!("return {}", lisp_name(name))),
                        None => self.emit("return None"),
                    }
                    Ok(())
                }
                Some(head) if STATEMENT_FORMS.contains(&head) => {
                    self.statement(form)?;
                    self.emit("return None");
                    Ok(())
                }
                _ => {
                    let value = self.expression(form)?;
                    self.emit(format!("return {}", value));
                    Ok(())
                }
            },
            _ => {
                let value = self.expression(form)?;
                self.emit(format!("return {}", value));
                Ok(())
            }
        }
    }

    fn statement(&mut self, form: &Sexp) -> Result<()> {
        let Sexp::List(items, pos) = form else {
            let value = self.expression(form)?;
            self.emit(value);
            return Ok(());
        };
        let pos = *pos;
        let args = items.get(1..).unwrap_or_default();
        match form.head() {
            Some("print") => {
                let values = self.expressions(args)?;
                if !values.is_empty() {
                    self.emit(format!("print({})", values.join(", ")));
                }
                self.emit("newline()");
            }
            Some("goto") => {
                arity(pos, "goto", args, 2)?;
                let row = self.expression(&args[0])?;
                let col = self.expression(&args[1])?;
                self.emit(format!("goto({}, {})", row, col));
            }
            Some("color") => self.color(pos, args)?,
            Some("cls") => {
                arity(pos, "cls", args, 0)?;
                self.emit("cls()");
            }
            Some("setq") => self.setq(pos, args)?,
            Some("if") => self.if_form(pos, args, false)?,
            Some("while") => {
                let Some((condition, body)) = args.split_first() else {
                    return Err(syntax(pos, "'while' needs a condition"));
                };
                let condition = self.expression(condition)?;
                self.emit(format!("while {}:", condition));
                self.indent();
                self.block(body)?;
                self.dedent();
            }
            Some("progn") => {
                for form in args {
                    self.statement(form)?;
                }
            }
            Some("defun") => {
                return Err(syntax(pos, "'defun' is only allowed at top level"));
            }
            _ => {
                let value = self.expression(form)?;
                self.emit(value);
            }
        }
        Ok(())
    }

    /// Statements of a nested body; an empty body is `pass`.
    fn block(&mut self, forms: &[Sexp]) -> Result<()> {
        if forms.is_empty() {
            self.emit("pass");
        }
        for form in forms {
            self.statement(form)?;
        }
        Ok(())
    }

    fn if_form(&mut self, pos: SourcePosition, args: &[Sexp], tail: bool) -> Result<()> {
        if !(2..=3).contains(&args.len()) {
            return Err(syntax(
                pos,
                format!("'if' takes a condition and one or two branches, found {} forms", args.len()),
            ));
        }
        let condition = self.expression(&args[0])?;
        self.emit(format!("if {}:", condition));
        self.indent();
        self.branch(&args[1], tail)?;
        self.dedent();
        match args.get(2) {
            Some(otherwise) => {
                self.emit("else:");
                self.indent();
                self.branch(otherwise, tail)?;
                self.dedent();
            }
            None if tail => self.emit("return None"),
            None => {}
        }
        Ok(())
    }

    fn branch(&mut self, form: &Sexp, tail: bool) -> Result<()> {
        if tail {
            self.tail(form)
        } else {
            self.statement(form)
        }
    }

    fn setq(&mut self, pos: SourcePosition, args: &[Sexp]) -> Result<()> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(syntax(pos, "'setq' takes name/value pairs"));
        }
        for pair in args.chunks(2) {
            let name = self.definable(&pair[0], "a variable")?;
            let value = self.expression(&pair[1])?;
            self.emit(format!("{} = {}", name, value));
        }
        Ok(())
    }

    /// `(color "fg" ["bg"])` with color names resolved now; any other
    /// argument is a palette index evaluated at run time.
    fn color(&mut self, pos: SourcePosition, args: &[Sexp]) -> Result<()> {
        let colors = match args {
            [fg] => vec![self.color_arg(fg)?],
            [fg, bg] => vec![self.color_arg(fg)?, self.color_arg(bg)?],
            _ => {
                return Err(syntax(
                    pos,
                    format!("'color' takes 1 or 2 arguments, found {}", args.len()),
                ));
            }
        };
        match colors.as_slice() {
            [fg, bg] => self.emit(format!("set_color({}, {})", fg, bg)),
            [fg] => self.emit(format!("set_fg({})", fg)),
            _ => {}
        }
        Ok(())
    }

    fn color_arg(&mut self, form: &Sexp) -> Result<String> {
        match form {
            Sexp::Str(name, pos) => match self.ctx.rules().color(name) {
                Some(rgb) => Ok(rgb.to_string()),
                None => Err(syntax(*pos, format!("unknown color \"{}\"", name))),
            },
            other => Ok(format!("palette({})", self.expression(other)?)),
        }
    }

    fn expressions(&mut self, forms: &[Sexp]) -> Result<Vec<String>> {
        forms.iter().map(|f| self.expression(f)).collect()
    }

    fn expression(&mut self, form: &Sexp) -> Result<String> {
        match form {
            Sexp::Number(n, _) => Ok(n.clone()),
            Sexp::Str(s, _) => Ok(quote(s)),
            Sexp::Symbol(s, _) if s == "t" => Ok("True".to_string()),
            Sexp::Symbol(s, _) if s == "nil" => Ok("None".to_string()),
            Sexp::Symbol(s, pos) if self.ctx.rules().is_keyword(s) => Err(error_at(
                *pos,
                ErrorKind::KeywordNotAllowedHere,
                format!("'{}' cannot be used as a value", s),
            )),
            Sexp::Symbol(s, pos) if !s.starts_with(|c: char| c.is_alphabetic() || c == '_') => {
                Err(syntax(*pos, format!("operator '{}' cannot be used as a value", s)))
            }
            Sexp::Symbol(s, _) => Ok(lisp_name(s)),
            Sexp::List(items, pos) => {
                let Some((head, args)) = items.split_first() else {
                    return Ok("None".to_string());
                };
                let Some(name) = head.symbol() else {
                    return Err(syntax(
                        head.pos(),
                        format!("expected a function name, found {}", head.describe()),
                    ));
                };
                self.application(*pos, name, args)
            }
        }
    }

    fn application(&mut self, pos: SourcePosition, name: &str, args: &[Sexp]) -> Result<String> {
        let values = self.expressions(args)?;
        let fold = |op: &str, values: &[String]| format!("({})", values.join(&format!(" {} ", op)));
        let value = match name {
            "+" | "*" | "and" | "or" => {
                if values.is_empty() {
                    return Err(syntax(pos, format!("'{}' needs at least one argument", name)));
                }
                fold(name, &values)
            }
            "-" => match values.as_slice() {
                [] => return Err(syntax(pos, "'-' needs at least one argument")),
                [only] => format!("(-{})", only),
                _ => fold("-", &values),
            },
            "/" => {
                if values.len() < 2 {
                    return Err(syntax(pos, "'/' needs at least two arguments"));
                }
                fold("/", &values)
            }
            "mod" | "=" | "/=" | "<" | ">" | "<=" | ">=" => {
                arity(pos, name, args, 2)?;
                let op = match name {
                    "mod" => "%",
                    "=" => "==",
                    "/=" => "!=",
                    other => other,
                };
                fold(op, &values)
            }
            "not" => {
                arity(pos, name, args, 1)?;
                format!("(not {})", values[0])
            }
            "concat" => {
                if values.is_empty() {
                    return Ok(quote(""));
                }
                let parts: Vec<String> = values.iter().map(|v| format!("str({})", v)).collect();
                fold("+", &parts)
            }
            "length" | "upcase" | "downcase" | "string" => {
                arity(pos, name, args, 1)?;
                let host = match name {
                    "length" => "len",
                    "upcase" => "upper",
                    "downcase" => "lower",
                    _ => "str",
                };
                format!("{}({})", host, values[0])
            }
            _ if STATEMENT_FORMS.contains(&name) => {
                return Err(syntax(pos, format!("'{}' cannot be used as a value", name)));
            }
            _ if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') => {
                return Err(syntax(pos, format!("unknown operator '{}'", name)));
            }
            _ => format!("{}({})", lisp_name(name), values.join(", ")),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Dialect;
    use crate::{GeneratedProgram, transpile};

    fn compile(src: &str) -> GeneratedProgram {
        transpile(Dialect::Lisp, src, "test.lisp").unwrap()
    }

    fn texts(lines: &[crate::emitter::Line]) -> Vec<String> {
        lines.iter().map(|l| l.text.clone()).collect()
    }

    fn error(src: &str) -> ParseError {
        transpile(Dialect::Lisp, src, "test.lisp").unwrap_err()
    }

    #[test]
    fn test_print_runs_in_main() {
        let program = compile("(print \"hi\" 42)");
        assert!(program.header.is_empty());
        assert_eq!(
            texts(&program.body),
            vec!["def main():", "print(\"hi\", 42)", "newline()"]
        );
    }

    #[test]
    fn test_defun_returns_last_form() {
        let program = compile("(defun square (x) (* x x))\n(print (square 3))");
        assert_eq!(texts(&program.header), vec!["def square(x):", "return (x * x)"]);
        assert_eq!(program.header[1].indent, 1);
        assert_eq!(texts(&program.body)[1], "print(square(3))");
    }

    #[test]
    fn test_top_level_setq_declares_globals() {
        let program = compile("(setq n 0)\n(defun bump () (setq n (+ n 1)))\n(bump)");
        assert_eq!(
            texts(&program.header),
            vec!["n = None", "def bump():", "n = (n + 1)", "return n"]
        );
        assert_eq!(texts(&program.body), vec!["def main():", "n = 0", "bump()"]);
    }

    #[test]
    fn test_tail_if_returns_from_both_branches() {
        let program = compile("(defun sign (x) (if (< x 0) -1 1))");
        let lines: Vec<(usize, String)> = program
            .header
            .iter()
            .map(|l| (l.indent, l.text.clone()))
            .collect();
        assert_eq!(
            lines,
            vec![
                (0, "def sign(x):".to_string()),
                (1, "if (x < 0):".to_string()),
                (2, "return -1".to_string()),
                (1, "else:".to_string()),
                (2, "return 1".to_string()),
            ]
        );
    }

    #[test]
    fn test_while_loop_and_comparisons() {
        let program = compile("(setq i 0)\n(while (<= i 2) (print i) (setq i (+ i 1)))");
        assert_eq!(
            texts(&program.body),
            vec![
                "def main():",
                "i = 0",
                "while (i <= 2):",
                "print(i)",
                "newline()",
                "i = (i + 1)",
            ]
        );
    }

    #[test]
    fn test_color_names_resolve() {
        let program = compile("(color \"yellow\" \"blue\")\n(color \"Light-Blue\")");
        let body = texts(&program.body);
        assert_eq!(body[1], "set_color(0xFFFF55, 0x0000AA)");
        assert_eq!(body[2], "set_fg(0x5555FF)");
    }

    #[test]
    fn test_unknown_color() {
        let err = error("(color \"mauve\")");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!((err.line, err.column), (1, 8));
    }

    #[test]
    fn test_symbol_names_become_host_names() {
        let program = compile("(setq done? t list-size nil)");
        assert_eq!(texts(&program.header), vec!["done_p = None", "list_size = None"]);
        assert_eq!(
            texts(&program.body)[1..],
            ["done_p = True".to_string(), "list_size = None".to_string()]
        );
    }

    #[test]
    fn test_two_character_operators() {
        let program = compile("(print (/= a b) (>= a 1) (mod a 2))");
        assert_eq!(texts(&program.body)[1], "print((a != b), (a >= 1), (a % 2))");
    }

    #[test]
    fn test_unclosed_paren() {
        let err = error("(print 1\n  (cls)");
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_extra_close_paren() {
        let err = error("(cls))");
        assert_eq!(err.kind, ErrorKind::ParenUnderflow);
        assert_eq!((err.line, err.column), (1, 6));
    }

    #[test]
    fn test_keyword_cannot_be_assigned() {
        let err = error("(setq while 1)");
        assert_eq!(err.kind, ErrorKind::KeywordNotAllowedHere);
    }

    #[test]
    fn test_statement_form_is_not_a_value() {
        let err = error("(setq x (print 1))");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.column, 9);
    }

    #[test]
    fn test_nested_defun_rejected() {
        let err = error("(progn (defun f () 1))");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_goto_arity() {
        let err = error("(goto 1)");
        assert!(err.message.contains("takes 2 arguments"), "{}", err.message);
    }

    #[test]
    fn test_concat_stringifies() {
        let program = compile("(print (concat \"n=\" 5))");
        assert_eq!(texts(&program.body)[1], "print((str(\"n=\") + str(5)))");
    }

    #[test]
    fn test_empty_source() {
        let program = compile("; nothing here\n");
        assert_eq!(texts(&program.body), vec!["def main():", "pass"]);
    }
}
