//! Line-numbered BASIC
//!
//! Physical lines are read whole. Each one starts with a line number and the
//! rest is split into [`TokenClass`]es by an ordered list of regex matchers
//! (first match wins). Translation turns every line into a host function
//! `line_N()` that returns the number of the line to run next, or `None` to
//! stop, and `main()` loops over those numbers.

pub mod encoder;

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use relic_core::PALETTE;
use relic_runtime::quote;
use tracing::debug;

use super::{host_name, minus_one};
use crate::context::ParserContext;
use crate::emitter::Segment;
use crate::error::{ErrorKind, ParseError, Result};

/// Highest line number a tokenized program can store.
pub const MAX_LINE_NUMBER: u32 = 63999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Command,
    Str,
    Variable,
    Number,
    Symbol,
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenClass::Command => "COMMAND",
            TokenClass::Str => "STRING",
            TokenClass::Variable => "VARIABLE",
            TokenClass::Number => "NUMBER",
            TokenClass::Symbol => "SYMBOL",
        };
        f.write_str(name)
    }
}

/// One token of a BASIC line. Commands and variables are upper-cased;
/// strings keep their quotes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicToken {
    pub class: TokenClass,
    pub text: String,
    pub column: usize,
}

impl BasicToken {
    fn is_symbol(&self, symbol: &str) -> bool {
        self.class == TokenClass::Symbol && self.text == symbol
    }

    fn is_command(&self, command: &str) -> bool {
        self.class == TokenClass::Command && self.text == command
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicLine {
    pub number: u32,
    /// Physical line in the source file.
    pub source_line: usize,
    pub tokens: Vec<BasicToken>,
    /// Text after `REM`, verbatim.
    pub remark: Option<String>,
}

type Matcher = (Option<TokenClass>, Regex);

static MATCHERS: LazyLock<Vec<Matcher>> = LazyLock::new(|| {
    [
        (None, r"^\s+"),
        (
            Some(TokenClass::Command),
            r"(?i)^(PRINT|LET|GOTO|IF|THEN|END|REM|CLS|COLOR|LOCATE|LEFT\$|RIGHT\$)",
        ),
        (Some(TokenClass::Str), r#"^"[^"]*""#),
        (Some(TokenClass::Number), r"^\d+(\.\d+)?"),
        (Some(TokenClass::Variable), r"^[A-Za-z][A-Za-z0-9]*\$?"),
        (Some(TokenClass::Symbol), r"^(<>|<=|>=|[-+*/=<>;,():])"),
    ]
    .into_iter()
    .map(|(class, pattern)| (class, Regex::new(pattern).expect("BASIC token pattern")))
    .collect()
});

static LINE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+").expect("line number pattern"));

pub fn parse(ctx: &mut ParserContext) -> Result<()> {
    let lines = read_program(ctx)?;
    debug!(lines = lines.len(), file = ctx.file(), "read BASIC program");
    Translator::new(ctx, &lines).translate()
}

/// Read every numbered line of the program. Blank lines and `#` directive
/// lines are skipped; line numbers must strictly increase.
pub fn read_program(ctx: &mut ParserContext) -> Result<Vec<BasicLine>> {
    let mut lines: Vec<BasicLine> = Vec::new();
    loop {
        let start = ctx.position();
        let mut text = String::new();
        let mut at_end = false;
        loop {
            match ctx.advance()? {
                None => {
                    at_end = true;
                    break;
                }
                Some('\n') => break,
                Some(c) => text.push(c),
            }
        }

        if let Some(line) = parse_line(&text, start.line)? {
            if let Some(previous) = lines.last()
                && line.number <= previous.number
            {
                return Err(ParseError::new(
                    ErrorKind::SyntaxError,
                    start.line,
                    1,
                    format!(
                        "line {} does not follow line {}",
                        line.number, previous.number
                    ),
                ));
            }
            lines.push(line);
        }
        if at_end {
            return Ok(lines);
        }
    }
}

fn parse_line(text: &str, source_line: usize) -> Result<Option<BasicLine>> {
    let trimmed = text.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let indent = text.chars().count() - trimmed.chars().count();

    let Some(digits) = LINE_NUMBER.find(trimmed) else {
        return Err(ParseError::new(
            ErrorKind::SyntaxError,
            source_line,
            indent + 1,
            "every line must begin with a line number",
        ));
    };
    let number = match digits.as_str().parse::<u32>() {
        Ok(n) if n <= MAX_LINE_NUMBER => n,
        _ => {
            return Err(ParseError::new(
                ErrorKind::SyntaxError,
                source_line,
                indent + 1,
                format!(
                    "line number {} is out of range (0-{})",
                    digits.as_str(),
                    MAX_LINE_NUMBER
                ),
            ));
        }
    };

    let (tokens, remark) = tokenize_line(
        &trimmed[digits.end()..],
        source_line,
        indent + 1 + digits.as_str().len(),
    )?;
    Ok(Some(BasicLine {
        number,
        source_line,
        tokens,
        remark,
    }))
}

/// Split the text after a line number into tokens. `column` is the 1-based
/// column of the text's first character.
pub fn tokenize_line(
    text: &str,
    source_line: usize,
    mut column: usize,
) -> Result<(Vec<BasicToken>, Option<String>)> {
    let mut tokens = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('"')
            && !after.contains('"')
        {
            return Err(ParseError::new(
                ErrorKind::StringNotTerminated,
                source_line,
                column,
                "string is not closed before the end of the line",
            ));
        }

        let matched = MATCHERS
            .iter()
            .find_map(|(class, re)| re.find(rest).map(|m| (*class, m.end())));
        let Some((class, len)) = matched else {
            let found = rest.chars().next().map(String::from).unwrap_or_default();
            return Err(ParseError::new(
                ErrorKind::UnexpectedCharacter,
                source_line,
                column,
                format!("unexpected character '{}'", found),
            ));
        };

        let lexeme = &rest[..len];
        if let Some(class) = class {
            let text = match class {
                TokenClass::Command | TokenClass::Variable => lexeme.to_ascii_uppercase(),
                _ => lexeme.to_string(),
            };
            let is_remark = class == TokenClass::Command && text == "REM";
            tokens.push(BasicToken {
                class,
                text,
                column,
            });
            if is_remark {
                let remark = rest[len..].trim_start().to_string();
                return Ok((tokens, Some(remark)));
            }
        }
        column += lexeme.chars().count();
        rest = &rest[len..];
    }
    Ok((tokens, None))
}

/// Host name of a BASIC variable. String variables (`A$`) get an `_s`
/// suffix so `A` and `A$` stay distinct.
fn var_name(text: &str) -> String {
    match text.strip_suffix('$') {
        Some(stem) => format!("{}_s", stem.to_ascii_lowercase()),
        None => host_name(text),
    }
}

fn describe(token: Option<&BasicToken>) -> String {
    match token {
        Some(t) => format!("{} '{}'", t.class, t.text),
        None => "end of line".to_string(),
    }
}

/// Position within one line's tokens.
struct LineCursor<'t> {
    line: &'t BasicLine,
    pos: usize,
}

impl<'t> LineCursor<'t> {
    fn new(line: &'t BasicLine) -> Self {
        LineCursor { line, pos: 0 }
    }

    fn peek(&self) -> Option<&'t BasicToken> {
        self.line.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t BasicToken> {
        let token = self.line.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn at_statement_end(&self) -> bool {
        self.peek().is_none_or(|t| t.is_symbol(":"))
    }

    fn error(&self, at: Option<&BasicToken>, message: impl Into<String>) -> ParseError {
        let column = match at {
            Some(token) => token.column,
            None => self
                .line
                .tokens
                .last()
                .map_or(1, |t| t.column + t.text.chars().count()),
        };
        ParseError::new(ErrorKind::SyntaxError, self.line.source_line, column, message)
    }

    /// A token of `class`, or a SyntaxError naming the class.
    fn expect(&mut self, class: TokenClass, context: &str) -> Result<&'t BasicToken> {
        match self.next() {
            Some(t) if t.class == class => Ok(t),
            other => Err(self.error(
                other,
                format!("expected {} {}, found {}", class, context, describe(other)),
            )),
        }
    }

    fn expect_symbol(&mut self, symbol: &str, context: &str) -> Result<()> {
        match self.next() {
            Some(t) if t.is_symbol(symbol) => Ok(()),
            other => Err(self.error(
                other,
                format!(
                    "expected SYMBOL '{}' {}, found {}",
                    symbol,
                    context,
                    describe(other)
                ),
            )),
        }
    }
}

struct Translator<'a> {
    ctx: &'a mut ParserContext,
    lines: &'a [BasicLine],
    numbers: HashSet<u32>,
}

impl<'a> Translator<'a> {
    fn new(ctx: &'a mut ParserContext, lines: &'a [BasicLine]) -> Self {
        Translator {
            ctx,
            lines,
            numbers: lines.iter().map(|l| l.number).collect(),
        }
    }

    fn emit(&mut self, text: impl Into<String>) {
        self.ctx.emitter.emit(text);
    }

    fn translate(mut self) -> Result<()> {
        self.ctx.emitter.select(Segment::Header);
        self.declare_variables();
        let lines = self.lines;
        for (i, line) in lines.iter().enumerate() {
            let next = lines.get(i + 1).map(|l| l.number);
            self.line_function(line, next)?;
        }
        self.ctx.emitter.select(Segment::Body);
        self.dispatcher();
        Ok(())
    }

    /// BASIC variables are global and start as 0 or "".
    fn declare_variables(&mut self) {
        let mut seen = HashSet::new();
        let lines = self.lines;
        for token in lines.iter().flat_map(|l| &l.tokens) {
            if token.class != TokenClass::Variable || !seen.insert(token.text.as_str()) {
                continue;
            }
            let initial = if token.text.ends_with('$') { "\"\"" } else { "0" };
            self.emit(format!("{} = {}", var_name(&token.text), initial));
        }
    }

    fn line_function(&mut self, line: &BasicLine, next: Option<u32>) -> Result<()> {
        self.emit(format!("def line_{}():", line.number));
        self.ctx.emitter.indent();
        let mut cur = LineCursor::new(line);
        let transferred = self.statements(&mut cur)?;
        if !transferred {
            match next {
                Some(n) => self.emit(format!("return {}", n)),
                None => self.emit("return None"),
            }
        }
        self.ctx.emitter.dedent();
        Ok(())
    }

    /// Statements separated by `:` up to the end of the line. Returns true
    /// when the last one already returned from the line function.
    fn statements(&mut self, cur: &mut LineCursor) -> Result<bool> {
        let mut transferred = false;
        while cur.peek().is_some() {
            transferred = self.statement(cur)?;
            match cur.next() {
                None => break,
                Some(t) if t.is_symbol(":") => {}
                Some(t) => {
                    return Err(cur.error(
                        Some(t),
                        format!("expected ':' or end of line, found {}", describe(Some(t))),
                    ));
                }
            }
        }
        Ok(transferred)
    }

    fn statement(&mut self, cur: &mut LineCursor) -> Result<bool> {
        let Some(token) = cur.next() else {
            return Ok(false);
        };
        match (token.class, token.text.as_str()) {
            (TokenClass::Command, "PRINT") => self.print(cur)?,
            (TokenClass::Command, "LET") => {
                let var = cur.expect(TokenClass::Variable, "after LET")?;
                self.assignment(cur, var)?;
            }
            (TokenClass::Variable, _) => self.assignment(cur, token)?,
            (TokenClass::Command, "GOTO") => {
                let target = self.target(cur)?;
                self.emit(format!("return {}", target));
                return Ok(true);
            }
            (TokenClass::Command, "IF") => self.if_then(cur)?,
            (TokenClass::Command, "CLS") => self.emit("cls()"),
            (TokenClass::Command, "COLOR") => self.color(cur)?,
            (TokenClass::Command, "LOCATE") => {
                let row = self.expression(cur)?;
                cur.expect_symbol(",", "between LOCATE row and column")?;
                let col = self.expression(cur)?;
                self.emit(format!("goto({}, {})", minus_one(&row), minus_one(&col)));
            }
            (TokenClass::Command, "END") => {
                self.emit("return None");
                return Ok(true);
            }
            (TokenClass::Command, "REM") => {
                let remark = cur.line.remark.as_deref().unwrap_or_default();
                self.emit(format!("# {}", remark).trim_end().to_string());
            }
            _ => {
                return Err(cur.error(
                    Some(token),
                    format!("{} cannot start a statement", describe(Some(token))),
                ));
            }
        }
        Ok(false)
    }

    /// A GOTO/THEN target that names an existing line.
    fn target(&mut self, cur: &mut LineCursor) -> Result<u32> {
        let token = cur.expect(TokenClass::Number, "as jump target")?;
        match token.text.parse::<u32>() {
            Ok(n) if self.numbers.contains(&n) => Ok(n),
            _ => Err(cur.error(
                Some(token),
                format!("jump to line {} which does not exist", token.text),
            )),
        }
    }

    fn assignment(&mut self, cur: &mut LineCursor, var: &BasicToken) -> Result<()> {
        cur.expect_symbol("=", &format!("after {}", var.text))?;
        let value = self.expression(cur)?;
        self.emit(format!("{} = {}", var_name(&var.text), value));
        Ok(())
    }

    /// `PRINT a; b, c` concatenates; `,` inserts a blank and a trailing
    /// separator suppresses the line break.
    fn print(&mut self, cur: &mut LineCursor) -> Result<()> {
        let mut items = Vec::new();
        let mut line_break = true;
        while !cur.at_statement_end() {
            items.push(self.expression(cur)?);
            line_break = true;
            match cur.peek() {
                Some(t) if t.is_symbol(";") => {
                    cur.next();
                    line_break = false;
                }
                Some(t) if t.is_symbol(",") => {
                    cur.next();
                    items.push("\" \"".to_string());
                    line_break = false;
                }
                _ => break,
            }
        }
        if !items.is_empty() {
            self.emit(format!("print({})", items.join(", ")));
        }
        if line_break {
            self.emit("newline()");
        }
        Ok(())
    }

    fn if_then(&mut self, cur: &mut LineCursor) -> Result<()> {
        let condition = self.expression(cur)?;
        match cur.next() {
            Some(t) if t.is_command("THEN") => {}
            other => {
                return Err(cur.error(
                    other,
                    format!("expected COMMAND 'THEN', found {}", describe(other)),
                ));
            }
        }
        self.emit(format!("if {}:", condition));
        self.ctx.emitter.indent();
        if cur.peek().is_some_and(|t| t.class == TokenClass::Number) {
            let target = self.target(cur)?;
            self.emit(format!("return {}", target));
        } else {
            if cur.at_statement_end() {
                let at = cur.peek();
                return Err(cur.error(
                    at,
                    format!(
                        "expected a line number or statement after THEN, found {}",
                        describe(at)
                    ),
                ));
            }
            // The rest of the line belongs to the THEN branch.
            self.statements(cur)?;
        }
        self.ctx.emitter.dedent();
        Ok(())
    }

    fn color(&mut self, cur: &mut LineCursor) -> Result<()> {
        let fg = self.color_arg(cur)?;
        if cur.peek().is_some_and(|t| t.is_symbol(",")) {
            cur.next();
            let bg = self.color_arg(cur)?;
            self.emit(format!("set_color({}, {})", fg, bg));
        } else {
            self.emit(format!("set_fg({})", fg));
        }
        Ok(())
    }

    /// A palette index. Literals resolve at compile time.
    fn color_arg(&mut self, cur: &mut LineCursor) -> Result<String> {
        let at = cur.peek();
        let expr = self.expression(cur)?;
        if let Ok(index) = expr.parse::<usize>() {
            return match PALETTE.get(index) {
                Some(rgb) => Ok(rgb.to_string()),
                None => Err(cur.error(
                    at,
                    format!("color {} is outside the palette (0-15)", index),
                )),
            };
        }
        Ok(format!("palette({})", expr))
    }

    fn expression(&mut self, cur: &mut LineCursor) -> Result<String> {
        let left = self.additive(cur)?;
        let op = match cur
            .peek()
            .filter(|t| t.class == TokenClass::Symbol)
            .map(|t| t.text.as_str())
        {
            Some("=") => "==",
            Some("<>") => "!=",
            Some(op @ ("<" | ">" | "<=" | ">=")) => op,
            _ => return Ok(left),
        };
        cur.next();
        let right = self.additive(cur)?;
        Ok(format!("{} {} {}", left, op, right))
    }

    fn additive(&mut self, cur: &mut LineCursor) -> Result<String> {
        let mut left = self.term(cur)?;
        while let Some(op) = cur.peek().filter(|t| t.is_symbol("+") || t.is_symbol("-")) {
            cur.next();
            let right = self.term(cur)?;
            left = format!("{} {} {}", left, op.text, right);
        }
        Ok(left)
    }

    fn term(&mut self, cur: &mut LineCursor) -> Result<String> {
        let mut left = self.factor(cur)?;
        while let Some(op) = cur.peek().filter(|t| t.is_symbol("*") || t.is_symbol("/")) {
            cur.next();
            let right = self.factor(cur)?;
            left = format!("{} {} {}", left, op.text, right);
        }
        Ok(left)
    }

    fn factor(&mut self, cur: &mut LineCursor) -> Result<String> {
        let token = cur.next();
        match token {
            Some(t) if t.class == TokenClass::Number => Ok(t.text.clone()),
            Some(t) if t.class == TokenClass::Str => Ok(string_literal(t)),
            Some(t) if t.class == TokenClass::Variable => Ok(var_name(&t.text)),
            Some(t) if t.is_symbol("(") => {
                let inner = self.expression(cur)?;
                cur.expect_symbol(")", "to close the parenthesis")?;
                Ok(format!("({})", inner))
            }
            Some(t) if t.is_symbol("-") => Ok(format!("-{}", self.factor(cur)?)),
            Some(t) if t.is_command("LEFT$") || t.is_command("RIGHT$") => self.slice(cur, t),
            other => Err(cur.error(
                other,
                format!("expected an expression, found {}", describe(other)),
            )),
        }
    }

    /// `LEFT$("s", n)` / `RIGHT$("s", n)`: a string literal and a number
    /// literal, nothing else.
    fn slice(&mut self, cur: &mut LineCursor, func: &BasicToken) -> Result<String> {
        let name = func.text.as_str();
        cur.expect_symbol("(", &format!("after {}", name))?;
        let source = match cur.next() {
            Some(t) if t.class == TokenClass::Str => string_literal(t),
            other => {
                return Err(cur.error(
                    other,
                    format!(
                        "expected STRING as first argument of {}, found {}",
                        name,
                        describe(other)
                    ),
                ));
            }
        };
        cur.expect_symbol(",", &format!("between the arguments of {}", name))?;
        let count = match cur.next() {
            Some(t) if t.class == TokenClass::Number => t.text.clone(),
            other => {
                return Err(cur.error(
                    other,
                    format!(
                        "expected NUMBER as second argument of {}, found {}",
                        name,
                        describe(other)
                    ),
                ));
            }
        };
        cur.expect_symbol(")", &format!("to close {}", name))?;
        let host = if name == "LEFT$" { "left" } else { "right" };
        Ok(format!("{}({}, {})", host, source, count))
    }

    /// `main()` runs line functions until one returns `None`.
    fn dispatcher(&mut self) {
        self.emit("def main():");
        self.ctx.emitter.indent();
        let lines = self.lines;
        match lines.first() {
            None => self.emit("pass"),
            Some(first) => {
                self.emit(format!("_line = {}", first.number));
                self.emit("while _line != None:");
                self.ctx.emitter.indent();
                for (i, line) in lines.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "elif" };
                    self.emit(format!("{} _line == {}:", keyword, line.number));
                    self.ctx.emitter.indent();
                    self.emit(format!("_line = line_{}()", line.number));
                    self.ctx.emitter.dedent();
                }
                self.ctx.emitter.dedent();
            }
        }
        self.ctx.emitter.dedent();
    }
}

fn string_literal(token: &BasicToken) -> String {
    let inner = token
        .text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(&token.text);
    quote(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Dialect;
    use crate::{GeneratedProgram, transpile};

    fn compile(src: &str) -> GeneratedProgram {
        transpile(Dialect::Basic, src, "test.bas").unwrap()
    }

    fn header(src: &str) -> Vec<(usize, String)> {
        compile(src)
            .header
            .iter()
            .map(|l| (l.indent, l.text.clone()))
            .collect()
    }

    fn error(src: &str) -> ParseError {
        transpile(Dialect::Basic, src, "test.bas").unwrap_err()
    }

    #[test]
    fn test_lines_chain_to_the_next_number() {
        let lines = header("10 PRINT \"HELLO\"\n20 END\n");
        assert_eq!(
            lines,
            vec![
                (0, "def line_10():".to_string()),
                (1, "print(\"HELLO\")".to_string()),
                (1, "newline()".to_string()),
                (1, "return 20".to_string()),
                (0, "def line_20():".to_string()),
                (1, "return None".to_string()),
            ]
        );
    }

    #[test]
    fn test_dispatcher_loops_over_line_numbers() {
        let program = compile("10 CLS\n20 END");
        let body: Vec<&str> = program.body.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(
            body,
            vec![
                "def main():",
                "_line = 10",
                "while _line != None:",
                "if _line == 10:",
                "_line = line_10()",
                "elif _line == 20:",
                "_line = line_20()",
            ]
        );
    }

    #[test]
    fn test_last_line_without_end_stops() {
        let lines = header("10 CLS");
        assert_eq!(lines.last().unwrap().1, "return None");
    }

    #[test]
    fn test_goto_overrides_next_line() {
        let lines = header("10 GOTO 30\n20 PRINT \"SKIPPED\"\n30 END");
        assert_eq!(lines[1], (1, "return 30".to_string()));
        assert_eq!(lines[2], (0, "def line_20():".to_string()));
    }

    #[test]
    fn test_goto_unknown_line() {
        let err = error("10 GOTO 99\n20 END");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!((err.line, err.column), (1, 9));
    }

    #[test]
    fn test_missing_line_number() {
        let err = error("10 CLS\nPRINT \"X\"");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn test_line_numbers_must_increase() {
        let err = error("20 CLS\n10 END");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_blank_and_directive_lines_are_skipped() {
        let program = compile("# banner\n\n10 END\n");
        assert_eq!(program.header.len(), 2);
    }

    #[test]
    fn test_variables_are_declared_globally() {
        let lines = header("10 A$ = \"X\"\n20 LET N = N + 1");
        assert_eq!(lines[0].1, "a_s = \"\"");
        assert_eq!(lines[1].1, "n = 0");
        assert!(lines.iter().any(|(_, t)| t == "a_s = \"X\""));
        assert!(lines.iter().any(|(_, t)| t == "n = n + 1"));
    }

    #[test]
    fn test_print_separators() {
        let lines = header("10 PRINT \"A\"; N, \"B\";");
        assert_eq!(lines[2].1, "print(\"A\", n, \" \", \"B\")");
        assert_eq!(lines[3].1, "return None");
    }

    #[test]
    fn test_print_concatenation_and_slicing() {
        let lines = header("10 PRINT LEFT$(\"HELLO\", 2) + RIGHT$(\"XYZ\", 1)");
        assert_eq!(
            lines[2].1,
            "print(left(\"HELLO\", 2) + right(\"XYZ\", 1))"
        );
    }

    #[test]
    fn test_left_rejects_string_variable() {
        let err = error("10 A$ = \"HELLO\"\n20 PRINT LEFT$(A$, 2)");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.message.contains("expected STRING"), "{}", err.message);
        assert_eq!((err.line, err.column), (2, 16));
    }

    #[test]
    fn test_right_rejects_numeric_variable() {
        let err = error("10 N = 1\n20 PRINT RIGHT$(\"X\", N)");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.message.contains("expected NUMBER"), "{}", err.message);
    }

    #[test]
    fn test_left_requires_number_argument() {
        let err = error("10 PRINT LEFT$(\"HELLO\", \"X\")");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert!(err.message.contains("expected NUMBER"), "{}", err.message);
        assert_eq!(err.column, 25);
    }

    #[test]
    fn test_left_requires_string_argument() {
        let err = error("10 PRINT LEFT$(5, 2)");
        assert!(err.message.contains("expected STRING"), "{}", err.message);
    }

    #[test]
    fn test_right_requires_open_paren() {
        let err = error("10 PRINT RIGHT$ \"X\"");
        assert!(err.message.contains("SYMBOL '('"), "{}", err.message);
    }

    #[test]
    fn test_if_then_line_number() {
        let lines = header("10 IF N > 5 THEN 30\n20 N = N + 1\n30 END");
        assert_eq!(lines[2], (1, "if n > 5:".to_string()));
        assert_eq!(lines[3], (2, "return 30".to_string()));
        assert_eq!(lines[4], (1, "return 20".to_string()));
    }

    #[test]
    fn test_if_then_statements_take_rest_of_line() {
        let lines = header("10 IF A$ = \"Y\" THEN PRINT \"YES\": END\n20 CLS");
        assert_eq!(lines[2], (1, "if a_s == \"Y\":".to_string()));
        assert_eq!(lines[3], (2, "print(\"YES\")".to_string()));
        assert_eq!(lines[5], (2, "return None".to_string()));
        assert_eq!(lines[6], (1, "return 20".to_string()));
    }

    #[test]
    fn test_color_and_locate() {
        let lines = header("10 COLOR 14, 1: LOCATE 5, C");
        assert_eq!(lines[2].1, "set_color(0xFFFF55, 0x0000AA)");
        assert_eq!(lines[3].1, "goto(4, c - 1)");
        let lines = header("10 COLOR N");
        assert_eq!(lines[2].1, "set_fg(palette(n))");
    }

    #[test]
    fn test_color_out_of_palette() {
        let err = error("10 COLOR 16");
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn test_rem_keeps_remark() {
        let lines = header("10 REM draw the \"box\"\n20 END");
        assert_eq!(lines[1].1, "# draw the \"box\"");
    }

    #[test]
    fn test_unterminated_string() {
        let err = error("10 PRINT \"OOPS");
        assert_eq!(err.kind, ErrorKind::StringNotTerminated);
        assert_eq!((err.line, err.column), (1, 10));
    }

    #[test]
    fn test_unexpected_character() {
        let err = error("10 PRINT @");
        assert_eq!(err.kind, ErrorKind::UnexpectedCharacter);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn test_then_cannot_start_a_statement() {
        let err = error("10 THEN");
        assert!(err.message.contains("COMMAND 'THEN'"), "{}", err.message);
    }

    #[test]
    fn test_tokenizer_classes_first_match_wins() {
        let (tokens, remark) = tokenize_line(" print a$;\"x\" <> 12.5", 1, 3).unwrap();
        let classes: Vec<(TokenClass, &str, usize)> = tokens
            .iter()
            .map(|t| (t.class, t.text.as_str(), t.column))
            .collect();
        assert_eq!(
            classes,
            vec![
                (TokenClass::Command, "PRINT", 4),
                (TokenClass::Variable, "A$", 10),
                (TokenClass::Symbol, ";", 12),
                (TokenClass::Str, "\"x\"", 13),
                (TokenClass::Symbol, "<>", 17),
                (TokenClass::Number, "12.5", 20),
            ]
        );
        assert_eq!(remark, None);
    }

    #[test]
    fn test_reserved_host_names_are_mangled() {
        let lines = header("10 LEN = 3");
        assert_eq!(lines[0].1, "len_ = 0");
    }

    #[test]
    fn test_empty_program() {
        let program = compile("");
        assert!(program.header.is_empty());
        let body: Vec<&str> = program.body.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(body, vec!["def main():", "pass"]);
    }
}
