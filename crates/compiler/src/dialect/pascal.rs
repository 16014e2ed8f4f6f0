//! Pascal-style grammar
//!
//! Block structure is driven by an explicit stack of pending close
//! expectations rather than by recursion. Each open block (the program,
//! a routine, a `BEGIN ... END` compound, a `THEN`/`ELSE` branch, a loop
//! body) pushes one [`Expectation`] carrying the closer it requires and
//! the emitter indent to restore when it closes.
//!
//! Routines are emitted as top-level host functions in the header segment;
//! the program block becomes the host `main` in the body segment.

use super::{
    check_parens, error_at, expect_name, expect_op, expect_punct, expect_word, host_name,
    minus_one, unexpected,
};
use crate::context::ParserContext;
use crate::cursor::SourcePosition;
use crate::emitter::Segment;
use crate::error::{ErrorKind, ParseError, Result};
use crate::scanner::{Token, TokenKind, next_token, peek_token};
use relic_core::palette_index;
use relic_runtime::quote;
use std::collections::HashMap;
use tracing::debug;

/// What ends an open block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Closer {
    /// `END.` closes the program block.
    EndDot,
    /// `END;` closes a routine body.
    EndSemicolon,
    /// `END` closes a compound statement.
    End,
    /// The next complete statement closes a branch or loop body.
    Statement,
}

#[derive(Debug)]
struct Routine {
    /// Lowercase source name.
    name: String,
    host: String,
    params: Vec<String>,
    /// `(source name, host name, default)` for each local variable.
    locals: Vec<(String, String, &'static str)>,
    result_default: Option<&'static str>,
    in_body: bool,
}

#[derive(Debug)]
enum Frame {
    Program { in_body: bool },
    Routine(Routine),
    Compound,
    Then,
    Else,
    Loop,
}

impl Frame {
    fn describe(&self) -> &'static str {
        match self {
            Frame::Program { .. } => "PROGRAM",
            Frame::Routine(r) if r.result_default.is_some() => "FUNCTION",
            Frame::Routine(_) => "PROCEDURE",
            Frame::Compound => "BEGIN",
            Frame::Then | Frame::Else => "IF",
            Frame::Loop => "loop",
        }
    }

    fn in_declarations(&self) -> bool {
        match self {
            Frame::Program { in_body } => !in_body,
            Frame::Routine(r) => !r.in_body,
            _ => false,
        }
    }
}

#[derive(Debug)]
struct Expectation {
    frame: Frame,
    closer: Closer,
    /// Emitter indent when the block opened.
    indent: usize,
    /// Emitted line count when the block's body started.
    body_start: usize,
    opened: SourcePosition,
}

#[derive(Debug, Clone)]
struct RoutineSig {
    host: String,
    arity: usize,
    is_function: bool,
}

const RESULT_VAR: &str = "_result";

pub fn parse(ctx: &mut ParserContext) -> Result<()> {
    let mut parser = PascalParser::new(ctx);
    parser.parse()?;
    debug_assert_eq!(parser.open_blocks(), 0);
    Ok(())
}

pub struct PascalParser<'a> {
    ctx: &'a mut ParserContext,
    stack: Vec<Expectation>,
    globals: HashMap<String, String>,
    routines: HashMap<String, RoutineSig>,
}

impl<'a> PascalParser<'a> {
    pub fn new(ctx: &'a mut ParserContext) -> Self {
        PascalParser {
            ctx,
            stack: Vec::new(),
            globals: HashMap::new(),
            routines: HashMap::new(),
        }
    }

    /// Number of blocks still waiting for their closer.
    pub fn open_blocks(&self) -> usize {
        self.stack.len()
    }

    pub fn parse(&mut self) -> Result<()> {
        let start = expect_word(self.ctx, "program")?;
        let (name, _) = expect_name(self.ctx, "a program name")?;
        expect_punct(self.ctx, ';')?;
        debug!(program = %name, "pascal program");
        self.push(Frame::Program { in_body: false }, Closer::EndDot, &start);

        while let Some(top) = self.stack.last() {
            if top.frame.in_declarations() {
                self.declaration()?;
            } else {
                self.statement()?;
            }
        }
        check_parens(self.ctx)
    }

    fn next(&mut self) -> Result<Token> {
        next_token(self.ctx)
    }

    fn peek(&mut self) -> Result<Token> {
        peek_token(self.ctx)
    }

    fn emit(&mut self, text: impl Into<String>) {
        self.ctx.emitter.emit(text);
    }

    fn is_keyword(&self, word: &str) -> bool {
        self.ctx.rules().is_keyword(word)
    }

    fn push(&mut self, frame: Frame, closer: Closer, token: &Token) {
        let indent = self.ctx.emitter.level();
        if closer == Closer::Statement {
            self.ctx.emitter.indent();
        }
        self.stack.push(Expectation {
            frame,
            closer,
            indent,
            body_start: self.ctx.emitter.len(),
            opened: token.pos,
        });
    }

    /// Finish a block's emitted body and restore the indent it opened at.
    fn close(&mut self, block: &Expectation) {
        if self.ctx.emitter.len() == block.body_start && block.closer != Closer::End {
            self.emit("pass");
        }
        while self.ctx.emitter.level() > block.indent {
            self.ctx.emitter.dedent();
        }
    }

    fn unclosed(&self) -> ParseError {
        match self.stack.last() {
            Some(top) => ParseError::new(
                ErrorKind::StructuralImbalance,
                top.opened.line,
                top.opened.column,
                format!(
                    "{} opened here is never closed before end of input",
                    top.frame.describe()
                ),
            ),
            None => self.ctx.error(ErrorKind::StructuralImbalance, "unexpected end of input"),
        }
    }

    fn innermost_routine(&self) -> Option<&Routine> {
        self.stack.iter().rev().find_map(|e| match &e.frame {
            Frame::Routine(r) => Some(r),
            _ => None,
        })
    }

    fn current_function(&self) -> Option<&str> {
        self.innermost_routine()
            .filter(|r| r.result_default.is_some())
            .map(|r| r.name.as_str())
    }

    /// Host name for a variable or routine reference.
    fn resolve(&self, name: &str) -> String {
        let lower = name.to_ascii_lowercase();
        if let Some(routine) = self.innermost_routine() {
            if let Some((_, host, _)) = routine.locals.iter().find(|(src, _, _)| *src == lower) {
                return host.clone();
            }
            if routine.params.contains(&lower) {
                return host_name(&lower);
            }
        }
        if let Some(host) = self.globals.get(&lower) {
            return host.clone();
        }
        if let Some(sig) = self.routines.get(&lower) {
            return sig.host.clone();
        }
        host_name(&lower)
    }

    // --- declarations ---

    fn declaration(&mut self) -> Result<()> {
        let token = self.next()?;
        if token.is_end() {
            return Err(self.unclosed());
        }
        let Some(word) = token.identifier().map(str::to_ascii_lowercase) else {
            return Err(error_at(
                &token,
                ErrorKind::SyntaxError,
                format!("expected VAR, PROCEDURE, FUNCTION or BEGIN, found {}", token.kind),
            ));
        };
        match word.as_str() {
            "var" => self.var_block(),
            "procedure" => self.routine_header(&token, false),
            "function" => self.routine_header(&token, true),
            "begin" => {
                self.enter_body();
                Ok(())
            }
            "end" => Err(error_at(
                &token,
                ErrorKind::StructuralImbalance,
                "END without a matching BEGIN",
            )),
            _ => Err(error_at(
                &token,
                ErrorKind::SyntaxError,
                format!("expected VAR, PROCEDURE, FUNCTION or BEGIN, found {}", token.kind),
            )),
        }
    }

    /// `VAR a, b: integer; s: string;`
    fn var_block(&mut self) -> Result<()> {
        loop {
            let names = self.name_list()?;
            expect_op(self.ctx, ':')?;
            let default = self.type_default()?;
            expect_punct(self.ctx, ';')?;
            for name in names {
                self.declare(name, default);
            }
            let more = self.peek()?;
            match more.identifier() {
                Some(w) if !self.is_keyword(w) => continue,
                _ => return Ok(()),
            }
        }
    }

    fn declare(&mut self, name: String, default: &'static str) {
        let lower = name.to_ascii_lowercase();
        let host = host_name(&lower);
        let shadows = self.globals.contains_key(&lower);
        match self.stack.last_mut().map(|e| &mut e.frame) {
            Some(Frame::Routine(routine)) => {
                let host = if shadows {
                    format!("{}_{}", routine.host, host)
                } else {
                    host
                };
                routine.locals.push((lower, host, default));
            }
            _ => {
                self.ctx.emitter.select(Segment::Header);
                self.ctx.emitter.emit(format!("{} = {}", host, default));
                self.globals.insert(lower, host);
            }
        }
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let (first, _) = expect_name(self.ctx, "a variable name")?;
        let mut names = vec![first];
        while self.peek()?.is_punct(',') {
            self.next()?;
            let (name, _) = expect_name(self.ctx, "a variable name")?;
            names.push(name);
        }
        Ok(names)
    }

    /// A type name, mapped to the host literal its variables start with.
    fn type_default(&mut self) -> Result<&'static str> {
        let token = self.next()?;
        let Some(name) = token.identifier().map(str::to_ascii_lowercase) else {
            return Err(unexpected(&token, "a type name"));
        };
        if self.peek()?.is_punct('[') {
            self.next()?;
            let size = self.next()?;
            if !matches!(size.kind, TokenKind::Number(_)) {
                return Err(unexpected(&size, "a string length"));
            }
            expect_punct(self.ctx, ']')?;
        }
        Ok(match name.as_str() {
            "integer" | "longint" | "shortint" | "byte" | "word" | "cardinal" => "0",
            "real" | "double" | "single" | "extended" => "0.0",
            "string" | "char" => "\"\"",
            "boolean" => "False",
            _ => "None",
        })
    }

    /// `PROCEDURE name [(params)];` or `FUNCTION name [(params)]: type;`
    fn routine_header(&mut self, token: &Token, is_function: bool) -> Result<()> {
        let (name, _) = expect_name(self.ctx, "a routine name")?;
        let lower = name.to_ascii_lowercase();
        let mut params = Vec::new();
        if self.peek()?.is_punct('(') {
            self.next()?;
            loop {
                if self.peek()?.is_word("var") {
                    self.next()?;
                }
                let names = self.name_list()?;
                expect_op(self.ctx, ':')?;
                self.type_default()?;
                params.extend(names.iter().map(|n| n.to_ascii_lowercase()));
                if self.peek()?.is_punct(';') {
                    self.next()?;
                } else {
                    break;
                }
            }
            expect_punct(self.ctx, ')')?;
        }
        let result_default = if is_function {
            expect_op(self.ctx, ':')?;
            Some(self.type_default()?)
        } else {
            None
        };
        expect_punct(self.ctx, ';')?;

        let host = host_name(&lower);
        self.routines.insert(
            lower.clone(),
            RoutineSig {
                host: host.clone(),
                arity: params.len(),
                is_function,
            },
        );
        debug!(routine = %lower, params = params.len(), is_function, "routine declaration");
        self.push(
            Frame::Routine(Routine {
                name: lower,
                host,
                params,
                locals: Vec::new(),
                result_default,
                in_body: false,
            }),
            Closer::EndSemicolon,
            token,
        );
        Ok(())
    }

    /// The `BEGIN` of a program or routine: emit the host function header.
    fn enter_body(&mut self) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        let emitter = &mut self.ctx.emitter;
        match &mut top.frame {
            Frame::Program { in_body } => {
                emitter.select(Segment::Body);
                top.indent = emitter.level();
                emitter.emit("def main():");
                emitter.indent();
                *in_body = true;
                top.body_start = emitter.len();
            }
            Frame::Routine(routine) => {
                emitter.select(Segment::Header);
                top.indent = emitter.level();
                let params: Vec<String> = routine.params.iter().map(|p| host_name(p)).collect();
                emitter.emit(format!("def {}({}):", routine.host, params.join(", ")));
                emitter.indent();
                top.body_start = emitter.len();
                for (_, host, default) in &routine.locals {
                    emitter.emit(format!("{} = {}", host, default));
                }
                if let Some(default) = routine.result_default {
                    emitter.emit(format!("{} = {}", RESULT_VAR, default));
                }
                routine.in_body = true;
            }
            _ => {}
        }
    }

    // --- statements ---

    fn statement(&mut self) -> Result<()> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::EndOfInput => Err(self.unclosed()),
            TokenKind::Punctuation(';') => {
                if self.stack.last().is_some_and(|e| e.closer == Closer::Statement) {
                    self.statement_done()?;
                }
                Ok(())
            }
            TokenKind::Identifier(word) => {
                let lower = word.to_ascii_lowercase();
                match lower.as_str() {
                    "end" => self.end_block(),
                    "begin" => {
                        self.push(Frame::Compound, Closer::End, &token);
                        Ok(())
                    }
                    "if" => {
                        let cond = self.expression()?;
                        expect_word(self.ctx, "then")?;
                        self.emit(format!("if {}:", cond));
                        self.push(Frame::Then, Closer::Statement, &token);
                        Ok(())
                    }
                    "while" => {
                        let cond = self.expression()?;
                        expect_word(self.ctx, "do")?;
                        self.emit(format!("while {}:", cond));
                        self.push(Frame::Loop, Closer::Statement, &token);
                        Ok(())
                    }
                    "for" => self.for_loop(&token),
                    "procedure" | "function" | "var" | "program" => Err(error_at(
                        &token,
                        ErrorKind::SyntaxError,
                        format!("{} is not allowed inside a statement block", token.kind),
                    )),
                    _ if self.is_keyword(&lower) => Err(error_at(
                        &token,
                        ErrorKind::KeywordNotAllowedHere,
                        format!("{} cannot start a statement", token.kind),
                    )),
                    _ => self.simple_statement(word),
                }
            }
            _ => Err(unexpected(&token, "a statement")),
        }
    }

    /// A statement just completed: close every branch or loop body that
    /// was waiting for it, picking up a following `ELSE`.
    fn statement_done(&mut self) -> Result<()> {
        while let Some(top) = self.stack.last() {
            let frame_is_then = matches!(top.frame, Frame::Then);
            if top.closer != Closer::Statement {
                break;
            }
            if let Some(block) = self.stack.pop() {
                self.close(&block);
            }
            if frame_is_then {
                let token = self.peek()?;
                if token.is_word("else") {
                    self.next()?;
                    self.emit("else:");
                    self.push(Frame::Else, Closer::Statement, &token);
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    fn end_block(&mut self) -> Result<()> {
        loop {
            let Some(block) = self.stack.pop() else {
                return Err(self.ctx.error(
                    ErrorKind::StructuralImbalance,
                    "END without a matching BEGIN",
                ));
            };
            match block.closer {
                // An empty branch or loop body ends at END.
                Closer::Statement => self.close(&block),
                Closer::End => {
                    self.close(&block);
                    return self.statement_done();
                }
                Closer::EndSemicolon => {
                    let after = self.next()?;
                    if !after.is_punct(';') {
                        return Err(error_at(
                            &after,
                            ErrorKind::SyntaxError,
                            format!(
                                "END of {} must be followed by ';', found {}",
                                block.frame.describe(),
                                after.kind
                            ),
                        ));
                    }
                    if let Frame::Routine(routine) = &block.frame
                        && routine.result_default.is_some()
                    {
                        self.emit(format!("return {}", RESULT_VAR));
                    }
                    self.close(&block);
                    return Ok(());
                }
                Closer::EndDot => {
                    let after = self.next()?;
                    if !after.is_punct('.') {
                        return Err(error_at(
                            &after,
                            ErrorKind::SyntaxError,
                            format!("expected '.' after the final END, found {}", after.kind),
                        ));
                    }
                    let rest = self.peek()?;
                    if !rest.is_end() {
                        return Err(error_at(
                            &rest,
                            ErrorKind::SyntaxError,
                            format!("unexpected {} after the final 'END.'", rest.kind),
                        ));
                    }
                    self.close(&block);
                    return Ok(());
                }
            }
        }
    }

    /// `FOR i := a TO|DOWNTO b DO`
    fn for_loop(&mut self, token: &Token) -> Result<()> {
        let (var, _) = expect_name(self.ctx, "a loop variable")?;
        let var = self.resolve(&var);
        expect_op(self.ctx, ':')?;
        expect_op(self.ctx, '=')?;
        let start = self.expression()?;
        let direction = self.next()?;
        let downto = if direction.is_word("to") {
            false
        } else if direction.is_word("downto") {
            true
        } else {
            return Err(unexpected(&direction, "TO or DOWNTO"));
        };
        let end = self.expression()?;
        let end = if end.contains(' ') {
            format!("({})", end)
        } else {
            end
        };
        expect_word(self.ctx, "do")?;
        let range = if downto {
            format!("range({}, {} - 1, -1)", start, end)
        } else {
            format!("range({}, {} + 1)", start, end)
        };
        self.emit(format!("for {} in {}:", var, range));
        self.push(Frame::Loop, Closer::Statement, token);
        Ok(())
    }

    /// Assignment or procedure call.
    fn simple_statement(&mut self, name: &str) -> Result<()> {
        let lower = name.to_ascii_lowercase();
        let next = self.peek()?;
        if next.is_op(':') {
            self.next()?;
            expect_op(self.ctx, '=')?;
            let value = self.expression()?;
            let target = if self.current_function() == Some(lower.as_str()) {
                RESULT_VAR.to_string()
            } else {
                self.resolve(name)
            };
            self.emit(format!("{} = {}", target, value));
        } else {
            let args = if next.is_punct('(') {
                self.call_args()?
            } else {
                Vec::new()
            };
            self.call_statement(&next, &lower, args)?;
        }
        self.statement_done()
    }

    fn call_statement(&mut self, at: &Token, name: &str, args: Vec<String>) -> Result<()> {
        let arity = |expected: usize| -> Result<()> {
            if args.len() == expected {
                Ok(())
            } else {
                Err(error_at(
                    at,
                    ErrorKind::SyntaxError,
                    format!("{} takes {} argument(s), got {}", name, expected, args.len()),
                ))
            }
        };
        match name {
            "write" => self.emit(format!("print({})", args.join(", "))),
            "writeln" => {
                if !args.is_empty() {
                    self.emit(format!("print({})", args.join(", ")));
                }
                self.emit("newline()");
            }
            "gotoxy" => {
                arity(2)?;
                self.emit(format!(
                    "goto({}, {})",
                    minus_one(&args[1]),
                    minus_one(&args[0])
                ));
            }
            "clrscr" => {
                arity(0)?;
                self.emit("cls()");
            }
            "textcolor" => {
                arity(1)?;
                self.emit(format!("set_fg(palette({}))", args[0]));
            }
            "textbackground" => {
                arity(1)?;
                self.emit(format!("set_bg(palette({}))", args[0]));
            }
            _ => {
                let callee = self.resolve(name);
                self.emit(format!("{}({})", callee, args.join(", ")));
            }
        }
        Ok(())
    }

    fn call_args(&mut self) -> Result<Vec<String>> {
        expect_punct(self.ctx, '(')?;
        let mut args = Vec::new();
        if self.peek()?.is_punct(')') {
            self.next()?;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            let token = self.next()?;
            if token.is_punct(')') {
                return Ok(args);
            }
            if !token.is_punct(',') {
                return Err(unexpected(&token, "',' or ')'"));
            }
        }
    }

    // --- expressions ---

    fn expression(&mut self) -> Result<String> {
        let left = self.simple_expression()?;
        let token = self.peek()?;
        let op = match token.kind {
            TokenKind::Operator('=') => {
                self.next()?;
                "=="
            }
            TokenKind::Operator('<') => {
                self.next()?;
                match self.ctx.lookahead() {
                    Some('>') => {
                        self.next()?;
                        "!="
                    }
                    Some('=') => {
                        self.next()?;
                        "<="
                    }
                    _ => "<",
                }
            }
            TokenKind::Operator('>') => {
                self.next()?;
                if self.ctx.lookahead() == Some('=') {
                    self.next()?;
                    ">="
                } else {
                    ">"
                }
            }
            _ => return Ok(left),
        };
        let right = self.simple_expression()?;
        Ok(format!("{} {} {}", left, op, right))
    }

    fn simple_expression(&mut self) -> Result<String> {
        let mut left = self.term()?;
        loop {
            let token = self.peek()?;
            if let TokenKind::Operator(c @ ('+' | '-')) = token.kind {
                self.next()?;
                let right = self.term()?;
                left = format!("{} {} {}", left, c, right);
            } else if token.is_word("or") {
                self.next()?;
                let right = self.term()?;
                left = format!("({} or {})", left, right);
            } else {
                return Ok(left);
            }
        }
    }

    fn term(&mut self) -> Result<String> {
        let mut left = self.factor()?;
        loop {
            let token = self.peek()?;
            let op = match &token.kind {
                TokenKind::Operator('*') => "*",
                TokenKind::Operator('/') => "/",
                _ if token.is_word("div") => "//",
                _ if token.is_word("mod") => "%",
                _ if token.is_word("and") => "and",
                _ => return Ok(left),
            };
            self.next()?;
            let right = self.factor()?;
            left = if op == "and" {
                format!("({} and {})", left, right)
            } else {
                format!("{} {} {}", left, op, right)
            };
        }
    }

    fn factor(&mut self) -> Result<String> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::Number(n) => Ok(n.clone()),
            TokenKind::StringLiteral(s) => Ok(quote(s)),
            TokenKind::Operator('-') => Ok(format!("-{}", self.factor()?)),
            TokenKind::Operator('+') => self.factor(),
            TokenKind::Punctuation('(') => {
                let inner = self.expression()?;
                expect_punct(self.ctx, ')')?;
                Ok(format!("({})", inner))
            }
            TokenKind::Identifier(word) => {
                let lower = word.to_ascii_lowercase();
                match lower.as_str() {
                    "not" => Ok(format!("(not {})", self.factor()?)),
                    "true" => Ok("True".to_string()),
                    "false" => Ok("False".to_string()),
                    _ if self.is_keyword(&lower) => Err(error_at(
                        &token,
                        ErrorKind::KeywordNotAllowedHere,
                        format!("keyword {} used in an expression", token.kind),
                    )),
                    _ => self.name_reference(word),
                }
            }
            _ => Err(unexpected(&token, "an expression")),
        }
    }

    fn name_reference(&mut self, word: &str) -> Result<String> {
        let lower = word.to_ascii_lowercase();
        if self.peek()?.is_punct('(') {
            let args = self.call_args()?;
            return Ok(match lower.as_str() {
                "length" => format!("len({})", args.join(", ")),
                "upcase" => format!("upper({})", args.join(", ")),
                "lowercase" => format!("lower({})", args.join(", ")),
                "copy" => format!("substr({})", args.join(", ")),
                "trunc" | "round" => format!("int({})", args.join(", ")),
                "concat" => format!("({})", args.join(" + ")),
                _ => format!("{}({})", self.resolve(word), args.join(", ")),
            });
        }
        let is_variable = self.globals.contains_key(&lower)
            || self.innermost_routine().is_some_and(|r| {
                r.params.contains(&lower) || r.locals.iter().any(|(src, _, _)| *src == lower)
            });
        if !is_variable {
            if let Some(sig) = self.routines.get(&lower)
                && sig.is_function
                && sig.arity == 0
            {
                return Ok(format!("{}()", sig.host));
            }
            // CRT color constants evaluate to their palette index.
            if let Some(index) = self.ctx.rules().color(&lower).and_then(palette_index) {
                return Ok(index.to_string());
            }
        }
        Ok(self.resolve(word))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Dialect;
    use crate::transpile;

    fn parse_source(src: &str) -> (Result<()>, usize) {
        let mut ctx = ParserContext::new(Dialect::Pascal, src, "test.pas");
        let mut parser = PascalParser::new(&mut ctx);
        let result = parser.parse();
        let open = parser.open_blocks();
        (result, open)
    }

    fn lines(src: &str) -> (Vec<String>, Vec<String>) {
        let program = transpile(Dialect::Pascal, src, "test.pas").unwrap();
        let render = |lines: &[crate::emitter::Line]| -> Vec<String> {
            lines
                .iter()
                .map(|l| format!("{}{}", "\t".repeat(l.indent), l.text))
                .collect()
        };
        (render(&program.header), render(&program.body))
    }

    #[test]
    fn test_minimal_program_closes_every_block() {
        let (result, open) = parse_source("PROGRAM test; BEGIN END.");
        assert!(result.is_ok());
        assert_eq!(open, 0);
    }

    #[test]
    fn test_missing_final_dot() {
        let (result, _) = parse_source("PROGRAM test; BEGIN END");
        assert_eq!(result.unwrap_err().kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_end_without_begin_is_structural() {
        let err = transpile(Dialect::Pascal, "PROGRAM t;\nVAR i: integer;\nEND.", "t")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
        assert_eq!((err.line, err.column), (3, 1));

        let err = transpile(Dialect::Pascal, "PROGRAM t;\nPROCEDURE p;\nEND;\nBEGIN END.", "t")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
    }

    #[test]
    fn test_text_after_final_end_is_rejected() {
        let err = transpile(Dialect::Pascal, "PROGRAM t;\nBEGIN END.\nwriteln('x')", "t")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!((err.line, err.column), (3, 1));
        let src = "PROGRAM t; BEGIN END. { trailing comment }\n";
        assert!(transpile(Dialect::Pascal, src, "t").is_ok());
    }

    #[test]
    fn test_routine_end_needs_semicolon() {
        let err = transpile(
            Dialect::Pascal,
            "PROGRAM t; PROCEDURE p; BEGIN END. BEGIN END.",
            "t",
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_non_block_starter_is_syntax_error() {
        let err = transpile(Dialect::Pascal, "PROGRAM t;\nwriteln('x');", "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
        assert_eq!((err.line, err.column), (2, 1));
    }

    #[test]
    fn test_missing_end_is_structural() {
        let err = transpile(Dialect::Pascal, "PROGRAM t;\nBEGIN\n  writeln('x');", "t")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
    }

    #[test]
    fn test_unterminated_brace_comment_position() {
        let src = "PROGRAM x;\n  { never closed\n\nBEGIN END.";
        let err = transpile(Dialect::Pascal, src, "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnterminatedComment);
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_nested_comments_are_skipped() {
        let src = "PROGRAM x; { a { nested } comment } (* b (* c *) *) BEGIN END.";
        assert!(transpile(Dialect::Pascal, src, "t").is_ok());
    }

    #[test]
    fn test_full_program() {
        let src = "\
PROGRAM demo;
VAR n: integer;
FUNCTION sq(x: integer): integer;
BEGIN
  sq := x * x
END;
BEGIN
  n := sq(3);
  IF n > 5 THEN writeln('big') ELSE writeln('small');
  WHILE n > 0 DO n := n - 4;
  FOR n := 1 TO 3 DO BEGIN write(n); write(' ') END
END.
";
        let (header, body) = lines(src);
        assert_eq!(
            header,
            vec![
                "n = 0",
                "def sq(x):",
                "\t_result = 0",
                "\t_result = x * x",
                "\treturn _result",
            ]
        );
        assert_eq!(
            body,
            vec![
                "def main():",
                "\tn = sq(3)",
                "\tif n > 5:",
                "\t\tprint(\"big\")",
                "\t\tnewline()",
                "\telse:",
                "\t\tprint(\"small\")",
                "\t\tnewline()",
                "\twhile n > 0:",
                "\t\tn = n - 4",
                "\tfor n in range(1, 3 + 1):",
                "\t\tprint(n)",
                "\t\tprint(\" \")",
            ]
        );
    }

    #[test]
    fn test_local_shadowing_global_is_renamed() {
        let src = "PROGRAM t; VAR i: integer;\nPROCEDURE p; VAR i: integer; BEGIN i := 5 END;\nBEGIN i := 1; p END.";
        let (header, body) = lines(src);
        assert_eq!(header, vec!["i = 0", "def p():", "\tp_i = 0", "\tp_i = 5"]);
        assert_eq!(body, vec!["def main():", "\ti = 1", "\tp()"]);
    }

    #[test]
    fn test_crt_builtins() {
        let src = "PROGRAM t; BEGIN clrscr; gotoxy(10, 5); textcolor(Yellow); textbackground(1) END.";
        let (_, body) = lines(src);
        assert_eq!(
            &body[1..],
            &["\tcls()", "\tgoto(4, 9)", "\tset_fg(palette(14))", "\tset_bg(palette(1))"]
        );
    }

    #[test]
    fn test_downto_and_empty_bodies() {
        let src = "PROGRAM t; VAR i: integer; BEGIN FOR i := 3 DOWNTO 1 DO ; IF i = 1 THEN BEGIN END END.";
        let (_, body) = lines(src);
        assert_eq!(
            body,
            vec![
                "def main():",
                "\tfor i in range(3, 1 - 1, -1):",
                "\t\tpass",
                "\tif i == 1:",
                "\t\tpass",
            ]
        );
    }

    #[test]
    fn test_boolean_operators_keep_precedence() {
        let src = "PROGRAM t; VAR a: boolean; BEGIN a := not (1 < 2) or true and false END.";
        let (_, body) = lines(src);
        assert_eq!(body[1], "\ta = ((not (1 < 2)) or (True and False))");
    }

    #[test]
    fn test_string_declarations_and_doubled_quotes() {
        let src = "PROGRAM t; VAR s: string[20]; BEGIN s := 'it''s' END.";
        let (header, body) = lines(src);
        assert_eq!(header, vec!["s = \"\""]);
        assert_eq!(body[1], "\ts = \"it's\"");
    }

    #[test]
    fn test_gotoxy_arity() {
        let err = transpile(Dialect::Pascal, "PROGRAM t; BEGIN gotoxy(1) END.", "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::SyntaxError);
    }

    #[test]
    fn test_gotoxy_with_minimum_integer_literal() {
        let src = "PROGRAM t;\nBEGIN\n  gotoxy(1, -9223372036854775808)\nEND.\n";
        let (_, body) = lines(src);
        assert!(body[1].starts_with("\tgoto("), "{}", body[1]);
        assert!(body[1].ends_with(" - 1, 0)"), "{}", body[1]);
    }
}
