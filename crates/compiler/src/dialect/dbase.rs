//! dBase-style 4GL grammar
//!
//! Statement-oriented: every statement starts with a keyword, `@`, `?`, or
//! an assignment target. Top-level statements become the body of the host
//! `main` function; `CLASS` declarations go to the header segment.
//!
//! Block structure (`IF`, `FOR`, `DO WHILE`) is tracked on a stack so a
//! closer that does not match the innermost opener, or an opener still open
//! at end of input, is a structural error.

use super::{
    attr_name, check_parens, error_at, expect_name, expect_op, expect_punct, expect_word,
    host_name, unexpected,
};
use std::collections::HashSet;

use crate::context::ParserContext;
use crate::cursor::SourcePosition;
use crate::emitter::Segment;
use crate::error::{ErrorKind, ParseError, Result};
use crate::scanner::{Token, TokenKind, next_token, peek_token};
use relic_core::{DEFAULT_BG, DEFAULT_FG};
use relic_runtime::quote;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    Say,
    Set,
    Color,
    To,
    For,
    Next,
    Step,
    Class,
    Of,
    EndClass,
    Local,
    Parameter,
    If,
    Else,
    EndIf,
    Do,
    While,
    EndDo,
    Clear,
    Return,
    New,
    This,
}

impl Keyword {
    fn lookup(word: &str) -> Option<Keyword> {
        Some(match word.to_ascii_lowercase().as_str() {
            "say" => Keyword::Say,
            "set" => Keyword::Set,
            "color" => Keyword::Color,
            "to" => Keyword::To,
            "for" => Keyword::For,
            "next" => Keyword::Next,
            "step" => Keyword::Step,
            "class" => Keyword::Class,
            "of" => Keyword::Of,
            "endclass" => Keyword::EndClass,
            "local" => Keyword::Local,
            "parameter" => Keyword::Parameter,
            "if" => Keyword::If,
            "else" => Keyword::Else,
            "endif" => Keyword::EndIf,
            "do" => Keyword::Do,
            "while" => Keyword::While,
            "enddo" => Keyword::EndDo,
            "clear" => Keyword::Clear,
            "return" => Keyword::Return,
            "new" => Keyword::New,
            "this" => Keyword::This,
            _ => return None,
        })
    }
}

/// The visual control kinds a class can derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    Form,
    Container,
    Grid,
    PushButton,
    Memo,
    Text,
    EditField,
}

impl ClassKind {
    fn lookup(word: &str) -> Option<ClassKind> {
        Some(match word.to_ascii_lowercase().as_str() {
            "form" => ClassKind::Form,
            "container" => ClassKind::Container,
            "grid" => ClassKind::Grid,
            "pushbutton" => ClassKind::PushButton,
            "memo" => ClassKind::Memo,
            "text" => ClassKind::Text,
            "editfield" => ClassKind::EditField,
            _ => return None,
        })
    }

    fn host_name(self) -> &'static str {
        match self {
            ClassKind::Form => "Form",
            ClassKind::Container => "Container",
            ClassKind::Grid => "Grid",
            ClassKind::PushButton => "PushButton",
            ClassKind::Memo => "Memo",
            ClassKind::Text => "Text",
            ClassKind::EditField => "EditField",
        }
    }

    /// Attribute defaults every instance of this kind starts with.
    fn defaults(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ClassKind::Form => &[
                ("top", "0"),
                ("left", "0"),
                ("width", "80"),
                ("height", "25"),
                ("caption", "\"\""),
            ],
            ClassKind::Container => &[
                ("top", "0"),
                ("left", "0"),
                ("width", "40"),
                ("height", "10"),
            ],
            ClassKind::Grid => &[
                ("top", "0"),
                ("left", "0"),
                ("rows", "10"),
                ("cols", "4"),
            ],
            ClassKind::PushButton => &[
                ("top", "0"),
                ("left", "0"),
                ("width", "10"),
                ("caption", "\"\""),
            ],
            ClassKind::Memo => &[
                ("top", "0"),
                ("left", "0"),
                ("width", "30"),
                ("height", "5"),
                ("value", "\"\""),
            ],
            ClassKind::Text => &[("top", "0"), ("left", "0"), ("text", "\"\"")],
            ClassKind::EditField => &[
                ("top", "0"),
                ("left", "0"),
                ("width", "20"),
                ("value", "\"\""),
            ],
        }
    }
}

/// Builtin function names and the host builtin each maps to.
const BUILTINS: &[(&str, &str)] = &[
    ("upper", "upper"),
    ("lower", "lower"),
    ("len", "len"),
    ("str", "str"),
    ("substr", "substr"),
    ("left", "left"),
    ("right", "right"),
    ("val", "val"),
];

#[derive(Debug)]
enum BlockKind {
    If { else_seen: bool },
    For { var: String },
    DoWhile,
}

impl BlockKind {
    fn opener(&self) -> &'static str {
        match self {
            BlockKind::If { .. } => "IF",
            BlockKind::For { .. } => "FOR",
            BlockKind::DoWhile => "DO WHILE",
        }
    }

    fn closer(&self) -> &'static str {
        match self {
            BlockKind::If { .. } => "ENDIF",
            BlockKind::For { .. } => "NEXT",
            BlockKind::DoWhile => "ENDDO",
        }
    }
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    opened: SourcePosition,
}

struct ClassScope {
    name: String,
    opened: SourcePosition,
    locals: Vec<String>,
}

/// Control signal returned by each statement.
enum Flow {
    Continue,
    ClassEnd,
    End,
}

pub fn parse(ctx: &mut ParserContext) -> Result<()> {
    DBaseParser::new(ctx).run()
}

/// Names following `CLASS` anywhere in the source, so `NEW` can prefer a
/// user class over a base kind of the same name even before its
/// declaration. Scanning stops quietly at the first lexical error; the
/// real parse reports it.
fn declared_classes(ctx: &mut ParserContext) -> HashSet<String> {
    let mark = ctx.mark();
    let mut names = HashSet::new();
    let mut after_class = false;
    while let Ok(token) = next_token(ctx) {
        if token.is_end() {
            break;
        }
        if after_class && let Some(name) = token.identifier() {
            names.insert(name.to_ascii_lowercase());
        }
        after_class = token
            .identifier()
            .is_some_and(|word| Keyword::lookup(word) == Some(Keyword::Class));
    }
    ctx.reset(mark);
    ctx.comment_depth.fill(0);
    names
}

struct DBaseParser<'a> {
    ctx: &'a mut ParserContext,
    blocks: Vec<Block>,
    class: Option<ClassScope>,
    main_open: bool,
    main_start: usize,
    params: Vec<String>,
    kinds_used: Vec<ClassKind>,
    /// Lowercased names of every `CLASS` declared anywhere in the source.
    user_classes: HashSet<String>,
}

impl<'a> DBaseParser<'a> {
    fn new(ctx: &'a mut ParserContext) -> Self {
        let user_classes = declared_classes(ctx);
        DBaseParser {
            ctx,
            blocks: Vec::new(),
            class: None,
            main_open: false,
            main_start: 0,
            params: Vec::new(),
            kinds_used: Vec::new(),
            user_classes,
        }
    }

    fn run(mut self) -> Result<()> {
        loop {
            match self.statement()? {
                Flow::End => break,
                Flow::Continue | Flow::ClassEnd => {}
            }
        }
        self.finish()
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

    /// The next token continues the current line.
    fn peek_same_line(&mut self) -> Result<Option<Token>> {
        let token = self.peek()?;
        Ok((!token.newline_before && !token.is_end()).then_some(token))
    }

    /// Start the host `main` function on the first executable statement.
    fn open_main(&mut self) {
        if self.class.is_some() || self.main_open {
            return;
        }
        let emitter = &mut self.ctx.emitter;
        emitter.select(Segment::Body);
        emitter.emit(format!("def main({}):", self.params.join(", ")));
        emitter.indent();
        self.main_open = true;
        self.main_start = emitter.len();
    }

    fn statement(&mut self) -> Result<Flow> {
        let token = self.next()?;
        match &token.kind {
            TokenKind::EndOfInput => return Ok(Flow::End),
            TokenKind::Operator('@') => self.at_say()?,
            TokenKind::Operator('?') => self.question()?,
            TokenKind::Identifier(word) => match Keyword::lookup(word) {
                Some(keyword) => return self.keyword_statement(keyword, &token),
                None => self.assignment(&token)?,
            },
            _ => return Err(unexpected(&token, "a statement")),
        }
        Ok(Flow::Continue)
    }

    fn keyword_statement(&mut self, keyword: Keyword, token: &Token) -> Result<Flow> {
        match keyword {
            Keyword::Say => {
                self.open_main();
                let value = self.expression()?;
                self.emit(format!("print({})", value));
            }
            Keyword::Set => self.set_color()?,
            Keyword::For => self.for_loop(token)?,
            Keyword::Next => self.next_statement(token)?,
            Keyword::Class => self.class_declaration(token)?,
            Keyword::EndClass => return self.end_class(token),
            Keyword::Local => self.local()?,
            Keyword::Parameter => self.parameter(token)?,
            Keyword::If => {
                self.open_main();
                let cond = self.expression()?;
                self.emit(format!("if {}:", cond));
                self.push_block(BlockKind::If { else_seen: false }, token);
            }
            Keyword::Else => self.else_branch(token)?,
            Keyword::EndIf => {
                self.close_block(token, "ENDIF", |kind| matches!(kind, BlockKind::If { .. }))?;
            }
            Keyword::Do => {
                self.open_main();
                expect_word(self.ctx, "while")?;
                let cond = self.expression()?;
                self.emit(format!("while {}:", cond));
                self.push_block(BlockKind::DoWhile, token);
            }
            Keyword::EndDo => {
                self.close_block(token, "ENDDO", |kind| matches!(kind, BlockKind::DoWhile))?;
            }
            Keyword::Clear => {
                self.open_main();
                self.emit("cls()");
            }
            Keyword::Return => {
                self.open_main();
                if self.peek_same_line()?.is_some() {
                    let value = self.expression()?;
                    self.emit(format!("return {}", value));
                } else {
                    self.emit("return");
                }
            }
            Keyword::This => self.assignment(token)?,
            Keyword::Color
            | Keyword::To
            | Keyword::Step
            | Keyword::Of
            | Keyword::While
            | Keyword::New => {
                return Err(error_at(
                    token,
                    ErrorKind::KeywordNotAllowedHere,
                    format!("{} cannot start a statement", token.kind),
                ));
            }
        }
        Ok(Flow::Continue)
    }

    fn push_block(&mut self, kind: BlockKind, token: &Token) {
        self.ctx.emitter.indent();
        self.blocks.push(Block {
            kind,
            opened: token.pos,
        });
    }

    fn close_block(
        &mut self,
        token: &Token,
        closer: &str,
        matches: impl Fn(&BlockKind) -> bool,
    ) -> Result<Block> {
        match self.blocks.last() {
            Some(block) if matches(&block.kind) => {}
            Some(block) => {
                return Err(error_at(
                    token,
                    ErrorKind::StructuralImbalance,
                    format!(
                        "{} does not close {} opened at line {}, which expects {}",
                        closer,
                        block.kind.opener(),
                        block.opened.line,
                        block.kind.closer()
                    ),
                ));
            }
            None => {
                return Err(error_at(
                    token,
                    ErrorKind::StructuralImbalance,
                    format!("{} without a matching opener", closer),
                ));
            }
        }
        self.ctx.emitter.dedent();
        self.blocks
            .pop()
            .ok_or_else(|| error_at(token, ErrorKind::StructuralImbalance, "empty block stack"))
    }

    fn else_branch(&mut self, token: &Token) -> Result<()> {
        match self.blocks.last_mut() {
            Some(Block {
                kind: BlockKind::If { else_seen },
                ..
            }) if !*else_seen => *else_seen = true,
            Some(Block {
                kind: BlockKind::If { .. },
                ..
            }) => {
                return Err(error_at(
                    token,
                    ErrorKind::StructuralImbalance,
                    "second ELSE in the same IF",
                ));
            }
            _ => {
                return Err(error_at(
                    token,
                    ErrorKind::StructuralImbalance,
                    "ELSE without a matching IF",
                ));
            }
        }
        self.ctx.emitter.dedent();
        self.emit("else:");
        self.ctx.emitter.indent();
        Ok(())
    }

    /// `@ row, col [SAY expr]`
    fn at_say(&mut self) -> Result<()> {
        self.open_main();
        let row = self.expression()?;
        expect_punct(self.ctx, ',')?;
        let col = self.expression()?;
        self.emit(format!("goto({}, {})", row, col));
        if let Some(token) = self.peek_same_line()?
            && token.is_word("say")
        {
            self.next()?;
            let value = self.expression()?;
            self.emit(format!("print({})", value));
        }
        Ok(())
    }

    /// `? [list]` prints on a new line, `?? list` at the cursor.
    fn question(&mut self) -> Result<()> {
        self.open_main();
        let Some(token) = self.peek_same_line()? else {
            self.emit("newline()");
            return Ok(());
        };
        if token.is_op('?') {
            self.next()?;
            let items = self.print_list()?;
            self.emit(format!("print({})", items));
            return Ok(());
        }
        self.emit("newline()");
        let items = self.print_list()?;
        self.emit(format!("print({})", items));
        Ok(())
    }

    fn print_list(&mut self) -> Result<String> {
        let mut items = vec![self.expression()?];
        while let Some(token) = self.peek_same_line()? {
            if !token.is_punct(',') {
                break;
            }
            self.next()?;
            items.push(self.expression()?);
        }
        Ok(items.join(", \" \", "))
    }

    /// `SET COLOR TO [fg][/bg]`
    fn set_color(&mut self) -> Result<()> {
        self.open_main();
        expect_word(self.ctx, "color")?;
        expect_word(self.ctx, "to")?;

        let Some(token) = self.peek_same_line()? else {
            self.emit(format!("set_color({}, {})", DEFAULT_FG, DEFAULT_BG));
            return Ok(());
        };
        let call = if token.is_op('/') {
            self.next()?;
            format!("set_bg({})", self.color_code()?)
        } else {
            let fg = self.color_code()?;
            match self.peek_same_line()? {
                Some(slash) if slash.is_op('/') => {
                    self.next()?;
                    format!("set_color({}, {})", fg, self.color_code()?)
                }
                _ => format!("set_fg({})", fg),
            }
        };
        debug!(call = %call, "resolved color");
        self.emit(call);
        Ok(())
    }

    /// A color mnemonic such as `w`, `gr+` or `bg`.
    fn color_code(&mut self) -> Result<relic_core::Rgb> {
        let token = self.next()?;
        let Some(code) = token.identifier() else {
            return Err(unexpected(&token, "a color code"));
        };
        let mut mnemonic = code.to_string();
        if let Some(plus) = self.peek_same_line()?
            && plus.is_op('+')
        {
            self.next()?;
            mnemonic.push('+');
        }
        self.ctx.rules().color(&mnemonic).ok_or_else(|| {
            error_at(
                &token,
                ErrorKind::SyntaxError,
                format!("unknown color '{}'", mnemonic),
            )
        })
    }

    /// `FOR var = a TO b [STEP n]`
    fn for_loop(&mut self, token: &Token) -> Result<()> {
        self.open_main();
        let (var, _) = expect_name(self.ctx, "a loop variable")?;
        let var = host_name(&var);
        expect_op(self.ctx, '=')?;
        let start = self.expression()?;
        expect_word(self.ctx, "to")?;
        let end = self.expression()?;
        let end = if end.contains(' ') {
            format!("({})", end)
        } else {
            end
        };

        let step = match self.peek_same_line()? {
            Some(t) if t.is_word("step") => {
                self.next()?;
                let mut negative = false;
                let mut number = self.next()?;
                if number.is_op('-') {
                    negative = true;
                    number = self.next()?;
                }
                match number.kind {
                    TokenKind::Number(n) => Some((negative, n)),
                    _ => return Err(unexpected(&number, "a numeric STEP")),
                }
            }
            _ => None,
        };
        let range = match step {
            None => format!("range({}, {} + 1)", start, end),
            Some((false, n)) => format!("range({}, {} + 1, {})", start, end, n),
            Some((true, n)) => format!("range({}, {} - 1, -{})", start, end, n),
        };
        self.emit(format!("for {} in {}:", var, range));
        self.push_block(BlockKind::For { var }, token);
        Ok(())
    }

    /// `NEXT [var]`
    fn next_statement(&mut self, token: &Token) -> Result<()> {
        let named = match self.peek_same_line()? {
            Some(t) => match t.identifier() {
                Some(name) if !self.ctx.rules().is_keyword(name) => {
                    let name = host_name(name);
                    self.next()?;
                    Some(name)
                }
                _ => None,
            },
            None => None,
        };
        let block = self.close_block(token, "NEXT", |kind| matches!(kind, BlockKind::For { .. }))?;
        if let (Some(name), BlockKind::For { var }) = (named, &block.kind)
            && name != *var
        {
            return Err(error_at(
                token,
                ErrorKind::StructuralImbalance,
                format!("NEXT {} closes FOR {}", name, var),
            ));
        }
        Ok(())
    }

    /// `LOCAL a, b` declares each name with a null value.
    fn local(&mut self) -> Result<()> {
        self.open_main();
        for name in self.name_list()? {
            if let Some(scope) = self.class.as_mut() {
                scope.locals.push(name.clone());
            }
            self.emit(format!("{} = None", name));
        }
        Ok(())
    }

    /// `PARAMETER a, b` names the arguments `main` receives.
    fn parameter(&mut self, token: &Token) -> Result<()> {
        if self.main_open || self.class.is_some() || !self.blocks.is_empty() {
            return Err(error_at(
                token,
                ErrorKind::KeywordNotAllowedHere,
                "PARAMETER must come before the first executable statement",
            ));
        }
        let names = self.name_list()?;
        self.params.extend(names);
        Ok(())
    }

    fn name_list(&mut self) -> Result<Vec<String>> {
        let (first, _) = expect_name(self.ctx, "a variable name")?;
        let mut names = vec![host_name(&first)];
        while let Some(token) = self.peek_same_line()? {
            if !token.is_punct(',') {
                break;
            }
            self.next()?;
            let (name, _) = expect_name(self.ctx, "a variable name")?;
            names.push(host_name(&name));
        }
        Ok(names)
    }

    /// `CLASS name OF kind [(params)] ... ENDCLASS`
    fn class_declaration(&mut self, token: &Token) -> Result<()> {
        if self.class.is_some() || !self.blocks.is_empty() {
            return Err(error_at(
                token,
                ErrorKind::KeywordNotAllowedHere,
                "CLASS must appear at the top level",
            ));
        }
        let (name, _) = expect_name(self.ctx, "a class name")?;
        expect_word(self.ctx, "of")?;
        let kind_token = self.next()?;
        let Some(kind) = kind_token.identifier().and_then(ClassKind::lookup) else {
            return Err(unexpected(
                &kind_token,
                "FORM, CONTAINER, GRID, PUSHBUTTON, MEMO, TEXT or EDITFIELD",
            ));
        };

        let mut params = Vec::new();
        if let Some(open) = self.peek_same_line()?
            && open.is_punct('(')
        {
            self.next()?;
            if !self.peek()?.is_punct(')') {
                params = self.name_list()?;
            }
            expect_punct(self.ctx, ')')?;
        }

        debug!(class = %name, kind = kind.host_name(), "class declaration");
        let emitter = &mut self.ctx.emitter;
        emitter.select(Segment::Header);
        emitter.emit(format!("class {}({}):", host_name(&name), kind.host_name()));
        emitter.indent();
        for (attr, value) in kind.defaults() {
            emitter.emit(format!("{} = {}", attr, value));
        }
        let mut signature = vec!["self".to_string()];
        signature.extend(params.iter().cloned());
        emitter.emit(format!("def init({}):", signature.join(", ")));
        emitter.indent();
        for param in &params {
            emitter.emit(format!("self.{} = {}", param, param));
        }

        self.class = Some(ClassScope {
            name,
            opened: token.pos,
            locals: params,
        });
        loop {
            match self.statement()? {
                Flow::Continue => {}
                Flow::ClassEnd => return Ok(()),
                Flow::End => return Err(self.unclosed_class()),
            }
        }
    }

    fn unclosed_class(&self) -> ParseError {
        match &self.class {
            Some(scope) => ParseError::new(
                ErrorKind::StructuralImbalance,
                scope.opened.line,
                scope.opened.column,
                format!("CLASS {} has no ENDCLASS", scope.name),
            ),
            None => self.ctx.error(ErrorKind::StructuralImbalance, "CLASS has no ENDCLASS"),
        }
    }

    fn end_class(&mut self, token: &Token) -> Result<Flow> {
        if self.class.is_none() {
            return Err(error_at(
                token,
                ErrorKind::StructuralImbalance,
                "ENDCLASS without a matching CLASS",
            ));
        }
        if let Some(block) = self.blocks.last() {
            return Err(error_at(
                token,
                ErrorKind::StructuralImbalance,
                format!(
                    "ENDCLASS inside {} opened at line {}",
                    block.kind.opener(),
                    block.opened.line
                ),
            ));
        }
        self.class = None;
        let emitter = &mut self.ctx.emitter;
        emitter.dedent();
        emitter.dedent();
        emitter.select(Segment::Body);
        Ok(Flow::ClassEnd)
    }

    /// `name = expr`, `obj.prop = expr`, `THIS.prop = expr`, or a call.
    fn assignment(&mut self, first: &Token) -> Result<()> {
        self.open_main();
        let Some(word) = first.identifier() else {
            return Err(unexpected(first, "an assignment target"));
        };
        let mut target = if word.eq_ignore_ascii_case("this") {
            if self.class.is_none() {
                return Err(error_at(
                    first,
                    ErrorKind::KeywordNotAllowedHere,
                    "THIS is only valid inside a CLASS",
                ));
            }
            "self".to_string()
        } else {
            host_name(word)
        };

        let mut has_attr = false;
        while self.peek()?.is_punct('.') && self.dotted_word()?.is_none() {
            self.next()?;
            let (attr, _) = self.attribute()?;
            target = format!("{}.{}", target, attr);
            has_attr = true;
        }

        if !has_attr && target == "self" {
            return Err(unexpected(&self.peek()?, "'.' after THIS"));
        }

        if self.peek()?.is_punct('(') {
            let args = self.call_args()?;
            self.emit(format!("{}({})", target, args));
            return Ok(());
        }

        expect_op(self.ctx, '=')?;
        let value = self.expression()?;
        if !has_attr
            && let Some(scope) = &self.class
            && !scope.locals.contains(&target)
        {
            target = format!("self.{}", target);
        }
        self.emit(format!("{} = {}", target, value));
        Ok(())
    }

    fn attribute(&mut self) -> Result<(String, Token)> {
        let token = self.next()?;
        match token.identifier() {
            Some(name) => Ok((attr_name(name), token)),
            None => Err(unexpected(&token, "an attribute name")),
        }
    }

    /// Look ahead for a `.WORD.` operator or literal without consuming it.
    fn dotted_word(&mut self) -> Result<Option<String>> {
        let mark = self.ctx.mark();
        let mut found = None;
        let dot = self.next()?;
        if dot.is_punct('.') {
            let word = self.next()?;
            if let Some(w) = word.identifier() {
                let w = w.to_ascii_lowercase();
                if matches!(w.as_str(), "and" | "or" | "not" | "t" | "f")
                    && self.next()?.is_punct('.')
                {
                    found = Some(w);
                }
            }
        }
        self.ctx.reset(mark);
        Ok(found)
    }

    fn eat_dotted(&mut self, word: &str) -> Result<bool> {
        if self.dotted_word()?.as_deref() == Some(word) {
            for _ in 0..3 {
                self.next()?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn expression(&mut self) -> Result<String> {
        let mut left = self.and_expr()?;
        while self.eat_dotted("or")? {
            let right = self.and_expr()?;
            left = format!("{} or {}", left, right);
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<String> {
        let mut left = self.not_expr()?;
        while self.eat_dotted("and")? {
            let right = self.not_expr()?;
            left = format!("{} and {}", left, right);
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<String> {
        if self.eat_dotted("not")? {
            return Ok(format!("not {}", self.not_expr()?));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<String> {
        let left = self.additive()?;
        let Some(token) = self.peek_same_line()? else {
            return Ok(left);
        };
        let op = match token.kind {
            TokenKind::Operator('=') => {
                self.next()?;
                if self.ctx.lookahead() == Some('=') {
                    self.next()?;
                }
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
        let right = self.additive()?;
        Ok(format!("{} {} {}", left, op, right))
    }

    fn additive(&mut self) -> Result<String> {
        let mut left = self.term()?;
        while let Some(token) = self.peek_same_line()? {
            let op = match token.kind {
                TokenKind::Operator(c @ ('+' | '-')) => c,
                _ => break,
            };
            self.next()?;
            let right = self.term()?;
            left = format!("{} {} {}", left, op, right);
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<String> {
        let mut left = self.unary()?;
        while let Some(token) = self.peek_same_line()? {
            let op = match token.kind {
                TokenKind::Operator(c @ ('*' | '/' | '%')) => c,
                _ => break,
            };
            self.next()?;
            let right = self.unary()?;
            left = format!("{} {} {}", left, op, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<String> {
        let token = self.peek()?;
        if token.is_op('-') {
            self.next()?;
            return Ok(format!("-{}", self.unary()?));
        }
        if token.is_op('+') {
            self.next()?;
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<String> {
        let mut expr = self.primary()?;
        loop {
            let token = self.peek()?;
            if token.newline_before || !token.is_punct('.') || self.dotted_word()?.is_some() {
                break;
            }
            self.next()?;
            let (attr, _) = self.attribute()?;
            expr = format!("{}.{}", expr, attr);
            if self.peek()?.is_punct('(') {
                let args = self.call_args()?;
                expr = format!("{}({})", expr, args);
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<String> {
        if let Some(word) = self.dotted_word()? {
            let literal = match word.as_str() {
                "t" => "True",
                "f" => "False",
                _ => return Err(unexpected(&self.peek()?, "an expression")),
            };
            for _ in 0..3 {
                self.next()?;
            }
            return Ok(literal.to_string());
        }

        let token = self.next()?;
        match &token.kind {
            TokenKind::Number(n) => Ok(n.clone()),
            TokenKind::StringLiteral(s) => Ok(quote(s)),
            TokenKind::Punctuation('(') => {
                let inner = self.expression()?;
                expect_punct(self.ctx, ')')?;
                Ok(format!("({})", inner))
            }
            TokenKind::Identifier(word) => match Keyword::lookup(word) {
                Some(Keyword::New) => self.new_object(),
                Some(Keyword::This) if self.class.is_some() => Ok("self".to_string()),
                Some(_) => Err(error_at(
                    &token,
                    ErrorKind::KeywordNotAllowedHere,
                    format!("keyword {} used in an expression", token.kind),
                )),
                None => {
                    if self.peek()?.is_punct('(') {
                        let lower = word.to_ascii_lowercase();
                        let callee = BUILTINS
                            .iter()
                            .find(|(name, _)| *name == lower)
                            .map(|(_, host)| host.to_string())
                            .unwrap_or_else(|| host_name(word));
                        let args = self.call_args()?;
                        Ok(format!("{}({})", callee, args))
                    } else {
                        Ok(host_name(word))
                    }
                }
            },
            _ => Err(unexpected(&token, "an expression")),
        }
    }

    /// `NEW Kind[(args)]` after the NEW keyword.
    fn new_object(&mut self) -> Result<String> {
        let (name, _) = expect_name(self.ctx, "a class name")?;
        let user_class = self.user_classes.contains(&name.to_ascii_lowercase());
        let class = match ClassKind::lookup(&name).filter(|_| !user_class) {
            Some(kind) => {
                if !self.kinds_used.contains(&kind) {
                    self.kinds_used.push(kind);
                }
                kind.host_name().to_string()
            }
            None => host_name(&name),
        };
        let args = if self.peek()?.is_punct('(') {
            self.call_args()?
        } else {
            String::new()
        };
        Ok(format!("{}({})", class, args))
    }

    /// `( [expr {, expr}] )`
    fn call_args(&mut self) -> Result<String> {
        expect_punct(self.ctx, '(')?;
        let mut args = Vec::new();
        if self.peek()?.is_punct(')') {
            self.next()?;
            return Ok(String::new());
        }
        loop {
            args.push(self.expression()?);
            let token = self.next()?;
            if token.is_punct(')') {
                break;
            }
            if !token.is_punct(',') {
                return Err(unexpected(&token, "',' or ')'"));
            }
        }
        Ok(args.join(", "))
    }

    fn finish(mut self) -> Result<()> {
        if let Some(block) = self.blocks.last() {
            return Err(ParseError::new(
                ErrorKind::StructuralImbalance,
                block.opened.line,
                block.opened.column,
                format!(
                    "{} is never closed with {}",
                    block.kind.opener(),
                    block.kind.closer()
                ),
            ));
        }
        check_parens(self.ctx)?;

        self.open_main();
        if self.ctx.emitter.len() == self.main_start {
            self.emit("pass");
        }
        self.ctx.emitter.dedent();

        // Base kinds instantiated directly with NEW.
        let emitter = &mut self.ctx.emitter;
        emitter.select(Segment::Header);
        for kind in &self.kinds_used {
            emitter.emit(format!("class {}({}):", kind.host_name(), kind.host_name()));
            emitter.indent();
            for (attr, value) in kind.defaults() {
                emitter.emit(format!("{} = {}", attr, value));
            }
            emitter.dedent();
        }
        emitter.select(Segment::Body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::rules::Dialect;
    use crate::{GeneratedProgram, transpile};
    use crate::error::ErrorKind;
    use relic_core::Rgb;

    fn body(src: &str) -> Vec<String> {
        let program = transpile(Dialect::DBase, src, "test.prg").unwrap();
        program.body.iter().map(|l| l.text.clone()).collect()
    }

    fn compile(src: &str) -> GeneratedProgram {
        transpile(Dialect::DBase, src, "test.prg").unwrap()
    }

    fn error_kind(src: &str) -> ErrorKind {
        transpile(Dialect::DBase, src, "test.prg").unwrap_err().kind
    }

    #[test]
    fn test_at_say_positions_and_prints() {
        let lines = body("@ 5,10 SAY \"hi\"");
        assert_eq!(lines, vec!["def main():", "goto(5, 10)", "print(\"hi\")"]);
    }

    #[test]
    fn test_set_color_resolves_both_colors_in_order() {
        let rules = Dialect::DBase.rules();
        let fg = rules.color("w+").unwrap();
        let bg = rules.color("b").unwrap();
        assert_eq!((fg, bg), (Rgb(0xFFFFFF), Rgb(0x0000AA)));

        let lines = body("SET COLOR TO w+/b");
        assert_eq!(lines[1], format!("set_color({}, {})", fg, bg));
        assert_eq!(lines[1], "set_color(0xFFFFFF, 0x0000AA)");
    }

    #[test]
    fn test_set_color_foreground_only() {
        let lines = body("set color to gr+");
        assert_eq!(lines[1], "set_fg(0xFFFF55)");
    }

    #[test]
    fn test_set_color_unknown_mnemonic() {
        assert_eq!(error_kind("SET COLOR TO q"), ErrorKind::SyntaxError);
    }

    #[test]
    fn test_if_endif_balance() {
        let three_two = "IF a\nIF b\nIF c\nENDIF\nENDIF\n";
        assert_eq!(error_kind(three_two), ErrorKind::StructuralImbalance);

        let balanced = "a = 1\nIF a\nIF a\nIF a\nSAY a\nENDIF\nENDIF\nENDIF\n";
        assert!(transpile(Dialect::DBase, balanced, "t").is_ok());
    }

    #[test]
    fn test_unclosed_if_reports_opener_position() {
        let err = transpile(Dialect::DBase, "x = 1\n  IF x = 1\n", "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_stray_endif() {
        assert_eq!(error_kind("ENDIF"), ErrorKind::StructuralImbalance);
    }

    #[test]
    fn test_crossed_closers() {
        let src = "FOR i = 1 TO 3\nIF i = 2\nNEXT\nENDIF\n";
        assert_eq!(error_kind(src), ErrorKind::StructuralImbalance);
    }

    #[test]
    fn test_if_else_emits_branches() {
        let program = compile("IF x > 1 .AND. .NOT. y\n? \"big\"\nELSE\n?? \"small\"\nENDIF");
        assert_eq!(
            program.render(),
            "def main():\n\tif x > 1 and not y:\n\t\tnewline()\n\t\tprint(\"big\")\n\telse:\n\t\tprint(\"small\")\n"
        );
    }

    #[test]
    fn test_for_loop_inclusive_range() {
        let lines = body("FOR i = 1 TO 10\nSAY i\nNEXT i");
        assert_eq!(lines[1], "for i in range(1, 10 + 1):");
        assert_eq!(lines[2], "print(i)");
    }

    #[test]
    fn test_for_loop_negative_step() {
        let lines = body("FOR i = 10 TO 1 STEP -2\nNEXT");
        assert_eq!(lines[1], "for i in range(10, 1 - 1, -2):");
    }

    #[test]
    fn test_next_with_wrong_variable() {
        assert_eq!(
            error_kind("FOR i = 1 TO 2\nNEXT j"),
            ErrorKind::StructuralImbalance
        );
    }

    #[test]
    fn test_step_requires_number() {
        assert_eq!(
            error_kind("FOR i = 1 TO 2 STEP n\nNEXT"),
            ErrorKind::UnexpectedToken
        );
    }

    #[test]
    fn test_parameters_become_main_signature() {
        let lines = body("PARAMETER name, count\nSAY name");
        assert_eq!(lines[0], "def main(name, count):");
    }

    #[test]
    fn test_parameter_after_statement() {
        assert_eq!(
            error_kind("SAY 1\nPARAMETER late"),
            ErrorKind::KeywordNotAllowedHere
        );
    }

    #[test]
    fn test_local_defaults_to_none() {
        let lines = body("LOCAL a, b");
        assert_eq!(&lines[1..], &["a = None", "b = None"]);
    }

    #[test]
    fn test_keyword_as_name() {
        assert_eq!(error_kind("LOCAL endif"), ErrorKind::KeywordNotAllowedHere);
        assert_eq!(error_kind("x = say"), ErrorKind::KeywordNotAllowedHere);
    }

    #[test]
    fn test_unexpected_token() {
        assert_eq!(error_kind("\"floating\""), ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_class_goes_to_header() {
        let src = "CLASS Win OF FORM (title)\nthis.caption = title\nwidth = 60\nENDCLASS\nf = NEW win(\"x\")\n";
        let program = compile(src);
        let header: Vec<_> = program.header.iter().map(|l| (l.indent, l.text.as_str())).collect();
        assert_eq!(header[0], (0, "class win(Form):"));
        assert!(header.contains(&(1, "caption = \"\"")));
        assert!(header.contains(&(1, "def init(self, title):")));
        assert!(header.contains(&(2, "self.title = title")));
        assert!(header.contains(&(2, "self.caption = title")));
        assert!(header.contains(&(2, "self.width = 60")));
        assert_eq!(program.body[1].text, "f = win(\"x\")");
    }

    #[test]
    fn test_class_without_endclass() {
        let err = transpile(Dialect::DBase, "\nCLASS a OF grid\nx = 1\n", "t").unwrap_err();
        assert_eq!(err.kind, ErrorKind::StructuralImbalance);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_stray_endclass() {
        assert_eq!(error_kind("ENDCLASS"), ErrorKind::StructuralImbalance);
    }

    #[test]
    fn test_unknown_class_kind() {
        assert_eq!(error_kind("CLASS a OF window\nENDCLASS"), ErrorKind::UnexpectedToken);
    }

    #[test]
    fn test_new_base_kind_declares_it() {
        let program = compile("b = NEW PushButton()");
        assert_eq!(program.header[0].text, "class PushButton(PushButton):");
        assert_eq!(program.body[1].text, "b = PushButton()");
    }

    #[test]
    fn test_new_prefers_user_class_named_like_a_kind() {
        let program = compile("CLASS form OF FORM\nENDCLASS\nf = NEW form()");
        assert_eq!(program.body[1].text, "f = form()");
        assert!(!program.header.iter().any(|l| l.text == "class Form(Form):"));
    }

    #[test]
    fn test_new_sees_user_class_declared_later() {
        let program = compile("f = NEW Grid()\nCLASS grid OF CONTAINER\nENDCLASS");
        assert_eq!(program.body[1].text, "f = grid()");
        assert_eq!(program.header[0].text, "class grid(Container):");
    }

    #[test]
    fn test_builtin_functions_map_to_host() {
        let lines = body("x = UPPER(LEFT(\"abc\", 2)) + STR(LEN(\"q\"))");
        assert_eq!(lines[1], "x = upper(left(\"abc\", 2)) + str(len(\"q\"))");
    }

    #[test]
    fn test_logical_literals_and_attributes() {
        let lines = body("f.visible = .T.\ng = f.visible .OR. .F.");
        assert_eq!(lines[1], "f.visible = True");
        assert_eq!(lines[2], "g = f.visible or False");
    }

    #[test]
    fn test_comparison_operators() {
        let lines = body("a = x <> 1\nb = x <= 2\nc = x == 3");
        assert_eq!(&lines[1..], &["a = x != 1", "b = x <= 2", "c = x == 3"]);
    }

    #[test]
    fn test_do_while_and_clear() {
        let program = compile("CLEAR\nDO WHILE n < 3\nn = n + 1\nENDDO\nRETURN");
        assert_eq!(
            program.render(),
            "def main():\n\tcls()\n\twhile n < 3:\n\t\tn = n + 1\n\treturn\n"
        );
    }

    #[test]
    fn test_empty_source_still_defines_main() {
        assert_eq!(compile("** nothing here\n").render(), "def main():\n\tpass\n");
    }

    #[test]
    fn test_unbalanced_parens_at_end() {
        assert_eq!(error_kind("x = (1 + 2"), ErrorKind::UnexpectedToken);
    }
}
