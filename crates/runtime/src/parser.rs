//! Host-script parser
//!
//! Grammar (one statement per line, blocks introduced by `:` and a tab):
//! ```text
//! stmt   := def NAME ( params ) : block
//!         | class NAME [ ( NAME ) ] : block
//!         | if expr : block { elif expr : block } [ else : block ]
//!         | while expr : block
//!         | for NAME in range ( expr [, expr [, expr]] ) : block
//!         | return [expr] | pass | expr [ = expr ]
//! expr   := or-chain of and-chains of not / comparisons / sums / terms / unary / postfix
//! ```

use crate::ast::{Expr, Stmt, StmtKind, Target};
use crate::bytecode::{BinOp, UnOp};
use crate::error::ScriptError;
use crate::lexer::{Tok, Token, tokenize};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, ScriptError> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    pub fn parse(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut stmts = Vec::new();
        while !self.check(&Tok::Eof) {
            stmts.push(self.statement()?);
        }
        Ok(stmts)
    }

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn check_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn check_name(&self, name: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == name)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_name(&mut self, name: &str) -> bool {
        if self.check_name(name) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::syntax(self.line(), message)
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ScriptError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {:?}", op, self.peek())))
        }
    }

    fn expect_newline(&mut self) -> Result<(), ScriptError> {
        match self.peek() {
            Tok::Newline => {
                self.pos += 1;
                Ok(())
            }
            Tok::Eof => Ok(()),
            other => Err(self.error(format!("expected end of line, found {:?}", other))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ScriptError> {
        match self.advance() {
            Tok::Name(n) if !is_reserved(&n) => Ok(n),
            other => Err(self.error(format!("expected a name, found {:?}", other))),
        }
    }

    /// `:` NEWLINE, then an indented block. A header with no indented
    /// lines after it has an empty body.
    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_op(":")?;
        self.expect_newline()?;
        if !self.check(&Tok::Indent) {
            return Ok(Vec::new());
        }
        self.pos += 1;
        let mut body = Vec::new();
        while !self.check(&Tok::Dedent) && !self.check(&Tok::Eof) {
            body.push(self.statement()?);
        }
        if self.check(&Tok::Dedent) {
            self.pos += 1;
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Stmt, ScriptError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Name(n) if n == "def" => {
                self.pos += 1;
                let name = self.expect_ident()?;
                self.expect_op("(")?;
                let mut params = Vec::new();
                if !self.check_op(")") {
                    loop {
                        params.push(self.expect_ident()?);
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                }
                self.expect_op(")")?;
                let body = self.block()?;
                StmtKind::Def { name, params, body }
            }
            Tok::Name(n) if n == "class" => {
                self.pos += 1;
                let name = self.expect_ident()?;
                let base = if self.eat_op("(") {
                    let base = self.expect_ident()?;
                    self.expect_op(")")?;
                    Some(base)
                } else {
                    None
                };
                let body = self.block()?;
                StmtKind::Class { name, base, body }
            }
            Tok::Name(n) if n == "if" => {
                self.pos += 1;
                let mut branches = Vec::new();
                let cond = self.expression()?;
                branches.push((cond, self.block()?));
                let mut otherwise = Vec::new();
                loop {
                    if self.eat_name("elif") {
                        let cond = self.expression()?;
                        branches.push((cond, self.block()?));
                    } else if self.eat_name("else") {
                        otherwise = self.block()?;
                        break;
                    } else {
                        break;
                    }
                }
                StmtKind::If {
                    branches,
                    otherwise,
                }
            }
            Tok::Name(n) if n == "while" => {
                self.pos += 1;
                let cond = self.expression()?;
                StmtKind::While(cond, self.block()?)
            }
            Tok::Name(n) if n == "for" => {
                self.pos += 1;
                let var = self.expect_ident()?;
                if !self.eat_name("in") || !self.eat_name("range") {
                    return Err(self.error("only 'for NAME in range(...)' loops are supported"));
                }
                self.expect_op("(")?;
                let mut args = vec![self.expression()?];
                while self.eat_op(",") {
                    args.push(self.expression()?);
                }
                self.expect_op(")")?;
                let (start, end, step) = match args.len() {
                    1 => (Expr::Int(0), args.remove(0), None),
                    2 => {
                        let end = args.remove(1);
                        (args.remove(0), end, None)
                    }
                    3 => {
                        let step = args.remove(2);
                        let end = args.remove(1);
                        (args.remove(0), end, Some(step))
                    }
                    n => return Err(self.error(format!("range() takes 1 to 3 arguments, got {}", n))),
                };
                let body = self.block()?;
                StmtKind::For {
                    var,
                    start,
                    end,
                    step,
                    body,
                }
            }
            Tok::Name(n) if n == "return" => {
                self.pos += 1;
                let value = if self.check(&Tok::Newline) || self.check(&Tok::Eof) {
                    None
                } else {
                    Some(self.expression()?)
                };
                self.expect_newline()?;
                StmtKind::Return(value)
            }
            Tok::Name(n) if n == "pass" => {
                self.pos += 1;
                self.expect_newline()?;
                StmtKind::Pass
            }
            _ => {
                let expr = self.expression()?;
                let kind = if self.eat_op("=") {
                    let target = match expr {
                        Expr::Name(n) => Target::Name(n),
                        Expr::Attr(obj, attr) => Target::Attr(*obj, attr),
                        other => {
                            return Err(self.error(format!("cannot assign to {:?}", other)));
                        }
                    };
                    StmtKind::Assign(target, self.expression()?)
                } else {
                    StmtKind::Expr(expr)
                };
                self.expect_newline()?;
                kind
            }
        };
        Ok(Stmt { kind, line })
    }

    pub fn expression(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        while self.eat_name("or") {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        while self.eat_name("and") {
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_name("not") {
            let inner = self.not_expr()?;
            return Ok(Expr::Unary(UnOp::Not, Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.sum()?;
        loop {
            let op = match self.peek() {
                Tok::Op("==") => BinOp::Eq,
                Tok::Op("!=") => BinOp::Ne,
                Tok::Op("<") => BinOp::Lt,
                Tok::Op("<=") => BinOp::Le,
                Tok::Op(">") => BinOp::Gt,
                Tok::Op(">=") => BinOp::Ge,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.sum()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn sum(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_op("-") {
            let inner = self.unary()?;
            return Ok(match inner {
                Expr::Int(v) => Expr::Int(-v),
                Expr::Float(v) => Expr::Float(-v),
                other => Expr::Unary(UnOp::Neg, Box::new(other)),
            });
        }
        if self.eat_op("+") {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat_op(".") {
                let attr = self.expect_ident()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else if self.eat_op("(") {
                let mut args = Vec::new();
                if !self.check_op(")") {
                    loop {
                        args.push(self.expression()?);
                        if !self.eat_op(",") {
                            break;
                        }
                    }
                }
                self.expect_op(")")?;
                if args.len() > u8::MAX as usize {
                    return Err(self.error("too many call arguments"));
                }
                expr = Expr::Call(Box::new(expr), args);
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Tok::Int(v) => Ok(Expr::Int(v)),
            Tok::Float(v) => Ok(Expr::Float(v)),
            Tok::Str(s) => Ok(Expr::Str(s)),
            Tok::Name(n) => match n.as_str() {
                "None" => Ok(Expr::None),
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                _ if is_reserved(&n) => Err(self.error(format!("unexpected keyword '{}'", n))),
                _ => Ok(Expr::Name(n)),
            },
            Tok::Op("(") => {
                let inner = self.expression()?;
                self.expect_op(")")?;
                Ok(inner)
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

/// Words the host script reserves; they cannot be used as names.
pub fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "def"
            | "class"
            | "if"
            | "elif"
            | "else"
            | "while"
            | "for"
            | "in"
            | "return"
            | "pass"
            | "and"
            | "or"
            | "not"
            | "None"
            | "True"
            | "False"
    )
}

/// Parse a complete host script.
pub fn parse(source: &str) -> Result<Vec<Stmt>, ScriptError> {
    Parser::new(source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_precedence() {
        let stmts = parse("x = 1 + 2 * 3\n").unwrap();
        match &stmts[0].kind {
            StmtKind::Assign(Target::Name(n), Expr::Binary(BinOp::Add, _, rhs)) => {
                assert_eq!(n, "x");
                assert!(matches!(**rhs, Expr::Binary(BinOp::Mul, _, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_def_with_empty_body() {
        let stmts = parse("def f(a, b):\nf(1, 2)\n").unwrap();
        assert_eq!(stmts.len(), 2);
        match &stmts[0].kind {
            StmtKind::Def { params, body, .. } => {
                assert_eq!(params, &vec!["a".to_string(), "b".to_string()]);
                assert!(body.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_if_elif_else() {
        let src = "if a:\n\tx = 1\nelif b:\n\tx = 2\nelse:\n\tx = 3\n";
        let stmts = parse(src).unwrap();
        match &stmts[0].kind {
            StmtKind::If {
                branches,
                otherwise,
            } => {
                assert_eq!(branches.len(), 2);
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_for_range_forms() {
        let stmts = parse("for i in range(1, 11, 2):\n\tprint(i)\n").unwrap();
        match &stmts[0].kind {
            StmtKind::For { step, .. } => assert_eq!(step, &Some(Expr::Int(2))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("for i in items:\n\tpass\n").is_err());
    }

    #[test]
    fn test_parse_attribute_assignment() {
        let stmts = parse("self.width = 80\n").unwrap();
        assert!(matches!(
            &stmts[0].kind,
            StmtKind::Assign(Target::Attr(Expr::Name(_), attr), Expr::Int(80)) if attr == "width"
        ));
    }

    #[test]
    fn test_cannot_assign_to_call() {
        assert!(parse("f() = 1\n").is_err());
    }

    #[test]
    fn test_negative_literal_folds() {
        let stmts = parse("x = -5\n").unwrap();
        assert!(matches!(&stmts[0].kind, StmtKind::Assign(_, Expr::Int(-5))));
    }
}
