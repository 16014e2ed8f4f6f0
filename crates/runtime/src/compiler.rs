//! Host-script to bytecode compiler
//!
//! Each `def` and `class` body becomes its own [`Function`]; the top level
//! is one more function, recorded as the program's entry.

use crate::ast::{Expr, Stmt, StmtKind, Target};
use crate::bytecode::{BinOp, ClassProto, Constant, Function, Op, Program};
use crate::error::ScriptError;
use crate::parser::parse;
use std::collections::HashMap;

/// Compile host-script source text into a [`Program`].
pub fn compile(source: &str) -> Result<Program, ScriptError> {
    let stmts = parse(source)?;
    let mut compiler = Compiler::default();
    let entry = compiler.function("<top>", Vec::new(), &stmts)?;
    let mut program = compiler.program;
    program.entry = entry;
    Ok(program)
}

#[derive(Default)]
struct Compiler {
    program: Program,
    name_index: HashMap<String, u32>,
    hidden_counter: usize,
}

/// Instructions for one function while it is being built.
struct Chunk {
    code: Vec<Op>,
    lines: Vec<u32>,
    line: u32,
}

impl Chunk {
    fn push(&mut self, op: Op) -> usize {
        self.code.push(op);
        self.lines.push(self.line);
        self.code.len() - 1
    }

    fn here(&self) -> u32 {
        self.code.len() as u32
    }

    fn patch(&mut self, at: usize, target: u32) {
        self.code[at] = match self.code[at] {
            Op::Jump(_) => Op::Jump(target),
            Op::JumpIfFalse(_) => Op::JumpIfFalse(target),
            Op::JumpIfFalseKeep(_) => Op::JumpIfFalseKeep(target),
            Op::JumpIfTrueKeep(_) => Op::JumpIfTrueKeep(target),
            other => other,
        };
    }
}

impl Compiler {
    fn constant(&mut self, value: Constant) -> u32 {
        if let Some(idx) = self.program.constants.iter().position(|c| *c == value) {
            return idx as u32;
        }
        self.program.constants.push(value);
        (self.program.constants.len() - 1) as u32
    }

    fn name(&mut self, name: &str) -> u32 {
        if let Some(idx) = self.name_index.get(name) {
            return *idx;
        }
        let idx = self.program.names.len() as u32;
        self.program.names.push(name.to_string());
        self.name_index.insert(name.to_string(), idx);
        idx
    }

    fn hidden(&mut self, label: &str) -> u32 {
        self.hidden_counter += 1;
        let name = format!("${}{}", label, self.hidden_counter);
        self.name(&name)
    }

    /// Compile a function body and return its index. The slot is reserved
    /// first so nested functions get higher indices than their parent.
    fn function(
        &mut self,
        name: &str,
        params: Vec<String>,
        body: &[Stmt],
    ) -> Result<u32, ScriptError> {
        let idx = self.program.functions.len();
        self.program.functions.push(Function {
            name: name.to_string(),
            params: params.clone(),
            code: Vec::new(),
            lines: Vec::new(),
        });

        let mut chunk = Chunk {
            code: Vec::new(),
            lines: Vec::new(),
            line: body.first().map(|s| s.line as u32).unwrap_or(0),
        };
        self.block(&mut chunk, body)?;
        let none = self.constant(Constant::None);
        chunk.push(Op::Const(none));
        chunk.push(Op::Return);

        let func = &mut self.program.functions[idx];
        func.code = chunk.code;
        func.lines = chunk.lines;
        Ok(idx as u32)
    }

    fn block(&mut self, chunk: &mut Chunk, stmts: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in stmts {
            self.statement(chunk, stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, chunk: &mut Chunk, stmt: &Stmt) -> Result<(), ScriptError> {
        chunk.line = stmt.line as u32;
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.expr(chunk, expr)?;
                chunk.push(Op::Pop);
            }
            StmtKind::Assign(Target::Name(name), value) => {
                self.expr(chunk, value)?;
                let n = self.name(name);
                chunk.push(Op::StoreName(n));
            }
            StmtKind::Assign(Target::Attr(obj, attr), value) => {
                self.expr(chunk, obj)?;
                self.expr(chunk, value)?;
                let n = self.name(attr);
                chunk.push(Op::StoreAttr(n));
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                let mut exits = Vec::new();
                for (cond, body) in branches {
                    self.expr(chunk, cond)?;
                    let skip = chunk.push(Op::JumpIfFalse(0));
                    self.block(chunk, body)?;
                    exits.push(chunk.push(Op::Jump(0)));
                    let next = chunk.here();
                    chunk.patch(skip, next);
                }
                self.block(chunk, otherwise)?;
                let end = chunk.here();
                for exit in exits {
                    chunk.patch(exit, end);
                }
            }
            StmtKind::While(cond, body) => {
                let top = chunk.here();
                self.expr(chunk, cond)?;
                let exit = chunk.push(Op::JumpIfFalse(0));
                self.block(chunk, body)?;
                chunk.push(Op::Jump(top));
                let end = chunk.here();
                chunk.patch(exit, end);
            }
            StmtKind::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let var = self.name(var);
                let end_slot = self.hidden("end");
                let step_slot = self.hidden("step");
                self.expr(chunk, start)?;
                chunk.push(Op::StoreName(var));
                self.expr(chunk, end)?;
                chunk.push(Op::StoreName(end_slot));
                match step {
                    Some(step) => self.expr(chunk, step)?,
                    None => {
                        let one = self.constant(Constant::Int(1));
                        chunk.push(Op::Const(one));
                    }
                }
                chunk.push(Op::StoreName(step_slot));

                let top = chunk.here();
                chunk.push(Op::LoadName(var));
                chunk.push(Op::LoadName(end_slot));
                chunk.push(Op::LoadName(step_slot));
                chunk.push(Op::RangeTest);
                let exit = chunk.push(Op::JumpIfFalse(0));
                self.block(chunk, body)?;
                chunk.push(Op::LoadName(var));
                chunk.push(Op::LoadName(step_slot));
                chunk.push(Op::Binary(BinOp::Add));
                chunk.push(Op::StoreName(var));
                chunk.push(Op::Jump(top));
                let done = chunk.here();
                chunk.patch(exit, done);
            }
            StmtKind::Def { name, params, body } => {
                let idx = self.function(name, params.clone(), body)?;
                chunk.line = stmt.line as u32;
                chunk.push(Op::MakeFunction(idx));
                let n = self.name(name);
                chunk.push(Op::StoreName(n));
            }
            StmtKind::Class { name, base, body } => {
                let body_idx = self.function(name, Vec::new(), body)?;
                chunk.line = stmt.line as u32;
                self.program.classes.push(ClassProto {
                    name: name.clone(),
                    base: base.clone(),
                    body: body_idx,
                });
                let class_idx = (self.program.classes.len() - 1) as u32;
                chunk.push(Op::MakeClass(class_idx));
                let n = self.name(name);
                chunk.push(Op::StoreName(n));
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => self.expr(chunk, expr)?,
                    None => {
                        let none = self.constant(Constant::None);
                        chunk.push(Op::Const(none));
                    }
                }
                chunk.push(Op::Return);
            }
            StmtKind::Pass => {}
        }
        Ok(())
    }

    fn expr(&mut self, chunk: &mut Chunk, expr: &Expr) -> Result<(), ScriptError> {
        match expr {
            Expr::None => {
                let c = self.constant(Constant::None);
                chunk.push(Op::Const(c));
            }
            Expr::Bool(b) => {
                let c = self.constant(Constant::Bool(*b));
                chunk.push(Op::Const(c));
            }
            Expr::Int(v) => {
                let c = self.constant(Constant::Int(*v));
                chunk.push(Op::Const(c));
            }
            Expr::Float(v) => {
                let c = self.constant(Constant::Float(*v));
                chunk.push(Op::Const(c));
            }
            Expr::Str(s) => {
                let c = self.constant(Constant::Str(s.clone()));
                chunk.push(Op::Const(c));
            }
            Expr::Name(name) => {
                let n = self.name(name);
                chunk.push(Op::LoadName(n));
            }
            Expr::Attr(obj, attr) => {
                self.expr(chunk, obj)?;
                let n = self.name(attr);
                chunk.push(Op::LoadAttr(n));
            }
            Expr::Call(callee, args) => {
                self.expr(chunk, callee)?;
                for arg in args {
                    self.expr(chunk, arg)?;
                }
                let argc = u8::try_from(args.len()).map_err(|_| {
                    ScriptError::syntax(chunk.line as usize, "too many call arguments")
                })?;
                chunk.push(Op::Call(argc));
            }
            Expr::Unary(op, inner) => {
                self.expr(chunk, inner)?;
                chunk.push(Op::Unary(*op));
            }
            Expr::Binary(op, left, right) => {
                self.expr(chunk, left)?;
                self.expr(chunk, right)?;
                chunk.push(Op::Binary(*op));
            }
            Expr::And(left, right) => {
                self.expr(chunk, left)?;
                let jump = chunk.push(Op::JumpIfFalseKeep(0));
                self.expr(chunk, right)?;
                let end = chunk.here();
                chunk.patch(jump, end);
            }
            Expr::Or(left, right) => {
                self.expr(chunk, left)?;
                let jump = chunk.push(Op::JumpIfTrueKeep(0));
                self.expr(chunk, right)?;
                let end = chunk.here();
                chunk.patch(jump, end);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_is_top_level() {
        let program = compile("x = 1\n").unwrap();
        let entry = program.function(program.entry).unwrap();
        assert_eq!(entry.name, "<top>");
        assert_eq!(entry.code.last(), Some(&Op::Return));
        assert_eq!(entry.code.len(), entry.lines.len());
    }

    #[test]
    fn test_defs_become_functions() {
        let program = compile("def main(a):\n\treturn a\n").unwrap();
        let main = program.find_function("main").unwrap();
        assert_eq!(main.params, vec!["a".to_string()]);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let program = compile("x = 7\ny = 7\n").unwrap();
        let sevens = program
            .constants
            .iter()
            .filter(|c| **c == Constant::Int(7))
            .count();
        assert_eq!(sevens, 1);
    }

    #[test]
    fn test_jumps_are_patched() {
        let program = compile("if x:\n\ty = 1\nelse:\n\ty = 2\n").unwrap();
        let entry = program.function(program.entry).unwrap();
        for op in &entry.code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) = op {
                assert!(*t > 0 && (*t as usize) <= entry.code.len());
            }
        }
    }

    #[test]
    fn test_class_registers_proto() {
        let program = compile("class Box(Form):\n\twidth = 80\n").unwrap();
        assert_eq!(program.classes.len(), 1);
        assert_eq!(program.classes[0].base.as_deref(), Some("Form"));
    }
}
