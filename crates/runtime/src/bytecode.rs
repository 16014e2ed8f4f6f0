//! Compiled host-script representation
//!
//! A [`Program`] is a flat table of functions and class bodies plus shared
//! constant and name pools. It is plain data and serializes with serde, which
//! is what the compile cache writes to disk.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    /// Push a constant from the pool.
    Const(u32),
    LoadName(u32),
    StoreName(u32),
    /// Replace the object on top of the stack with one of its attributes.
    LoadAttr(u32),
    /// Pop value then object, assign the attribute.
    StoreAttr(u32),
    Binary(BinOp),
    Unary(UnOp),
    /// Call with N arguments; callee sits below them.
    Call(u8),
    Pop,
    Jump(u32),
    JumpIfFalse(u32),
    /// Short-circuit helpers: jump keeping the operand, otherwise pop it.
    JumpIfFalseKeep(u32),
    JumpIfTrueKeep(u32),
    /// Pop `counter, end, step`; push whether a range loop should continue.
    RangeTest,
    Return,
    MakeFunction(u32),
    MakeClass(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    pub code: Vec<Op>,
    /// Source line of each instruction, parallel to `code`.
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProto {
    pub name: String,
    /// Kind label from the `class Name(Kind)` header.
    pub base: Option<String>,
    /// Index of the function holding the class body.
    pub body: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub constants: Vec<Constant>,
    pub names: Vec<String>,
    pub functions: Vec<Function>,
    pub classes: Vec<ClassProto>,
    /// Index of the top-level function.
    pub entry: u32,
}

impl Program {
    pub fn name(&self, idx: u32) -> &str {
        self.names.get(idx as usize).map(String::as_str).unwrap_or("?")
    }

    pub fn function(&self, idx: u32) -> Option<&Function> {
        self.functions.get(idx as usize)
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Program {
    /// Human-readable listing, one function at a time.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, func) in self.functions.iter().enumerate() {
            writeln!(f, "fn #{} {}({})", idx, func.name, func.params.join(", "))?;
            for (pc, op) in func.code.iter().enumerate() {
                let detail = match op {
                    Op::Const(c) => format!("{:?}", self.constants.get(*c as usize)),
                    Op::LoadName(n) | Op::StoreName(n) | Op::LoadAttr(n) | Op::StoreAttr(n) => {
                        self.name(*n).to_string()
                    }
                    Op::Binary(b) => b.symbol().to_string(),
                    _ => String::new(),
                };
                writeln!(f, "  {:04} {:?} {}", pc, op, detail)?;
            }
        }
        Ok(())
    }
}
