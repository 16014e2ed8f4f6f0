//! Relic Runtime: the host scripting language
//!
//! Every dialect grammar emits the same small, tab-indented host script.
//! This crate compiles that script to a serializable bytecode [`Program`]
//! and executes it against a [`relic_core::ConsoleSink`].
//!
//! # Modules
//!
//! - `lexer`: line/indent-aware tokenizer, plus `quote` for emitting literals
//! - `parser` / `ast`: host-script syntax tree
//! - `compiler`: syntax tree to bytecode
//! - `bytecode`: the serializable program format
//! - `vm`: stack interpreter with step and depth limits
//! - `builtins`: console and string helpers visible to every program
//! - `value`: runtime values

pub mod ast;
pub mod builtins;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod value;
pub mod vm;

pub use builtins::Builtin;
pub use bytecode::Program;
pub use compiler::compile;
pub use error::ScriptError;
pub use lexer::quote;
pub use parser::is_reserved;
pub use value::Value;
pub use vm::{Limits, Vm, execute};
