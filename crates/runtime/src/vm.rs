//! Bytecode interpreter
//!
//! Calls recurse on the Rust stack, one `run_frame` per host-script call,
//! bounded by [`Limits::max_depth`]. Name resolution is local, then global,
//! then builtin. Assignment inside a function updates an existing local,
//! otherwise an existing global, otherwise creates a local.

use crate::builtins::Builtin;
use crate::bytecode::{BinOp, Function, Op, Program, UnOp};
use crate::error::ScriptError;
use crate::value::{ClassValue, Object, Value};
use relic_core::ConsoleSink;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

/// Longest string a `*` repeat may build, in bytes.
const MAX_STRING_LEN: usize = 1 << 24;

/// Execution limits.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum number of instructions before aborting.
    pub max_steps: u64,
    /// Maximum call depth.
    pub max_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_steps: 10_000_000,
            max_depth: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Top-level code reads and writes globals directly.
    Global,
    Function,
    /// Class bodies always bind locally; the locals become class attributes.
    Class,
}

struct Frame {
    locals: HashMap<String, Value>,
    scope: Scope,
}

pub struct Vm<'a> {
    program: &'a Program,
    console: &'a mut dyn ConsoleSink,
    globals: HashMap<String, Value>,
    limits: Limits,
    steps: u64,
    depth: usize,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program, console: &'a mut dyn ConsoleSink, limits: Limits) -> Self {
        Vm {
            program,
            console,
            globals: HashMap::new(),
            limits,
            steps: 0,
            depth: 0,
        }
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Run the top-level code, then `main` if the program defines one.
    ///
    /// `args` are bound to `main`'s parameters in order; missing ones are
    /// `None` and extras are dropped.
    pub fn run(&mut self, args: Vec<Value>) -> Result<(), ScriptError> {
        let entry = self.function(self.program.entry)?;
        let mut frame = Frame {
            locals: HashMap::new(),
            scope: Scope::Global,
        };
        self.run_frame(entry, &mut frame)?;

        if let Some(Value::Function(idx)) = self.globals.get("main").cloned() {
            let main = self.function(idx)?;
            let mut bound = args;
            bound.resize(main.params.len(), Value::None);
            debug!(params = main.params.len(), "calling main");
            self.call_function(idx, bound)?;
        }
        debug!(steps = self.steps, "program finished");
        Ok(())
    }

    fn function(&self, idx: u32) -> Result<&'a Function, ScriptError> {
        self.program
            .function(idx)
            .ok_or_else(|| ScriptError::Runtime {
                function: "<vm>".to_string(),
                message: format!("no function #{}", idx),
            })
    }

    fn call_function(&mut self, idx: u32, args: Vec<Value>) -> Result<Value, ScriptError> {
        let func = self.function(idx)?;
        if args.len() != func.params.len() {
            return Err(runtime(
                func,
                format!(
                    "expected {} argument(s), got {}",
                    func.params.len(),
                    args.len()
                ),
            ));
        }
        if self.depth >= self.limits.max_depth {
            return Err(runtime(func, "call depth limit exceeded"));
        }
        let mut frame = Frame {
            locals: func.params.iter().cloned().zip(args).collect(),
            scope: Scope::Function,
        };
        self.depth += 1;
        let result = self.run_frame(func, &mut frame);
        self.depth -= 1;
        result
    }

    fn call_value(&mut self, callee: Value, mut args: Vec<Value>) -> Result<Value, ScriptError> {
        match callee {
            Value::Function(idx) => self.call_function(idx, args),
            Value::BoundMethod(obj, idx) => {
                args.insert(0, Value::Object(obj));
                self.call_function(idx, args)
            }
            Value::Builtin(b) => b.call(&args, self.console).map_err(|message| ScriptError::Runtime {
                function: b.name().to_string(),
                message,
            }),
            Value::Class(class) => {
                let fields = class
                    .attrs
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Function(_)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let obj = Rc::new(RefCell::new(Object {
                    class: Rc::clone(&class),
                    fields,
                }));
                if let Some(Value::Function(init)) = class.attrs.get("init") {
                    args.insert(0, Value::Object(Rc::clone(&obj)));
                    self.call_function(*init, args)?;
                } else if !args.is_empty() {
                    return Err(ScriptError::Runtime {
                        function: class.name.clone(),
                        message: "class without init takes no arguments".to_string(),
                    });
                }
                Ok(Value::Object(obj))
            }
            other => Err(ScriptError::Runtime {
                function: "<call>".to_string(),
                message: format!("{} is not callable", other.type_name()),
            }),
        }
    }

    fn load_name(&self, frame: &Frame, name: &str) -> Option<Value> {
        if frame.scope != Scope::Global {
            if let Some(v) = frame.locals.get(name) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.globals.get(name) {
            return Some(v.clone());
        }
        Builtin::lookup(name).map(Value::Builtin)
    }

    fn store_name(&mut self, frame: &mut Frame, name: &str, value: Value) {
        if frame.scope == Scope::Global {
            self.globals.insert(name.to_string(), value);
        } else if frame.scope == Scope::Class || frame.locals.contains_key(name) {
            frame.locals.insert(name.to_string(), value);
        } else if let Some(slot) = self.globals.get_mut(name) {
            *slot = value;
        } else {
            frame.locals.insert(name.to_string(), value);
        }
    }

    fn run_frame(&mut self, func: &'a Function, frame: &mut Frame) -> Result<Value, ScriptError> {
        let program = self.program;
        let mut stack: Vec<Value> = Vec::with_capacity(16);
        let mut pc = 0usize;

        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .ok_or_else(|| runtime(func, "value stack underflow"))?
            };
        }

        while let Some(op) = func.code.get(pc) {
            self.steps += 1;
            if self.steps > self.limits.max_steps {
                return Err(ScriptError::StepLimit(self.limits.max_steps));
            }
            pc += 1;
            let line = func.lines.get(pc - 1).copied().unwrap_or(0);

            match *op {
                Op::Const(idx) => {
                    let c = program
                        .constants
                        .get(idx as usize)
                        .ok_or_else(|| runtime(func, format!("bad constant #{}", idx)))?;
                    stack.push(Value::from(c));
                }
                Op::LoadName(idx) => {
                    let name = program.name(idx);
                    let value = self.load_name(frame, name).ok_or_else(|| {
                        runtime_at(func, line, format!("name '{}' is not defined", name))
                    })?;
                    stack.push(value);
                }
                Op::StoreName(idx) => {
                    let value = pop!();
                    let name = program.name(idx);
                    self.store_name(frame, name, value);
                }
                Op::LoadAttr(idx) => {
                    let target = pop!();
                    let attr = program.name(idx);
                    stack.push(load_attr(&target, attr).ok_or_else(|| {
                        runtime_at(
                            func,
                            line,
                            format!("{} has no attribute '{}'", target.type_name(), attr),
                        )
                    })?);
                }
                Op::StoreAttr(idx) => {
                    let value = pop!();
                    let target = pop!();
                    let attr = program.name(idx);
                    match target {
                        Value::Object(obj) => {
                            obj.borrow_mut().fields.insert(attr.to_string(), value);
                        }
                        other => {
                            return Err(runtime_at(
                                func,
                                line,
                                format!("cannot set attribute on {}", other.type_name()),
                            ));
                        }
                    }
                }
                Op::Binary(bin) => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(binary(bin, &left, &right).map_err(|m| runtime_at(func, line, m))?);
                }
                Op::Unary(un) => {
                    let value = pop!();
                    stack.push(match un {
                        UnOp::Not => Value::Bool(!value.is_truthy()),
                        UnOp::Neg => match value {
                            Value::Int(v) => Value::Int(v.wrapping_neg()),
                            Value::Float(v) => Value::Float(-v),
                            other => {
                                return Err(runtime_at(
                                    func,
                                    line,
                                    format!("cannot negate {}", other.type_name()),
                                ));
                            }
                        },
                    });
                }
                Op::Call(argc) => {
                    let argc = argc as usize;
                    if stack.len() < argc + 1 {
                        return Err(runtime(func, "value stack underflow"));
                    }
                    let args = stack.split_off(stack.len() - argc);
                    let callee = pop!();
                    let result = self.call_value(callee, args)?;
                    stack.push(result);
                }
                Op::Pop => {
                    pop!();
                }
                Op::Jump(target) => pc = target as usize,
                Op::JumpIfFalse(target) => {
                    if !pop!().is_truthy() {
                        pc = target as usize;
                    }
                }
                Op::JumpIfFalseKeep(target) => {
                    let top = stack.last().map(Value::is_truthy).unwrap_or(false);
                    if top {
                        stack.pop();
                    } else {
                        pc = target as usize;
                    }
                }
                Op::JumpIfTrueKeep(target) => {
                    let top = stack.last().map(Value::is_truthy).unwrap_or(false);
                    if top {
                        pc = target as usize;
                    } else {
                        stack.pop();
                    }
                }
                Op::RangeTest => {
                    let step = pop!();
                    let end = pop!();
                    let counter = pop!();
                    let (c, e, s) = match (counter.as_f64(), end.as_f64(), step.as_f64()) {
                        (Some(c), Some(e), Some(s)) => (c, e, s),
                        _ => return Err(runtime_at(func, line, "range() bounds must be numbers")),
                    };
                    if s == 0.0 {
                        return Err(runtime_at(func, line, "range() step must not be zero"));
                    }
                    stack.push(Value::Bool(if s > 0.0 { c < e } else { c > e }));
                }
                Op::Return => {
                    return Ok(stack.pop().unwrap_or(Value::None));
                }
                Op::MakeFunction(idx) => stack.push(Value::Function(idx)),
                Op::MakeClass(idx) => {
                    let proto = program
                        .classes
                        .get(idx as usize)
                        .ok_or_else(|| runtime(func, format!("no class #{}", idx)))?;
                    let body = self.function(proto.body)?;
                    let mut class_frame = Frame {
                        locals: HashMap::new(),
                        scope: Scope::Class,
                    };
                    self.run_frame(body, &mut class_frame)?;
                    stack.push(Value::Class(Rc::new(ClassValue {
                        name: proto.name.clone(),
                        base: proto.base.clone(),
                        attrs: class_frame.locals,
                    })));
                }
            }
        }
        Ok(Value::None)
    }
}

fn runtime(func: &Function, message: impl Into<String>) -> ScriptError {
    ScriptError::Runtime {
        function: func.name.clone(),
        message: message.into(),
    }
}

fn runtime_at(func: &Function, line: u32, message: impl Into<String>) -> ScriptError {
    ScriptError::Runtime {
        function: func.name.clone(),
        message: format!("line {}: {}", line, message.into()),
    }
}

fn load_attr(target: &Value, attr: &str) -> Option<Value> {
    match target {
        Value::Object(obj) => {
            let obj_ref = obj.borrow();
            if let Some(v) = obj_ref.fields.get(attr) {
                return Some(v.clone());
            }
            match obj_ref.class.attrs.get(attr) {
                Some(Value::Function(idx)) => Some(Value::BoundMethod(Rc::clone(obj), *idx)),
                Some(v) => Some(v.clone()),
                None => None,
            }
        }
        Value::Class(class) => {
            if attr == "kind" && !class.attrs.contains_key("kind") {
                return class.base.as_deref().map(Value::str);
            }
            class.attrs.get(attr).cloned()
        }
        _ => None,
    }
}

fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, String> {
    use Value::{Float, Int, Str};

    match op {
        BinOp::Eq => return Ok(Value::Bool(left.loose_eq(right))),
        BinOp::Ne => return Ok(Value::Bool(!left.loose_eq(right))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (left, right) {
                (Str(a), Str(b)) => a.partial_cmp(b),
                _ => match (left.as_f64(), right.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
            }
            .ok_or_else(|| {
                format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                )
            })?;
            return Ok(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }));
        }
        _ => {}
    }

    match (op, left, right) {
        (BinOp::Add, Str(a), b) => Ok(Value::str(format!("{}{}", a, b))),
        (BinOp::Add, a, Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
        (BinOp::Add, Int(a), Int(b)) => Ok(Int(a.wrapping_add(*b))),
        (BinOp::Sub, Int(a), Int(b)) => Ok(Int(a.wrapping_sub(*b))),
        (BinOp::Mul, Int(a), Int(b)) => Ok(Int(a.wrapping_mul(*b))),
        (BinOp::Mul, Str(s), Int(n)) | (BinOp::Mul, Int(n), Str(s)) => {
            let count = usize::try_from((*n).max(0)).unwrap_or(usize::MAX);
            match s.len().checked_mul(count) {
                Some(len) if len <= MAX_STRING_LEN => Ok(Value::str(s.repeat(count))),
                _ => Err("string repeat too large".to_string()),
            }
        }
        (BinOp::FloorDiv | BinOp::Mod, Int(_), Int(0)) => Err("division by zero".to_string()),
        (BinOp::FloorDiv, Int(a), Int(b)) => Ok(Int(floor_div(*a, *b))),
        (BinOp::Mod, Int(a), Int(b)) => Ok(Int(floor_mod(*a, *b))),
        _ => {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(format!(
                        "unsupported operand types for {}: {} and {}",
                        op.symbol(),
                        left.type_name(),
                        right.type_name()
                    ));
                }
            };
            match op {
                BinOp::Add => Ok(Float(a + b)),
                BinOp::Sub => Ok(Float(a - b)),
                BinOp::Mul => Ok(Float(a * b)),
                BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
                    Err("division by zero".to_string())
                }
                BinOp::Div => Ok(Float(a / b)),
                BinOp::FloorDiv => Ok(Float((a / b).floor())),
                BinOp::Mod => {
                    let r = a % b;
                    Ok(Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
                }
                _ => Err(format!("unsupported operator {}", op.symbol())),
            }
        }
    }
}

/// Compile-free entry point: run an already compiled program.
pub fn execute(
    program: &Program,
    console: &mut dyn ConsoleSink,
    args: Vec<Value>,
    limits: Limits,
) -> Result<(), ScriptError> {
    Vm::new(program, console, limits).run(args)
}

/// Quotient rounded toward negative infinity. `b` is non-zero.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

/// Remainder carrying the sign of `b`. `b` is non-zero.
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use relic_core::{ConsoleGrid, PALETTE};

    fn run(source: &str) -> ConsoleGrid {
        let program = compile(source).unwrap();
        let mut grid = ConsoleGrid::new(40, 10);
        execute(&program, &mut grid, Vec::new(), Limits::default()).unwrap();
        grid
    }

    fn run_err(source: &str) -> ScriptError {
        let program = compile(source).unwrap();
        let mut grid = ConsoleGrid::new(40, 10);
        execute(&program, &mut grid, Vec::new(), Limits::default()).unwrap_err()
    }

    #[test]
    fn test_huge_string_repeat_is_an_error() {
        match run_err("x = \"ab\" * 9223372036854775807\n") {
            ScriptError::Runtime { message, .. } => {
                assert!(message.contains("too large"), "{}", message)
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }
        assert_eq!(run("print(\"ab\" * 3)\n").row_text(0), "ababab");
    }

    #[test]
    fn test_floor_div_and_mod_wrap_at_min() {
        let grid = run(
            "m = -9223372036854775807 - 1\nprint(m // -1)\nnewline()\nprint(m % -1)\n",
        );
        assert_eq!(grid.row_text(0), "-9223372036854775808");
        assert_eq!(grid.row_text(1), "0");
    }

    #[test]
    fn test_floor_div_and_mod_follow_the_divisor_sign() {
        let grid = run(
            "print(7 // -2)\nnewline()\nprint(7 % -2)\nnewline()\nprint(-7 // 2)\nnewline()\nprint(-7 % 2)\n",
        );
        assert_eq!(grid.row_text(0), "-4");
        assert_eq!(grid.row_text(1), "-1");
        assert_eq!(grid.row_text(2), "-4");
        assert_eq!(grid.row_text(3), "1");
    }

    #[test]
    fn test_print_and_goto() {
        let grid = run("goto(2, 3)\nprint(\"hi\")\n");
        assert_eq!(grid.row_text(2), "   hi");
    }

    #[test]
    fn test_range_loop_inclusive_via_plus_one() {
        let grid = run("for i in range(1, 3 + 1):\n\tprint(i)\n");
        assert_eq!(grid.row_text(0), "123");
    }

    #[test]
    fn test_negative_step() {
        let grid = run("for i in range(3, 0, -1):\n\tprint(i)\n");
        assert_eq!(grid.row_text(0), "321");
    }

    #[test]
    fn test_main_receives_args() {
        let program = compile("def main(a, b):\n\tprint(a)\n\tprint(b)\n").unwrap();
        let mut grid = ConsoleGrid::new(40, 10);
        execute(
            &program,
            &mut grid,
            vec![Value::str("x")],
            Limits::default(),
        )
        .unwrap();
        assert_eq!(grid.row_text(0), "x");
    }

    #[test]
    fn test_function_assigns_existing_global() {
        let grid = run("count = 1\ndef bump():\n\tcount = count + 1\nbump()\nprint(count)\n");
        assert_eq!(grid.row_text(0), "2");
    }

    #[test]
    fn test_locals_do_not_leak() {
        let err = run_err("def f():\n\ttemp = 1\nf()\nprint(temp)\n");
        assert!(err.to_string().contains("temp"));
    }

    #[test]
    fn test_class_instantiation_and_init() {
        let src = "class Box(Form):\n\twidth = 80\n\tdef init(self, title):\n\t\tself.title = title\n\tdef label(self):\n\t\treturn self.title + \"!\"\nb = Box(\"win\")\nprint(b.width)\nprint(b.label())\nprint(Box.kind)\n";
        let grid = run(src);
        assert_eq!(grid.row_text(0), "80win!Form");
    }

    #[test]
    fn test_set_color_uses_rgb_ints() {
        let grid = run("set_color(0xFFFFFF, 0x0000AA)\nprint(\"x\")\n");
        let cell = grid.cell(0, 0).unwrap();
        assert_eq!((cell.fg, cell.bg), (PALETTE[15], PALETTE[1]));
    }

    #[test]
    fn test_short_circuit() {
        let grid = run("x = None\nif x and x.y:\n\tprint(\"bad\")\nelse:\n\tprint(\"ok\")\n");
        assert_eq!(grid.row_text(0), "ok");
    }

    #[test]
    fn test_step_limit() {
        let program = compile("while True:\n\tpass\n").unwrap();
        let mut grid = ConsoleGrid::new(10, 2);
        let limits = Limits {
            max_steps: 1_000,
            ..Limits::default()
        };
        assert_eq!(
            execute(&program, &mut grid, Vec::new(), limits),
            Err(ScriptError::StepLimit(1_000))
        );
    }

    #[test]
    fn test_recursion_depth_limit() {
        let err = run_err("def f(n):\n\treturn f(n + 1)\nf(0)\n");
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_division_semantics() {
        let grid = run("print(7 / 2)\nprint(\" \")\nprint(7 // 2)\nprint(\" \")\nprint(7 % 3)\n");
        assert_eq!(grid.row_text(0), "3.5 3 1");
    }

    #[test]
    fn test_string_concat_with_number() {
        let grid = run("print(\"n=\" + 5)\n");
        assert_eq!(grid.row_text(0), "n=5");
    }
}
