//! Host-script programs as the transpiler emits them: compiled, persisted
//! and executed through the public API.

use relic_core::ConsoleGrid;
use relic_runtime::{Limits, Program, ScriptError, Value, compile, execute};

fn run(source: &str) -> ConsoleGrid {
    let program = compile(source).unwrap();
    let mut grid = ConsoleGrid::new(40, 10);
    execute(&program, &mut grid, Vec::new(), Limits::default()).unwrap();
    grid
}

#[test]
fn test_line_dispatcher_shape() {
    let src = "\
def line_10():
\tprint(\"A\")
\treturn 20
def line_20():
\tprint(\"B\")
\treturn None
def main():
\t_line = 10
\twhile _line != None:
\t\tif _line == 10:
\t\t\t_line = line_10()
\t\telif _line == 20:
\t\t\t_line = line_20()
";
    assert_eq!(run(src).row_text(0), "AB");
}

#[test]
fn test_persisted_program_runs_the_same() {
    let src = "total = 0\ndef main(n):\n\tfor i in range(1, n + 1):\n\t\ttotal = total + i\n\tprint(total)\n";
    let program = compile(src).unwrap();
    let bytes = bincode::serialize(&program).unwrap();
    let restored: Program = bincode::deserialize(&bytes).unwrap();
    assert_eq!(restored, program);

    let mut grid = ConsoleGrid::new(20, 2);
    execute(&restored, &mut grid, vec![Value::Int(4)], Limits::default()).unwrap();
    assert_eq!(grid.row_text(0), "10");
}

#[test]
fn test_comment_lines_are_ignored_inside_blocks() {
    let src = "def main():\n\t# remark\n\tprint(\"ok\")\n";
    assert_eq!(run(src).row_text(0), "ok");
}

#[test]
fn test_syntax_error_carries_line() {
    let err = compile("def main():\n\tx = = 1\n").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { line: 2, .. }));
}

#[test]
fn test_unknown_name_is_a_runtime_error() {
    let program = compile("def main():\n\tmissing()\n").unwrap();
    let mut grid = ConsoleGrid::new(20, 2);
    let err = execute(&program, &mut grid, Vec::new(), Limits::default()).unwrap_err();
    assert!(matches!(err, ScriptError::Runtime { .. }));
}
