//! Relic Compiler Library
//!
//! Transpiles small legacy languages (a dBase-like 4GL, a Pascal-like
//! language, line-numbered BASIC and a LISP-like language) into the host
//! script of [`relic_runtime`], caches the compiled bytecode and runs it
//! against a [`relic_core::ConsoleGrid`].
//!
//! ```rust,ignore
//! use relicc::{CompilerConfig, Dialect, compile_and_run, console_for, transpile};
//!
//! let program = transpile(Dialect::DBase, "@ 5,10 SAY \"hi\"", "hi.prg")?;
//! let mut grid = console_for(Dialect::DBase);
//! compile_and_run(&program, "hi.prg", &mut grid, Vec::new(), &CompilerConfig::default())?;
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod cursor;
pub mod dialect;
pub mod display;
pub mod emitter;
pub mod error;
pub mod rules;
pub mod scanner;
pub mod session;
pub mod skipper;

pub use cache::{Artifact, compile_and_run, load_artifact, run_artifact};
pub use config::CompilerConfig;
pub use context::ParserContext;
pub use emitter::{Emitter, GeneratedProgram, Line, Segment};
pub use error::{ErrorKind, ParseError, RelicError};
pub use rules::{Dialect, DialectRules};
pub use session::Session;

use relic_core::{ConsoleGrid, SharedConsole};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Parse `source` in `dialect` and return the generated host program.
///
/// The parse stops at the first error; the partially generated program is
/// dropped with the parser context.
pub fn transpile(
    dialect: Dialect,
    source: &str,
    source_name: &str,
) -> Result<GeneratedProgram, ParseError> {
    let mut ctx = ParserContext::new(dialect, source, source_name);
    match dialect::parse(&mut ctx) {
        Ok(()) => {
            let program = ctx.emitter.take();
            debug!(
                %dialect,
                source = source_name,
                lines = program.header.len() + program.body.len(),
                "transpiled"
            );
            Ok(program)
        }
        Err(e) => {
            debug!(%dialect, source = source_name, error = %e, "parse failed");
            Err(e)
        }
    }
}

/// Read a source file and transpile it. The file name keys the cache.
pub fn transpile_file(dialect: Dialect, path: &Path) -> Result<GeneratedProgram, RelicError> {
    let source = read_source(path)?;
    Ok(transpile(dialect, &source, &source_name(path))?)
}

/// The tokenized program image of a BASIC source.
pub fn tokenize_basic(source: &str, source_name: &str) -> Result<Vec<u8>, ParseError> {
    let mut ctx = ParserContext::new(Dialect::Basic, source, source_name);
    let lines = dialect::basic::read_program(&mut ctx)?;
    dialect::basic::encoder::encode(&lines)
}

/// A blank console sized for `dialect`.
pub fn console_for(dialect: Dialect) -> ConsoleGrid {
    let rules = dialect.rules();
    ConsoleGrid::new(rules.console_cols, rules.console_rows)
}

/// A blank console sized for `dialect`, shareable with a display thread.
pub fn shared_console_for(dialect: Dialect) -> SharedConsole {
    let rules = dialect.rules();
    ConsoleGrid::shared(rules.console_cols, rules.console_rows)
}

pub fn read_source(path: &Path) -> Result<String, RelicError> {
    fs::read_to_string(path)
        .map_err(|e| RelicError::Io(format!("failed to read '{}': {}", path.display(), e)))
}

/// File name used as the cache key for `path`.
pub fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpile_dispatches_by_dialect() {
        let dbase = transpile(Dialect::DBase, "CLEAR", "a.prg").unwrap();
        assert!(dbase.render().contains("cls()"));
        let pascal = transpile(Dialect::Pascal, "program p; begin clrscr end.", "a.pas").unwrap();
        assert!(pascal.render().contains("cls()"));
        let basic = transpile(Dialect::Basic, "10 CLS", "a.bas").unwrap();
        assert!(basic.render().contains("cls()"));
        let lisp = transpile(Dialect::Lisp, "(cls)", "a.lisp").unwrap();
        assert!(lisp.render().contains("cls()"));
    }

    #[test]
    fn test_console_sizes() {
        assert_eq!(console_for(Dialect::Basic).cols(), 40);
        assert_eq!(console_for(Dialect::DBase).cols(), 80);
        assert_eq!(console_for(Dialect::Pascal).rows(), 25);
    }

    #[test]
    fn test_shared_console_receives_program_output() {
        let temp = tempfile::tempdir().unwrap();
        let config = CompilerConfig::new().with_cache_dir(temp.path());
        let console = shared_console_for(Dialect::Basic);
        let program = transpile(Dialect::Basic, "10 PRINT \"HI\"", "hi.bas").unwrap();
        let mut sink = std::sync::Arc::clone(&console);
        compile_and_run(&program, "hi.bas", &mut sink, Vec::new(), &config).unwrap();
        let grid = console.lock().unwrap();
        assert_eq!(grid.cols(), 40);
        assert_eq!(grid.row_text(0), "HI");
    }

    #[test]
    fn test_source_name() {
        assert_eq!(source_name(Path::new("/a/b/menu.prg")), "menu.prg");
    }

    #[test]
    fn test_tokenize_basic() {
        let bytes = tokenize_basic("10 END", "t.bas").unwrap();
        assert_eq!(bytes, vec![0x01, 0x08, 0x07, 0x08, 0x0A, 0x00, 0x80, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_missing_file() {
        let err = transpile_file(Dialect::DBase, Path::new("/nonexistent/x.prg")).unwrap_err();
        assert!(matches!(err, RelicError::Io(_)));
    }
}
