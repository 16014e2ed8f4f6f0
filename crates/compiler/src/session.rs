//! One interactive transpile-and-run session
//!
//! The surrounding application keeps a [`Session`] alive across runs. A
//! failed parse, compile or execution drops the session's generated program
//! so nothing from that attempt carries into the next one.

use crate::cache::compile_and_run;
use crate::config::CompilerConfig;
use crate::emitter::GeneratedProgram;
use crate::error::RelicError;
use crate::rules::Dialect;
use relic_core::ConsoleSink;
use relic_runtime::Value;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Default)]
pub struct Session {
    config: CompilerConfig,
    program: Option<(String, GeneratedProgram)>,
}

impl Session {
    pub fn new(config: CompilerConfig) -> Self {
        Session {
            config,
            program: None,
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// The program from the last successful transpile, if it is still held.
    pub fn program(&self) -> Option<&GeneratedProgram> {
        self.program.as_ref().map(|(_, program)| program)
    }

    pub fn transpile(
        &mut self,
        dialect: Dialect,
        source: &str,
        source_name: &str,
    ) -> Result<&GeneratedProgram, RelicError> {
        self.program = None;
        let program = crate::transpile(dialect, source, source_name)?;
        let (_, program) = self
            .program
            .insert((source_name.to_string(), program));
        Ok(program)
    }

    /// Compile, cache and run the held program.
    pub fn run(
        &mut self,
        console: &mut dyn ConsoleSink,
        args: Vec<Value>,
    ) -> Result<PathBuf, RelicError> {
        let Some((name, program)) = self.program.take() else {
            return Err(RelicError::Artifact("no program to run".into()));
        };
        match compile_and_run(&program, &name, console, args, &self.config) {
            Ok(path) => {
                self.program = Some((name, program));
                Ok(path)
            }
            Err(e) => {
                warn!(source = %name, error = %e, "discarding generated program");
                Err(e)
            }
        }
    }
}
