//! Compile-and-cache
//!
//! A generated program is compiled to host bytecode, written to
//! `<cache-dir>/<source-file-name>.bin` and then executed from the freshly
//! compiled form. The cache file is always rewritten; it exists so that
//! `--exec` can run a program again without its source.
//!
//! The file is a bincode-encoded [`Artifact`]: a format version, the source
//! name, the SHA-256 of the generated script and the compiled program.

use crate::config::CompilerConfig;
use crate::emitter::GeneratedProgram;
use crate::error::RelicError;
use relic_core::ConsoleSink;
use relic_runtime::{Program, Value, compile, execute};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bumped whenever the artifact or bytecode layout changes.
pub const FORMAT_VERSION: u32 = 1;

/// Extension of cached artifacts.
pub const ARTIFACT_EXTENSION: &str = "bin";

/// Extension of the host script kept next to an artifact.
pub const SCRIPT_EXTENSION: &str = "host";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub format_version: u32,
    pub source_name: String,
    /// Hex SHA-256 of the rendered host script.
    pub script_sha256: String,
    pub program: Program,
}

impl Artifact {
    pub fn new(source_name: &str, script: &str, program: Program) -> Self {
        Artifact {
            format_version: FORMAT_VERSION,
            source_name: source_name.to_string(),
            script_sha256: script_digest(script),
            program,
        }
    }
}

pub fn script_digest(script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(script.as_bytes());
    hex::encode(hasher.finalize())
}

/// `<dir>/<file name of source_name>.bin`. The source extension stays in
/// the key so `menu.prg` and `menu.pas` get separate artifacts.
pub fn cache_path(dir: &Path, source_name: &str) -> PathBuf {
    let name = Path::new(source_name)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name.to_string());
    dir.join(format!("{}.{}", name, ARTIFACT_EXTENSION))
}

/// Write an artifact, replacing any previous one atomically.
pub fn store_artifact(path: &Path, artifact: &Artifact) -> Result<(), RelicError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|e| {
            RelicError::Io(format!(
                "failed to create cache directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
    }

    let bytes = bincode::serialize(artifact)?;
    // Process ID in the temp name keeps parallel runs from clobbering each other.
    let temp = path.with_extension(format!("{}.tmp", std::process::id()));
    fs::write(&temp, &bytes).map_err(|e| {
        RelicError::Io(format!("failed to write '{}': {}", temp.display(), e))
    })?;
    if let Err(e) = fs::rename(&temp, path) {
        fs::remove_file(&temp).ok();
        return Err(RelicError::Io(format!(
            "failed to move artifact into '{}': {}",
            path.display(),
            e
        )));
    }
    debug!(path = %path.display(), bytes = bytes.len(), "stored artifact");
    Ok(())
}

pub fn load_artifact(path: &Path) -> Result<Artifact, RelicError> {
    let bytes = fs::read(path).map_err(|e| {
        RelicError::Io(format!("failed to read '{}': {}", path.display(), e))
    })?;
    let artifact: Artifact = bincode::deserialize(&bytes)?;
    if artifact.format_version != FORMAT_VERSION {
        return Err(RelicError::Artifact(format!(
            "'{}' has format version {}, expected {}",
            path.display(),
            artifact.format_version,
            FORMAT_VERSION
        )));
    }
    debug!(path = %path.display(), source = %artifact.source_name, "loaded artifact");
    Ok(artifact)
}

pub fn run_artifact(
    artifact: &Artifact,
    console: &mut dyn ConsoleSink,
    args: Vec<Value>,
    config: &CompilerConfig,
) -> Result<(), RelicError> {
    info!(source = %artifact.source_name, "running program");
    execute(&artifact.program, console, args, config.limits())?;
    Ok(())
}

/// Compile `generated`, cache it, then run it. Returns the artifact path.
pub fn compile_and_run(
    generated: &GeneratedProgram,
    source_name: &str,
    console: &mut dyn ConsoleSink,
    args: Vec<Value>,
    config: &CompilerConfig,
) -> Result<PathBuf, RelicError> {
    let script = generated.render();
    let program = compile(&script)?;
    let artifact = Artifact::new(source_name, &script, program);

    let path = cache_path(&config.cache_dir()?, source_name);
    store_artifact(&path, &artifact)?;
    if config.keep_script {
        let script_path = path.with_extension(SCRIPT_EXTENSION);
        fs::write(&script_path, &script).map_err(|e| {
            RelicError::Io(format!("failed to write '{}': {}", script_path.display(), e))
        })?;
    }
    info!(path = %path.display(), "cached compiled program");

    run_artifact(&artifact, console, args, config)?;
    Ok(path)
}
