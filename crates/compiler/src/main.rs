//! Relic Compiler CLI
//!
//! Transpiles a legacy source file, caches the compiled program and runs it
//! against the simulated console, then prints the console to stdout.

use clap::{ArgGroup, CommandFactory, Parser as ClapParser};
use clap_complete::{Shell, generate};
use relic_core::{ConsoleGrid, SharedConsole};
use relic_runtime::Value;
use relicc::display::{view, write_grid};
use relicc::{
    CompilerConfig, Dialect, RelicError, compile_and_run, load_artifact, read_source,
    run_artifact, shared_console_for, source_name, tokenize_basic, transpile_file,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::info;

#[derive(ClapParser)]
#[command(name = "relicc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relic - run legacy 4GL, Pascal, BASIC and LISP programs", long_about = None)]
#[command(group(
    ArgGroup::new("input")
        .args(["dbase", "pascal", "basic", "lisp", "exec", "completions"])
        .required(true)
))]
struct Cli {
    /// Transpile and run a dBase-like 4GL program
    #[arg(long, value_name = "FILE")]
    dbase: Option<PathBuf>,

    /// Transpile and run a Pascal-like program
    #[arg(long, value_name = "FILE")]
    pascal: Option<PathBuf>,

    /// Transpile and run a line-numbered BASIC program
    #[arg(long, value_name = "FILE")]
    basic: Option<PathBuf>,

    /// Transpile and run a LISP-like program
    #[arg(long, value_name = "FILE")]
    lisp: Option<PathBuf>,

    /// Run a previously compiled artifact (.bin)
    #[arg(long, value_name = "FILE")]
    exec: Option<PathBuf>,

    /// Cache directory (defaults to $RELIC_CACHE_DIR, then ~/.cache/relic)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Print the generated host script before running it
    #[arg(long)]
    show_script: bool,

    /// Keep the generated host script next to the cached artifact
    #[arg(long)]
    keep_script: bool,

    /// Write the tokenized BASIC program image to this path
    #[arg(long, value_name = "PATH", requires = "basic")]
    tokens_out: Option<PathBuf>,

    /// Maximum instructions a program may execute
    #[arg(long, value_name = "N")]
    step_limit: Option<u64>,

    /// Print the console with its colors
    #[arg(long)]
    ansi: bool,

    /// Show the console full screen with a blinking cursor until a key is pressed
    #[arg(long, conflicts_with = "ansi")]
    view: bool,

    /// Generate shell completion scripts
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Arguments passed to the program's main
    #[arg(last = true)]
    args: Vec<String>,
}

impl Cli {
    fn source(&self) -> Option<(Dialect, &Path)> {
        [
            (Dialect::DBase, &self.dbase),
            (Dialect::Pascal, &self.pascal),
            (Dialect::Basic, &self.basic),
            (Dialect::Lisp, &self.lisp),
        ]
        .into_iter()
        .find_map(|(dialect, path)| path.as_deref().map(|p| (dialect, p)))
    }

    fn config(&self) -> CompilerConfig {
        let mut config = CompilerConfig::new().with_keep_script(self.keep_script);
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if let Some(steps) = self.step_limit {
            config = config.with_step_limit(steps);
        }
        config
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relicc=warn".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        run_completions(shell);
        return;
    }

    if let Err(e) = run(&cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "relicc", &mut io::stdout());
}

fn run(cli: &Cli) -> Result<(), RelicError> {
    let config = cli.config();
    let args: Vec<Value> = cli.args.iter().map(Value::str).collect();

    if let Some(path) = &cli.exec {
        let artifact = load_artifact(path)?;
        let console = match dialect_for_name(&artifact.source_name) {
            Some(dialect) => shared_console_for(dialect),
            None => ConsoleGrid::shared(80, 25),
        };
        run_artifact(&artifact, &mut Arc::clone(&console), args, &config)?;
        return present(&console, cli);
    }

    let Some((dialect, path)) = cli.source() else {
        return Err(RelicError::Io("no source file given".into()));
    };
    let program = transpile_file(dialect, path)?;
    if cli.show_script {
        print!("{}", program.render());
    }
    if let Some(out) = &cli.tokens_out {
        let bytes = tokenize_basic(&read_source(path)?, &source_name(path))?;
        fs::write(out, &bytes).map_err(io_error)?;
        info!(path = %out.display(), bytes = bytes.len(), "wrote tokenized program");
    }

    let console = shared_console_for(dialect);
    let artifact = compile_and_run(
        &program,
        &source_name(path),
        &mut Arc::clone(&console),
        args,
        &config,
    )?;
    info!(artifact = %artifact.display(), "run complete");
    present(&console, cli)
}

/// Guess the dialect of a cached program from its source file extension.
fn dialect_for_name(name: &str) -> Option<Dialect> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "prg" => Some(Dialect::DBase),
        "pas" => Some(Dialect::Pascal),
        "bas" => Some(Dialect::Basic),
        "lisp" | "lsp" => Some(Dialect::Lisp),
        _ => None,
    }
}

fn present(console: &SharedConsole, cli: &Cli) -> Result<(), RelicError> {
    if cli.view {
        return view(console).map_err(io_error);
    }
    let grid = console
        .lock()
        .map_err(|_| RelicError::Io("console lock poisoned".into()))?;
    write_grid(&mut io::stdout().lock(), &grid, cli.ansi).map_err(io_error)
}

fn io_error(e: io::Error) -> RelicError {
    RelicError::Io(e.to_string())
}
