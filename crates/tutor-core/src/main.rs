//! Binary entry point for the `tutor` CLI.
//!
//! ```bash
//! # Analyze the current directory incrementally
//! tutor analyze --id my-project
//!
//! # Analyze a single file, ignoring the cache
//! tutor file src/app.py --no-cache
//!
//! # Show stored metrics, list and forget codebases
//! tutor stats --id my-project
//! tutor list
//! tutor forget my-project
//! ```
//!
//! Results are written to stdout as JSON; logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;

use tutor_core::config::TutorConfig;
use tutor_core::engine::AnalysisEngine;
use tutor_core::errors::{TutorError, TutorResult};
use tutor_core::telemetry;

// ============================================================================
// CLI Structure
// ============================================================================

/// Incremental code analysis for codebase tutoring.
#[derive(Parser, Debug)]
#[command(name = "tutor", version, about = "Incremental code analysis for codebase tutoring")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Project root (default: current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Data directory for the cache and snapshots (default: .tutor/ in root).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Worker threads for codebase analysis.
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log level; `TUTOR_LOG` takes precedence when set.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze every supported file under the root.
    Analyze {
        /// Codebase id (default: configured default id).
        #[arg(long)]
        id: Option<String>,
        /// Re-analyze every file instead of diffing against the last run.
        #[arg(long)]
        full: bool,
        /// Do not consult or fill the file cache.
        #[arg(long)]
        no_cache: bool,
        /// Print the whole analysis instead of a summary.
        #[arg(long)]
        details: bool,
    },
    /// Analyze a single file.
    File {
        path: PathBuf,
        #[arg(long)]
        no_cache: bool,
    },
    /// Show stored metrics of a codebase and cache statistics.
    Stats {
        #[arg(long)]
        id: Option<String>,
    },
    /// List codebases with a stored analysis.
    List,
    /// Delete the stored analysis of a codebase.
    Forget { id: String },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (root, config) = match load_config(&cli.global) {
        Ok(loaded) => loaded,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    let guard = telemetry::init(&config.log);

    let code = match execute(cli.command, root, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            if err.is_validation() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    };
    guard.shutdown();
    code
}

fn load_config(global: &GlobalArgs) -> TutorResult<(PathBuf, TutorConfig)> {
    let root = match &global.root {
        Some(root) => root.clone(),
        None => std::env::current_dir()?,
    };
    let root = root.canonicalize().map_err(|e| {
        TutorError::Validation(format!("cannot open root {}: {e}", root.display()))
    })?;

    let mut config = match &global.data_dir {
        Some(dir) => {
            let env = TutorConfig::from_env(&root);
            TutorConfig {
                log: env.log,
                engine: env.engine,
                ..TutorConfig::with_data_dir(dir.clone())
            }
        }
        None => TutorConfig::from_env(&root),
    };
    if let Some(workers) = global.workers {
        config.engine.workers = workers.max(1);
    }
    if let Some(level) = global.log_level {
        config.log.level = level.as_directive().to_string();
    }
    if global.log_json {
        config.log.json = true;
    }
    Ok((root, config))
}

fn emit<T: Serialize>(value: &T) -> TutorResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

fn execute(command: Command, root: PathBuf, config: &TutorConfig) -> TutorResult<()> {
    let engine = AnalysisEngine::from_config(root, config);
    let default_id = config.engine.default_codebase_id.clone();

    let result = match command {
        Command::Analyze {
            id,
            full,
            no_cache,
            details,
        } => {
            let id = id.unwrap_or(default_id);
            let purged = engine.cache().purge_expired();
            tracing::debug!(purged, "expired cache entries removed");
            let analysis = engine.analyze_codebase(&id, !full, !no_cache)?;
            if details {
                emit(&analysis)
            } else {
                emit(&json!({
                    "codebase_id": analysis.codebase_id,
                    "metrics": analysis.metrics,
                    "scan": analysis.scan,
                    "circular_dependencies": analysis.dependency_graph.circular_dependencies,
                    "top_teaching_files": analysis.top_teaching_files,
                    "global_patterns": analysis.global_patterns,
                }))
            }
        }
        Command::File { path, no_cache } => {
            // relative to the working directory, like any other CLI path
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()?.join(path)
            };
            let path = path.canonicalize().unwrap_or(path);
            let analysis = engine.analyze_file(&path, !no_cache)?;
            emit(&analysis)
        }
        Command::Stats { id } => {
            let id = id.unwrap_or(default_id);
            let stored = engine.load_codebase(&id)?;
            emit(&json!({
                "codebase_id": id,
                "metrics": stored.as_ref().map(|a| &a.metrics),
                "analyzed_at": stored.as_ref().map(|a| a.analyzed_at),
                "cache": engine.cache().get_stats(),
                "performance": engine.get_performance_metrics(),
            }))
        }
        Command::List => emit(&engine.persistence().list_codebases()?),
        Command::Forget { id } => {
            let removed = engine.forget_codebase(&id)?;
            emit(&json!({ "codebase_id": id, "removed": removed }))
        }
    };
    engine.cache().close();
    result
}
