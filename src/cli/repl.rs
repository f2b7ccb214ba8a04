//! `voxlogica repl` (spec §0.D): an interactive line-at-a-time session,
//! grounded on the reference client binary's `rustyline` loop mechanics
//! (history file resolution, interrupt/eof handling).

use crate::ast::Command;
use crate::cli::ExecutionStrategyArg;
use crate::config::Config;
use crate::execution::{dask, strict};
use crate::policy::enforce_workplan_policy_or_raise;
use crate::storage::{InMemoryResultsDatabase, ResultsDatabase};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub fn run_repl(config: Config, strategy: ExecutionStrategyArg) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history_path = history_path();
    let _ = editor.load_history(&history_path);

    println!("voxlogica {} ({})", env!("CARGO_PKG_VERSION"), strategy.as_str());
    let mut session_source = String::new();

    loop {
        match editor.readline("voxlogica> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if let Err(error) = evaluate_line(&config, strategy, &mut session_source, line) {
                    eprintln!("error: {error}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("goodbye");
                break;
            }
            Err(error) => {
                eprintln!("error: {error}");
                break;
            }
        }
    }

    let _ = editor.save_history(&history_path);
    Ok(())
}

fn history_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        let dir = PathBuf::from(home).join(".voxlogica");
        if std::fs::create_dir_all(&dir).is_ok() {
            return dir.join("history");
        }
    }
    PathBuf::from(".voxlogica_history")
}

/// Reduce and run `session_source` with `line` appended; on success only
/// the `let`/`import` commands are folded back into the session (so a
/// later line sees earlier bindings) while `print`/`save` goals run once
/// and are not replayed on the next line's re-evaluation.
fn evaluate_line(config: &Config, strategy: ExecutionStrategyArg, session_source: &mut String, line: &str) -> anyhow::Result<()> {
    let candidate = format!("{session_source}{line}\n");
    let program = crate::parser::parse_program_content(&candidate).map_err(|e| anyhow::anyhow!("{e}"))?;

    let mut registry = crate::primitives::PrimitiveRegistry::new();
    let work_plan = crate::reducer::reduce_program(&program, &mut registry).map_err(|e| anyhow::anyhow!("{e}"))?;
    let plan = work_plan.to_symbolic_plan();

    let legacy = config.policy.legacy;
    let read_roots = config.policy.extra_read_roots.clone();
    enforce_workplan_policy_or_raise(&plan, &registry, legacy, config.policy.serve_mode, &read_roots, None)
        .map_err(|e| anyhow::anyhow!("{}", e.diagnostics.first().map(|d| d.message.as_str()).unwrap_or("policy check failed")))?;

    let backend: Option<Arc<dyn ResultsDatabase>> = Some(Arc::new(InMemoryResultsDatabase::new()));
    let started = Instant::now();
    let result = match strategy {
        ExecutionStrategyArg::Strict => {
            let prepared = strict::compile(plan, registry, backend, None, 0.0);
            strict::run(&prepared, None, || started.elapsed().as_secs_f64())
        }
        ExecutionStrategyArg::Dask => {
            let prepared = dask::compile(plan, registry, backend, None, 0.0);
            dask::run(&prepared, None, || started.elapsed().as_secs_f64())
        }
    };

    if !result.success {
        let messages: Vec<String> = result.failed_operations.values().cloned().collect();
        anyhow::bail!(messages.join("; "));
    }

    let bindings: Vec<String> = program
        .commands
        .iter()
        .filter(|c| matches!(c, Command::Declaration { .. } | Command::Import(_)))
        .map(Command::to_syntax)
        .collect();
    *session_source = if bindings.is_empty() { String::new() } else { format!("{}\n", bindings.join("\n")) };
    Ok(())
}
