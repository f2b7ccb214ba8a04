//! `voxlogica run FILE [...]` (spec §0.D): parse, reduce, policy-check,
//! optionally export the task graph/syntax, and optionally execute.

use crate::cli::ExecutionStrategyArg;
use crate::config::{Config, StorageBackendKind};
use crate::execution::{dask, strict};
use crate::policy::{enforce_workplan_policy_or_raise, RuntimePolicyContext};
use crate::storage::{InMemoryResultsDatabase, NoCacheResultsDatabase, ResultsDatabase, SqliteResultsDatabase};
use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct RunArgs {
    pub config: Config,
    pub file: PathBuf,
    pub execute: bool,
    pub no_cache: bool,
    pub strategy: ExecutionStrategyArg,
    pub save_task_graph: Option<PathBuf>,
    pub save_task_graph_as_json: Option<PathBuf>,
    pub save_syntax: Option<PathBuf>,
    pub debug: bool,
    pub verbose: bool,
}

pub fn run_file(args: RunArgs) -> anyhow::Result<()> {
    if args.verbose || args.debug {
        info!(file = %args.file.display(), strategy = args.strategy.as_str(), "starting run");
    }

    let source = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read '{}'", args.file.display()))?;
    let program = crate::parser::parse_program_content(&source)
        .map_err(|e| anyhow::anyhow!("parse error in '{}': {e}", args.file.display()))?;

    if let Some(path) = &args.save_syntax {
        std::fs::write(path, crate::convert::to_syntax(&program))
            .with_context(|| format!("failed to write syntax export to '{}'", path.display()))?;
    }

    let mut registry = crate::primitives::PrimitiveRegistry::new();
    let work_plan = crate::reducer::reduce_program(&program, &mut registry)
        .map_err(|e| anyhow::anyhow!("failed to reduce '{}': {e}", args.file.display()))?;
    let plan = work_plan.to_symbolic_plan();
    plan.validate().map_err(|e| anyhow::anyhow!("invalid plan for '{}': {e}", args.file.display()))?;

    if let Some(path) = &args.save_task_graph {
        std::fs::write(path, crate::convert::to_dot(&plan))
            .with_context(|| format!("failed to write task graph to '{}'", path.display()))?;
    }
    if let Some(path) = &args.save_task_graph_as_json {
        let json = serde_json::to_vec_pretty(&crate::convert::to_json_graph(&plan))?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write json task graph to '{}'", path.display()))?;
    }

    let legacy = args.config.policy.legacy;
    let read_roots = args.config.policy.extra_read_roots.clone();
    if let Err(err) =
        enforce_workplan_policy_or_raise(&plan, &registry, legacy, args.config.policy.serve_mode, &read_roots, None)
    {
        for diagnostic in &err.diagnostics {
            warn!(code = diagnostic.code, message = %diagnostic.message, "static policy violation");
        }
        anyhow::bail!("static policy check failed: {}", err.diagnostics.first().map(|d| d.message.as_str()).unwrap_or(""));
    }

    if !args.execute {
        return Ok(());
    }

    let backend = build_backend(&args.config, args.no_cache)?;
    let policy_context = if args.config.policy.serve_mode {
        Some(RuntimePolicyContext { serve_mode: true, allowed_read_roots: read_roots })
    } else {
        None
    };
    let started = Instant::now();
    let compiled_at = unix_epoch_secs();

    let result = match args.strategy {
        ExecutionStrategyArg::Strict => {
            let prepared = strict::compile(plan, registry, backend, policy_context, compiled_at);
            strict::run(&prepared, None, || started.elapsed().as_secs_f64())
        }
        ExecutionStrategyArg::Dask => {
            let prepared = dask::compile(plan, registry, backend, policy_context, compiled_at);
            dask::run(&prepared, None, || started.elapsed().as_secs_f64())
        }
    };

    if !result.success {
        for (node, error) in &result.failed_operations {
            eprintln!("{node}: {error}");
        }
        anyhow::bail!(
            "run failed: {} of {} operations did not complete",
            result.failed_operations.len(),
            result.total_operations
        );
    }
    Ok(())
}

fn build_backend(config: &Config, no_cache: bool) -> anyhow::Result<Option<Arc<dyn ResultsDatabase>>> {
    if no_cache {
        return Ok(Some(Arc::new(NoCacheResultsDatabase::new())));
    }
    match config.storage.backend {
        StorageBackendKind::None => Ok(None),
        StorageBackendKind::Memory => Ok(Some(Arc::new(InMemoryResultsDatabase::new()))),
        StorageBackendKind::Sqlite => {
            let db = match &config.storage.database_path {
                Some(path) => SqliteResultsDatabase::open(path),
                None => SqliteResultsDatabase::open_default(),
            }
            .context("failed to open sqlite results database")?;
            Ok(Some(Arc::new(db)))
        }
    }
}

/// Wall-clock reading taken once at the CLI boundary; the execution core
/// itself never reads the clock (see `PreparedPlan`'s doc comment).
fn unix_epoch_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
