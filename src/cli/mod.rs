//! Command-line surface (spec §0.D): `version`, `run`, `list-primitives`,
//! `repl`, wired with `clap`'s derive macros.

pub mod repl;
pub mod run;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionStrategyArg {
    Dask,
    Strict,
}

impl ExecutionStrategyArg {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStrategyArg::Dask => crate::execution::dask::STRATEGY_NAME,
            ExecutionStrategyArg::Strict => crate::execution::strict::STRATEGY_NAME,
        }
    }
}

impl From<crate::config::ExecutionStrategyKind> for ExecutionStrategyArg {
    fn from(kind: crate::config::ExecutionStrategyKind) -> Self {
        match kind {
            crate::config::ExecutionStrategyKind::Dask => ExecutionStrategyArg::Dask,
            crate::config::ExecutionStrategyKind::Strict => ExecutionStrategyArg::Strict,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "voxlogica", version, about = "Analyzer and runtime for IMGQL")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the runtime version and exit.
    Version,
    /// Reduce an IMGQL program and, unless `--no-execute` is given, run it.
    Run {
        file: PathBuf,
        #[arg(long, conflicts_with = "no_execute")]
        execute: bool,
        #[arg(long, conflicts_with = "execute")]
        no_execute: bool,
        #[arg(long)]
        no_cache: bool,
        #[arg(long, value_enum)]
        execution_strategy: Option<ExecutionStrategyArg>,
        /// Shorthand for `--execution-strategy strict`.
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        save_task_graph: Option<PathBuf>,
        #[arg(long)]
        save_task_graph_as_json: Option<PathBuf>,
        #[arg(long)]
        save_syntax: Option<PathBuf>,
        #[arg(long)]
        debug: bool,
        #[arg(long)]
        verbose: bool,
    },
    /// List primitives exported by a namespace, or every loaded namespace.
    #[command(name = "list-primitives")]
    ListPrimitives { namespace: Option<String> },
    /// Start an interactive read-eval-print loop.
    Repl {
        #[arg(long, value_enum)]
        execution_strategy: Option<ExecutionStrategyArg>,
        #[arg(long)]
        strict: bool,
    },
}

pub fn dispatch(cli: Cli, config: crate::config::Config) -> anyhow::Result<()> {
    match cli.command {
        Command::Version => {
            println!("voxlogica {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::ListPrimitives { namespace } => {
            list_primitives(namespace.as_deref());
            Ok(())
        }
        Command::Run {
            file,
            execute,
            no_execute,
            no_cache,
            execution_strategy,
            strict,
            save_task_graph,
            save_task_graph_as_json,
            save_syntax,
            debug,
            verbose,
        } => {
            let strategy = resolve_strategy(&config, execution_strategy, strict);
            run::run_file(run::RunArgs {
                config,
                file,
                execute: !no_execute || execute,
                no_cache,
                strategy,
                save_task_graph,
                save_task_graph_as_json,
                save_syntax,
                debug,
                verbose,
            })
        }
        Command::Repl { execution_strategy, strict } => {
            let strategy = resolve_strategy(&config, execution_strategy, strict);
            repl::run_repl(config, strategy)
        }
    }
}

/// `--strict` is shorthand for `--execution-strategy strict`; an explicit
/// `--execution-strategy` wins over both; with neither given, fall back to
/// the loaded configuration's default.
fn resolve_strategy(
    config: &crate::config::Config,
    explicit: Option<ExecutionStrategyArg>,
    strict_flag: bool,
) -> ExecutionStrategyArg {
    match explicit {
        Some(strategy) => strategy,
        None if strict_flag => ExecutionStrategyArg::Strict,
        None => config.execution.strategy.into(),
    }
}

fn list_primitives(namespace: Option<&str>) {
    let registry = crate::primitives::PrimitiveRegistry::new();
    for (name, description) in registry.list_primitives(namespace) {
        println!("{name}\t{description}");
    }
}
