//! Full pipeline exercised through the public `run` entry point: parse,
//! reduce, policy-check, execute, and the `--save-*` export flags (spec §8).

use std::io::Write;
use voxlogica::cli::run::{run_file, RunArgs};
use voxlogica::cli::ExecutionStrategyArg;
use voxlogica::config::{Config, StorageBackendKind};

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(source.as_bytes()).unwrap();
    path
}

fn base_args(dir: &tempfile::TempDir, source: &str) -> RunArgs {
    let mut config = Config::default();
    config.storage.backend = StorageBackendKind::None;
    RunArgs {
        config,
        file: write_source(dir, "program.imgql", source),
        execute: true,
        no_cache: true,
        strategy: ExecutionStrategyArg::Strict,
        save_task_graph: None,
        save_task_graph_as_json: None,
        save_syntax: None,
        debug: false,
        verbose: false,
    }
}

#[test]
fn a_pure_program_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    let args = base_args(&dir, "let f(x) = x * x\nprint \"r\" f(6)");
    run_file(args).expect("a well-formed pure program must run to completion");
}

#[test]
fn map_over_a_range_runs_under_the_dask_strategy_too() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = base_args(&dir, "let sq(x) = x * x\nprint \"r\" map(sq, range(8))");
    args.strategy = ExecutionStrategyArg::Dask;
    run_file(args).expect("a parallel-safe program must run under the dask strategy");
}

#[test]
fn no_execute_still_performs_parsing_reduction_and_policy_checks() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = base_args(&dir, "print \"r\" 1 + 1");
    args.execute = false;
    run_file(args).expect("--no-execute must still succeed for a well-formed program");
}

#[test]
fn save_task_graph_exports_are_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut args = base_args(&dir, "print \"r\" 1 + 2");
    args.execute = false;
    let dot_path = dir.path().join("graph.dot");
    let json_path = dir.path().join("graph.json");
    let syntax_path = dir.path().join("program.out.imgql");
    args.save_task_graph = Some(dot_path.clone());
    args.save_task_graph_as_json = Some(json_path.clone());
    args.save_syntax = Some(syntax_path.clone());

    run_file(args).unwrap();

    let dot = std::fs::read_to_string(&dot_path).unwrap();
    assert!(dot.starts_with("digraph {"));
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(json["goals"].as_array().unwrap().len(), 1);
    let syntax = std::fs::read_to_string(&syntax_path).unwrap();
    assert!(syntax.contains("print \"r\""));
}

#[test]
fn a_program_with_an_unresolved_callable_fails_at_reduction() {
    let dir = tempfile::tempdir().unwrap();
    let args = base_args(&dir, "print \"r\" not_a_real_function(1)");
    assert!(run_file(args).is_err());
}
