//! Static effect-blocking and runtime read-root sandboxing through the
//! public `run` pipeline (spec §4.D).

use std::io::Write;
use voxlogica::cli::run::{run_file, RunArgs};
use voxlogica::cli::ExecutionStrategyArg;
use voxlogica::config::Config;

fn write_source(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(source.as_bytes()).unwrap();
    path
}

#[test]
fn effectful_primitive_is_rejected_in_non_legacy_mode() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "write.imgql", "print \"r\" simpleitk.WriteImage(0, \"/tmp/out.nii\")");

    let mut config = Config::default();
    config.storage.backend = voxlogica::config::StorageBackendKind::None;

    let result = run_file(RunArgs {
        config,
        file,
        execute: true,
        no_cache: true,
        strategy: ExecutionStrategyArg::Strict,
        save_task_graph: None,
        save_task_graph_as_json: None,
        save_syntax: None,
        debug: false,
        verbose: false,
    });
    assert!(result.is_err(), "non-legacy run must reject an effectful primitive before execution");
}

#[test]
fn effectful_primitive_is_accepted_in_legacy_mode_but_file_write_is_sandboxed_elsewhere() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "pure.imgql", "print \"r\" 1 + 1");

    let mut config = Config::default();
    config.policy.legacy = true;
    config.storage.backend = voxlogica::config::StorageBackendKind::None;

    let result = run_file(RunArgs {
        config,
        file,
        execute: true,
        no_cache: true,
        strategy: ExecutionStrategyArg::Strict,
        save_task_graph: None,
        save_task_graph_as_json: None,
        save_syntax: None,
        debug: false,
        verbose: false,
    });
    assert!(result.is_ok());
}

#[test]
fn serve_mode_rejects_reads_outside_the_allowed_roots() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_source(&dir, "read.imgql", "print \"r\" load(\"/etc/passwd\")");

    let mut config = Config::default();
    config.policy.serve_mode = true;
    config.policy.extra_read_roots = vec![dir.path().to_path_buf()];
    config.storage.backend = voxlogica::config::StorageBackendKind::None;

    let result = run_file(RunArgs {
        config,
        file,
        execute: false,
        no_cache: true,
        strategy: ExecutionStrategyArg::Strict,
        save_task_graph: None,
        save_task_graph_as_json: None,
        save_syntax: None,
        debug: false,
        verbose: false,
    });
    assert!(result.is_err(), "a load outside the allowed read roots must be rejected statically");
}
