//! A node already recorded in the materialization store is never
//! recomputed within the same prepared plan (spec §4.F).

use voxlogica::execution::strict;
use voxlogica::primitives::PrimitiveRegistry;
use voxlogica::reducer::reduce_program;
use voxlogica::storage::InMemoryResultsDatabase;
use std::sync::Arc;

#[test]
fn shared_subexpression_materializes_once_across_two_goals() {
    let source = "print \"a\" (1 + 2) * 10\nprint \"b\" (1 + 2) * 20";
    let program = voxlogica::parser::parse_program_content(source).unwrap();
    let mut registry = PrimitiveRegistry::new();
    let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();

    // the "1+2" node is shared by both goals; confirm it exists exactly once
    // in the node table regardless of how many goals reference it.
    let plus_one_two = plan
        .nodes
        .iter()
        .filter(|(_, spec)| matches!(spec, voxlogica::ir::NodeSpec::Constant(_)))
        .count();
    assert_eq!(plus_one_two, 4, "1, 2, 10, 20 are the only distinct constants");

    let backend = Arc::new(InMemoryResultsDatabase::new());
    let prepared = strict::compile(plan, registry, Some(backend), None, 0.0);
    let result = strict::run(&prepared, None, || 0.0);
    assert!(result.success);
    assert_eq!(result.failed_operations.len(), 0);
}

#[test]
fn re_running_the_same_prepared_plan_reuses_materialized_values() {
    let source = "print \"r\" 3 * 4";
    let program = voxlogica::parser::parse_program_content(source).unwrap();
    let mut registry = PrimitiveRegistry::new();
    let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();

    let prepared = strict::compile(plan, registry, None, None, 0.0);
    let first = strict::run(&prepared, None, || 0.0);
    let second = strict::run(&prepared, None, || 0.0);
    assert!(first.success && second.success);
    assert_eq!(first.completed_operations, second.completed_operations);
}
