//! Reference execution strategy: local, single-threaded, demand-driven
//! recursive evaluation (spec §4.E). Grounded directly on
//! `original_source/implementation/python/voxlogica/execution_strategy/strict.py`'s
//! `_evaluate_node`/`run`/`stream`/`page` algorithm.

use crate::execution::dispatch::apply_primitive;
use crate::execution::results::{ExecutionResult, PageResult, PreparedPlan};
use crate::execution::runtime_value;
use crate::ir::{ConstantValue, GoalOperation, NodeId, NodeSpec};
use crate::policy::RuntimePolicyContext;
use crate::primitives::api::{KernelError, KernelResult};
use crate::primitives::PrimitiveRegistry;
use crate::storage::{MaterializationStore, ResultsDatabase};
use crate::value::{EagerSequence, ScalarValue, SequenceValue, VoxValue, MAX_PAGE_SIZE};
use std::collections::HashMap;
use std::sync::Arc;

pub const STRATEGY_NAME: &str = "strict";

/// Compile `plan` against `registry` (after applying the plan's own
/// namespace imports) and an optional durable backend. `compiled_at` is the
/// caller's wall-clock reading (see `PreparedPlan`'s doc comment).
pub fn compile(
    plan: crate::ir::SymbolicPlan,
    mut registry: PrimitiveRegistry,
    backend: Option<Arc<dyn ResultsDatabase>>,
    policy_context: Option<RuntimePolicyContext>,
    compiled_at: f64,
) -> PreparedPlan {
    registry.apply_imports(plan.imported_namespaces.iter().map(String::as_str));
    PreparedPlan {
        plan,
        registry: Arc::new(registry),
        materialization_store: Arc::new(MaterializationStore::new(backend, false, true)),
        strategy_name: STRATEGY_NAME.to_string(),
        compiled_at,
        policy_context: policy_context.map(Arc::new),
    }
}

/// Evaluate every goal target (or just `goals` when given, spec §4.E's
/// `run(prepared, goals?)`), then run each successfully evaluated goal's
/// side effect. A per-node failure is recorded and does not abort the run.
pub fn run(prepared: &PreparedPlan, goals: Option<&[NodeId]>, elapsed_secs: impl FnOnce() -> f64) -> ExecutionResult {
    prepared.registry.reset_runtime_state();
    let mut failures: HashMap<NodeId, String> = HashMap::new();

    let target_goals: Vec<NodeId> = match goals {
        Some(goals) => goals.to_vec(),
        None => prepared.plan.goals.iter().map(|g| g.target.clone()).collect(),
    };

    for goal_id in &target_goals {
        if let Err(e) = evaluate_node(prepared, goal_id) {
            failures.insert(goal_id.clone(), e.to_string());
        }
    }

    if goals.is_none() {
        for goal in &prepared.plan.goals {
            if failures.contains_key(&goal.target) {
                continue;
            }
            match evaluate_node(prepared, &goal.target) {
                Ok(value) => run_goal_side_effect(goal.operation, &goal.label, &value),
                Err(e) => {
                    failures.insert(goal.target.clone(), e.to_string());
                }
            }
        }
    }

    ExecutionResult {
        success: failures.is_empty(),
        completed_operations: prepared.materialization_store.completed_nodes(),
        failed_operations: failures,
        execution_time: elapsed_secs(),
        total_operations: prepared.plan.nodes.len(),
    }
}

fn run_goal_side_effect(operation: GoalOperation, label: &str, value: &VoxValue) {
    match operation {
        GoalOperation::Print => {
            let rendered = render_for_print(value);
            println!("{label}={rendered}");
        }
        GoalOperation::Save => {
            if let Err(e) = save_value(label, value) {
                eprintln!("save '{label}' failed: {e}");
            }
        }
    }
}

fn render_for_print(value: &VoxValue) -> String {
    match value {
        VoxValue::Sequence(seq) => {
            let materialized = VoxValue::Sequence(Arc::new(EagerSequence::new(seq.materialize())));
            materialized.to_string()
        }
        other => other.to_string(),
    }
}

/// Materialize `value` then encode it by `label`'s filename suffix: `.json`
/// for canonical JSON, `.bin`/`.pkl`/`.pickle` for the binary codec envelope,
/// anything else as a plain textual rendering (spec §4.E goal side effects).
fn save_value(label: &str, value: &VoxValue) -> std::io::Result<()> {
    let materialized = match value {
        VoxValue::Sequence(seq) => VoxValue::Sequence(Arc::new(EagerSequence::new(seq.materialize()))),
        other => other.clone(),
    };
    let path = std::path::Path::new(label);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let suffix = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_lowercase();
    match suffix.as_str() {
        "json" => {
            let json = materialized.to_json_native();
            std::fs::write(path, serde_json::to_vec_pretty(&json).unwrap_or_default())
        }
        "bin" | "pkl" | "pickle" => match crate::codec::encode_for_storage(&materialized, MAX_PAGE_SIZE) {
            Ok(record) => std::fs::write(path, bincode::serialize(&record).unwrap_or_default()),
            Err(e) => Err(std::io::Error::other(e.to_string())),
        },
        _ => std::fs::write(path, materialized.to_string()),
    }
}

/// Stream `node`'s sequence contents in chunks of `chunk_size` (spec §4.E
/// `stream`).
pub fn stream(prepared: &PreparedPlan, node: &NodeId, chunk_size: usize) -> KernelResult<Vec<Vec<VoxValue>>> {
    if chunk_size == 0 {
        return Err(KernelError::new("chunk_size must be > 0"));
    }
    let value = evaluate_node(prepared, node)?;
    let sequence = coerce_sequence(&value)?;
    let items = sequence.materialize();
    Ok(items.chunks(chunk_size).map(<[VoxValue]>::to_vec).collect())
}

/// Page `node`'s sequence contents (spec §4.E `page`); non-sequence values
/// behave like a one-element sequence at offset zero.
pub fn page(prepared: &PreparedPlan, node: &NodeId, offset: usize, limit: usize) -> KernelResult<PageResult> {
    let value = evaluate_node(prepared, node)?;
    match coerce_sequence(&value) {
        Ok(sequence) => {
            let items = sequence.page(offset, limit);
            let next_offset = if items.len() < limit { None } else { Some(offset + items.len()) };
            Ok(PageResult { items, offset, limit, next_offset })
        }
        Err(_) => {
            let items = if offset == 0 && limit > 0 { vec![value] } else { vec![] };
            Ok(PageResult { items, offset, limit, next_offset: None })
        }
    }
}

fn coerce_sequence(value: &VoxValue) -> KernelResult<Arc<dyn SequenceValue>> {
    match value {
        VoxValue::Sequence(seq) => Ok(seq.clone()),
        other => Err(KernelError::new(format!("expected a sequence, got {}", other.vox_type()))),
    }
}

/// Evaluate `node_id` under `prepared`, reading the materialization cache
/// first and writing the result (or failure) back through it on the way out.
fn evaluate_node(prepared: &PreparedPlan, node_id: &NodeId) -> KernelResult {
    if prepared.materialization_store.has(node_id) {
        return prepared
            .materialization_store
            .get(node_id)
            .map_err(|e| KernelError::new(e.to_string()));
    }

    let spec = prepared
        .plan
        .nodes
        .get(node_id)
        .ok_or_else(|| KernelError::new(format!("no definition for node {node_id}")))?;

    let result = evaluate_node_spec(prepared, node_id, spec);
    match &result {
        Ok(value) => prepared.materialization_store.put(node_id, value.clone(), serde_json::json!({})),
        Err(e) => prepared.materialization_store.fail(node_id, &e.to_string()),
    }
    result
}

fn evaluate_node_spec(prepared: &PreparedPlan, node_id: &NodeId, spec: &NodeSpec) -> KernelResult {
    match spec {
        NodeSpec::Constant(value) => Ok(constant_to_value(value)),
        NodeSpec::Closure { parameter, body, capture_names, captures, function_captures } => {
            let mut lookup = |id: &NodeId| evaluate_node(prepared, id);
            let closure = runtime_value::build_closure(parameter, body, capture_names, captures, function_captures, &mut lookup)?;
            Ok(VoxValue::Closure(Arc::new(closure)))
        }
        NodeSpec::Primitive { operator, args, kwargs, .. } => {
            let mut arg_values = Vec::with_capacity(args.len());
            for arg_id in args {
                arg_values.push(evaluate_node(prepared, arg_id)?);
            }
            let mut kwarg_values = Vec::with_capacity(kwargs.len());
            for (name, value_id) in kwargs {
                kwarg_values.push((name.clone(), evaluate_node(prepared, value_id)?));
            }
            let _ = node_id;
            apply_primitive(&prepared.registry, prepared.policy_context.as_deref(), operator, arg_values, kwarg_values)
        }
    }
}

fn constant_to_value(value: &ConstantValue) -> VoxValue {
    match value {
        ConstantValue::Null => VoxValue::Scalar(ScalarValue::Null),
        ConstantValue::Bool(b) => VoxValue::Scalar(ScalarValue::Bool(*b)),
        ConstantValue::Integer(i) => VoxValue::Scalar(ScalarValue::Integer(*i)),
        ConstantValue::Number(n) => VoxValue::Scalar(ScalarValue::Number(*n)),
        ConstantValue::String(s) => VoxValue::Scalar(ScalarValue::Str(s.clone())),
        ConstantValue::Bytes(b) => VoxValue::Scalar(ScalarValue::Bytes(b.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program_content;
    use crate::reducer::reduce_program;

    fn compiled(source: &str) -> PreparedPlan {
        let mut registry = PrimitiveRegistry::new();
        let program = parse_program_content(source).unwrap();
        let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
        compile(plan, registry, None, None, 0.0)
    }

    #[test]
    fn evaluates_arithmetic_goal() {
        let prepared = compiled("print \"r\" 1 + 2");
        let target = prepared.plan.goals[0].target.clone();
        match evaluate_node(&prepared, &target).unwrap() {
            VoxValue::Scalar(ScalarValue::Integer(3)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn arithmetic_node_is_memoized_after_first_evaluation() {
        let prepared = compiled("print \"r\" 1 + 2");
        let target = prepared.plan.goals[0].target.clone();
        evaluate_node(&prepared, &target).unwrap();
        assert!(prepared.materialization_store.has(&target));
    }

    #[test]
    fn map_over_declared_function_evaluates_elementwise() {
        let prepared = compiled("let f(x) = x * x\nprint \"m\" map(f, range(0,4))");
        let target = prepared.plan.goals[0].target.clone();
        let value = evaluate_node(&prepared, &target).unwrap();
        match value {
            VoxValue::Sequence(seq) => {
                let items = seq.materialize();
                let rendered: Vec<i64> = items
                    .into_iter()
                    .map(|v| match v {
                        VoxValue::Scalar(ScalarValue::Integer(i)) => i,
                        other => panic!("unexpected {other:?}"),
                    })
                    .collect();
                assert_eq!(rendered, vec![0, 1, 4, 9]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn failed_node_records_failure_without_aborting_run() {
        let prepared = compiled("print \"ok\" 1 + 1\nprint \"bad\" 1 / 0");
        let result = run(&prepared, None, || 0.0);
        assert!(!result.success);
        assert_eq!(result.failed_operations.len(), 1);
    }

    #[test]
    fn run_completes_successfully_for_a_pure_program() {
        let prepared = compiled("print \"r\" 2 * 3");
        let result = run(&prepared, None, || 0.0);
        assert!(result.success);
        assert!(result.failed_operations.is_empty());
    }
}
