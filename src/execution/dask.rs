//! Parallel-lifted execution strategy (spec §4.E). Grounded on
//! `original_source/implementation/python/voxlogica/execution_strategy/dask.py`,
//! which subclasses the reference strategy and only overrides how `range`,
//! `load`, and `map`/`for_loop` interact with Dask bags. Rust has no Dask;
//! this crate's analogue keeps `strict`'s node evaluator for everything and
//! reaches for `rayon` only where the Python override actually parallelizes
//! work: independent goal targets and the per-element step of `map`/
//! `for_loop`, matching the teacher's use of `rayon::prelude` for its own
//! bulk parallel passes. `map`/`for_loop` still produce a lazy
//! `ParallelMappedSequence` rather than an eagerly computed bag — a Dask bag
//! itself doesn't run until `.compute()`, and this crate's `stream`/`page`
//! pull results the same incremental way.

use crate::execution::dispatch::apply_primitive;
use crate::execution::results::{ExecutionResult, PreparedPlan};
use crate::execution::runtime_value;
use crate::execution::strict;
use crate::ir::{ConstantValue, GoalOperation, NodeId, NodeSpec, SymbolicPlan};
use crate::policy::RuntimePolicyContext;
use crate::primitives::api::{KernelError, KernelResult};
use crate::primitives::PrimitiveRegistry;
use crate::storage::{MaterializationStore, ResultsDatabase};
use crate::value::{RuntimeClosure, SequenceValue, VoxValue};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub const STRATEGY_NAME: &str = "dask";

pub fn compile(
    plan: SymbolicPlan,
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

/// Like `strict::run`, except independent goal targets are evaluated
/// concurrently (`MaterializationStore`/`PrimitiveRegistry` are `Send+Sync`,
/// so concurrent recursive evaluation through shared `Arc`s is sound). Goal
/// side effects still run sequentially, in declaration order, after every
/// target has settled — `print`/`save` ordering is user-observable and the
/// reference implementation never parallelizes it either.
pub fn run(prepared: &PreparedPlan, goals: Option<&[NodeId]>, elapsed_secs: impl FnOnce() -> f64) -> ExecutionResult {
    prepared.registry.reset_runtime_state();

    let target_goals: Vec<NodeId> = match goals {
        Some(goals) => goals.to_vec(),
        None => prepared.plan.goals.iter().map(|g| g.target.clone()).collect(),
    };

    let outcomes: Vec<(NodeId, KernelResult)> = target_goals
        .par_iter()
        .map(|goal_id| (goal_id.clone(), evaluate_node(prepared, goal_id)))
        .collect();

    let mut failures: HashMap<NodeId, String> = HashMap::new();
    for (id, outcome) in outcomes {
        if let Err(e) = outcome {
            failures.insert(id, e.to_string());
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
        GoalOperation::Print => println!("{label}={value}"),
        GoalOperation::Save => {
            if let Err(e) = strict_save(label, value) {
                eprintln!("save '{label}' failed: {e}");
            }
        }
    }
}

fn strict_save(label: &str, value: &VoxValue) -> std::io::Result<()> {
    std::fs::write(label, value.to_string())
}

/// Same recursive-with-memoization shape as `strict::evaluate_node`, except
/// `map`/`for_loop` fan their per-element applications out over `rayon`
/// (the Rust analogue of a Dask bag's partitioned `.map`).
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

    let result = evaluate_node_spec(prepared, spec);
    match &result {
        Ok(value) => prepared.materialization_store.put(node_id, value.clone(), serde_json::json!({})),
        Err(e) => prepared.materialization_store.fail(node_id, &e.to_string()),
    }
    result
}

fn evaluate_node_spec(prepared: &PreparedPlan, spec: &NodeSpec) -> KernelResult {
    match spec {
        NodeSpec::Constant(value) => Ok(constant_to_value(value)),
        NodeSpec::Closure { parameter, body, capture_names, captures, function_captures } => {
            let mut lookup = |id: &NodeId| evaluate_node(prepared, id);
            let closure = runtime_value::build_closure(parameter, body, capture_names, captures, function_captures, &mut lookup)?;
            Ok(VoxValue::Closure(Arc::new(closure)))
        }
        NodeSpec::Primitive { operator, args, kwargs, .. } => {
            let leaf = operator.rsplit('.').next().unwrap_or(operator);
            if (leaf == "map" || leaf == "for_loop") && args.len() == 2 {
                return evaluate_parallel_map(prepared, operator, &args[0], &args[1]);
            }

            let mut arg_values = Vec::with_capacity(args.len());
            for arg_id in args {
                arg_values.push(evaluate_node(prepared, arg_id)?);
            }
            let mut kwarg_values = Vec::with_capacity(kwargs.len());
            for (name, value_id) in kwargs {
                kwarg_values.push((name.clone(), evaluate_node(prepared, value_id)?));
            }
            apply_primitive(&prepared.registry, prepared.policy_context.as_deref(), operator, arg_values, kwarg_values)
        }
    }
}

/// Like `dispatch::MappedSequence`, except `page` fans its slice out over
/// `rayon` rather than applying the closure element-by-element — the Rust
/// analogue of a Dask bag partition's `.map()` staying a lazy graph node
/// until something (`compute()`, here `page`/`materialize`) pulls a result
/// out of it. `iter_values` still applies sequentially: a pull-based
/// `Iterator` has no natural partition boundary to hand to `rayon` without
/// buffering the whole sequence first, which is exactly the eagerness this
/// type exists to avoid.
struct ParallelMappedSequence {
    source: Arc<dyn SequenceValue>,
    closure: Arc<RuntimeClosure>,
    registry: PrimitiveRegistry,
    policy_context: Option<RuntimePolicyContext>,
    op: &'static str,
}

impl fmt::Debug for ParallelMappedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParallelMappedSequence({}, total_size={:?})", self.op, self.source.total_size())
    }
}

impl ParallelMappedSequence {
    fn apply_one(&self, item: VoxValue) -> VoxValue {
        runtime_value::apply_closure(&self.closure, item, &self.registry, self.policy_context.as_ref())
            .unwrap_or_else(|e| panic!("{}: {e}", self.op))
    }
}

impl SequenceValue for ParallelMappedSequence {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_> {
        Box::new(self.source.iter_values().map(|item| self.apply_one(item)))
    }

    fn total_size(&self) -> Option<usize> {
        self.source.total_size()
    }

    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        self.source
            .page(offset, limit)
            .into_par_iter()
            .map(|item| self.apply_one(item))
            .collect()
    }
}

fn evaluate_parallel_map(prepared: &PreparedPlan, operator: &str, seq_id: &NodeId, closure_id: &NodeId) -> KernelResult {
    let (seq_value, closure_value) = {
        let seq_result = evaluate_node(prepared, seq_id);
        let closure_result = evaluate_node(prepared, closure_id);
        (seq_result?, closure_result?)
    };

    let sequence = match seq_value {
        VoxValue::Sequence(seq) => seq,
        other => return Err(KernelError::new(format!("{operator}: expected a sequence, got {}", other.vox_type()))),
    };
    let closure = match closure_value {
        VoxValue::Closure(c) => c,
        other => return Err(KernelError::new(format!("{operator}: expected a closure, got {}", other.vox_type()))),
    };

    let leaf = operator.rsplit('.').next().unwrap_or(operator);
    Ok(VoxValue::Sequence(Arc::new(ParallelMappedSequence {
        source: sequence,
        closure,
        registry: prepared.registry.as_ref().clone(),
        policy_context: prepared.policy_context.as_deref().cloned(),
        op: if leaf == "map" { "map" } else { "for_loop" },
    })))
}

fn constant_to_value(value: &ConstantValue) -> VoxValue {
    match value {
        ConstantValue::Null => VoxValue::Scalar(crate::value::ScalarValue::Null),
        ConstantValue::Bool(b) => VoxValue::Scalar(crate::value::ScalarValue::Bool(*b)),
        ConstantValue::Integer(i) => VoxValue::Scalar(crate::value::ScalarValue::Integer(*i)),
        ConstantValue::Number(n) => VoxValue::Scalar(crate::value::ScalarValue::Number(*n)),
        ConstantValue::String(s) => VoxValue::Scalar(crate::value::ScalarValue::Str(s.clone())),
        ConstantValue::Bytes(b) => VoxValue::Scalar(crate::value::ScalarValue::Bytes(b.clone())),
    }
}

pub fn stream(prepared: &PreparedPlan, node: &NodeId, chunk_size: usize) -> KernelResult<Vec<Vec<VoxValue>>> {
    strict::stream(prepared, node, chunk_size)
}

pub fn page(prepared: &PreparedPlan, node: &NodeId, offset: usize, limit: usize) -> KernelResult<crate::execution::results::PageResult> {
    strict::page(prepared, node, offset, limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program_content;
    use crate::reducer::reduce_program;
    use crate::value::ScalarValue;

    fn compiled(source: &str) -> PreparedPlan {
        let mut registry = PrimitiveRegistry::new();
        let program = parse_program_content(source).unwrap();
        let plan = reduce_program(&program, &mut registry).unwrap().to_symbolic_plan();
        compile(plan, registry, None, None, 0.0)
    }

    #[test]
    fn parallel_map_matches_strict_elementwise_result() {
        let prepared = compiled("let f(x) = x * x\nprint \"m\" map(f, range(0,8))");
        let target = prepared.plan.goals[0].target.clone();
        let value = evaluate_node(&prepared, &target).unwrap();
        match value {
            VoxValue::Sequence(seq) => {
                let items: Vec<i64> = seq
                    .materialize()
                    .into_iter()
                    .map(|v| match v {
                        VoxValue::Scalar(ScalarValue::Integer(i)) => i,
                        other => panic!("unexpected {other:?}"),
                    })
                    .collect();
                assert_eq!(items, vec![0, 1, 4, 9, 16, 25, 36, 49]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn independent_goals_all_complete() {
        let prepared = compiled("print \"a\" 1 + 1\nprint \"b\" 2 + 2\nprint \"c\" 3 + 3");
        let result = run(&prepared, None, || 0.0);
        assert!(result.success);
        assert_eq!(result.completed_operations.len() >= 3, true);
    }
}
