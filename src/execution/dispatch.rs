//! Shared "apply one primitive to already-evaluated arguments" dispatch,
//! used by both the strict node evaluator and the runtime AST interpreter
//! that powers closure/function application (spec §4.E step 3's
//! `map`/`for_loop`/`load`/generic-kernel dispatch, unified into one place
//! because both callers need identical behavior).

use crate::policy::{self, RuntimePolicyContext};
use crate::primitives::api::{KernelError, KernelResult};
use crate::primitives::PrimitiveRegistry;
use crate::value::{RuntimeClosure, ScalarValue, SequenceValue, VoxValue};
use crate::execution::runtime_value::apply_closure;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

fn operator_leaf(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Lazily applies `closure` to each element of `source` on demand (spec
/// §4.E: `map`/`for_loop` "lazily apply the closure ... to each element,
/// propagating `total_size` when known"). Holds an owned, `Arc`-cheap clone
/// of the registry/policy context rather than borrowing them, since the
/// resulting `VoxValue::Sequence` can outlive the call that produced it.
///
/// `SequenceValue::iter_values` has no `Result` in its `Item` type, so a
/// per-element kernel failure can't be returned the way `apply_primitive`
/// returns one: there is nowhere to put it except the iteration that
/// discovers it. This mirrors the reference implementation's own
/// generator-based `SequenceValue` (`original_source/.../strict.py`'s
/// `_evaluate_map`, `yield closure.apply(item)`): building the generator
/// there doesn't evaluate the closure either, so a bad element raises only
/// when something iterates far enough to reach it, in whatever call stack
/// that happens to be (print/save materialization, `stream`, `page`), not
/// necessarily the one that evaluated the `map` node. A Rust iterator has
/// no exception channel, so this reaches for the nearest equivalent — a
/// panic at the failing element — instead of silently dropping it.
struct MappedSequence {
    source: Arc<dyn SequenceValue>,
    closure: Arc<RuntimeClosure>,
    registry: PrimitiveRegistry,
    policy: Option<RuntimePolicyContext>,
    op: &'static str,
}

impl fmt::Debug for MappedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MappedSequence({}, total_size={:?})", self.op, self.source.total_size())
    }
}

impl MappedSequence {
    fn apply_one(&self, item: VoxValue) -> VoxValue {
        apply_closure(&self.closure, item, &self.registry, self.policy.as_ref())
            .unwrap_or_else(|e| panic!("{}: {e}", self.op))
    }
}

impl SequenceValue for MappedSequence {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_> {
        Box::new(self.source.iter_values().map(|item| self.apply_one(item)))
    }

    fn total_size(&self) -> Option<usize> {
        self.source.total_size()
    }

    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        self.source.page(offset, limit).into_iter().map(|item| self.apply_one(item)).collect()
    }
}

fn as_sequence(value: &VoxValue, op: &str) -> Result<Arc<dyn SequenceValue>, KernelError> {
    match value {
        VoxValue::Sequence(s) => Ok(s.clone()),
        other => Err(KernelError::new(format!("{op}: expected a sequence, got {}", other.vox_type()))),
    }
}

fn as_closure(value: &VoxValue, op: &str) -> Result<Arc<RuntimeClosure>, KernelError> {
    match value {
        VoxValue::Closure(c) => Ok(c.clone()),
        other => Err(KernelError::new(format!("{op}: expected a closure, got {}", other.vox_type()))),
    }
}

fn bind_args(args: Vec<VoxValue>, kwargs: Vec<(String, VoxValue)>) -> HashMap<String, VoxValue> {
    let mut bound = HashMap::with_capacity(args.len() + kwargs.len());
    for (index, value) in args.into_iter().enumerate() {
        bound.insert(index.to_string(), value);
    }
    for (name, value) in kwargs {
        bound.insert(name, value);
    }
    bound
}

/// Apply `operator` (fully qualified, e.g. `default.map`) to already
/// evaluated positional/keyword arguments.
///
/// `map`/`for_loop` are intercepted here rather than reaching the registry
/// kernel (which exists only to reject a direct call): they return a lazy
/// `MappedSequence` that applies the closure on demand (spec §4.E), not an
/// eagerly-drained one. `load`/`dir` pass through to their registered
/// kernel after a read-root policy check against any constant string path
/// argument.
pub fn apply_primitive(
    registry: &PrimitiveRegistry,
    policy_context: Option<&RuntimePolicyContext>,
    operator: &str,
    args: Vec<VoxValue>,
    kwargs: Vec<(String, VoxValue)>,
) -> KernelResult {
    let leaf = operator_leaf(operator);

    if (leaf == "map" || leaf == "for_loop") && args.len() == 2 {
        let seq = as_sequence(&args[0], leaf)?;
        let closure = as_closure(&args[1], leaf)?;
        return Ok(VoxValue::Sequence(Arc::new(MappedSequence {
            source: seq,
            closure,
            registry: registry.clone(),
            policy: policy_context.cloned(),
            op: if leaf == "map" { "map" } else { "for_loop" },
        })));
    }

    if policy::is_read_operator(operator) {
        if let (Some(policy_context), Some(VoxValue::Scalar(ScalarValue::Str(path)))) = (policy_context, args.first()) {
            policy::enforce_runtime_read_path_policy(policy_context, operator, path).map_err(KernelError::new)?;
        }
    }

    let kernel = registry
        .load_kernel(operator)
        .map_err(|e| KernelError::new(format!("{operator}: {e}")))?;
    kernel(&bind_args(args, kwargs))
}
