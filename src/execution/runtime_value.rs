//! Runtime interpreter for closure/function bodies (spec §4.E "Runtime
//! closures and functions"): applying a `RuntimeClosure` to an element, or
//! invoking a `RuntimeFunction` with arguments, means evaluating its stored
//! `Expression` body against an environment of already-resolved values —
//! the same `Number`/`Bool`/`String`/`Call`/`Let`/`For` walk the reducer does
//! over the symbolic plan, except this one actually computes a `VoxValue`
//! instead of building a node.

use crate::ast::{Expression, OrderedF64};
use crate::ir::{NodeId, SerializedFunction};
use crate::policy::RuntimePolicyContext;
use crate::primitives::api::{KernelError, KernelResult};
use crate::primitives::PrimitiveRegistry;
use crate::value::{EagerSequence, RuntimeClosure, RuntimeFunction, ScalarValue, SequenceValue, VoxValue};
use crate::execution::dispatch::apply_primitive;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Instantiate a `RuntimeClosure` from a `NodeSpec::Closure`'s pieces, using
/// `lookup` to resolve each captured `NodeId` to its materialized value.
pub fn build_closure(
    parameter: &str,
    body: &Expression,
    capture_names: &[String],
    captures: &[NodeId],
    function_captures: &[(String, SerializedFunction)],
    lookup: &mut dyn FnMut(&NodeId) -> KernelResult,
) -> Result<RuntimeClosure, KernelError> {
    let mut resolved = BTreeMap::new();
    for (name, node_id) in capture_names.iter().zip(captures) {
        resolved.insert(name.clone(), lookup(node_id)?);
    }
    let mut functions = BTreeMap::new();
    for (name, serialized) in function_captures {
        functions.insert(name.clone(), build_function(serialized, lookup)?);
    }
    Ok(RuntimeClosure { parameter: parameter.to_string(), body: body.clone(), captures: resolved, functions })
}

/// Same idea for a transitively captured named function.
pub fn build_function(
    serialized: &SerializedFunction,
    lookup: &mut dyn FnMut(&NodeId) -> KernelResult,
) -> Result<RuntimeFunction, KernelError> {
    let mut captures = BTreeMap::new();
    for (name, node_id) in &serialized.captures {
        captures.insert(name.clone(), lookup(node_id)?);
    }
    let mut functions = BTreeMap::new();
    for (name, nested) in &serialized.functions {
        functions.insert(name.clone(), build_function(nested, lookup)?);
    }
    Ok(RuntimeFunction { parameters: serialized.parameters.clone(), body: serialized.body.clone(), captures, functions })
}

#[derive(Default, Clone)]
struct RuntimeEnv {
    values: HashMap<String, VoxValue>,
    functions: HashMap<String, RuntimeFunction>,
}

/// Apply `closure` to `input` (`map`/`for_loop`'s per-element step).
pub fn apply_closure(
    closure: &RuntimeClosure,
    input: VoxValue,
    registry: &PrimitiveRegistry,
    policy: Option<&RuntimePolicyContext>,
) -> KernelResult {
    let mut env = RuntimeEnv {
        values: closure.captures.clone().into_iter().collect(),
        functions: closure.functions.clone().into_iter().collect(),
    };
    env.values.insert(closure.parameter.clone(), input);
    eval_expression(&closure.body, &env, registry, policy)
}

/// Invoke `function` with already-evaluated positional `args`.
pub fn invoke_function(
    function: &RuntimeFunction,
    args: Vec<VoxValue>,
    registry: &PrimitiveRegistry,
    policy: Option<&RuntimePolicyContext>,
) -> KernelResult {
    if args.len() != function.parameters.len() {
        return Err(KernelError::new(format!(
            "E_ARITY: function expects {} argument(s), got {}",
            function.parameters.len(),
            args.len()
        )));
    }
    let mut env = RuntimeEnv {
        values: function.captures.clone().into_iter().collect(),
        functions: function.functions.clone().into_iter().collect(),
    };
    for (param, value) in function.parameters.iter().zip(args) {
        env.values.insert(param.clone(), value);
    }
    eval_expression(&function.body, &env, registry, policy)
}

fn number_to_scalar(n: OrderedF64) -> ScalarValue {
    let value = n.get();
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        ScalarValue::Integer(value as i64)
    } else {
        ScalarValue::Number(value)
    }
}

fn as_sequence(value: VoxValue, context: &str) -> Result<Arc<dyn SequenceValue>, KernelError> {
    match value {
        VoxValue::Sequence(seq) => Ok(seq),
        other => Err(KernelError::new(format!("{context}: expected a sequence, got {}", other.vox_type()))),
    }
}

fn eval_expression(
    expr: &Expression,
    env: &RuntimeEnv,
    registry: &PrimitiveRegistry,
    policy: Option<&RuntimePolicyContext>,
) -> KernelResult {
    match expr {
        Expression::Number(n) => Ok(VoxValue::Scalar(number_to_scalar(*n))),
        Expression::Bool(b) => Ok(VoxValue::Scalar(ScalarValue::Bool(*b))),
        Expression::String(s) => Ok(VoxValue::Scalar(ScalarValue::Str(s.clone()))),
        Expression::Let { var, value, body } => {
            let resolved = eval_expression(value, env, registry, policy)?;
            let mut extended = env.clone();
            extended.values.insert(var.clone(), resolved);
            eval_expression(body, &extended, registry, policy)
        }
        Expression::For { var, iterable, body } => {
            let seq = as_sequence(eval_expression(iterable, env, registry, policy)?, "for")?;
            let mut out = Vec::new();
            for item in seq.iter_values() {
                let mut extended = env.clone();
                extended.values.insert(var.clone(), item);
                out.push(eval_expression(body, &extended, registry, policy)?);
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(out))))
        }
        Expression::Call { callee, args } => eval_call(callee, args, env, registry, policy),
    }
}

/// Lazily applies a bare function reference (`map(f, xs)` where `f` names a
/// zero-argument reference to a declared function rather than a closure
/// value) to each element of `source` on demand — the bespoke-`map` sibling
/// of `dispatch::MappedSequence`, kept separate because this one interprets
/// a `RuntimeFunction` via `invoke_function` instead of a `RuntimeClosure`
/// via `apply_closure`. Same no-`Result`-channel caveat applies: a
/// per-element failure panics rather than silently dropping the element.
struct FunctionMappedSequence {
    source: Arc<dyn SequenceValue>,
    function: RuntimeFunction,
    registry: PrimitiveRegistry,
    policy: Option<RuntimePolicyContext>,
}

impl fmt::Debug for FunctionMappedSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FunctionMappedSequence(total_size={:?})", self.source.total_size())
    }
}

impl FunctionMappedSequence {
    fn apply_one(&self, item: VoxValue) -> VoxValue {
        invoke_function(&self.function, vec![item], &self.registry, self.policy.as_ref())
            .unwrap_or_else(|e| panic!("map: {e}"))
    }
}

impl SequenceValue for FunctionMappedSequence {
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

fn eval_call(
    callee: &str,
    args: &[Expression],
    env: &RuntimeEnv,
    registry: &PrimitiveRegistry,
    policy: Option<&RuntimePolicyContext>,
) -> KernelResult {
    if callee == "map" && args.len() == 2 {
        if let Some(function) = bare_function_reference(&args[0], env) {
            if function.parameters.len() == 1 {
                let seq = as_sequence(eval_expression(&args[1], env, registry, policy)?, "map")?;
                return Ok(VoxValue::Sequence(Arc::new(FunctionMappedSequence {
                    source: seq,
                    function: function.clone(),
                    registry: registry.clone(),
                    policy: policy.cloned(),
                })));
            }
        }
        return Err(KernelError::new(
            "E_MAP_TARGET: map's first argument must be a zero-argument reference to a single-parameter function",
        ));
    }

    if args.is_empty() {
        if let Some(value) = env.values.get(callee) {
            return Ok(value.clone());
        }
    }

    if let Some(function) = env.functions.get(callee) {
        if function.parameters.len() != args.len() {
            return Err(KernelError::new(format!(
                "E_ARITY: '{callee}' expects {} argument(s), got {}",
                function.parameters.len(),
                args.len()
            )));
        }
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(eval_expression(arg, env, registry, policy)?);
        }
        return invoke_function(function, values, registry, policy);
    }

    let mut values = Vec::with_capacity(args.len());
    for arg in args {
        values.push(eval_expression(arg, env, registry, policy)?);
    }
    apply_primitive(registry, policy, callee, values, vec![])
}

fn bare_function_reference<'a>(expr: &Expression, env: &'a RuntimeEnv) -> Option<&'a RuntimeFunction> {
    let Expression::Call { callee, args } = expr else { return None };
    if !args.is_empty() {
        return None;
    }
    env.functions.get(callee)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NdArray;

    fn registry() -> PrimitiveRegistry {
        PrimitiveRegistry::new()
    }

    #[test]
    fn closure_applies_arithmetic_body_to_captured_and_parameter_values() {
        let closure = RuntimeClosure {
            parameter: "x".to_string(),
            body: Expression::Call {
                callee: "+".to_string(),
                args: vec![
                    Expression::Call { callee: "x".to_string(), args: vec![] },
                    Expression::Call { callee: "k".to_string(), args: vec![] },
                ],
            },
            captures: BTreeMap::from([("k".to_string(), VoxValue::Scalar(ScalarValue::Integer(10)))]),
            functions: BTreeMap::new(),
        };
        let registry = registry();
        let result = apply_closure(&closure, VoxValue::Scalar(ScalarValue::Integer(5)), &registry, None).unwrap();
        match result {
            VoxValue::Scalar(ScalarValue::Integer(15)) => {}
            other => panic!("unexpected {other:?}"),
        }
        let _ = NdArray::scalar(0.0);
    }

    #[test]
    fn invoke_function_checks_arity() {
        let function = RuntimeFunction {
            parameters: vec!["a".to_string()],
            body: Expression::Call { callee: "a".to_string(), args: vec![] },
            captures: BTreeMap::new(),
            functions: BTreeMap::new(),
        };
        let registry = registry();
        let err = invoke_function(&function, vec![], &registry, None).unwrap_err();
        assert!(err.to_string().contains("E_ARITY"));
    }

    #[test]
    fn map_over_bare_function_reference_applies_elementwise() {
        let function = Arc::new(RuntimeFunction {
            parameters: vec!["x".to_string()],
            body: Expression::Call {
                callee: "*".to_string(),
                args: vec![
                    Expression::Call { callee: "x".to_string(), args: vec![] },
                    Expression::Number(OrderedF64::new(2.0)),
                ],
            },
            captures: BTreeMap::new(),
            functions: BTreeMap::new(),
        });
        let mut env = RuntimeEnv::default();
        env.functions.insert("double".to_string(), (*function).clone());
        env.values.insert(
            "xs".to_string(),
            VoxValue::Sequence(Arc::new(EagerSequence::new(vec![
                VoxValue::Scalar(ScalarValue::Integer(1)),
                VoxValue::Scalar(ScalarValue::Integer(2)),
            ]))),
        );
        let registry = registry();
        let call = Expression::Call {
            callee: "map".to_string(),
            args: vec![
                Expression::Call { callee: "double".to_string(), args: vec![] },
                Expression::Call { callee: "xs".to_string(), args: vec![] },
            ],
        };
        let result = eval_expression(&call, &env, &registry, None).unwrap();
        match result {
            VoxValue::Sequence(seq) => assert_eq!(seq.total_size(), Some(2)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
