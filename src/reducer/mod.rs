//! AST-to-`WorkPlan` reduction: lexical scoping, constant/primitive/closure
//! node construction, and content-addressed sharing.
//!
//! This is the one module with no direct teacher analogue (the teacher
//! lowers Datalog rules into a dependency graph of relations, not
//! expressions into a content-addressed node table), so it is grounded
//! directly on `original_source/implementation/python/voxlogica/reducer.py`:
//! the same two-binding `Environment` (operation vs. function), the same
//! "declarations bind before their body is reduced" order, and the same
//! `map`-over-bare-function special case — adapted to Rust's lack of a
//! runtime `eval` via the AST-as-closure-body design (spec §10.E).

use crate::ast::{Command, Expression, OrderedF64, Program};
use crate::ir::{ConstantValue, GoalOperation, NodeId, NodeSpec, SerializedFunction, WorkPlan};
use crate::parser::{self, ParseError};
use crate::primitives::PrimitiveRegistry;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

const STDLIB_SOURCE: &str = include_str!("../../stdlib/stdlib.imgql");

#[derive(Debug, Error)]
pub enum ReduceError {
    #[error("E_UNKNOWN_CALLABLE: unknown callable '{0}'")]
    UnknownCallable(String),
    #[error("E_ARITY: '{name}' expects {expected} argument(s), got {got}")]
    Arity { name: String, expected: String, got: usize },
    #[error("E_BAD_IMPORT: {0}")]
    BadImport(String),
    #[error("stdlib failed to parse: {0}")]
    Stdlib(#[from] ParseError),
    #[error("E_MAP_TARGET: map's first argument must be a zero-argument reference to a single-parameter function")]
    MapTarget,
    #[error("{0}")]
    Registry(#[from] crate::primitives::RegistryError),
}

pub type ReduceResult<T> = Result<T, ReduceError>;

#[derive(Clone)]
enum Binding {
    Operation(NodeId),
    Function(Rc<FunctionDef>),
}

struct FunctionDef {
    params: Vec<String>,
    body: Expression,
    env: Environment,
}

/// A persistent (clone-cheap) lexical environment: `let`/function bindings
/// shadow outer ones without mutating them, matching IMGQL's let-shadowing
/// semantics.
#[derive(Clone, Default)]
struct Environment {
    bindings: Rc<HashMap<String, Binding>>,
}

impl Environment {
    fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.get(name)
    }

    fn extended(&self, name: String, binding: Binding) -> Environment {
        let mut map = (*self.bindings).clone();
        map.insert(name, binding);
        Environment { bindings: Rc::new(map) }
    }
}

/// Reduce a full program into a `WorkPlan`, preloading the compiled-in
/// standard library first (spec §10.A).
pub fn reduce_program(program: &Program, registry: &mut PrimitiveRegistry) -> ReduceResult<WorkPlan> {
    let mut plan = WorkPlan::new();
    let mut env = Environment::default();

    let stdlib = parser::parse_program_content(STDLIB_SOURCE)?;
    for command in &stdlib.commands {
        env = reduce_command(command, env, &mut plan, registry)?;
    }
    for command in &program.commands {
        env = reduce_command(command, env, &mut plan, registry)?;
    }
    Ok(plan)
}

fn reduce_command(
    command: &Command,
    env: Environment,
    plan: &mut WorkPlan,
    registry: &mut PrimitiveRegistry,
) -> ReduceResult<Environment> {
    match command {
        Command::Declaration { name, params, body } => {
            if params.is_empty() {
                let node_id = reduce_expression(body, &env, plan, registry)?;
                Ok(env.extended(name.clone(), Binding::Operation(node_id)))
            } else {
                let def = FunctionDef {
                    params: params.clone(),
                    body: body.clone(),
                    env: env.clone(),
                };
                Ok(env.extended(name.clone(), Binding::Function(Rc::new(def))))
            }
        }
        Command::Save { label, expr } => {
            let node_id = reduce_expression(expr, &env, plan, registry)?;
            plan.add_goal(GoalOperation::Save, node_id, label.clone());
            Ok(env)
        }
        Command::Print { label, expr } => {
            let node_id = reduce_expression(expr, &env, plan, registry)?;
            plan.add_goal(GoalOperation::Print, node_id, label.clone());
            Ok(env)
        }
        Command::Import(target) => reduce_import(target, env, plan, registry),
    }
}

/// `import "name"` resolves to a primitive namespace when `name` matches one
/// known to the registry (replaying its compiled-in `.imgql` exports per
/// spec §10.B); otherwise `name` is treated as a sibling source file.
fn reduce_import(
    target: &str,
    env: Environment,
    plan: &mut WorkPlan,
    registry: &mut PrimitiveRegistry,
) -> ReduceResult<Environment> {
    if registry.list_namespaces().iter().any(|n| n == target) {
        registry.import_namespace(target);
        plan.import_namespace(target);
        let mut env = env;
        let exports: Vec<Command> = registry.namespace_imgql_exports(target).to_vec();
        for command in &exports {
            env = reduce_command(command, env, plan, registry)?;
        }
        return Ok(env);
    }

    let path = if target.ends_with(".imgql") { target.to_string() } else { format!("{target}.imgql") };
    let source = std::fs::read_to_string(&path).map_err(|e| ReduceError::BadImport(format!("{path}: {e}")))?;
    let imported = parser::parse_program_content(&source)?;
    let mut env = env;
    for command in &imported.commands {
        env = reduce_command(command, env, plan, registry)?;
    }
    Ok(env)
}

fn reduce_expression(
    expr: &Expression,
    env: &Environment,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<NodeId> {
    match expr {
        Expression::Number(n) => Ok(plan.add_node(NodeSpec::Constant(number_to_constant(*n)))),
        Expression::Bool(b) => Ok(plan.add_node(NodeSpec::Constant(ConstantValue::Bool(*b)))),
        Expression::String(s) => Ok(plan.add_node(NodeSpec::Constant(ConstantValue::String(s.clone())))),
        Expression::Let { var, value, body } => {
            let value_id = reduce_expression(value, env, plan, registry)?;
            let extended = env.extended(var.clone(), Binding::Operation(value_id));
            reduce_expression(body, &extended, plan, registry)
        }
        Expression::For { var, iterable, body } => {
            let iterable_id = reduce_expression(iterable, env, plan, registry)?;
            let closure_id = build_closure(var, body, env, plan, registry)?;
            build_primitive_call(registry, plan, "for_loop", vec![iterable_id, closure_id], vec![])
        }
        Expression::Call { callee, args } => reduce_call(callee, args, env, plan, registry),
    }
}

fn reduce_call(
    callee: &str,
    args: &[Expression],
    env: &Environment,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<NodeId> {
    if (callee == "map" || callee == "default.map") && args.len() == 2 {
        return reduce_map(&args[0], &args[1], env, plan, registry);
    }

    if let Some(Binding::Function(def)) = env.get(callee) {
        if def.params.len() != args.len() {
            return Err(ReduceError::Arity {
                name: callee.to_string(),
                expected: def.params.len().to_string(),
                got: args.len(),
            });
        }
        let def = def.clone();
        let mut call_env = def.env.clone();
        for (param, arg) in def.params.iter().zip(args) {
            let arg_id = reduce_expression(arg, env, plan, registry)?;
            call_env = call_env.extended(param.clone(), Binding::Operation(arg_id));
        }
        return reduce_expression(&def.body, &call_env, plan, registry);
    }

    if let Some(Binding::Operation(node_id)) = env.get(callee) {
        if args.is_empty() {
            return Ok(node_id.clone());
        }
        return Err(ReduceError::UnknownCallable(callee.to_string()));
    }

    let mut arg_ids = Vec::with_capacity(args.len());
    for arg in args {
        arg_ids.push(reduce_expression(arg, env, plan, registry)?);
    }
    build_primitive_call(registry, plan, callee, arg_ids, vec![])
}

fn build_primitive_call(
    registry: &PrimitiveRegistry,
    plan: &mut WorkPlan,
    name: &str,
    args: Vec<NodeId>,
    kwargs: Vec<(String, NodeId)>,
) -> ReduceResult<NodeId> {
    let spec = registry.resolve(name).map_err(|_| ReduceError::UnknownCallable(name.to_string()))?;
    if !spec.arity.accepts(args.len()) {
        let expected = match spec.arity.max_args {
            Some(max) if max == spec.arity.min_args => spec.arity.min_args.to_string(),
            Some(max) => format!("{}..{}", spec.arity.min_args, max),
            None => format!("{}..", spec.arity.min_args),
        };
        return Err(ReduceError::Arity { name: name.to_string(), expected, got: args.len() });
    }
    let call = crate::primitives::api::PrimitiveCall::new(args, kwargs, serde_json::json!({}));
    let node = (spec.planner)(&call);
    Ok(plan.add_node(node))
}

/// `map(f, seq)` where `f` is a bare zero-arg reference to a single-parameter
/// function: synthesize a `closure` node from `f`'s body instead of reducing
/// `f()` as an application (Design Notes' documented `map` special form).
fn reduce_map(
    target: &Expression,
    seq: &Expression,
    env: &Environment,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<NodeId> {
    let Expression::Call { callee, args } = target else {
        return Err(ReduceError::MapTarget);
    };
    if !args.is_empty() {
        return Err(ReduceError::MapTarget);
    }
    let Some(Binding::Function(def)) = env.get(callee) else {
        return Err(ReduceError::MapTarget);
    };
    if def.params.len() != 1 {
        return Err(ReduceError::MapTarget);
    }
    let def = def.clone();
    let seq_id = reduce_expression(seq, env, plan, registry)?;
    let closure_id = build_closure_from_def(&def, plan, registry)?;
    build_primitive_call(registry, plan, "map", vec![seq_id, closure_id], vec![])
}

fn build_closure_from_def(
    def: &FunctionDef,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<NodeId> {
    build_closure(&def.params[0], &def.body, &def.env, plan, registry)
}

/// Build a unary `closure` node: `parameter` is bound fresh at each
/// application; every other free identifier in `body` is resolved in `env`
/// now (an already-computed `NodeId`, or a transitively captured function)
/// and folded into `captures`/`function_captures` so the body can be
/// re-interpreted without access to this reduction's environment.
fn build_closure(
    parameter: &str,
    body: &Expression,
    env: &Environment,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<NodeId> {
    let (capture_names, captures, function_captures) = capture_free_variables(body, &[parameter.to_string()], env, plan, registry)?;
    Ok(plan.add_node(NodeSpec::Closure {
        parameter: parameter.to_string(),
        body: body.clone(),
        capture_names,
        captures,
        function_captures,
    }))
}

fn serialize_function(
    def: &FunctionDef,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<SerializedFunction> {
    let (capture_names, captures, function_captures) = capture_free_variables(&def.body, &def.params, &def.env, plan, registry)?;
    Ok(SerializedFunction {
        parameters: def.params.clone(),
        body: def.body.clone(),
        captures: capture_names.into_iter().zip(captures).collect(),
        functions: function_captures,
    })
}

fn capture_free_variables(
    body: &Expression,
    bound: &[String],
    env: &Environment,
    plan: &mut WorkPlan,
    registry: &PrimitiveRegistry,
) -> ReduceResult<(Vec<String>, Vec<NodeId>, Vec<(String, SerializedFunction)>)> {
    let mut seen = std::collections::BTreeSet::new();
    let mut capture_names = Vec::new();
    let mut captures = Vec::new();
    let mut function_captures = Vec::new();

    for name in body.referenced_names() {
        if bound.iter().any(|b| b == name) || !seen.insert(name.to_string()) {
            continue;
        }
        match env.get(name) {
            Some(Binding::Operation(node_id)) => {
                capture_names.push(name.to_string());
                captures.push(node_id.clone());
            }
            Some(Binding::Function(def)) => {
                let serialized = serialize_function(def, plan, registry)?;
                function_captures.push((name.to_string(), serialized));
            }
            None => {
                // Not a binding at all: either a primitive operator, resolved
                // directly from the registry at closure-application time, or
                // (if neither) a runtime `E_UNKNOWN_CALLABLE` when the body
                // is interpreted.
            }
        }
    }
    Ok((capture_names, captures, function_captures))
}

fn number_to_constant(n: OrderedF64) -> ConstantValue {
    let value = n.get();
    if value.fract() == 0.0 && value.is_finite() && value.abs() < 1e15 {
        ConstantValue::Integer(value as i64)
    } else {
        ConstantValue::Number(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduce(source: &str) -> (WorkPlan, PrimitiveRegistry) {
        let mut registry = PrimitiveRegistry::new();
        let program = parser::parse_program_content(source).unwrap();
        let plan = reduce_program(&program, &mut registry).unwrap();
        (plan, registry)
    }

    #[test]
    fn identical_constant_expressions_share_a_node() {
        let (plan, _) = reduce("let a = 1 + 1\nlet b = 1 + 1\nprint \"a\" a\nprint \"b\" b");
        assert_eq!(plan.goals[0].target, plan.goals[1].target);
    }

    #[test]
    fn let_shadowing_does_not_affect_outer_binding() {
        let (plan, _) = reduce("let x = 1\nlet y = let x = x + 10 in x\nprint \"x\" x\nprint \"y\" y");
        assert_ne!(plan.goals[0].target, plan.goals[1].target);
    }

    #[test]
    fn map_over_declared_function_builds_a_closure_node() {
        let (plan, _) = reduce("let f(x) = x + 1\nprint \"m\" map(f, range(0,3))");
        let target = &plan.goals[0].target;
        let spec = plan.nodes.get(target).unwrap();
        match spec {
            NodeSpec::Primitive { operator, args, .. } => {
                assert_eq!(operator, "default.map");
                let closure_spec = plan.nodes.get(&args[1]).unwrap();
                assert!(matches!(closure_spec, NodeSpec::Closure { .. }));
            }
            other => panic!("expected primitive node, got {other:?}"),
        }
    }

    #[test]
    fn unknown_callable_is_reported() {
        let mut registry = PrimitiveRegistry::new();
        let program = parser::parse_program_content("print \"x\" not_a_real_thing(1)").unwrap();
        let err = reduce_program(&program, &mut registry).unwrap_err();
        assert!(matches!(err, ReduceError::UnknownCallable(_)));
    }

    #[test]
    fn stdlib_functions_are_preloaded() {
        let (plan, _) = reduce("print \"s\" sq(3)");
        assert_eq!(plan.goals.len(), 1);
    }
}
