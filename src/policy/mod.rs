//! Static diagnostics and runtime policy enforcement.
//!
//! Grounded on `original_source/implementation/python/voxlogica/policy.py`:
//! the same effect allowlist, read-root sandboxing, and reachability-scoped
//! diagnostic collection. One check the Python version needs disappears
//! here by construction: closure and captured-function bodies are stored as
//! `Expression` ASTs directly (spec §10.E), not serialized source text, so
//! there is no re-parse step and no `E_CLOSURE_PARSE` failure mode —
//! walking a closure body for effects is a plain AST traversal.

use crate::ast::Expression;
use crate::ir::{ConstantValue, NodeId, NodeSpec, SerializedFunction, SymbolicPlan};
use crate::primitives::api::PrimitiveSpec;
use crate::primitives::PrimitiveRegistry;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

const SIMPLEITK_EFFECT_PREFIXES: &[&str] = &["Write", "ImageViewer_SetGlobalDefault", "ProcessObject_SetGlobal"];
const NNUNET_EFFECT_PREFIXES: &[&str] = &["train"];
const READ_OPERATOR_LEAF_NAMES: &[&str] = &["ReadImage", "ReadTransform", "load", "dir"];

#[derive(Debug, Clone, PartialEq)]
pub struct StaticDiagnostic {
    pub code: &'static str,
    pub message: String,
    pub location: Option<String>,
    pub symbol: Option<String>,
}

impl StaticDiagnostic {
    fn new(code: &'static str, message: String, location: Option<String>, symbol: Option<String>) -> Self {
        Self { code, message, location, symbol }
    }
}

#[derive(Debug, Error)]
#[error("{}", self.diagnostics.first().map(|d| d.message.as_str()).unwrap_or("static policy check failed"))]
pub struct StaticPolicyError {
    pub diagnostics: Vec<StaticDiagnostic>,
}

/// Runtime-scoped read-root policy, entered for the duration of one plan
/// execution (spec §4.D). `serve_mode` off means no restriction at all.
#[derive(Clone)]
pub struct RuntimePolicyContext {
    pub serve_mode: bool,
    pub allowed_read_roots: Vec<PathBuf>,
}

/// Run `f` under `context`. The Python implementation threads this through
/// a contextvar so nested runtime calls can reach it implicitly; this crate
/// passes `context` explicitly to every call that needs it instead (see
/// `execution::dispatch`), so entering the scope here is just running `f`
/// under a named boundary for symmetry with that call structure.
pub fn runtime_policy_scope<R>(context: &RuntimePolicyContext, f: impl FnOnce(&RuntimePolicyContext) -> R) -> R {
    f(context)
}

pub fn enforce_runtime_read_path_policy(
    context: &RuntimePolicyContext,
    operator_name: &str,
    path_text: &str,
) -> Result<(), String> {
    if !context.serve_mode || !is_read_operator(operator_name) {
        return Ok(());
    }
    match read_root_violation(operator_name, path_text, &context.allowed_read_roots, None) {
        Some(diag) => Err(diag.message),
        None => Ok(()),
    }
}

fn operator_leaf(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

pub fn is_read_operator(name: &str) -> bool {
    READ_OPERATOR_LEAF_NAMES.contains(&operator_leaf(name))
}

/// Effect-kind primitives are always blocked in non-legacy mode; a small
/// namespace-scoped leaf-prefix allowlist additionally blocks primitives
/// registered under other kinds purely by convention (spec §10.C).
pub fn is_effectful_primitive(spec: &PrimitiveSpec) -> bool {
    if spec.kind == crate::ir::OutputKind::Effect {
        return true;
    }
    let leaf = spec.name.as_str();
    match spec.namespace.as_str() {
        "simpleitk" => SIMPLEITK_EFFECT_PREFIXES.iter().any(|p| leaf.starts_with(p)),
        "nnunet" => NNUNET_EFFECT_PREFIXES.iter().any(|p| leaf.starts_with(p)),
        _ => false,
    }
}

/// Lexically normalize `.`/`..` components without touching the filesystem
/// (paths may not exist yet when checked statically).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn resolve_against_cwd(path_text: &str) -> PathBuf {
    let path = Path::new(path_text);
    if path.is_absolute() {
        normalize_lexically(path)
    } else {
        let cwd = std::env::current_dir().unwrap_or_default();
        normalize_lexically(&cwd.join(path))
    }
}

fn path_within_roots(candidate: &Path, roots: &[PathBuf]) -> bool {
    roots.iter().any(|root| candidate.starts_with(root))
}

fn read_root_violation(
    operator_name: &str,
    path_text: &str,
    roots: &[PathBuf],
    location: Option<String>,
) -> Option<StaticDiagnostic> {
    let candidate = resolve_against_cwd(path_text);
    if path_within_roots(&candidate, roots) {
        return None;
    }
    let roots_text = roots.iter().map(|r| r.display().to_string()).collect::<Vec<_>>().join(", ");
    Some(StaticDiagnostic::new(
        "E_READ_ROOT_POLICY",
        format!(
            "serve read policy blocked '{operator_name}' for path '{}'. allowed roots: {roots_text}",
            candidate.display()
        ),
        location,
        Some(operator_name.to_string()),
    ))
}

fn constant_string_argument(plan: &SymbolicPlan, args: &[NodeId], index: usize) -> Option<String> {
    let node_id = args.get(index)?;
    match plan.nodes.get(node_id)? {
        NodeSpec::Constant(ConstantValue::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Reachability from `goal_scope` over node dependencies; `None` scope means
/// "check every node" (the default when no scope narrowing is requested).
fn resolve_node_scope(plan: &SymbolicPlan, goal_scope: Option<&[NodeId]>) -> Option<HashSet<NodeId>> {
    let goal_scope = goal_scope?;
    let mut reachable: HashSet<NodeId> = HashSet::new();
    let mut pending: VecDeque<NodeId> = VecDeque::new();
    for id in goal_scope {
        if plan.nodes.contains(id) && reachable.insert(id.clone()) {
            pending.push_back(id.clone());
        }
    }
    while let Some(current) = pending.pop_front() {
        if let Some(spec) = plan.nodes.get(&current) {
            for dep in spec.dependencies() {
                if plan.nodes.contains(dep) && reachable.insert(dep.clone()) {
                    pending.push_back(dep.clone());
                }
            }
        }
    }
    Some(reachable)
}

fn scan_expression_for_effects(
    expr: &Expression,
    bound: &HashSet<String>,
    registry: &PrimitiveRegistry,
    diagnostics: &mut Vec<StaticDiagnostic>,
    location: &str,
) {
    match expr {
        Expression::Number(_) | Expression::Bool(_) | Expression::String(_) => {}
        Expression::Call { callee, args } => {
            if !bound.contains(callee.as_str()) {
                if let Ok(spec) = registry.resolve(callee) {
                    if is_effectful_primitive(spec) {
                        diagnostics.push(StaticDiagnostic::new(
                            "E_EFFECT_BLOCKED",
                            format!("primitive '{callee}' is blocked in non-legacy mode because it may produce side effects"),
                            Some(location.to_string()),
                            Some(callee.clone()),
                        ));
                    }
                }
            }
            for arg in args {
                scan_expression_for_effects(arg, bound, registry, diagnostics, location);
            }
        }
        Expression::Let { var, value, body } => {
            scan_expression_for_effects(value, bound, registry, diagnostics, location);
            let mut scoped = bound.clone();
            scoped.insert(var.clone());
            scan_expression_for_effects(body, &scoped, registry, diagnostics, location);
        }
        Expression::For { var, iterable, body } => {
            scan_expression_for_effects(iterable, bound, registry, diagnostics, location);
            let mut scoped = bound.clone();
            scoped.insert(var.clone());
            scan_expression_for_effects(body, &scoped, registry, diagnostics, location);
        }
    }
}

fn scan_serialized_function(
    func: &SerializedFunction,
    registry: &PrimitiveRegistry,
    diagnostics: &mut Vec<StaticDiagnostic>,
    location: &str,
) {
    let mut bound: HashSet<String> = func.parameters.iter().cloned().collect();
    bound.extend(func.captures.iter().map(|(name, _)| name.clone()));
    bound.extend(func.functions.iter().map(|(name, _)| name.clone()));
    scan_expression_for_effects(&func.body, &bound, registry, diagnostics, location);
    for (_, nested) in &func.functions {
        scan_serialized_function(nested, registry, diagnostics, location);
    }
}

/// Return every static diagnostic for `plan`; callers decide whether to
/// treat a non-empty result as fatal (see `enforce_workplan_policy_or_raise`).
pub fn validate_workplan_policy(
    plan: &SymbolicPlan,
    registry: &PrimitiveRegistry,
    legacy: bool,
    serve_mode: bool,
    read_roots: &[PathBuf],
    goal_scope: Option<&[NodeId]>,
) -> Vec<StaticDiagnostic> {
    let mut diagnostics = Vec::new();
    let scoped = resolve_node_scope(plan, goal_scope);

    for (id, spec) in plan.nodes.iter() {
        if let Some(scoped) = &scoped {
            if !scoped.contains(id) {
                continue;
            }
        }
        let NodeSpec::Primitive { operator, args, .. } = spec else { continue };
        let Ok(primitive_spec) = registry.resolve(operator) else { continue };

        if !legacy && is_effectful_primitive(primitive_spec) {
            diagnostics.push(StaticDiagnostic::new(
                "E_EFFECT_BLOCKED",
                format!("primitive '{operator}' is blocked in non-legacy mode because it may produce side effects"),
                Some(id.to_string()),
                Some(operator.clone()),
            ));
        }

        if serve_mode && is_read_operator(operator) {
            if let Some(path_text) = constant_string_argument(plan, args, 0) {
                if let Some(diag) = read_root_violation(operator, &path_text, read_roots, Some(id.to_string())) {
                    diagnostics.push(diag);
                }
            }
        }
    }

    if legacy {
        return diagnostics;
    }

    for (id, spec) in plan.nodes.iter() {
        if let Some(scoped) = &scoped {
            if !scoped.contains(id) {
                continue;
            }
        }
        let NodeSpec::Closure { parameter, body, capture_names, function_captures, .. } = spec else { continue };
        let mut bound: HashSet<String> = capture_names.iter().cloned().collect();
        bound.insert(parameter.clone());
        bound.extend(function_captures.iter().map(|(name, _)| name.clone()));
        scan_expression_for_effects(body, &bound, registry, &mut diagnostics, id.as_str());
        for (_, func) in function_captures {
            scan_serialized_function(func, registry, &mut diagnostics, id.as_str());
        }
    }

    diagnostics
}

pub fn enforce_workplan_policy_or_raise(
    plan: &SymbolicPlan,
    registry: &PrimitiveRegistry,
    legacy: bool,
    serve_mode: bool,
    read_roots: &[PathBuf],
    goal_scope: Option<&[NodeId]>,
) -> Result<(), StaticPolicyError> {
    let diagnostics = validate_workplan_policy(plan, registry, legacy, serve_mode, read_roots, goal_scope);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(StaticPolicyError { diagnostics })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{GoalOperation, GoalSpec, NodeTable};

    fn write_image_plan() -> (SymbolicPlan, PrimitiveRegistry) {
        let mut registry = PrimitiveRegistry::new();
        registry.import_namespace("simpleitk");
        let mut nodes = NodeTable::default();
        let path_const = nodes.insert(NodeSpec::Constant(ConstantValue::String("/tmp/out.nii".to_string())));
        let image_const = nodes.insert(NodeSpec::Constant(ConstantValue::Integer(0)));
        let write_node = nodes.insert(NodeSpec::Primitive {
            operator: "simpleitk.WriteImage".to_string(),
            args: vec![image_const, path_const],
            kwargs: vec![],
            attrs: serde_json::json!({}),
            output_kind: crate::ir::OutputKind::Effect,
        });
        let plan = SymbolicPlan {
            nodes,
            goals: vec![GoalSpec { operation: GoalOperation::Print, target: write_node, label: "x".to_string() }],
            imported_namespaces: vec!["simpleitk".to_string()],
        };
        (plan, registry)
    }

    #[test]
    fn effect_primitive_is_blocked_in_non_legacy_mode() {
        let (plan, registry) = write_image_plan();
        let diagnostics = validate_workplan_policy(&plan, &registry, false, false, &[], None);
        assert!(diagnostics.iter().any(|d| d.code == "E_EFFECT_BLOCKED"));
    }

    #[test]
    fn effect_primitive_is_allowed_in_legacy_mode() {
        let (plan, registry) = write_image_plan();
        let diagnostics = validate_workplan_policy(&plan, &registry, true, false, &[], None);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn read_root_violation_is_reported_in_serve_mode() {
        let mut nodes = NodeTable::default();
        let path_const = nodes.insert(NodeSpec::Constant(ConstantValue::String("/etc/passwd".to_string())));
        let load_node = nodes.insert(NodeSpec::Primitive {
            operator: "default.load".to_string(),
            args: vec![path_const],
            kwargs: vec![],
            attrs: serde_json::json!({}),
            output_kind: crate::ir::OutputKind::Unknown,
        });
        let plan = SymbolicPlan {
            nodes,
            goals: vec![GoalSpec { operation: GoalOperation::Print, target: load_node, label: "x".to_string() }],
            imported_namespaces: vec![],
        };
        let registry = PrimitiveRegistry::new();
        let roots = vec![PathBuf::from("/tmp/sandbox")];
        let diagnostics = validate_workplan_policy(&plan, &registry, true, true, &roots, None);
        assert!(diagnostics.iter().any(|d| d.code == "E_READ_ROOT_POLICY"));
    }
}
