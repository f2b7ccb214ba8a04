//! Primitive registration contract: `PrimitiveSpec`, `AritySpec`,
//! `PrimitiveCall`, and the planner/kernel function types.

use crate::ir::{NodeId, NodeSpec, OutputKind};
use crate::value::VoxValue;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Arity bounds for a primitive; `max_args = None` means variadic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AritySpec {
    pub min_args: usize,
    pub max_args: Option<usize>,
}

impl AritySpec {
    pub fn fixed(n: usize) -> Self {
        Self { min_args: n, max_args: Some(n) }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self { min_args: min, max_args: Some(max) }
    }

    pub fn variadic(min: usize) -> Self {
        Self { min_args: min, max_args: None }
    }

    pub fn accepts(&self, n: usize) -> bool {
        n >= self.min_args && self.max_args.map_or(true, |max| n <= max)
    }
}

/// A planner-facing view of a single invocation: positional argument
/// NodeIds, sorted keyword-argument NodeIds, and canonical attrs.
#[derive(Debug, Clone)]
pub struct PrimitiveCall {
    pub args: Vec<NodeId>,
    pub kwargs: Vec<(String, NodeId)>,
    pub attrs: serde_json::Value,
}

impl PrimitiveCall {
    pub fn new(args: Vec<NodeId>, mut kwargs: Vec<(String, NodeId)>, attrs: serde_json::Value) -> Self {
        kwargs.sort_by(|a, b| a.0.cmp(&b.0));
        Self { args, kwargs, attrs }
    }
}

/// Maps a `PrimitiveCall` to a `NodeSpec`; stateless and cheap to call
/// repeatedly during reduction.
pub type Planner = Arc<dyn Fn(&PrimitiveCall) -> NodeSpec + Send + Sync>;

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("{0}")]
    Message(String),
}

impl KernelError {
    pub fn new(message: impl Into<String>) -> Self {
        KernelError::Message(message.into())
    }
}

pub type KernelResult<T = VoxValue> = Result<T, KernelError>;

/// A kernel receives its bound arguments as `{"0": arg0, "1": arg1, ...} ∪
/// kwargs` (the explicit argument-binding layer that replaces the reference
/// implementation's runtime `**kwargs` reflection; see the execution
/// dispatch module). It can never observe engine/storage/session internals:
/// the signature structurally forbids it, which is the typed-language
/// tightening of the reference implementation's "forbidden kernel params"
/// runtime check.
pub type KernelFn = Arc<dyn Fn(&HashMap<String, VoxValue>) -> KernelResult + Send + Sync>;

#[derive(Clone)]
pub struct PrimitiveSpec {
    pub name: String,
    pub namespace: String,
    pub kind: OutputKind,
    pub arity: AritySpec,
    pub attrs_schema: serde_json::Value,
    pub planner: Planner,
    pub kernel_name: String,
    pub description: String,
    pub is_legacy_adapter: bool,
}

impl PrimitiveSpec {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }
}

/// A planner that simply builds a `primitive` NodeSpec tagged with
/// `qualified_name` and `kind`; the default for primitives with no planning
/// logic of their own.
pub fn default_planner_factory(qualified_name: &str, kind: OutputKind) -> Planner {
    let operator = qualified_name.to_string();
    Arc::new(move |call: &PrimitiveCall| NodeSpec::Primitive {
        operator: operator.clone(),
        args: call.args.clone(),
        kwargs: call.kwargs.clone(),
        attrs: call.attrs.clone(),
        output_kind: kind,
    })
}

/// Validate the non-arity-dependent invariants of a spec before
/// registration (name/namespace shape). Kernel-name and qualified-name
/// uniqueness are checked by the registry, which has the global view.
pub fn validate_spec(spec: &PrimitiveSpec) -> Result<(), String> {
    if spec.name.is_empty() {
        return Err("primitive name must not be empty".to_string());
    }
    if spec.name.contains('.') {
        return Err(format!("primitive name '{}' must not contain '.'", spec.name));
    }
    if spec.namespace.is_empty() {
        return Err("primitive namespace must not be empty".to_string());
    }
    Ok(())
}
