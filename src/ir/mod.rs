//! Content-addressed symbolic plan: `NodeId`, `NodeSpec`, `WorkPlan` and its
//! immutable `SymbolicPlan` projection.

use crate::ast::Expression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Opaque content-address of a `NodeSpec`.
///
/// Two nodes with identical `(kind, operator, args, sorted kwargs, attrs,
/// output_kind)` always hash to the same `NodeId`, in this process or any
/// other (invariant I1 of the content model).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// The declared result shape of a primitive invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Scalar,
    Sequence,
    Tree,
    Dataset,
    Closure,
    Effect,
    Unknown,
}

impl OutputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputKind::Scalar => "scalar",
            OutputKind::Sequence => "sequence",
            OutputKind::Tree => "tree",
            OutputKind::Dataset => "dataset",
            OutputKind::Closure => "closure",
            OutputKind::Effect => "effect",
            OutputKind::Unknown => "unknown",
        }
    }
}

/// A scalar constant value stored directly inside a `constant` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ConstantValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// A function value captured transitively by a closure, serialized so it can
/// be content-hashed and later re-instantiated without runtime `eval`
/// (Design Notes: "serialized closures as source text" is replaced here by
/// serializing the AST node itself).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedFunction {
    pub parameters: Vec<String>,
    pub body: Expression,
    pub captures: Vec<(String, NodeId)>,
    pub functions: Vec<(String, SerializedFunction)>,
}

/// A symbolic node: exactly one of `constant`, `primitive`, `closure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeSpec {
    Constant(ConstantValue),
    Primitive {
        operator: String,
        args: Vec<NodeId>,
        kwargs: Vec<(String, NodeId)>,
        attrs: serde_json::Value,
        output_kind: OutputKind,
    },
    Closure {
        parameter: String,
        body: Expression,
        capture_names: Vec<String>,
        captures: Vec<NodeId>,
        function_captures: Vec<(String, SerializedFunction)>,
    },
}

impl NodeSpec {
    pub fn output_kind(&self) -> OutputKind {
        match self {
            NodeSpec::Constant(_) => OutputKind::Scalar,
            NodeSpec::Primitive { output_kind, .. } => *output_kind,
            NodeSpec::Closure { .. } => OutputKind::Closure,
        }
    }

    /// Dependency NodeIds induced by args+kwargs (used for acyclicity
    /// checking and reachability scoping); does not include the identities
    /// nested inside `function_captures`' own `captures`, which are resolved
    /// when that function is itself instantiated.
    pub fn dependencies(&self) -> Vec<&NodeId> {
        match self {
            NodeSpec::Constant(_) => vec![],
            NodeSpec::Primitive { args, kwargs, .. } => {
                args.iter().chain(kwargs.iter().map(|(_, id)| id)).collect()
            }
            NodeSpec::Closure { captures, .. } => captures.iter().collect(),
        }
    }

    fn canonical_hash_input(&self) -> (&'static str, String, Vec<NodeId>, Vec<(String, NodeId)>, serde_json::Value, OutputKind) {
        match self {
            NodeSpec::Constant(value) => (
                "constant",
                String::new(),
                vec![],
                vec![],
                serde_json::to_value(value).expect("constant values always serialize"),
                OutputKind::Scalar,
            ),
            NodeSpec::Primitive {
                operator,
                args,
                kwargs,
                attrs,
                output_kind,
            } => {
                let mut sorted_kwargs = kwargs.clone();
                sorted_kwargs.sort_by(|a, b| a.0.cmp(&b.0));
                ("primitive", operator.clone(), args.clone(), sorted_kwargs, attrs.clone(), *output_kind)
            }
            NodeSpec::Closure {
                parameter,
                body,
                capture_names,
                captures,
                function_captures,
            } => {
                let attrs = serde_json::json!({
                    "parameter": parameter,
                    "body": body,
                    "capture_names": capture_names,
                    "function_captures": function_captures,
                });
                ("closure", "closure".to_string(), captures.clone(), vec![], attrs, OutputKind::Closure)
            }
        }
    }

    /// Compute this node's content-derived `NodeId`.
    pub fn node_id(&self) -> NodeId {
        let (kind, operator, args, kwargs, attrs, output_kind) = self.canonical_hash_input();
        compute_node_id(kind, &operator, &args, &kwargs, &attrs, output_kind)
    }
}

/// Compute a `NodeId` from the canonical fields directly; used by the
/// reducer when it needs the id before constructing the final `NodeSpec`
/// (e.g. for constant deduplication) as well as by `NodeSpec::node_id`.
pub fn compute_node_id(
    kind: &str,
    operator: &str,
    args: &[NodeId],
    kwargs: &[(String, NodeId)],
    attrs: &serde_json::Value,
    output_kind: OutputKind,
) -> NodeId {
    let mut sorted_kwargs = kwargs.to_vec();
    sorted_kwargs.sort_by(|a, b| a.0.cmp(&b.0));
    let canonical = serde_json::json!({
        "kind": kind,
        "operator": operator,
        "args": args.iter().map(NodeId::as_str).collect::<Vec<_>>(),
        "kwargs": sorted_kwargs.iter().map(|(k, v)| (k.clone(), v.as_str().to_string())).collect::<Vec<_>>(),
        "attrs": attrs,
        "output_kind": output_kind.as_str(),
    });
    let bytes = serde_json::to_vec(&canonical).expect("canonical json never fails to serialize");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    NodeId(to_hex(&hasher.finalize()))
}

/// Operation performed by a goal once its target node is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalOperation {
    Print,
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSpec {
    pub operation: GoalOperation,
    pub target: NodeId,
    pub label: String,
}

/// Insertion-ordered node table shared by `WorkPlan` and `SymbolicPlan`.
///
/// First-occurrence order is preserved (spec §5's ordering guarantee: "by
/// hash-insertion order"), with O(1) lookup via a side index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeTable {
    order: Vec<NodeId>,
    specs: HashMap<NodeId, NodeSpec>,
}

impl NodeTable {
    /// Insert `spec` if its id is new; returns the id either way.
    /// Idempotent: re-inserting an equivalent node returns the existing id
    /// without changing iteration order (the basis for constant/primitive
    /// sharing, e.g. scenario 1 in the testable properties).
    pub fn insert(&mut self, spec: NodeSpec) -> NodeId {
        let id = spec.node_id();
        if !self.specs.contains_key(&id) {
            self.order.push(id.clone());
            self.specs.insert(id.clone(), spec);
        }
        id
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.specs.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.specs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Nodes in first-occurrence (hash-insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NodeSpec)> {
        self.order.iter().map(move |id| (id, &self.specs[id]))
    }
}

/// Mutable plan under construction by the reducer.
///
/// Never mutated again once `reduce_program` returns; downstream consumers
/// always see it through `to_symbolic_plan()`.
#[derive(Debug, Clone, Default)]
pub struct WorkPlan {
    pub nodes: NodeTable,
    pub goals: Vec<GoalSpec>,
    pub imported_namespaces: Vec<String>,
}

impl WorkPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, spec: NodeSpec) -> NodeId {
        self.nodes.insert(spec)
    }

    pub fn add_goal(&mut self, operation: GoalOperation, target: NodeId, label: String) {
        self.goals.push(GoalSpec { operation, target, label });
    }

    /// Append `namespace` to the import order if not already present
    /// (invariant I4: namespace-import monotonicity).
    pub fn import_namespace(&mut self, namespace: &str) {
        if !self.imported_namespaces.iter().any(|n| n == namespace) {
            self.imported_namespaces.push(namespace.to_string());
        }
    }

    pub fn to_symbolic_plan(&self) -> SymbolicPlan {
        SymbolicPlan {
            nodes: self.nodes.clone(),
            goals: self.goals.clone(),
            imported_namespaces: self.imported_namespaces.clone(),
        }
    }
}

/// Immutable, registry-free view of a reduced program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolicPlan {
    pub nodes: NodeTable,
    pub goals: Vec<GoalSpec>,
    pub imported_namespaces: Vec<String>,
}

impl SymbolicPlan {
    /// Verify invariants I2 (reference closure) and I3 (acyclicity). Called
    /// by integration tests and, defensively, before execution.
    pub fn validate(&self) -> Result<(), String> {
        for (id, spec) in self.nodes.iter() {
            for dep in spec.dependencies() {
                if !self.nodes.contains(dep) {
                    return Err(format!("node {id} references missing dependency {dep}"));
                }
            }
        }
        for goal in &self.goals {
            if !self.nodes.contains(&goal.target) {
                return Err(format!("goal '{}' targets missing node {}", goal.label, goal.target));
            }
        }
        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&NodeId, Mark> = HashMap::new();

        fn visit<'a>(
            id: &'a NodeId,
            nodes: &'a NodeTable,
            marks: &mut HashMap<&'a NodeId, Mark>,
        ) -> Result<(), String> {
            match marks.get(id) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(format!("cycle detected at node {id}")),
                None => {}
            }
            marks.insert(id, Mark::Visiting);
            if let Some(spec) = nodes.get(id) {
                for dep in spec.dependencies() {
                    visit(dep, nodes, marks)?;
                }
            }
            marks.insert(id, Mark::Done);
            Ok(())
        }

        for (id, _) in self.nodes.iter() {
            visit(id, &self.nodes, &mut marks)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_constants_share_a_node_id() {
        let mut table = NodeTable::default();
        let a = table.insert(NodeSpec::Constant(ConstantValue::Integer(1)));
        let b = table.insert(NodeSpec::Constant(ConstantValue::Integer(1)));
        assert_eq!(a, b);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn distinct_constants_get_distinct_ids() {
        let mut table = NodeTable::default();
        let a = table.insert(NodeSpec::Constant(ConstantValue::Integer(1)));
        let b = table.insert(NodeSpec::Constant(ConstantValue::Integer(2)));
        assert_ne!(a, b);
    }

    #[test]
    fn primitive_kwargs_order_does_not_affect_hash() {
        let one = NodeId(to_hex(&Sha256::digest(b"one")));
        let two = NodeId(to_hex(&Sha256::digest(b"two")));
        let a = NodeSpec::Primitive {
            operator: "f".into(),
            args: vec![],
            kwargs: vec![("a".into(), one.clone()), ("b".into(), two.clone())],
            attrs: serde_json::json!({}),
            output_kind: OutputKind::Scalar,
        };
        let b = NodeSpec::Primitive {
            operator: "f".into(),
            args: vec![],
            kwargs: vec![("b".into(), two), ("a".into(), one)],
            attrs: serde_json::json!({}),
            output_kind: OutputKind::Scalar,
        };
        assert_eq!(a.node_id(), b.node_id());
    }

    #[test]
    fn symbolic_plan_detects_missing_dependency() {
        let mut nodes = NodeTable::default();
        let const_id = nodes.insert(NodeSpec::Constant(ConstantValue::Integer(1)));
        let bogus = compute_node_id("constant", "", &[], &[], &serde_json::json!(999), OutputKind::Scalar);
        let plan = SymbolicPlan {
            nodes,
            goals: vec![GoalSpec {
                operation: GoalOperation::Print,
                target: bogus,
                label: "x".into(),
            }],
            imported_namespaces: vec![],
        };
        assert!(plan.validate().is_err());
        let _ = const_id;
    }
}
