//! Canonical runtime value model: the `VoxValue` adapters that every kernel
//! result is classified into, their `describe()`/`page()`/`resolve()`
//! descriptors, and the lazy `SequenceValue` substrate used by `range`,
//! `map`, `for`, and `load`.

use crate::ast::Expression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Pagination is quantized into this range (spec §4.G).
pub const MAX_PAGE_SIZE: usize = 512;
pub const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::Integer(i) => write!(f, "{i}"),
            ScalarValue::Number(n) => write!(f, "{n}"),
            ScalarValue::Str(s) => write!(f, "{s}"),
            ScalarValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

/// Row-major n-dimensional numeric array. Dtype is fixed to `f64`: the
/// reference implementation carries numpy's full dtype zoo, which has no
/// idiomatic Rust analogue at this scope; every array value is stored and
/// hashed as 64-bit floats, noted as a deliberate simplification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NdArray {
    pub fn scalar(value: f64) -> Self {
        NdArray { shape: vec![], data: vec![value] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageValue {
    pub dimension: u8,
    pub size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    pub direction: Vec<f64>,
    pub pixel_id: String,
    pub array: NdArray,
}

/// A lazily iterable sequence artifact with an optional known size — the
/// substrate for `range`, `map`, `for`, and `load` (spec §4.E, Design Notes).
pub trait SequenceValue: Send + Sync + fmt::Debug {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_>;

    fn total_size(&self) -> Option<usize>;

    /// Default page implementation via linear iteration; strategies that can
    /// do better (e.g. a partitioned bag) override it.
    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        self.iter_values().skip(offset).take(limit).collect()
    }

    fn materialize(&self) -> Vec<VoxValue> {
        self.iter_values().collect()
    }
}

/// A `SequenceValue` backed by an already-materialized `Vec`.
#[derive(Debug, Clone)]
pub struct EagerSequence {
    pub items: Arc<Vec<VoxValue>>,
}

impl EagerSequence {
    pub fn new(items: Vec<VoxValue>) -> Self {
        Self { items: Arc::new(items) }
    }
}

impl SequenceValue for EagerSequence {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_> {
        Box::new(self.items.iter().cloned())
    }

    fn total_size(&self) -> Option<usize> {
        Some(self.items.len())
    }

    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        self.items.iter().skip(offset).take(limit).cloned().collect()
    }
}

/// A unary closure produced by reducing `map(f, ...)` or a `for` loop,
/// instantiated at execution time from a `NodeSpec::Closure`'s AST body plus
/// its already-evaluated captures (spec §4.E "Runtime closures and
/// functions"). Carried as a `VoxValue` variant (not a separate type outside
/// the value model) so the strict evaluator's normal per-node value slot can
/// hold it like any other result.
#[derive(Debug, Clone)]
pub struct RuntimeClosure {
    pub parameter: String,
    pub body: Expression,
    pub captures: BTreeMap<String, VoxValue>,
    pub functions: BTreeMap<String, RuntimeFunction>,
}

/// A named function value transitively captured by a closure or another
/// function; arity-checked at `invoke` time by the runtime interpreter.
#[derive(Debug, Clone)]
pub struct RuntimeFunction {
    pub parameters: Vec<String>,
    pub body: Expression,
    pub captures: BTreeMap<String, VoxValue>,
    pub functions: BTreeMap<String, RuntimeFunction>,
}

/// The canonical runtime value. Every kernel result is one of these.
#[derive(Clone)]
pub enum VoxValue {
    Scalar(ScalarValue),
    NdArray(NdArray),
    Image(ImageValue),
    Mapping(BTreeMap<String, VoxValue>),
    Sequence(Arc<dyn SequenceValue>),
    Closure(Arc<RuntimeClosure>),
}

impl fmt::Debug for VoxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoxValue::Scalar(s) => write!(f, "Scalar({s:?})"),
            VoxValue::NdArray(a) => write!(f, "NdArray(shape={:?})", a.shape),
            VoxValue::Image(i) => write!(f, "Image(dim={})", i.dimension),
            VoxValue::Mapping(m) => write!(f, "Mapping({} keys)", m.len()),
            VoxValue::Sequence(s) => write!(f, "Sequence(total_size={:?})", s.total_size()),
            VoxValue::Closure(c) => write!(f, "Closure(parameter={})", c.parameter),
        }
    }
}

impl PartialEq for VoxValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (VoxValue::Scalar(a), VoxValue::Scalar(b)) => a == b,
            (VoxValue::NdArray(a), VoxValue::NdArray(b)) => a == b,
            (VoxValue::Image(a), VoxValue::Image(b)) => a == b,
            (VoxValue::Mapping(a), VoxValue::Mapping(b)) => a == b,
            (VoxValue::Sequence(a), VoxValue::Sequence(b)) => Arc::ptr_eq(a, b) || a.materialize() == b.materialize(),
            (VoxValue::Closure(a), VoxValue::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for VoxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoxValue::Scalar(s) => write!(f, "{s}"),
            VoxValue::NdArray(a) => write!(f, "{:?}", a.data),
            VoxValue::Image(i) => write!(f, "<image {}D {:?}>", i.dimension, i.size),
            VoxValue::Mapping(m) => {
                let rendered: Vec<String> = m.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            VoxValue::Sequence(s) => {
                let items = s.materialize();
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            VoxValue::Closure(c) => write!(f, "<closure {}>", c.parameter),
        }
    }
}

impl VoxValue {
    pub fn vox_type(&self) -> &'static str {
        match self {
            VoxValue::Scalar(_) => "scalar",
            VoxValue::NdArray(_) => "ndarray",
            VoxValue::Image(img) => {
                if img.dimension == 2 {
                    "image2d"
                } else {
                    "volume3d"
                }
            }
            VoxValue::Mapping(_) => "mapping",
            VoxValue::Sequence(_) => "sequence",
            VoxValue::Closure(_) => "closure",
        }
    }

    /// Resolve the value (or nested element) addressed by a `/`-separated
    /// path, using `~0`/`~1` escaping for literal `~`/`/` inside path tokens.
    pub fn resolve(&self, path: &str) -> Option<VoxValue> {
        let tokens = parse_path(path);
        self.resolve_tokens(&tokens)
    }

    fn resolve_tokens(&self, tokens: &[String]) -> Option<VoxValue> {
        match tokens.split_first() {
            None => Some(self.clone()),
            Some((head, rest)) => match self {
                VoxValue::Mapping(map) => map.get(head)?.resolve_tokens(rest),
                VoxValue::Sequence(seq) => {
                    let index: usize = head.parse().ok()?;
                    let items = seq.page(index, 1);
                    items.into_iter().next()?.resolve_tokens(rest)
                }
                _ => None,
            },
        }
    }

    /// Describe this value (or the value at `path`) as a JSON descriptor.
    pub fn describe(&self, path: &str) -> Option<Descriptor> {
        let value = self.resolve(path)?;
        Some(value.describe_self(path))
    }

    fn describe_self(&self, path: &str) -> Descriptor {
        let (summary, pageable, can_descend, render) = match self {
            VoxValue::Scalar(s) => (serde_json::json!({ "value": scalar_to_json(s) }), false, false, None),
            VoxValue::NdArray(a) => (
                serde_json::json!({ "shape": a.shape, "len": a.len() }),
                true,
                true,
                None,
            ),
            VoxValue::Image(img) => (
                serde_json::json!({
                    "dimension": img.dimension,
                    "size": img.size,
                    "spacing": img.spacing,
                    "origin": img.origin,
                    "direction": img.direction,
                    "pixel_id": img.pixel_id,
                }),
                false,
                true,
                Some(RenderHint { kind: "image".to_string() }),
            ),
            VoxValue::Mapping(m) => (serde_json::json!({ "keys": m.keys().collect::<Vec<_>>() }), true, true, None),
            VoxValue::Sequence(s) => (serde_json::json!({ "length": s.total_size() }), true, true, None),
            VoxValue::Closure(c) => (serde_json::json!({ "parameter": c.parameter }), false, false, None),
        };
        Descriptor {
            vox_type: self.vox_type().to_string(),
            format_version: "voxpod/1".to_string(),
            summary,
            navigation: Navigation {
                path: path.to_string(),
                pageable,
                can_descend,
                default_page_size: DEFAULT_PAGE_SIZE,
                max_page_size: MAX_PAGE_SIZE,
            },
            render,
        }
    }

    /// Quantized page of this value's contents (spec §4.G paging).
    pub fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        let limit = limit.min(MAX_PAGE_SIZE);
        match self {
            VoxValue::Sequence(seq) => seq.page(offset, limit),
            other => {
                if offset == 0 && limit > 0 {
                    vec![other.clone()]
                } else {
                    vec![]
                }
            }
        }
    }

    /// Convert to a JSON-native representation, used both for `print`-style
    /// rendering and for the `payload_json` half of the codec.
    pub fn to_json_native(&self) -> serde_json::Value {
        match self {
            VoxValue::Scalar(s) => scalar_to_json(s),
            VoxValue::NdArray(a) => serde_json::json!({ "shape": a.shape, "data": a.data }),
            VoxValue::Image(img) => serde_json::json!({
                "dimension": img.dimension,
                "size": img.size,
                "spacing": img.spacing,
                "origin": img.origin,
                "direction": img.direction,
                "pixel_id": img.pixel_id,
                "array": { "shape": img.array.shape, "data": img.array.data },
            }),
            VoxValue::Mapping(m) => {
                serde_json::Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json_native())).collect())
            }
            VoxValue::Sequence(s) => {
                serde_json::Value::Array(s.materialize().iter().map(VoxValue::to_json_native).collect())
            }
            VoxValue::Closure(c) => serde_json::json!({ "closure": c.parameter }),
        }
    }
}

fn scalar_to_json(s: &ScalarValue) -> serde_json::Value {
    match s {
        ScalarValue::Null => serde_json::Value::Null,
        ScalarValue::Bool(b) => serde_json::json!(b),
        ScalarValue::Integer(i) => serde_json::json!(i),
        ScalarValue::Number(n) => serde_json::json!(n),
        ScalarValue::Str(s) => serde_json::json!(s),
        ScalarValue::Bytes(b) => serde_json::json!(b),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderHint {
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Navigation {
    pub path: String,
    pub pageable: bool,
    pub can_descend: bool,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    pub vox_type: String,
    pub format_version: String,
    pub summary: serde_json::Value,
    pub navigation: Navigation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderHint>,
}

/// Split a `/`-separated path into unescaped tokens (`~0`→`~`, `~1`→`/`).
pub fn parse_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|tok| tok.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Re-escape tokens into a path (inverse of `parse_path`).
pub fn render_path(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| t.replace('~', "~0").replace('/', "~1"))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_tokens_round_trip_escaping() {
        let tokens = parse_path("a~1b/c~0d");
        assert_eq!(tokens, vec!["a/b", "c~d"]);
        assert_eq!(render_path(&tokens), "a~1b/c~0d");
    }

    #[test]
    fn resolve_descends_into_mapping_and_sequence() {
        let mut map = BTreeMap::new();
        map.insert(
            "xs".to_string(),
            VoxValue::Sequence(Arc::new(EagerSequence::new(vec![
                VoxValue::Scalar(ScalarValue::Integer(10)),
                VoxValue::Scalar(ScalarValue::Integer(20)),
            ]))),
        );
        let root = VoxValue::Mapping(map);
        let resolved = root.resolve("xs/1").unwrap();
        match resolved {
            VoxValue::Scalar(ScalarValue::Integer(20)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn page_quantizes_to_max_page_size() {
        let items: Vec<VoxValue> = (0..1000).map(|i| VoxValue::Scalar(ScalarValue::Integer(i))).collect();
        let seq = VoxValue::Sequence(Arc::new(EagerSequence::new(items)));
        let page = seq.page(0, 10_000);
        assert_eq!(page.len(), MAX_PAGE_SIZE);
    }

    #[test]
    fn scalar_describe_is_not_pageable() {
        let value = VoxValue::Scalar(ScalarValue::Integer(42));
        let descriptor = value.describe("").unwrap();
        assert!(!descriptor.navigation.pageable);
        assert_eq!(descriptor.vox_type, "scalar");
    }
}
