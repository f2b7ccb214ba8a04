//! The `default` namespace: arithmetic, comparison, boolean, and sequence
//! primitives that exist without any imaging backend. Grounded on the
//! reference implementation's `primitives/default/__init__.py` registration
//! pattern and `_sequence_math.py`'s scalar/sequence lifting, with the
//! registration call itself rewritten against this crate's `PrimitiveSpec`
//! contract rather than Python's decorator-based one.

mod arithmetic;
mod boolean;

use crate::ir::OutputKind;
use crate::primitives::api::{default_planner_factory, AritySpec, KernelError, KernelResult, PrimitiveSpec};
use crate::primitives::registry::PrimitiveRegistry;
use crate::value::{EagerSequence, ScalarValue, SequenceValue, VoxValue};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// IMGQL source compiled into the `default` namespace, replacing the
/// reference implementation's directory scan for sibling `*.imgql` files
/// (spec §10.A / Design Notes) with a fixed compiled-in string.
pub const NAMESPACE_IMGQL_EXPORTS: &str = "";

fn positional<'a>(args: &'a HashMap<String, VoxValue>, index: usize, op: &str) -> Result<&'a VoxValue, KernelError> {
    args.get(&index.to_string())
        .ok_or_else(|| KernelError::new(format!("{op}: missing argument at position {index}")))
}

fn register_primitive(
    registry: &mut PrimitiveRegistry,
    name: &'static str,
    arity: AritySpec,
    kind: OutputKind,
    description: &str,
    kernel: impl Fn(&HashMap<String, VoxValue>) -> KernelResult + Send + Sync + 'static,
) {
    let qualified = format!("default.{name}");
    let spec = PrimitiveSpec {
        name: name.to_string(),
        namespace: "default".to_string(),
        kind,
        arity,
        attrs_schema: serde_json::json!({}),
        planner: default_planner_factory(&qualified, kind),
        kernel_name: qualified.clone(),
        description: description.to_string(),
        is_legacy_adapter: false,
    };
    registry
        .register(spec, Arc::new(kernel))
        .unwrap_or_else(|e| panic!("default.{name} must register cleanly: {e}"));
}

fn register_binary_numeric(
    registry: &mut PrimitiveRegistry,
    name: &'static str,
    description: &str,
    op: impl Fn(&VoxValue, &VoxValue) -> KernelResult + Send + Sync + Clone + 'static,
) {
    register_primitive(registry, name, AritySpec::fixed(2), OutputKind::Scalar, description, move |args| {
        op(positional(args, 0, name)?, positional(args, 1, name)?)
    });
}

fn register_comparison(
    registry: &mut PrimitiveRegistry,
    name: &'static str,
    description: &str,
    op: impl Fn(&VoxValue, &VoxValue) -> KernelResult + Send + Sync + Clone + 'static,
) {
    register_binary_numeric(registry, name, description, op);
}

pub fn register(registry: &mut PrimitiveRegistry) {
    for name in ["+", "+.", ".+", "+?"] {
        register_binary_numeric(registry, name, "elementwise numeric addition", arithmetic::add);
    }
    register_primitive(registry, "-", AritySpec::range(1, 2), OutputKind::Scalar, "numeric subtraction or unary negation", |args| {
        match args.get("1") {
            Some(b) => arithmetic::sub(positional(args, 0, "-")?, b),
            None => arithmetic::neg(positional(args, 0, "-")?),
        }
    });
    for name in [".-", "-."] {
        register_binary_numeric(registry, name, "elementwise numeric subtraction", arithmetic::sub);
    }
    for name in ["*", "*.", ".*"] {
        register_binary_numeric(registry, name, "elementwise numeric multiplication", arithmetic::mul);
    }
    for name in ["/", "./", "/."] {
        register_binary_numeric(registry, name, "elementwise numeric division", arithmetic::div);
    }

    register_comparison(registry, "<", "numeric/string less-than", boolean::lt);
    register_comparison(registry, ".<.", "elementwise less-than", boolean::lt);
    register_comparison(registry, "<=", "numeric/string less-than-or-equal", boolean::le);
    register_comparison(registry, ".<=.", "elementwise less-than-or-equal", boolean::le);
    register_comparison(registry, ">", "numeric/string greater-than", boolean::gt);
    register_comparison(registry, ".>.", "elementwise greater-than", boolean::gt);
    register_comparison(registry, ">=", "numeric/string greater-than-or-equal", boolean::ge);
    register_comparison(registry, ".>=.", "elementwise greater-than-or-equal", boolean::ge);
    register_comparison(registry, "==", "value equality", boolean::eq);
    register_comparison(registry, ".==.", "elementwise equality", boolean::eq);
    register_comparison(registry, "!=", "value inequality", boolean::neq);
    register_comparison(registry, ".!=.", "elementwise inequality", boolean::neq);

    register_binary_numeric(registry, "&&", "boolean conjunction", boolean::and);
    register_binary_numeric(registry, "||", "boolean disjunction", boolean::or);
    register_primitive(registry, "!", AritySpec::fixed(1), OutputKind::Scalar, "boolean negation", |args| {
        boolean::not(positional(args, 0, "!")?)
    });

    register_primitive(
        registry,
        "map",
        AritySpec::fixed(2),
        OutputKind::Sequence,
        "apply a closure elementwise over a sequence",
        |_args| {
            Err(KernelError::new(
                "default.map: must be intercepted by the execution strategy before generic kernel dispatch",
            ))
        },
    );
    register_primitive(
        registry,
        "for_loop",
        AritySpec::fixed(2),
        OutputKind::Sequence,
        "evaluate a closure body once per element of a sequence",
        |_args| {
            Err(KernelError::new(
                "default.for_loop: must be intercepted by the execution strategy before generic kernel dispatch",
            ))
        },
    );

    register_primitive(registry, "range", AritySpec::range(1, 2), OutputKind::Sequence, "one- or two-argument integer range", |args| {
        let to_i64 = |v: &VoxValue, op: &str| match v {
            VoxValue::Scalar(ScalarValue::Integer(i)) => Ok(*i),
            other => Err(KernelError::new(format!("{op}: expected an integer, got {}", other.vox_type()))),
        };
        let (start, end) = match args.get("1") {
            Some(b) => (to_i64(positional(args, 0, "range")?, "range")?, to_i64(b, "range")?),
            None => (0, to_i64(positional(args, 0, "range")?, "range")?),
        };
        Ok(VoxValue::Sequence(Arc::new(RangeSequence { start, end })))
    });

    register_primitive(registry, "subsequence", AritySpec::fixed(3), OutputKind::Sequence, "slice a sequence by [start, end)", |args| {
        let seq = match positional(args, 0, "subsequence")? {
            VoxValue::Sequence(s) => s.clone(),
            other => return Err(KernelError::new(format!("subsequence: expected a sequence, got {}", other.vox_type()))),
        };
        let start = match positional(args, 1, "subsequence")? {
            VoxValue::Scalar(ScalarValue::Integer(i)) => *i as usize,
            other => return Err(KernelError::new(format!("subsequence: start must be an integer, got {}", other.vox_type()))),
        };
        let end = match positional(args, 2, "subsequence")? {
            VoxValue::Scalar(ScalarValue::Integer(i)) => *i as usize,
            other => return Err(KernelError::new(format!("subsequence: end must be an integer, got {}", other.vox_type()))),
        };
        let len = end.saturating_sub(start);
        Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(seq.page(start, len)))))
    });

    register_primitive(registry, "dir", AritySpec::fixed(1), OutputKind::Sequence, "list directory entries", |args| {
        let path = expect_path(positional(args, 0, "dir")?, "dir")?;
        let mut names: Vec<String> = std::fs::read_dir(&path)
            .map_err(|e| KernelError::new(format!("dir: {}: {e}", path)))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        let items = names.into_iter().map(|n| VoxValue::Scalar(ScalarValue::Str(n))).collect();
        Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(items))))
    });

    register_primitive(registry, "load", AritySpec::fixed(1), OutputKind::Unknown, "load a file by suffix-driven interpretation", |args| {
        let path = expect_path(positional(args, 0, "load")?, "load")?;
        load_path(&path)
    });
}

fn expect_path(value: &VoxValue, op: &str) -> Result<String, KernelError> {
    match value {
        VoxValue::Scalar(ScalarValue::Str(s)) => Ok(s.clone()),
        other => Err(KernelError::new(format!("{op}: expected a string path, got {}", other.vox_type()))),
    }
}

/// Suffix-driven file interpretation (spec §4.D). `.imgql` files are loaded
/// as source, not data, by the reducer's import machinery, not here.
/// `.txt`/`.csv` yield a lazily-read line sequence; `.json` yields a decoded
/// value; anything else falls back to the file's raw bytes rather than
/// erroring, since `load` has no closed set of recognized data formats.
fn load_path(path: &str) -> KernelResult {
    let extension = std::path::Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    match extension.as_str() {
        "txt" | "csv" => {
            let file = std::fs::File::open(path).map_err(|e| KernelError::new(format!("load: {path}: {e}")))?;
            Ok(VoxValue::Sequence(Arc::new(LineSequence { reader: std::io::BufReader::new(file) })))
        }
        "json" => {
            let contents = std::fs::read_to_string(path).map_err(|e| KernelError::new(format!("load: {path}: {e}")))?;
            let json: serde_json::Value =
                serde_json::from_str(&contents).map_err(|e| KernelError::new(format!("load: {path}: invalid JSON: {e}")))?;
            json_to_vox_value(&json)
        }
        _ => {
            let bytes = std::fs::read(path).map_err(|e| KernelError::new(format!("load: {path}: {e}")))?;
            Ok(VoxValue::Scalar(ScalarValue::Bytes(bytes)))
        }
    }
}

/// Lazily reads lines from a `.txt`/`.csv` file one at a time (spec §4.E:
/// `load` "yields a lazily-read line sequence"). `total_size` is unknown
/// without scanning the whole file, so it stays `None` rather than paying
/// for a count upfront; `page`/`iter_values` both read through a fresh
/// `BufReader` from the start of the file, since `SequenceValue` gives no
/// other place to keep read position across calls.
struct LineSequence {
    reader: std::io::BufReader<std::fs::File>,
}

impl fmt::Debug for LineSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LineSequence")
    }
}

impl LineSequence {
    fn reopen(&self) -> std::io::BufReader<std::fs::File> {
        use std::io::Seek;
        let mut file = self.reader.get_ref().try_clone().expect("reopen load() source file");
        file.seek(std::io::SeekFrom::Start(0)).expect("seek load() source file to start");
        std::io::BufReader::new(file)
    }
}

impl SequenceValue for LineSequence {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_> {
        use std::io::BufRead;
        Box::new(self.reopen().lines().map(|line| {
            VoxValue::Scalar(ScalarValue::Str(line.expect("read line from load() source file")))
        }))
    }

    fn total_size(&self) -> Option<usize> {
        None
    }

    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        self.iter_values().skip(offset).take(limit).collect()
    }
}

fn json_to_vox_value(value: &serde_json::Value) -> KernelResult {
    Ok(match value {
        serde_json::Value::Null => VoxValue::Scalar(ScalarValue::Null),
        serde_json::Value::Bool(b) => VoxValue::Scalar(ScalarValue::Bool(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                VoxValue::Scalar(ScalarValue::Integer(i))
            } else {
                VoxValue::Scalar(ScalarValue::Number(n.as_f64().unwrap_or(0.0)))
            }
        }
        serde_json::Value::String(s) => VoxValue::Scalar(ScalarValue::Str(s.clone())),
        serde_json::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(json_to_vox_value(item)?);
            }
            VoxValue::Sequence(Arc::new(EagerSequence::new(out)))
        }
        serde_json::Value::Object(map) => {
            let mut out = std::collections::BTreeMap::new();
            for (k, v) in map {
                out.insert(k.clone(), json_to_vox_value(v)?);
            }
            VoxValue::Mapping(out)
        }
    })
}

/// Lazily iterable integer range, the laziness substrate `range` needs so a
/// `for`-loop over a wide range never materializes the whole sequence.
struct RangeSequence {
    start: i64,
    end: i64,
}

impl fmt::Debug for RangeSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RangeSequence({}..{})", self.start, self.end)
    }
}

impl SequenceValue for RangeSequence {
    fn iter_values(&self) -> Box<dyn Iterator<Item = VoxValue> + '_> {
        Box::new((self.start..self.end).map(|i| VoxValue::Scalar(ScalarValue::Integer(i))))
    }

    fn total_size(&self) -> Option<usize> {
        Some((self.end - self.start).max(0) as usize)
    }

    fn page(&self, offset: usize, limit: usize) -> Vec<VoxValue> {
        let from = self.start.saturating_add(offset as i64).min(self.end);
        let to = from.saturating_add(limit as i64).min(self.end);
        (from..to).map(|i| VoxValue::Scalar(ScalarValue::Integer(i))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_covers_arithmetic_and_range() {
        let registry = PrimitiveRegistry::new();
        assert!(registry.resolve("+").is_ok());
        assert!(registry.resolve("range").is_ok());
        assert!(registry.resolve("subsequence").is_ok());
    }

    #[test]
    fn range_sequence_pages_without_materializing() {
        let seq = RangeSequence { start: 0, end: 1_000_000 };
        let page = seq.page(10, 5);
        assert_eq!(page.len(), 5);
        assert_eq!(page[0].to_json_native(), serde_json::json!(10));
    }

    #[test]
    fn unary_minus_dispatches_by_arity() {
        let registry = PrimitiveRegistry::new();
        let kernel = registry.load_kernel("-").unwrap();
        let mut one_arg = HashMap::new();
        one_arg.insert("0".to_string(), VoxValue::Scalar(ScalarValue::Integer(5)));
        let result = kernel(&one_arg).unwrap();
        assert_eq!(result.to_json_native(), serde_json::json!(-5));
    }
}
