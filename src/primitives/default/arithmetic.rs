//! Arithmetic operator kernels for the `default` namespace.
//!
//! Binary numeric operators lift across scalars, sequences, and images the
//! same way the reference implementation's `_sequence_math.py` lifts scalar
//! binary ops over `SequenceValue`/dask-bag/list/tuple/range operands:
//! scalar⊗scalar, sequence⊗scalar, scalar⊗sequence, and sequence⊗sequence
//! (pairwise, erroring on length mismatch). Symbolic operator spellings
//! (`+.`, `.+`, `+?`, `.-`, `-.`, `*.`, `.*`, `./`, `/.`) are registered as
//! aliases of the same kernel: the reference language treats them as
//! operator *overloads* of one arithmetic meaning (spec §8 scenario 6), not
//! distinct semantics.

use crate::primitives::api::{KernelError, KernelResult};
use crate::value::{EagerSequence, NdArray, ScalarValue, VoxValue};
use std::sync::Arc;

fn scalar_number(value: &VoxValue) -> Option<f64> {
    match value {
        VoxValue::Scalar(ScalarValue::Integer(i)) => Some(*i as f64),
        VoxValue::Scalar(ScalarValue::Number(n)) => Some(*n),
        _ => None,
    }
}

fn wrap_number(original_was_integer: bool, value: f64) -> VoxValue {
    if original_was_integer && value.fract() == 0.0 {
        VoxValue::Scalar(ScalarValue::Integer(value as i64))
    } else {
        VoxValue::Scalar(ScalarValue::Number(value))
    }
}

fn both_integers(a: &VoxValue, b: &VoxValue) -> bool {
    matches!(a, VoxValue::Scalar(ScalarValue::Integer(_))) && matches!(b, VoxValue::Scalar(ScalarValue::Integer(_)))
}

/// Lift a scalar binary numeric op across scalar/sequence/array operands.
pub fn lift_binary_numeric(
    name: &str,
    a: &VoxValue,
    b: &VoxValue,
    op: impl Fn(f64, f64) -> f64 + Clone + Send + Sync + 'static,
) -> KernelResult {
    match (a, b) {
        (VoxValue::Sequence(xs), VoxValue::Sequence(ys)) => {
            let xs = xs.materialize();
            let ys = ys.materialize();
            if xs.len() != ys.len() {
                return Err(KernelError::new(format!(
                    "{name}: sequence operands have mismatched lengths {} and {}",
                    xs.len(),
                    ys.len()
                )));
            }
            let mut out = Vec::with_capacity(xs.len());
            for (x, y) in xs.iter().zip(ys.iter()) {
                out.push(lift_binary_numeric(name, x, y, op.clone())?);
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(out))))
        }
        (VoxValue::Sequence(xs), scalar) => {
            let mut out = Vec::new();
            for x in xs.materialize() {
                out.push(lift_binary_numeric(name, &x, scalar, op.clone())?);
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(out))))
        }
        (scalar, VoxValue::Sequence(ys)) => {
            let mut out = Vec::new();
            for y in ys.materialize() {
                out.push(lift_binary_numeric(name, scalar, &y, op.clone())?);
            }
            Ok(VoxValue::Sequence(Arc::new(EagerSequence::new(out))))
        }
        (VoxValue::NdArray(xs), VoxValue::NdArray(ys)) => {
            if xs.shape != ys.shape {
                return Err(KernelError::new(format!("{name}: array shape mismatch {:?} vs {:?}", xs.shape, ys.shape)));
            }
            let data = xs.data.iter().zip(ys.data.iter()).map(|(x, y)| op(*x, *y)).collect();
            Ok(VoxValue::NdArray(NdArray { shape: xs.shape.clone(), data }))
        }
        _ => {
            let x = scalar_number(a).ok_or_else(|| KernelError::new(format!("{name}: left operand is not numeric")))?;
            let y = scalar_number(b).ok_or_else(|| KernelError::new(format!("{name}: right operand is not numeric")))?;
            Ok(wrap_number(both_integers(a, b), op(x, y)))
        }
    }
}

pub fn add(a: &VoxValue, b: &VoxValue) -> KernelResult {
    lift_binary_numeric("+", a, b, |x, y| x + y)
}

pub fn sub(a: &VoxValue, b: &VoxValue) -> KernelResult {
    lift_binary_numeric("-", a, b, |x, y| x - y)
}

pub fn mul(a: &VoxValue, b: &VoxValue) -> KernelResult {
    lift_binary_numeric("*", a, b, |x, y| x * y)
}

pub fn div(a: &VoxValue, b: &VoxValue) -> KernelResult {
    lift_binary_numeric("/", a, b, |x, y| x / y)
}

pub fn neg(a: &VoxValue) -> KernelResult {
    let x = scalar_number(a).ok_or_else(|| KernelError::new("-: operand is not numeric"))?;
    Ok(wrap_number(matches!(a, VoxValue::Scalar(ScalarValue::Integer(_))), -x))
}
