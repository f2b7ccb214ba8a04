//! Comparison and boolean logic kernels for the `default` namespace.

use crate::primitives::api::{KernelError, KernelResult};
use crate::value::{ScalarValue, VoxValue};

fn as_bool(value: &VoxValue, context: &str) -> Result<bool, KernelError> {
    match value {
        VoxValue::Scalar(ScalarValue::Bool(b)) => Ok(*b),
        other => Err(KernelError::new(format!("{context}: expected a boolean, got {}", other.vox_type()))),
    }
}

fn compare(a: &VoxValue, b: &VoxValue) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (VoxValue::Scalar(ScalarValue::Integer(x)), VoxValue::Scalar(ScalarValue::Integer(y))) => x.partial_cmp(y),
        (VoxValue::Scalar(ScalarValue::Number(x)), VoxValue::Scalar(ScalarValue::Number(y))) => x.partial_cmp(y),
        (VoxValue::Scalar(ScalarValue::Integer(x)), VoxValue::Scalar(ScalarValue::Number(y))) => (*x as f64).partial_cmp(y),
        (VoxValue::Scalar(ScalarValue::Number(x)), VoxValue::Scalar(ScalarValue::Integer(y))) => x.partial_cmp(&(*y as f64)),
        (VoxValue::Scalar(ScalarValue::Str(x)), VoxValue::Scalar(ScalarValue::Str(y))) => x.partial_cmp(y),
        _ => None,
    }
}

fn equal(a: &VoxValue, b: &VoxValue) -> bool {
    match (a, b) {
        (VoxValue::Scalar(x), VoxValue::Scalar(y)) => match compare(a, b) {
            Some(ord) => ord == std::cmp::Ordering::Equal,
            None => x == y,
        },
        _ => false,
    }
}

pub fn lt(a: &VoxValue, b: &VoxValue) -> KernelResult {
    let ord = compare(a, b).ok_or_else(|| KernelError::new("<: operands are not comparable"))?;
    Ok(VoxValue::Scalar(ScalarValue::Bool(ord == std::cmp::Ordering::Less)))
}

pub fn le(a: &VoxValue, b: &VoxValue) -> KernelResult {
    let ord = compare(a, b).ok_or_else(|| KernelError::new("<=: operands are not comparable"))?;
    Ok(VoxValue::Scalar(ScalarValue::Bool(ord != std::cmp::Ordering::Greater)))
}

pub fn gt(a: &VoxValue, b: &VoxValue) -> KernelResult {
    let ord = compare(a, b).ok_or_else(|| KernelError::new(">: operands are not comparable"))?;
    Ok(VoxValue::Scalar(ScalarValue::Bool(ord == std::cmp::Ordering::Greater)))
}

pub fn ge(a: &VoxValue, b: &VoxValue) -> KernelResult {
    let ord = compare(a, b).ok_or_else(|| KernelError::new(">=: operands are not comparable"))?;
    Ok(VoxValue::Scalar(ScalarValue::Bool(ord != std::cmp::Ordering::Less)))
}

pub fn eq(a: &VoxValue, b: &VoxValue) -> KernelResult {
    Ok(VoxValue::Scalar(ScalarValue::Bool(equal(a, b))))
}

pub fn neq(a: &VoxValue, b: &VoxValue) -> KernelResult {
    Ok(VoxValue::Scalar(ScalarValue::Bool(!equal(a, b))))
}

pub fn and(a: &VoxValue, b: &VoxValue) -> KernelResult {
    Ok(VoxValue::Scalar(ScalarValue::Bool(as_bool(a, "&&")? && as_bool(b, "&&")?)))
}

pub fn or(a: &VoxValue, b: &VoxValue) -> KernelResult {
    Ok(VoxValue::Scalar(ScalarValue::Bool(as_bool(a, "||")? || as_bool(b, "||")?)))
}

pub fn not(a: &VoxValue) -> KernelResult {
    Ok(VoxValue::Scalar(ScalarValue::Bool(!as_bool(a, "!")?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_and_float_compare_across_kinds() {
        let i = VoxValue::Scalar(ScalarValue::Integer(2));
        let f = VoxValue::Scalar(ScalarValue::Number(2.5));
        assert!(matches!(lt(&i, &f).unwrap(), VoxValue::Scalar(ScalarValue::Bool(true))));
    }

    #[test]
    fn equality_handles_mixed_numeric_kinds() {
        let i = VoxValue::Scalar(ScalarValue::Integer(3));
        let f = VoxValue::Scalar(ScalarValue::Number(3.0));
        assert!(matches!(eq(&i, &f).unwrap(), VoxValue::Scalar(ScalarValue::Bool(true))));
    }

    #[test]
    fn logical_and_short_circuits_on_type() {
        let t = VoxValue::Scalar(ScalarValue::Bool(true));
        let not_bool = VoxValue::Scalar(ScalarValue::Integer(1));
        assert!(and(&t, &not_bool).is_err());
    }
}
