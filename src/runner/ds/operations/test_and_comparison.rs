use std::cmp::Ordering;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::value::Value;

use super::type_conversion::{operator_error, promote, to_num, Num};

/// `==` as the language defines it for the operand types involved.
pub fn strict_equals(a: &Value, b: &Value) -> Result<bool, ScriptError> {
    Ok(match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Char(x), Value::Char(y)) => x == y,
        _ if to_num(a).is_some() && to_num(b).is_some() => {
            compare_numbers("==", a, b)? == Some(Ordering::Equal)
        }
        (Value::Type(_), Value::Type(_))
        | (Value::Assembly(_), Value::Assembly(_))
        | (Value::Module(_), Value::Module(_))
        | (Value::TypeHandle(_), Value::TypeHandle(_))
        | (Value::Utf8Encoding, Value::Utf8Encoding) => a.equals(b),
        _ => match (a.reference_id(), b.reference_id()) {
            (Some(x), Some(y)) => x == y,
            _ => return Err(operator_error("==", a, b)),
        },
    })
}

/// `None` when the operands are unordered (NaN).
fn compare_numbers(op: &str, a: &Value, b: &Value) -> Result<Option<Ordering>, ScriptError> {
    let (x, y) = promote(op, a, b)?;
    Ok(match (x, y) {
        (Num::I32(x), Num::I32(y)) => Some(x.cmp(&y)),
        (Num::U32(x), Num::U32(y)) => Some(x.cmp(&y)),
        (Num::I64(x), Num::I64(y)) => Some(x.cmp(&y)),
        (Num::U64(x), Num::U64(y)) => Some(x.cmp(&y)),
        (Num::I128(x), Num::I128(y)) => Some(x.cmp(&y)),
        (Num::U128(x), Num::U128(y)) => Some(x.cmp(&y)),
        (Num::F32(x), Num::F32(y)) => x.partial_cmp(&y),
        (Num::F64(x), Num::F64(y)) => x.partial_cmp(&y),
        (Num::Dec(x), Num::Dec(y)) => Some(x.cmp(&y)),
        _ => None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl Relation {
    pub fn symbol(&self) -> &'static str {
        match self {
            Relation::Less => "<",
            Relation::LessEqual => "<=",
            Relation::Greater => ">",
            Relation::GreaterEqual => ">=",
        }
    }
}

pub fn relational(relation: Relation, a: &Value, b: &Value) -> Result<bool, ScriptError> {
    if to_num(a).is_none() || to_num(b).is_none() {
        return Err(operator_error(relation.symbol(), a, b));
    }
    let Some(ordering) = compare_numbers(relation.symbol(), a, b)? else {
        return Ok(false);
    };
    Ok(match relation {
        Relation::Less => ordering == Ordering::Less,
        Relation::LessEqual => ordering != Ordering::Greater,
        Relation::Greater => ordering == Ordering::Greater,
        Relation::GreaterEqual => ordering != Ordering::Less,
    })
}

/// Conditions must be `bool`; anything else is a binder failure.
pub fn truthiness(value: &Value) -> Result<bool, ScriptError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ScriptError::binder(format!(
            "Cannot implicitly convert type '{}' to 'bool'",
            other.friendly_type_name()
        ))),
    }
}

/// Ordering used by `Min`, `Max` and sorting helpers.
pub fn compare_values(a: &Value, b: &Value) -> Result<Ordering, ScriptError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, _) => Ok(Ordering::Less),
        (_, Value::Null) => Ok(Ordering::Greater),
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Ok(compare_numbers("<", a, b)?.unwrap_or_else(|| {
            let nan_a = matches!(to_num(a), Some(Num::F64(v)) if v.is_nan())
                || matches!(to_num(a), Some(Num::F32(v)) if v.is_nan());
            if nan_a {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numeric_equality_promotes() {
        assert!(strict_equals(&Value::Int(1), &Value::Long(1)).unwrap());
        assert!(strict_equals(&Value::Int(1), &Value::Double(1.0)).unwrap());
        assert!(!strict_equals(&Value::Double(f64::NAN), &Value::Double(f64::NAN)).unwrap());
        assert!(strict_equals(&Value::string("a"), &Value::Int(1)).is_err());
    }

    #[test]
    fn relations_with_nan_are_false() {
        let nan = Value::Double(f64::NAN);
        assert!(!relational(Relation::Less, &nan, &Value::Int(1)).unwrap());
        assert!(!relational(Relation::GreaterEqual, &nan, &Value::Int(1)).unwrap());
        assert!(relational(Relation::LessEqual, &Value::Char('a'), &Value::Int(97)).unwrap());
    }
}
