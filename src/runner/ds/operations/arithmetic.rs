use crate::parser::ast::{BinaryOperator, UnaryOperator};
use crate::runner::ds::decimal::Decimal;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::value::Value;

use super::test_and_comparison::{relational, strict_equals, Relation};
use super::type_conversion::{
    explicit_numeric, implicit_convert, operator_error, promote, to_num, Num,
};

pub fn operator_symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Subtract => "-",
        BinaryOperator::Multiply => "*",
        BinaryOperator::Divide => "/",
        BinaryOperator::Remainder => "%",
        BinaryOperator::ShiftLeft => "<<",
        BinaryOperator::ShiftRight => ">>",
        BinaryOperator::BitAnd => "&",
        BinaryOperator::BitOr => "|",
        BinaryOperator::BitXor => "^",
        BinaryOperator::Equal => "==",
        BinaryOperator::NotEqual => "!=",
        BinaryOperator::LessThan => "<",
        BinaryOperator::LessThanOrEqual => "<=",
        BinaryOperator::GreaterThan => ">",
        BinaryOperator::GreaterThanOrEqual => ">=",
    }
}

/// Evaluates a binary operator with the language's promotion rules.
pub fn binary(op: BinaryOperator, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    let result = match op {
        BinaryOperator::Equal => Value::Bool(strict_equals(a, b)?),
        BinaryOperator::NotEqual => Value::Bool(!strict_equals(a, b)?),
        BinaryOperator::LessThan => Value::Bool(relational(Relation::Less, a, b)?),
        BinaryOperator::LessThanOrEqual => Value::Bool(relational(Relation::LessEqual, a, b)?),
        BinaryOperator::GreaterThan => Value::Bool(relational(Relation::Greater, a, b)?),
        BinaryOperator::GreaterThanOrEqual => {
            Value::Bool(relational(Relation::GreaterEqual, a, b)?)
        }
        BinaryOperator::Add if is_string(a) || is_string(b) => {
            if a.is_null() && b.is_null() {
                return Err(operator_error("+", a, b));
            }
            let mut text = a.to_display_string();
            text.push_str(&b.to_display_string());
            Value::string(&text)
        }
        BinaryOperator::ShiftLeft | BinaryOperator::ShiftRight => shift(op, a, b)?,
        BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor
            if matches!((a, b), (Value::Bool(_), Value::Bool(_))) =>
        {
            let (Value::Bool(x), Value::Bool(y)) = (a, b) else {
                return Err(operator_error(operator_symbol(op), a, b));
            };
            Value::Bool(match op {
                BinaryOperator::BitAnd => x & y,
                BinaryOperator::BitOr => x | y,
                _ => x ^ y,
            })
        }
        _ => {
            let (x, y) = promote(operator_symbol(op), a, b)?;
            arithmetic(op, x, y).map_err(|e| e.unwrap_or_else(|| operator_error(operator_symbol(op), a, b)))?
        }
    };
    Ok(result)
}

fn is_string(v: &Value) -> bool {
    matches!(v, Value::String(_))
}

/// `Err(None)` means the operator is not defined for the promoted kind.
fn arithmetic(op: BinaryOperator, x: Num, y: Num) -> Result<Value, Option<ScriptError>> {
    use BinaryOperator::*;

    macro_rules! integral {
        ($a:expr, $b:expr, $wrap:path) => {{
            let (a, b) = ($a, $b);
            match op {
                Add => $wrap(a.wrapping_add(b)),
                Subtract => $wrap(a.wrapping_sub(b)),
                Multiply => $wrap(a.wrapping_mul(b)),
                Divide | Remainder if b == 0 => {
                    return Err(Some(ScriptError::divide_by_zero()))
                }
                Divide => $wrap(a.checked_div(b).ok_or_else(|| Some(ScriptError::overflow()))?),
                Remainder => {
                    $wrap(a.checked_rem(b).ok_or_else(|| Some(ScriptError::overflow()))?)
                }
                BitAnd => $wrap(a & b),
                BitOr => $wrap(a | b),
                BitXor => $wrap(a ^ b),
                _ => return Err(None),
            }
        }};
    }

    macro_rules! floating {
        ($a:expr, $b:expr, $wrap:path) => {{
            let (a, b) = ($a, $b);
            match op {
                Add => $wrap(a + b),
                Subtract => $wrap(a - b),
                Multiply => $wrap(a * b),
                Divide => $wrap(a / b),
                Remainder => $wrap(a % b),
                _ => return Err(None),
            }
        }};
    }

    Ok(match (x, y) {
        (Num::I32(a), Num::I32(b)) => integral!(a, b, Value::Int),
        (Num::U32(a), Num::U32(b)) => integral!(a, b, Value::UInt),
        (Num::I64(a), Num::I64(b)) => integral!(a, b, Value::Long),
        (Num::U64(a), Num::U64(b)) => integral!(a, b, Value::ULong),
        (Num::I128(a), Num::I128(b)) => integral!(a, b, Value::Int128),
        (Num::U128(a), Num::U128(b)) => integral!(a, b, Value::UInt128),
        (Num::F32(a), Num::F32(b)) => floating!(a, b, Value::Float),
        (Num::F64(a), Num::F64(b)) => floating!(a, b, Value::Double),
        (Num::Dec(a), Num::Dec(b)) => {
            let result = match op {
                Add => a.add(&b),
                Subtract => a.sub(&b),
                Multiply => a.mul(&b),
                Divide => a.div(&b),
                Remainder => a.rem(&b),
                _ => return Err(None),
            };
            Value::Decimal(result.map_err(|e| Some(ScriptError::from(e)))?)
        }
        _ => return Err(None),
    })
}

fn shift(op: BinaryOperator, a: &Value, b: &Value) -> Result<Value, ScriptError> {
    let symbol = operator_symbol(op);
    let count = match to_num(b) {
        Some(Num::I32(c)) => c as u32,
        _ => return Err(operator_error(symbol, a, b)),
    };
    let left = op == BinaryOperator::ShiftLeft;
    Ok(match to_num(a) {
        Some(Num::I32(v)) => Value::Int(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) }),
        Some(Num::U32(v)) => Value::UInt(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) }),
        Some(Num::I64(v)) => Value::Long(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) }),
        Some(Num::U64(v)) => Value::ULong(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) }),
        Some(Num::I128(v)) => {
            Value::Int128(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) })
        }
        Some(Num::U128(v)) => {
            Value::UInt128(if left { v.wrapping_shl(count) } else { v.wrapping_shr(count) })
        }
        _ => return Err(operator_error(symbol, a, b)),
    })
}

fn unary_error(symbol: &str, v: &Value) -> ScriptError {
    ScriptError::binder(format!(
        "Operator '{}' cannot be applied to operand of type '{}'",
        symbol,
        v.friendly_type_name()
    ))
}

pub fn unary(op: UnaryOperator, v: &Value) -> Result<Value, ScriptError> {
    if op == UnaryOperator::Not {
        return match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            other => Err(unary_error("!", other)),
        };
    }
    let Some(n) = to_num(v) else {
        let symbol = match op {
            UnaryOperator::Negate => "-",
            UnaryOperator::Plus => "+",
            _ => "~",
        };
        return Err(unary_error(symbol, v));
    };
    Ok(match op {
        UnaryOperator::Plus => n.into_value(),
        UnaryOperator::Negate => match n {
            Num::I32(x) => Value::Int(x.wrapping_neg()),
            Num::U32(x) => Value::Long(-(x as i64)),
            Num::I64(x) => Value::Long(x.wrapping_neg()),
            Num::U64(_) => return Err(unary_error("-", v)),
            Num::I128(x) => Value::Int128(x.wrapping_neg()),
            Num::U128(x) => Value::UInt128(x.wrapping_neg()),
            Num::F32(x) => Value::Float(-x),
            Num::F64(x) => Value::Double(-x),
            Num::Dec(d) => Value::Decimal(d.negate()),
        },
        _ => match n {
            Num::I32(x) => Value::Int(!x),
            Num::U32(x) => Value::UInt(!x),
            Num::I64(x) => Value::Long(!x),
            Num::U64(x) => Value::ULong(!x),
            Num::I128(x) => Value::Int128(!x),
            Num::U128(x) => Value::UInt128(!x),
            _ => return Err(unary_error("~", v)),
        },
    })
}

/// `++`/`--`, keeping the operand's own type.
pub fn step(value: &Value, increment: bool) -> Result<Value, ScriptError> {
    let d: i8 = if increment { 1 } else { -1 };
    Ok(match value {
        Value::Char(c) => {
            let code = (*c as u32 as i64 + d as i64) as u16;
            Value::Char(char::from_u32(code as u32).unwrap_or('\u{FFFD}'))
        }
        Value::Byte(v) => Value::Byte(v.wrapping_add_signed(d)),
        Value::SByte(v) => Value::SByte(v.wrapping_add(d)),
        Value::Short(v) => Value::Short(v.wrapping_add(d as i16)),
        Value::UShort(v) => Value::UShort(v.wrapping_add_signed(d as i16)),
        Value::Int(v) => Value::Int(v.wrapping_add(d as i32)),
        Value::UInt(v) => Value::UInt(v.wrapping_add_signed(d as i32)),
        Value::Long(v) => Value::Long(v.wrapping_add(d as i64)),
        Value::ULong(v) => Value::ULong(v.wrapping_add_signed(d as i64)),
        Value::Int128(v) => Value::Int128(v.wrapping_add(d as i128)),
        Value::UInt128(v) => Value::UInt128(v.wrapping_add_signed(d as i128)),
        Value::Float(v) => Value::Float(v + d as f32),
        Value::Double(v) => Value::Double(v + d as f64),
        Value::Decimal(v) => {
            let one = if increment { Decimal::ONE } else { Decimal::ONE.negate() };
            Value::Decimal(v.add(&one)?)
        }
        other => return Err(unary_error(if increment { "++" } else { "--" }, other)),
    })
}

/// Converts the result of `x op= y` back to the type of `x`. Small integral
/// types narrow explicitly; everything else must convert implicitly.
pub fn coerce_compound(result: Value, original: &Value) -> Result<Value, ScriptError> {
    let Some(target) = original.type_desc() else {
        return Ok(result);
    };
    if matches!(original, Value::String(_)) || result.type_desc().as_ref() == Some(&target) {
        return Ok(result);
    }
    match (original, to_num(&result)) {
        (
            Value::Byte(_) | Value::SByte(_) | Value::Short(_) | Value::UShort(_) | Value::Char(_),
            Some(n),
        ) => match target.kind() {
            Some(kind) => explicit_numeric(n, kind),
            None => Ok(result),
        },
        _ => implicit_convert(result, &target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_arithmetic_wraps() {
        let r = binary(BinaryOperator::Add, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
        assert!(matches!(r, Value::Int(i32::MIN)));
        let r = binary(BinaryOperator::Divide, &Value::Int(1), &Value::Int(0));
        assert!(r.is_err());
        let r = binary(BinaryOperator::Divide, &Value::Int(i32::MIN), &Value::Int(-1));
        assert!(r.is_err());
    }

    #[test]
    fn string_concatenation_accepts_any_operand() {
        let r = binary(BinaryOperator::Add, &Value::string("n="), &Value::Int(3)).unwrap();
        assert_eq!(r.to_display_string(), "n=3");
        let r = binary(BinaryOperator::Add, &Value::Bool(true), &Value::string("!")).unwrap();
        assert_eq!(r.to_display_string(), "True!");
    }

    #[test]
    fn shifts_mask_their_count() {
        let r = binary(BinaryOperator::ShiftLeft, &Value::Int(1), &Value::Int(33)).unwrap();
        assert!(matches!(r, Value::Int(2)));
        let r = binary(BinaryOperator::ShiftRight, &Value::Int(-8), &Value::Int(1)).unwrap();
        assert!(matches!(r, Value::Int(-4)));
    }

    #[test]
    fn compound_assignment_narrows_small_types() {
        let r = binary(BinaryOperator::Add, &Value::Byte(255), &Value::Int(1)).unwrap();
        assert!(matches!(coerce_compound(r, &Value::Byte(255)).unwrap(), Value::Byte(0)));
        let r = binary(BinaryOperator::Add, &Value::Int(1), &Value::Double(0.5)).unwrap();
        assert!(coerce_compound(r, &Value::Int(1)).is_err());
    }

    #[test]
    fn increments_keep_the_type() {
        assert!(matches!(step(&Value::Byte(255), true).unwrap(), Value::Byte(0)));
        assert!(matches!(step(&Value::Char('a'), true).unwrap(), Value::Char('b')));
        assert!(matches!(step(&Value::Long(0), false).unwrap(), Value::Long(-1)));
    }
}
