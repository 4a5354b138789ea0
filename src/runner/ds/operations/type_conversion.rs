//! Numeric promotion and the implicit/explicit conversion rules.

use crate::runner::ds::decimal::{Decimal, DecimalError};
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;

/// A numeric operand after unary promotion (small integers and `char`
/// widen to `int`).
#[derive(Debug, Clone, Copy)]
pub enum Num {
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    I128(i128),
    U128(u128),
    F32(f32),
    F64(f64),
    Dec(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumKind {
    I32,
    U32,
    I64,
    U64,
    I128,
    U128,
    F32,
    F64,
    Dec,
}

impl From<DecimalError> for ScriptError {
    fn from(e: DecimalError) -> Self {
        match e {
            DecimalError::Overflow => ScriptError::decimal_overflow(),
            DecimalError::DivideByZero => ScriptError::divide_by_zero(),
        }
    }
}

pub fn to_num(value: &Value) -> Option<Num> {
    Some(match value {
        Value::Char(c) => Num::I32(*c as i32),
        Value::Byte(v) => Num::I32(*v as i32),
        Value::SByte(v) => Num::I32(*v as i32),
        Value::Short(v) => Num::I32(*v as i32),
        Value::UShort(v) => Num::I32(*v as i32),
        Value::Int(v) => Num::I32(*v),
        Value::UInt(v) => Num::U32(*v),
        Value::Long(v) => Num::I64(*v),
        Value::ULong(v) => Num::U64(*v),
        Value::Int128(v) => Num::I128(*v),
        Value::UInt128(v) => Num::U128(*v),
        Value::Float(v) => Num::F32(*v),
        Value::Double(v) => Num::F64(*v),
        Value::Decimal(d) => Num::Dec(*d),
        _ => return None,
    })
}

pub fn is_numeric_kind(kind: TypeKind) -> bool {
    matches!(
        kind,
        TypeKind::Byte
            | TypeKind::SByte
            | TypeKind::Int16
            | TypeKind::UInt16
            | TypeKind::Char
            | TypeKind::Int32
            | TypeKind::UInt32
            | TypeKind::Int64
            | TypeKind::UInt64
            | TypeKind::Int128
            | TypeKind::UInt128
            | TypeKind::Single
            | TypeKind::Double
            | TypeKind::Decimal
    )
}

impl Num {
    pub fn kind(&self) -> NumKind {
        match self {
            Num::I32(_) => NumKind::I32,
            Num::U32(_) => NumKind::U32,
            Num::I64(_) => NumKind::I64,
            Num::U64(_) => NumKind::U64,
            Num::I128(_) => NumKind::I128,
            Num::U128(_) => NumKind::U128,
            Num::F32(_) => NumKind::F32,
            Num::F64(_) => NumKind::F64,
            Num::Dec(_) => NumKind::Dec,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Num::I32(v) => *v < 0,
            Num::I64(v) => *v < 0,
            Num::I128(v) => *v < 0,
            Num::F32(v) => *v < 0.0,
            Num::F64(v) => *v < 0.0,
            Num::Dec(d) => d.is_negative(),
            _ => false,
        }
    }

    /// Integer payload widened (two's complement wrap for `U128`).
    pub fn wrapping_i128(&self) -> i128 {
        match self {
            Num::I32(v) => *v as i128,
            Num::U32(v) => *v as i128,
            Num::I64(v) => *v as i128,
            Num::U64(v) => *v as i128,
            Num::I128(v) => *v,
            Num::U128(v) => *v as i128,
            Num::F32(v) => *v as i128,
            Num::F64(v) => *v as i128,
            Num::Dec(d) => d.trunc_i128(),
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self {
            Num::I32(v) => *v as f64,
            Num::U32(v) => *v as f64,
            Num::I64(v) => *v as f64,
            Num::U64(v) => *v as f64,
            Num::I128(v) => *v as f64,
            Num::U128(v) => *v as f64,
            Num::F32(v) => *v as f64,
            Num::F64(v) => *v,
            Num::Dec(d) => d.to_f64(),
        }
    }

    fn to_decimal(self) -> Result<Decimal, ScriptError> {
        Ok(match self {
            Num::Dec(d) => d,
            Num::F32(v) => Decimal::from_f64(v as f64)?,
            Num::F64(v) => Decimal::from_f64(v)?,
            Num::U128(v) => {
                Decimal::from_parts(false, v, 0).map_err(|_| ScriptError::decimal_overflow())?
            }
            other => Decimal::from_i128(other.wrapping_i128())?,
        })
    }

    /// Unchecked conversion between promoted kinds.
    pub fn convert(self, target: NumKind) -> Result<Num, ScriptError> {
        if self.kind() == target {
            return Ok(self);
        }
        Ok(match target {
            NumKind::F64 => Num::F64(self.to_f64()),
            NumKind::F32 => Num::F32(self.to_f64() as f32),
            NumKind::Dec => Num::Dec(self.to_decimal()?),
            NumKind::U128 => Num::U128(match self {
                Num::F32(v) => v as u128,
                Num::F64(v) => v as u128,
                other => other.wrapping_i128() as u128,
            }),
            NumKind::I128 => Num::I128(self.wrapping_i128()),
            NumKind::U64 => Num::U64(self.wrapping_i128() as u64),
            NumKind::I64 => Num::I64(self.wrapping_i128() as i64),
            NumKind::U32 => Num::U32(self.wrapping_i128() as u32),
            NumKind::I32 => Num::I32(self.wrapping_i128() as i32),
        })
    }

    pub fn into_value(self) -> Value {
        match self {
            Num::I32(v) => Value::Int(v),
            Num::U32(v) => Value::UInt(v),
            Num::I64(v) => Value::Long(v),
            Num::U64(v) => Value::ULong(v),
            Num::I128(v) => Value::Int128(v),
            Num::U128(v) => Value::UInt128(v),
            Num::F32(v) => Value::Float(v),
            Num::F64(v) => Value::Double(v),
            Num::Dec(d) => Value::Decimal(d),
        }
    }
}

pub fn operator_error(op: &str, a: &Value, b: &Value) -> ScriptError {
    ScriptError::binder(format!(
        "Operator '{}' cannot be applied to operands of type '{}' and '{}'",
        op,
        a.friendly_type_name(),
        b.friendly_type_name()
    ))
}

/// Binary numeric promotion: brings both operands to a common kind.
pub fn promote(op: &str, a: &Value, b: &Value) -> Result<(Num, Num), ScriptError> {
    let (x, y) = match (to_num(a), to_num(b)) {
        (Some(x), Some(y)) => (x, y),
        _ => return Err(operator_error(op, a, b)),
    };
    let unsigned_ok = |n: &Num| !n.is_negative();
    let target = match (x.kind(), y.kind()) {
        (kx, ky) if kx == ky => kx,
        (NumKind::Dec, NumKind::F32 | NumKind::F64 | NumKind::I128 | NumKind::U128)
        | (NumKind::F32 | NumKind::F64 | NumKind::I128 | NumKind::U128, NumKind::Dec) => {
            return Err(operator_error(op, a, b))
        }
        (NumKind::F64, _) | (_, NumKind::F64) => NumKind::F64,
        (NumKind::F32, _) | (_, NumKind::F32) => NumKind::F32,
        (NumKind::Dec, _) | (_, NumKind::Dec) => NumKind::Dec,
        (NumKind::U128, _) => {
            if unsigned_ok(&y) {
                NumKind::U128
            } else {
                return Err(operator_error(op, a, b));
            }
        }
        (_, NumKind::U128) => {
            if unsigned_ok(&x) {
                NumKind::U128
            } else {
                return Err(operator_error(op, a, b));
            }
        }
        (NumKind::I128, _) | (_, NumKind::I128) => NumKind::I128,
        (NumKind::U64, _) => {
            if unsigned_ok(&y) {
                NumKind::U64
            } else {
                return Err(operator_error(op, a, b));
            }
        }
        (_, NumKind::U64) => {
            if unsigned_ok(&x) {
                NumKind::U64
            } else {
                return Err(operator_error(op, a, b));
            }
        }
        (NumKind::I64, _) | (_, NumKind::I64) => NumKind::I64,
        (NumKind::U32, NumKind::I32) | (NumKind::I32, NumKind::U32) => NumKind::I64,
        _ => NumKind::I32,
    };
    Ok((x.convert(target)?, y.convert(target)?))
}

pub fn integral_range(kind: TypeKind) -> Option<(i128, i128)> {
    Some(match kind {
        TypeKind::SByte => (i8::MIN as i128, i8::MAX as i128),
        TypeKind::Byte => (0, u8::MAX as i128),
        TypeKind::Int16 => (i16::MIN as i128, i16::MAX as i128),
        TypeKind::UInt16 | TypeKind::Char => (0, u16::MAX as i128),
        TypeKind::Int32 => (i32::MIN as i128, i32::MAX as i128),
        TypeKind::UInt32 => (0, u32::MAX as i128),
        TypeKind::Int64 => (i64::MIN as i128, i64::MAX as i128),
        TypeKind::UInt64 => (0, u64::MAX as i128),
        TypeKind::Int128 => (i128::MIN, i128::MAX),
        _ => return None,
    })
}

fn char_from(code: i128) -> char {
    char::from_u32(code as u16 as u32).unwrap_or('\u{FFFD}')
}

/// Explicit (cast) conversion between numeric types. Integer narrowing
/// wraps; conversions out of `decimal` are checked.
pub fn explicit_numeric(n: Num, target: TypeKind) -> Result<Value, ScriptError> {
    let value = match target {
        TypeKind::Single => Value::Float(n.to_f64() as f32),
        TypeKind::Double => Value::Double(match n {
            Num::F32(v) => v as f64,
            other => other.to_f64(),
        }),
        TypeKind::Decimal => Value::Decimal(n.to_decimal()?),
        TypeKind::UInt128 => match n {
            Num::Dec(d) if d.is_negative() && d.trunc_i128() != 0 => {
                return Err(ScriptError::overflow())
            }
            other => Value::UInt128(match other {
                Num::U128(v) => v,
                Num::F32(v) => v as u128,
                Num::F64(v) => v as u128,
                o => o.wrapping_i128() as u128,
            }),
        },
        integral => {
            let wide = match n {
                Num::F32(v) => float_to_wide(v as f64, integral),
                Num::F64(v) => float_to_wide(v, integral),
                Num::Dec(d) => {
                    let t = d.trunc_i128();
                    match integral_range(integral) {
                        Some((lo, hi)) if t < lo || t > hi => {
                            return Err(ScriptError::new(
                                TypeKind::OverflowException,
                                format!(
                                    "Value was either too large or too small for {}.",
                                    article_name(integral)
                                ),
                            ))
                        }
                        _ => t,
                    }
                }
                other => other.wrapping_i128(),
            };
            match integral {
                TypeKind::SByte => Value::SByte(wide as i8),
                TypeKind::Byte => Value::Byte(wide as u8),
                TypeKind::Int16 => Value::Short(wide as i16),
                TypeKind::UInt16 => Value::UShort(wide as u16),
                TypeKind::Char => Value::Char(char_from(wide)),
                TypeKind::Int32 => Value::Int(wide as i32),
                TypeKind::UInt32 => Value::UInt(wide as u32),
                TypeKind::Int64 => Value::Long(wide as i64),
                TypeKind::UInt64 => Value::ULong(wide as u64),
                TypeKind::Int128 => Value::Int128(wide),
                other => {
                    return Err(ScriptError::invalid_cast(
                        "System.Object",
                        &TypeDesc::of(other).full_name(),
                    ))
                }
            }
        }
    };
    Ok(value)
}

fn float_to_wide(v: f64, target: TypeKind) -> i128 {
    match target {
        TypeKind::UInt64 => v as u64 as i128,
        TypeKind::UInt32 => v as i64 as u32 as i128,
        _ => v as i128,
    }
}

pub fn article_name(kind: TypeKind) -> String {
    let name = kind.name();
    let article = if name.starts_with(['A', 'E', 'I', 'O', 'U']) {
        "an"
    } else {
        "a"
    };
    format!("{} {}", article, name)
}

fn implicit_numeric_allowed(from: TypeKind, to: TypeKind) -> bool {
    use TypeKind::*;
    matches!(
        (from, to),
        (SByte, Int16 | Int32 | Int64 | Single | Double | Decimal | Int128)
            | (
                Byte,
                Int16 | UInt16 | Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal
                    | Int128 | UInt128
            )
            | (Int16, Int32 | Int64 | Single | Double | Decimal | Int128)
            | (
                UInt16 | Char,
                Int32 | UInt32 | Int64 | UInt64 | Single | Double | Decimal | Int128 | UInt128
            )
            | (Char, UInt16)
            | (Int32, Int64 | Single | Double | Decimal | Int128)
            | (UInt32, Int64 | UInt64 | Single | Double | Decimal | Int128 | UInt128)
            | (Int64, Single | Double | Decimal | Int128)
            | (UInt64, Single | Double | Decimal | Int128 | UInt128)
            | (Single, Double)
    )
}

/// Integer values that fit the target convert like integer constants do.
fn fits_as_constant(value: &Value, to: TypeKind) -> bool {
    let n = match value {
        Value::Int(v) => *v as i128,
        Value::Long(v) => *v as i128,
        _ => return false,
    };
    if to == TypeKind::Char {
        return false;
    }
    match integral_range(to) {
        Some((lo, hi)) => n >= lo && n <= hi,
        None => to == TypeKind::UInt128 && n >= 0,
    }
}

pub fn conversion_error(value: &Value, target: &TypeDesc) -> ScriptError {
    ScriptError::binder(format!(
        "Cannot implicitly convert type '{}' to '{}'",
        value.friendly_type_name(),
        target.friendly_name()
    ))
}

/// Conversion applied when storing into a typed local, parameter, array
/// slot or collection.
pub fn implicit_convert(value: Value, target: &TypeDesc) -> Result<Value, ScriptError> {
    let Some(source) = value.type_desc() else {
        return match target.kind() {
            Some(kind) if is_numeric_kind(kind) || kind == TypeKind::Boolean => {
                Err(ScriptError::binder(format!(
                    "Cannot convert null to '{}' because it is a non-nullable value type",
                    target.friendly_name()
                )))
            }
            _ => Ok(Value::Null),
        };
    };
    if &source == target || source.is_assignable_to(target) {
        return Ok(value);
    }
    if let (Some(from), Some(to)) = (source.kind(), target.kind()) {
        if is_numeric_kind(from) && is_numeric_kind(to) {
            if implicit_numeric_allowed(from, to) || fits_as_constant(&value, to) {
                if let Some(n) = to_num(&value) {
                    return explicit_numeric(n, to);
                }
            }
        }
    }
    Err(conversion_error(&value, target))
}

/// Cast expression semantics: numeric conversions, unboxing and reference
/// checks.
pub fn explicit_convert(value: Value, target: &TypeDesc) -> Result<Value, ScriptError> {
    let Some(source) = value.type_desc() else {
        return match target.kind() {
            Some(kind) if is_numeric_kind(kind) || kind == TypeKind::Boolean => {
                Err(ScriptError::null_reference())
            }
            _ => Ok(Value::Null),
        };
    };
    if &source == target || source.is_assignable_to(target) {
        return Ok(value);
    }
    if let Some(to) = target.kind() {
        if is_numeric_kind(to) {
            if let Some(n) = to_num(&value) {
                return explicit_numeric(n, to);
            }
        }
    }
    Err(ScriptError::invalid_cast(&source.full_name(), &target.full_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_follows_csharp_rules() {
        let (a, _) = promote("+", &Value::UInt(1), &Value::Int(1)).unwrap();
        assert_eq!(a.kind(), NumKind::I64);
        let (a, _) = promote("+", &Value::Byte(1), &Value::Short(1)).unwrap();
        assert_eq!(a.kind(), NumKind::I32);
        assert!(promote("+", &Value::Decimal(Decimal::ONE), &Value::Double(1.0)).is_err());
        assert!(promote("+", &Value::ULong(1), &Value::Int(-1)).is_err());
    }

    #[test]
    fn explicit_casts_wrap_or_check() {
        assert!(matches!(
            explicit_numeric(Num::I32(300), TypeKind::Byte).unwrap(),
            Value::Byte(44)
        ));
        assert!(matches!(
            explicit_numeric(Num::F64(-3.7), TypeKind::Int32).unwrap(),
            Value::Int(-3)
        ));
        let big = Decimal::parse("1e20").unwrap();
        assert!(explicit_numeric(Num::Dec(big), TypeKind::Int32).is_err());
    }

    #[test]
    fn implicit_conversions() {
        let long = TypeDesc::of(TypeKind::Int64);
        assert!(matches!(implicit_convert(Value::Int(5), &long).unwrap(), Value::Long(5)));
        let byte = TypeDesc::of(TypeKind::Byte);
        assert!(matches!(implicit_convert(Value::Int(5), &byte).unwrap(), Value::Byte(5)));
        assert!(implicit_convert(Value::Int(300), &byte).is_err());
        let int = TypeDesc::of(TypeKind::Int32);
        assert!(implicit_convert(Value::Double(1.5), &int).is_err());
        assert!(implicit_convert(Value::Null, &int).is_err());
    }
}
