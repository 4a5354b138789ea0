//! Math built-in object.
//!
//! Provides mathematical constants and functions. Overloads follow the
//! argument's numeric type: `Math.Abs(-3)` stays an `int`, `Math.Floor(2.5m)`
//! stays a `decimal`.

use std::cmp::Ordering;

use crate::runner::ds::decimal::Decimal;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::operations::test_and_comparison::compare_values;
use crate::runner::ds::operations::type_conversion::{promote, to_num, Num};
use crate::runner::ds::types::TypeKind;
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, to_f64, to_int, BuiltInObject, EvalContext};

/// Register the Math object with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    let math = BuiltInObject::new(TypeKind::Math)
        // Constants
        .add_property("PI", math_pi)
        .add_property("E", math_e)
        // Methods
        .add_method("Abs", math_abs)
        .add_method("Max", math_max)
        .add_method("Min", math_min)
        .add_method("Clamp", math_clamp)
        .add_method("Sign", math_sign)
        .add_method("Floor", math_floor)
        .add_method("Ceiling", math_ceiling)
        .add_method("Truncate", math_truncate)
        .add_method("Round", math_round)
        .add_method("Pow", math_pow)
        .add_method("Sqrt", math_sqrt)
        .add_method("Exp", math_exp)
        .add_method("Log", math_log)
        .add_method("Log10", math_log10)
        .add_method("Sin", math_sin)
        .add_method("Cos", math_cos)
        .add_method("Tan", math_tan);

    registry.register_object(math);
}

fn math_pi(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(std::f64::consts::PI))
}

fn math_e(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(std::f64::consts::E))
}

fn numeric_arg(name: &str, value: &Value) -> Result<Num, ScriptError> {
    to_num(value).ok_or_else(|| {
        ScriptError::binder(format!(
            "The best overloaded method match for 'System.Math.{}' has some invalid arguments",
            name
        ))
    })
}

fn math_abs(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Abs", &args, 1, 1)?;
    let min_value = || {
        ScriptError::overflow_with(
            "Negating the minimum value of a twos complement number is invalid.",
        )
    };
    Ok(match &args[0] {
        Value::SByte(v) => Value::SByte(v.checked_abs().ok_or_else(min_value)?),
        Value::Short(v) => Value::Short(v.checked_abs().ok_or_else(min_value)?),
        Value::Long(v) => Value::Long(v.checked_abs().ok_or_else(min_value)?),
        Value::Int128(v) => Value::Int128(v.checked_abs().ok_or_else(min_value)?),
        Value::Float(v) => Value::Float(v.abs()),
        Value::Double(v) => Value::Double(v.abs()),
        Value::Decimal(d) if d.is_negative() => Value::Decimal(d.negate()),
        Value::Decimal(d) => Value::Decimal(*d),
        other => match numeric_arg("Abs", other)? {
            Num::I32(v) => Value::Int(v.checked_abs().ok_or_else(min_value)?),
            n => n.into_value(),
        },
    })
}

/// Common-type pair for the two-argument overloads.
fn pair(name: &str, a: &Value, b: &Value) -> Result<(Value, Value), ScriptError> {
    let (x, y) = promote(name, a, b)?;
    Ok((x.into_value(), y.into_value()))
}

fn is_nan(value: &Value) -> bool {
    matches!(value, Value::Double(v) if v.is_nan()) || matches!(value, Value::Float(v) if v.is_nan())
}

fn math_max(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Max", &args, 2, 2)?;
    let (a, b) = pair("Max", &args[0], &args[1])?;
    if is_nan(&a) {
        return Ok(a);
    }
    Ok(match compare_values(&a, &b)? {
        Ordering::Less => b,
        _ => a,
    })
}

fn math_min(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Min", &args, 2, 2)?;
    let (a, b) = pair("Min", &args[0], &args[1])?;
    if is_nan(&a) {
        return Ok(a);
    }
    Ok(match compare_values(&a, &b)? {
        Ordering::Greater => b,
        _ => a,
    })
}

fn math_clamp(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Clamp", &args, 3, 3)?;
    let (value, min) = pair("Clamp", &args[0], &args[1])?;
    let (value, max) = pair("Clamp", &value, &args[2])?;
    let (min, _) = pair("Clamp", &min, &max)?;
    if compare_values(&min, &max)? == Ordering::Greater {
        return Err(ScriptError::argument(format!(
            "'{}' cannot be greater than {}.",
            min.to_display_string(),
            max.to_display_string()
        )));
    }
    Ok(if compare_values(&value, &min)? == Ordering::Less {
        min
    } else if compare_values(&value, &max)? == Ordering::Greater {
        max
    } else {
        value
    })
}

fn math_sign(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Sign", &args, 1, 1)?;
    let n = numeric_arg("Sign", &args[0])?;
    let sign = match n {
        Num::F32(v) if v.is_nan() => return Err(ScriptError::arithmetic_nan()),
        Num::F64(v) if v.is_nan() => return Err(ScriptError::arithmetic_nan()),
        Num::Dec(d) if d.is_zero() => 0,
        Num::F32(v) if v == 0.0 => 0,
        Num::F64(v) if v == 0.0 => 0,
        n if n.is_negative() => -1,
        n if n.wrapping_i128() == 0 && !matches!(n, Num::F32(_) | Num::F64(_) | Num::Dec(_)) => 0,
        _ => 1,
    };
    Ok(Value::Int(sign))
}

/// Applies a rounding function to doubles and decimals alike.
fn rounding(
    name: &str,
    value: &Value,
    float: fn(f64) -> f64,
    decimal: fn(&Decimal) -> Decimal,
) -> Result<Value, ScriptError> {
    Ok(match value {
        Value::Decimal(d) => Value::Decimal(decimal(d)),
        Value::Float(v) => Value::Float(float(*v as f64) as f32),
        other => Value::Double(float(to_f64(name, other)?)),
    })
}

fn decimal_floor(d: &Decimal) -> Decimal {
    let t = d.truncate();
    if d.is_negative() && !d.is_integer() {
        t.sub(&Decimal::ONE).unwrap_or(t)
    } else {
        t
    }
}

fn decimal_ceiling(d: &Decimal) -> Decimal {
    let t = d.truncate();
    if !d.is_negative() && !d.is_integer() {
        t.add(&Decimal::ONE).unwrap_or(t)
    } else {
        t
    }
}

fn math_floor(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Floor", &args, 1, 1)?;
    rounding("Floor", &args[0], f64::floor, decimal_floor)
}

fn math_ceiling(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Ceiling", &args, 1, 1)?;
    rounding("Ceiling", &args[0], f64::ceil, decimal_ceiling)
}

fn math_truncate(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Truncate", &args, 1, 1)?;
    rounding("Truncate", &args[0], f64::trunc, Decimal::truncate)
}

/// Round half to even, optionally at `digits` fractional digits.
fn math_round(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Round", &args, 1, 2)?;
    let digits = match args.get(1) {
        Some(d) => to_int("Round", d)?,
        None => 0,
    };
    if !(0..=15).contains(&digits) {
        return Err(ScriptError::argument_out_of_range("digits"));
    }
    match &args[0] {
        Value::Decimal(d) => Ok(Value::Decimal(round_decimal(d, digits as u32)?)),
        other => {
            let v = to_f64("Round", other)?;
            let scale = 10f64.powi(digits);
            let scaled = v * scale;
            let rounded = scaled.round_ties_even();
            Ok(Value::Double(if digits == 0 { rounded } else { rounded / scale }))
        }
    }
}

fn round_decimal(d: &Decimal, digits: u32) -> Result<Decimal, ScriptError> {
    if d.scale() <= digits {
        return Ok(*d);
    }
    let divisor = 10u128.pow(d.scale() - digits);
    let (mut quotient, remainder) = (d.mantissa() / divisor, d.mantissa() % divisor);
    let half = divisor / 2;
    if remainder > half || (remainder == half && quotient % 2 == 1) {
        quotient += 1;
    }
    Ok(Decimal::from_parts(d.is_negative(), quotient, digits)?)
}

macro_rules! unary_double {
    ($name:ident, $label:expr, $op:expr) => {
        fn $name(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
            arg_count($label, &args, 1, 1)?;
            let f: fn(f64) -> f64 = $op;
            Ok(Value::Double(f(to_f64($label, &args[0])?)))
        }
    };
}

unary_double!(math_sqrt, "Sqrt", f64::sqrt);
unary_double!(math_exp, "Exp", f64::exp);
unary_double!(math_log10, "Log10", f64::log10);
unary_double!(math_sin, "Sin", f64::sin);
unary_double!(math_cos, "Cos", f64::cos);
unary_double!(math_tan, "Tan", f64::tan);

fn math_log(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Log", &args, 1, 2)?;
    let v = to_f64("Log", &args[0])?;
    Ok(Value::Double(match args.get(1) {
        Some(base) => v.log(to_f64("Log", base)?),
        None => v.ln(),
    }))
}

fn math_pow(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Pow", &args, 2, 2)?;
    let x = to_f64("Pow", &args[0])?;
    let y = to_f64("Pow", &args[1])?;
    Ok(Value::Double(x.powf(y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(f: crate::runner::plugin::types::NativeFn, args: Vec<Value>) -> Result<Value, ScriptError> {
        f(&mut EvalContext::default(), Value::Null, args)
    }

    #[test]
    fn abs_keeps_integer_type_and_checks_min_value() {
        assert!(matches!(call(math_abs, vec![Value::Int(-3)]).unwrap(), Value::Int(3)));
        let err = call(math_abs, vec![Value::Int(i32::MIN)]).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OverflowException);
    }

    #[test]
    fn max_promotes_mixed_arguments() {
        assert!(matches!(
            call(math_max, vec![Value::Int(2), Value::Double(2.5)]).unwrap(),
            Value::Double(v) if v == 2.5
        ));
        assert!(matches!(call(math_min, vec![Value::Int(2), Value::Long(-1)]).unwrap(), Value::Long(-1)));
    }

    #[test]
    fn round_is_bankers_rounding() {
        assert!(matches!(call(math_round, vec![Value::Double(2.5)]).unwrap(), Value::Double(v) if v == 2.0));
        assert!(matches!(call(math_round, vec![Value::Double(3.5)]).unwrap(), Value::Double(v) if v == 4.0));
        let d = Decimal::parse("-2.5").unwrap();
        assert_eq!(call(math_floor, vec![Value::Decimal(d)]).unwrap().to_display_string(), "-3");
    }
}
