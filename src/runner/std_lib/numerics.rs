//! Numeric types: bounds, parsing, `Convert` and format strings.

use crate::runner::ds::decimal::Decimal;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::operations::type_conversion::{
    article_name, explicit_numeric, integral_range, to_num, Num,
};
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{
    arg, arg_count, to_str, BuiltInObject, EvalContext, GetterFn, NativeFn,
};

macro_rules! bounds {
    ($max:ident, $min:ident, $max_value:expr, $min_value:expr) => {
        fn $max(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
            Ok($max_value)
        }

        fn $min(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
            Ok($min_value)
        }
    };
}

macro_rules! parser {
    ($name:ident, $kind:expr) => {
        fn $name(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
            arg_count("Parse", &args, 1, 2)?;
            let text = to_str("Parse", &args[0])?.ok_or_else(|| ScriptError::argument_null("s"))?;
            parse_text($kind, &text)
        }
    };
}

macro_rules! converter {
    ($name:ident, $kind:expr) => {
        fn $name(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
            arg_count("Convert", &args, 1, 1)?;
            convert_to($kind, &args[0])
        }
    };
}

bounds!(byte_max, byte_min, Value::Byte(u8::MAX), Value::Byte(u8::MIN));
bounds!(sbyte_max, sbyte_min, Value::SByte(i8::MAX), Value::SByte(i8::MIN));
bounds!(short_max, short_min, Value::Short(i16::MAX), Value::Short(i16::MIN));
bounds!(ushort_max, ushort_min, Value::UShort(u16::MAX), Value::UShort(u16::MIN));
bounds!(int_max, int_min, Value::Int(i32::MAX), Value::Int(i32::MIN));
bounds!(uint_max, uint_min, Value::UInt(u32::MAX), Value::UInt(u32::MIN));
bounds!(long_max, long_min, Value::Long(i64::MAX), Value::Long(i64::MIN));
bounds!(ulong_max, ulong_min, Value::ULong(u64::MAX), Value::ULong(u64::MIN));
bounds!(int128_max, int128_min, Value::Int128(i128::MAX), Value::Int128(i128::MIN));
bounds!(uint128_max, uint128_min, Value::UInt128(u128::MAX), Value::UInt128(u128::MIN));
bounds!(float_max, float_min, Value::Float(f32::MAX), Value::Float(f32::MIN));
bounds!(double_max, double_min, Value::Double(f64::MAX), Value::Double(f64::MIN));
bounds!(decimal_max, decimal_min, Value::Decimal(Decimal::MAX), Value::Decimal(Decimal::MIN));
bounds!(char_max, char_min, Value::Char('\u{FFFF}'), Value::Char('\0'));

fn double_nan(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(f64::NAN))
}

fn double_positive_infinity(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(f64::INFINITY))
}

fn double_negative_infinity(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(f64::NEG_INFINITY))
}

fn double_epsilon(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Double(f64::from_bits(1)))
}

parser!(byte_parse, TypeKind::Byte);
parser!(sbyte_parse, TypeKind::SByte);
parser!(short_parse, TypeKind::Int16);
parser!(ushort_parse, TypeKind::UInt16);
parser!(int_parse, TypeKind::Int32);
parser!(uint_parse, TypeKind::UInt32);
parser!(long_parse, TypeKind::Int64);
parser!(ulong_parse, TypeKind::UInt64);
parser!(int128_parse, TypeKind::Int128);
parser!(uint128_parse, TypeKind::UInt128);
parser!(float_parse, TypeKind::Single);
parser!(double_parse, TypeKind::Double);
parser!(decimal_parse, TypeKind::Decimal);
parser!(bool_parse, TypeKind::Boolean);

converter!(convert_to_int32, TypeKind::Int32);
converter!(convert_to_int64, TypeKind::Int64);
converter!(convert_to_double, TypeKind::Double);
converter!(convert_to_decimal, TypeKind::Decimal);
converter!(convert_to_boolean, TypeKind::Boolean);
converter!(convert_to_byte, TypeKind::Byte);

/// Register numeric types, `bool`, `char` and `Convert`.
pub fn register(registry: &mut BuiltInRegistry) {
    let numeric = |kind: TypeKind, max: GetterFn, min: GetterFn, parse: NativeFn| {
        BuiltInObject::new(kind)
            .add_property("MaxValue", max)
            .add_property("MinValue", min)
            .add_method("Parse", parse)
            .add_instance_method("ToString", number_to_string)
            .add_instance_method("CompareTo", number_compare_to)
    };
    registry.register_object(numeric(TypeKind::Byte, byte_max, byte_min, byte_parse));
    registry.register_object(numeric(TypeKind::SByte, sbyte_max, sbyte_min, sbyte_parse));
    registry.register_object(numeric(TypeKind::Int16, short_max, short_min, short_parse));
    registry.register_object(numeric(TypeKind::UInt16, ushort_max, ushort_min, ushort_parse));
    registry.register_object(numeric(TypeKind::Int32, int_max, int_min, int_parse));
    registry.register_object(numeric(TypeKind::UInt32, uint_max, uint_min, uint_parse));
    registry.register_object(numeric(TypeKind::Int64, long_max, long_min, long_parse));
    registry.register_object(numeric(TypeKind::UInt64, ulong_max, ulong_min, ulong_parse));
    registry.register_object(numeric(TypeKind::Int128, int128_max, int128_min, int128_parse));
    registry.register_object(numeric(
        TypeKind::UInt128,
        uint128_max,
        uint128_min,
        uint128_parse,
    ));
    registry.register_object(
        numeric(TypeKind::Single, float_max, float_min, float_parse)
            .add_method("IsNaN", float_is_nan),
    );
    registry.register_object(
        numeric(TypeKind::Double, double_max, double_min, double_parse)
            .add_property("NaN", double_nan)
            .add_property("PositiveInfinity", double_positive_infinity)
            .add_property("NegativeInfinity", double_negative_infinity)
            .add_property("Epsilon", double_epsilon)
            .add_method("IsNaN", float_is_nan)
            .add_method("IsInfinity", float_is_infinity),
    );
    registry.register_object(numeric(
        TypeKind::Decimal,
        decimal_max,
        decimal_min,
        decimal_parse,
    ));

    registry.register_object(BuiltInObject::new(TypeKind::Boolean).add_method("Parse", bool_parse));

    let char_object = BuiltInObject::new(TypeKind::Char)
        .add_property("MaxValue", char_max)
        .add_property("MinValue", char_min)
        .add_method("IsDigit", char_is_digit)
        .add_method("IsLetter", char_is_letter)
        .add_method("IsWhiteSpace", char_is_white_space)
        .add_method("IsUpper", char_is_upper)
        .add_method("IsLower", char_is_lower)
        .add_method("ToUpper", char_to_upper)
        .add_method("ToLower", char_to_lower);
    registry.register_object(char_object);

    let convert = BuiltInObject::new(TypeKind::Convert)
        .add_method("ToInt32", convert_to_int32)
        .add_method("ToInt64", convert_to_int64)
        .add_method("ToDouble", convert_to_double)
        .add_method("ToDecimal", convert_to_decimal)
        .add_method("ToBoolean", convert_to_boolean)
        .add_method("ToByte", convert_to_byte)
        .add_method("ToString", convert_to_string)
        .add_method("ToHexString", convert_to_hex_string);
    registry.register_object(convert);
}

fn overflow(kind: TypeKind) -> ScriptError {
    ScriptError::new(
        TypeKind::OverflowException,
        format!(
            "Value was either too large or too small for {}.",
            article_name(kind)
        ),
    )
}

fn bad_format(text: &str) -> ScriptError {
    ScriptError::format(format!(
        "The input string '{}' was not in a correct format.",
        text
    ))
}

/// `T.Parse` with invariant culture: surrounding whitespace and a leading
/// sign are allowed.
pub fn parse_text(kind: TypeKind, text: &str) -> Result<Value, ScriptError> {
    let trimmed = text.trim();
    match kind {
        TypeKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(ScriptError::format(format!(
                "String '{}' was not recognized as a valid Boolean.",
                text
            ))),
        },
        TypeKind::Single => trimmed
            .parse::<f32>()
            .map(Value::Float)
            .map_err(|_| bad_format(text)),
        TypeKind::Double => trimmed
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| bad_format(text)),
        TypeKind::Decimal => Decimal::parse(trimmed)
            .map(Value::Decimal)
            .ok_or_else(|| bad_format(text)),
        TypeKind::UInt128 => {
            if !is_integer_text(trimmed) {
                return Err(bad_format(text));
            }
            trimmed
                .trim_start_matches('+')
                .parse::<u128>()
                .map(Value::UInt128)
                .map_err(|_| overflow(kind))
        }
        integral => {
            if !is_integer_text(trimmed) {
                return Err(bad_format(text));
            }
            let wide = trimmed.parse::<i128>().map_err(|_| overflow(integral))?;
            match integral_range(integral) {
                Some((lo, hi)) if wide >= lo && wide <= hi => {
                    explicit_numeric(Num::I128(wide), integral)
                }
                _ => Err(overflow(integral)),
            }
        }
    }
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn round_half_even_decimal(d: Decimal) -> Result<i128, ScriptError> {
    let whole = d.truncate();
    let mut fraction = d.sub(&whole)?;
    if fraction.is_negative() {
        fraction = fraction.negate();
    }
    let half = Decimal::from_parts(false, 5, 1)?;
    let t = whole.trunc_i128();
    let step = if d.is_negative() { -1 } else { 1 };
    Ok(match fraction.cmp(&half) {
        std::cmp::Ordering::Greater => t + step,
        std::cmp::Ordering::Equal if t % 2 != 0 => t + step,
        _ => t,
    })
}

/// `Convert.ToX`: like a checked cast, but floating values round to even
/// and strings are parsed.
pub fn convert_to(kind: TypeKind, value: &Value) -> Result<Value, ScriptError> {
    if kind == TypeKind::Boolean {
        return match value {
            Value::Null => Ok(Value::Bool(false)),
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::String(s) => parse_text(kind, s),
            other => match to_num(other) {
                Some(n) => Ok(Value::Bool(n.to_f64() != 0.0)),
                None => Err(ScriptError::invalid_cast(
                    &other.type_name(),
                    &TypeDesc::of(kind).full_name(),
                )),
            },
        };
    }
    let n = match value {
        Value::Null => return Ok(Value::default_for(&TypeDesc::of(kind))),
        Value::String(s) => return parse_text(kind, s),
        Value::Bool(b) => Num::I32(*b as i32),
        other => to_num(other).ok_or_else(|| {
            ScriptError::invalid_cast(&other.type_name(), &TypeDesc::of(kind).full_name())
        })?,
    };
    if matches!(kind, TypeKind::Single | TypeKind::Double | TypeKind::Decimal) {
        return explicit_numeric(n, kind);
    }
    let wide = match n {
        Num::F32(v) => rounded_float(v as f64, kind)?,
        Num::F64(v) => rounded_float(v, kind)?,
        Num::Dec(d) => round_half_even_decimal(d)?,
        Num::U128(v) => i128::try_from(v).map_err(|_| overflow(kind))?,
        other => other.wrapping_i128(),
    };
    match integral_range(kind) {
        Some((lo, hi)) if wide >= lo && wide <= hi => explicit_numeric(Num::I128(wide), kind),
        _ => Err(overflow(kind)),
    }
}

fn rounded_float(v: f64, kind: TypeKind) -> Result<i128, ScriptError> {
    if !v.is_finite() {
        return Err(overflow(kind));
    }
    let r = v.round_ties_even();
    if r.abs() > 1e38 {
        return Err(overflow(kind));
    }
    Ok(r as i128)
}

fn convert_to_string(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToString", &args, 1, 1)?;
    Ok(Value::string(&args[0].to_display_string()))
}

fn convert_to_hex_string(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToHexString", &args, 1, 1)?;
    let bytes = super::encoding::bytes_of("ToHexString", &args[0])?;
    let hex: String = bytes.iter().map(|b| format!("{:02X}", b)).collect();
    Ok(Value::string(&hex))
}

fn float_is_nan(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IsNaN", &args, 1, 1)?;
    Ok(Value::Bool(matches!(to_num(&args[0]), Some(n) if n.to_f64().is_nan())))
}

fn float_is_infinity(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IsInfinity", &args, 1, 1)?;
    Ok(Value::Bool(matches!(to_num(&args[0]), Some(n) if n.to_f64().is_infinite())))
}

fn char_arg(name: &str, args: &[Value]) -> Result<char, ScriptError> {
    arg_count(name, args, 1, 1)?;
    match &args[0] {
        Value::Char(c) => Ok(*c),
        other => Err(ScriptError::binder(format!(
            "Argument 1: cannot convert from '{}' to 'char'",
            other.friendly_type_name()
        ))),
    }
}

fn char_is_digit(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::Bool(char_arg("IsDigit", &args)?.is_ascii_digit()))
}

fn char_is_letter(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::Bool(char_arg("IsLetter", &args)?.is_alphabetic()))
}

fn char_is_white_space(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::Bool(char_arg("IsWhiteSpace", &args)?.is_whitespace()))
}

fn char_is_upper(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::Bool(char_arg("IsUpper", &args)?.is_uppercase()))
}

fn char_is_lower(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::Bool(char_arg("IsLower", &args)?.is_lowercase()))
}

fn char_to_upper(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let c = char_arg("ToUpper", &args)?;
    Ok(Value::Char(c.to_uppercase().next().unwrap_or(c)))
}

fn char_to_lower(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let c = char_arg("ToLower", &args)?;
    Ok(Value::Char(c.to_lowercase().next().unwrap_or(c)))
}

fn number_to_string(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToString", &args, 0, 2)?;
    let format = match args.first() {
        Some(v) => to_str("ToString", v)?.unwrap_or_default(),
        None => String::new(),
    };
    Ok(Value::string(&format_value(&this, &format)?))
}

fn number_compare_to(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("CompareTo", &args, 1, 1)?;
    let ordering = crate::runner::ds::operations::test_and_comparison::compare_values(&this, &arg(&args, 0))?;
    Ok(Value::Int(ordering as i32))
}

// ── Format strings ────────────────────────────────────────────

const MAX_FORMAT_PRECISION: usize = 1_000_000;

/// Applies a standard or simple custom numeric format string. Non-numeric
/// values ignore the format.
pub fn format_value(value: &Value, format: &str) -> Result<String, ScriptError> {
    let Some(n) = to_num(value).filter(|_| !matches!(value, Value::Char(_))) else {
        return Ok(value.to_display_string());
    };
    if format.is_empty() {
        return Ok(value.to_display_string());
    }
    let mut chars = format.chars();
    let specifier = chars.next().unwrap_or('G');
    let precision_text: String = chars.collect();
    if !specifier.is_ascii_alphabetic()
        || !precision_text.chars().all(|c| c.is_ascii_digit())
        || precision_text.len() > 9
    {
        return format_custom(value, &n, format);
    }
    let precision: Option<usize> = precision_text.parse().ok();
    if precision.unwrap_or(0) > MAX_FORMAT_PRECISION {
        return Err(ScriptError::out_of_memory("string"));
    }
    let integral = !matches!(n, Num::F32(_) | Num::F64(_) | Num::Dec(_));
    let bad = || ScriptError::format("Format specifier was invalid.");
    Ok(match specifier.to_ascii_uppercase() {
        'G' | 'R' => value.to_display_string(),
        'D' if integral => {
            let wide = integral_text(value);
            let (sign, digits) = match wide.strip_prefix('-') {
                Some(rest) => ("-", rest.to_string()),
                None => ("", wide),
            };
            format!("{}{:0>width$}", sign, digits, width = precision.unwrap_or(0))
        }
        'X' if integral => {
            let hex = hex_text(value);
            let hex = if specifier == 'x' { hex.to_lowercase() } else { hex };
            format!("{:0>width$}", hex, width = precision.unwrap_or(0))
        }
        'F' => fixed_text(value, &n, precision.unwrap_or(2)),
        'N' => group_thousands(&fixed_text(value, &n, precision.unwrap_or(2))),
        'P' => {
            let scaled = n.to_f64() * 100.0;
            let fixed = fixed_text(&Value::Double(scaled), &Num::F64(scaled), precision.unwrap_or(2));
            format!("{} %", group_thousands(&fixed))
        }
        'E' => {
            let text = format!("{:.*e}", precision.unwrap_or(6), n.to_f64());
            let (mantissa, exponent) = text.split_once('e').ok_or_else(bad)?;
            let exponent: i32 = exponent.parse().map_err(|_| bad())?;
            format!(
                "{}{}{}{:03}",
                mantissa,
                if specifier == 'e' { 'e' } else { 'E' },
                if exponent < 0 { '-' } else { '+' },
                exponent.abs()
            )
        }
        _ => return Err(bad()),
    })
}

fn integral_text(value: &Value) -> String {
    value.to_display_string()
}

fn hex_text(value: &Value) -> String {
    match value {
        Value::Byte(v) => format!("{:X}", v),
        Value::SByte(v) => format!("{:X}", v),
        Value::Short(v) => format!("{:X}", v),
        Value::UShort(v) => format!("{:X}", v),
        Value::Int(v) => format!("{:X}", v),
        Value::UInt(v) => format!("{:X}", v),
        Value::Long(v) => format!("{:X}", v),
        Value::ULong(v) => format!("{:X}", v),
        Value::Int128(v) => format!("{:X}", v),
        Value::UInt128(v) => format!("{:X}", v),
        other => other.to_display_string(),
    }
}

/// Fixed-point text with `precision` fraction digits, rounding half away
/// from zero on the decimal digits.
fn fixed_text(value: &Value, n: &Num, precision: usize) -> String {
    match n {
        Num::F32(_) | Num::F64(_) => {
            let v = n.to_f64();
            if !v.is_finite() {
                return value.to_display_string();
            }
            format!("{:.*}", precision, v)
        }
        _ => round_digits(&value.to_display_string(), precision),
    }
}

fn round_digits(text: &str, precision: usize) -> String {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().chain(std::iter::repeat(b'0')).take(precision))
        .map(|b| b - b'0')
        .collect();
    let round_up = frac_part.as_bytes().get(precision).map_or(false, |d| *d >= b'5');
    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }
    let int_len = digits.len() - precision;
    let mut out = String::new();
    if negative && digits.iter().any(|d| *d != 0) {
        out.push('-');
    }
    out.extend(digits[..int_len].iter().map(|d| (d + b'0') as char));
    if precision > 0 {
        out.push('.');
        out.extend(digits[int_len..].iter().map(|d| (d + b'0') as char));
    }
    out
}

fn group_thousands(fixed: &str) -> String {
    let (sign, body) = match fixed.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", fixed),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(f) => format!("{}{}.{}", sign, grouped, f),
        None => format!("{}{}", sign, grouped),
    }
}

/// Custom formats built from `0`, `#`, `,` and `.`.
fn format_custom(value: &Value, n: &Num, format: &str) -> Result<String, ScriptError> {
    if !format.chars().all(|c| matches!(c, '0' | '#' | ',' | '.')) {
        return Err(ScriptError::format("Format specifier was invalid."));
    }
    let (int_spec, frac_spec) = format.split_once('.').unwrap_or((format, ""));
    let min_fraction = frac_spec.chars().filter(|c| *c == '0').count();
    let max_fraction = frac_spec.len();
    let mut text = fixed_text(value, n, max_fraction);
    if max_fraction > min_fraction {
        if let Some((int_part, frac)) = text.clone().split_once('.') {
            let mut frac = frac.to_string();
            while frac.len() > min_fraction && frac.ends_with('0') {
                frac.pop();
            }
            text = if frac.is_empty() {
                int_part.to_string()
            } else {
                format!("{}.{}", int_part, frac)
            };
        }
    }
    let min_int = int_spec.chars().filter(|c| *c == '0').count();
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", text.clone()),
    };
    let (int_part, frac) = match body.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (body.clone(), None),
    };
    let mut int_part = format!("{:0>width$}", int_part, width = min_int);
    if min_int == 0 && int_part == "0" {
        int_part.clear();
    }
    let mut out = format!("{}{}", sign, int_part);
    if let Some(f) = frac {
        out.push('.');
        out.push_str(&f);
    }
    if int_spec.contains(',') {
        out = group_thousands(&out);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reports_format_and_overflow() {
        assert!(matches!(parse_text(TypeKind::Int32, " 42 "), Ok(Value::Int(42))));
        let err = parse_text(TypeKind::Int32, "abc").unwrap_err();
        assert_eq!(err.kind(), TypeKind::FormatException);
        let err = parse_text(TypeKind::Int32, "99999999999").unwrap_err();
        assert_eq!(err.message(), "Value was either too large or too small for an Int32.");
    }

    #[test]
    fn convert_rounds_to_even() {
        assert!(matches!(convert_to(TypeKind::Int32, &Value::Double(2.5)), Ok(Value::Int(2))));
        assert!(matches!(convert_to(TypeKind::Int32, &Value::Double(3.5)), Ok(Value::Int(4))));
        let half = Value::Decimal(Decimal::parse("-1.5").unwrap());
        assert!(matches!(convert_to(TypeKind::Int32, &half), Ok(Value::Int(-2))));
    }

    #[test]
    fn standard_format_strings() {
        assert_eq!(format_value(&Value::Int(255), "X").unwrap(), "FF");
        assert_eq!(format_value(&Value::Int(255), "x4").unwrap(), "00ff");
        assert_eq!(format_value(&Value::Int(-7), "D3").unwrap(), "-007");
        assert_eq!(format_value(&Value::Double(1234.567), "N2").unwrap(), "1,234.57");
        assert_eq!(format_value(&Value::Double(1.5), "F3").unwrap(), "1.500");
        let d = Value::Decimal(Decimal::parse("2.345").unwrap());
        assert_eq!(format_value(&d, "F2").unwrap(), "2.35");
        assert_eq!(format_value(&Value::Double(3.14159), "0.00").unwrap(), "3.14");
    }
}
