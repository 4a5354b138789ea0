//! `string` statics, instance methods and composite formatting.

use std::rc::Rc;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{
    arg, arg_count, required_str, to_int, to_str, BuiltInObject, EvalContext,
};

use super::numerics::format_value;

/// Register the String object with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    let string = BuiltInObject::new(TypeKind::String)
        .add_property("Empty", string_empty)
        .add_method("Join", string_join)
        .add_method("Concat", string_concat)
        .add_method("Format", string_format)
        .add_method("IsNullOrEmpty", string_is_null_or_empty)
        .add_method("IsNullOrWhiteSpace", string_is_null_or_white_space)
        .add_instance_property("Length", string_length)
        .add_instance_method("ToUpper", string_to_upper)
        .add_instance_method("ToLower", string_to_lower)
        .add_instance_method("Trim", string_trim)
        .add_instance_method("TrimStart", string_trim_start)
        .add_instance_method("TrimEnd", string_trim_end)
        .add_instance_method("Contains", string_contains)
        .add_instance_method("StartsWith", string_starts_with)
        .add_instance_method("EndsWith", string_ends_with)
        .add_instance_method("IndexOf", string_index_of)
        .add_instance_method("Substring", string_substring)
        .add_instance_method("Replace", string_replace)
        .add_instance_method("Split", string_split)
        .add_instance_method("PadLeft", string_pad_left)
        .add_instance_method("PadRight", string_pad_right)
        .add_instance_method("ToCharArray", string_to_char_array)
        .add_instance_method("ToString", string_to_string)
        .with_constructor(string_construct);

    registry.register_object(string);
}

fn this_str(this: &Value) -> Result<Rc<str>, ScriptError> {
    match this {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn chars_of(s: &str) -> Vec<char> {
    s.chars().collect()
}

/// `new string(c, count)`.
fn string_construct(ctx: &mut EvalContext, _target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("String", &args, 1, 2)?;
    match (&args[0], args.get(1)) {
        (Value::Char(c), Some(count)) => {
            let count = to_int("String", count)?;
            if count < 0 {
                return Err(ScriptError::argument_out_of_range("count"));
            }
            ctx.check_str_len(count as usize)?;
            Ok(Value::string(&c.to_string().repeat(count as usize)))
        }
        (Value::Array(a), None) => {
            let text: String = a
                .borrow()
                .items
                .iter()
                .map(|v| match v {
                    Value::Char(c) => *c,
                    _ => '\u{FFFD}',
                })
                .collect();
            Ok(Value::string(&text))
        }
        (other, _) => Err(ScriptError::binder(format!(
            "The best overloaded method match for 'String.String' has some invalid arguments: cannot convert from '{}'",
            other.friendly_type_name()
        ))),
    }
}

fn string_empty(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(""))
}

fn string_length(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Int(this_str(&this)?.encode_utf16().count() as i32))
}

fn string_join(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Join", &args, 2, usize::MAX)?;
    let separator = match &args[0] {
        Value::Char(c) => c.to_string(),
        other => to_str("Join", other)?.unwrap_or_default(),
    };
    let parts = match &args[1..] {
        [single] if !matches!(single, Value::String(_)) && single.reference_id().is_some() => {
            ctx.items(single)?
        }
        rest => rest.to_vec(),
    };
    let joined = parts
        .iter()
        .map(|v| v.to_display_string())
        .collect::<Vec<_>>()
        .join(&separator);
    ctx.check_str_len(joined.len())?;
    Ok(Value::string(&joined))
}

fn string_concat(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let parts = match args.as_slice() {
        [single] if !matches!(single, Value::String(_)) && single.reference_id().is_some() => {
            ctx.items(single)?
        }
        rest => rest.to_vec(),
    };
    let mut text = String::new();
    for part in &parts {
        text.push_str(&part.to_display_string());
        ctx.check_str_len(text.len())?;
    }
    Ok(Value::string(&text))
}

fn string_format(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Format", &args, 1, usize::MAX)?;
    let format = required_str("Format", "format", &args[0])?;
    Ok(Value::string(&format_composite(&format, &args[1..], ctx.limits.max_string_len)?))
}

fn string_is_null_or_empty(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IsNullOrEmpty", &args, 1, 1)?;
    Ok(Value::Bool(to_str("IsNullOrEmpty", &args[0])?.map_or(true, |s| s.is_empty())))
}

fn string_is_null_or_white_space(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IsNullOrWhiteSpace", &args, 1, 1)?;
    Ok(Value::Bool(
        to_str("IsNullOrWhiteSpace", &args[0])?.map_or(true, |s| s.trim().is_empty()),
    ))
}

fn string_to_upper(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToUpper", &args, 0, 0)?;
    Ok(Value::string(&this_str(&this)?.to_uppercase()))
}

fn string_to_lower(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToLower", &args, 0, 0)?;
    Ok(Value::string(&this_str(&this)?.to_lowercase()))
}

fn trim_set(name: &str, args: &[Value]) -> Result<Option<Vec<char>>, ScriptError> {
    if args.is_empty() {
        return Ok(None);
    }
    let mut set = vec![];
    for value in args {
        match value {
            Value::Char(c) => set.push(*c),
            Value::Array(a) => set.extend(a.borrow().items.iter().filter_map(|v| match v {
                Value::Char(c) => Some(*c),
                _ => None,
            })),
            other => {
                return Err(ScriptError::binder(format!(
                    "The best overloaded method match for 'string.{}' has some invalid arguments: cannot convert from '{}' to 'char'",
                    name,
                    other.friendly_type_name()
                )))
            }
        }
    }
    Ok(Some(set))
}

fn string_trim(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let s = this_str(&this)?;
    Ok(Value::string(match trim_set("Trim", &args)? {
        Some(set) => s.trim_matches(set.as_slice()),
        None => s.trim(),
    }))
}

fn string_trim_start(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let s = this_str(&this)?;
    Ok(Value::string(match trim_set("TrimStart", &args)? {
        Some(set) => s.trim_start_matches(set.as_slice()),
        None => s.trim_start(),
    }))
}

fn string_trim_end(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let s = this_str(&this)?;
    Ok(Value::string(match trim_set("TrimEnd", &args)? {
        Some(set) => s.trim_end_matches(set.as_slice()),
        None => s.trim_end(),
    }))
}

/// Needle argument: a string, or a char rendered as a one-char string.
fn needle(name: &str, value: &Value) -> Result<String, ScriptError> {
    match value {
        Value::Char(c) => Ok(c.to_string()),
        other => required_str(name, "value", other),
    }
}

fn string_contains(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Contains", &args, 1, 1)?;
    Ok(Value::Bool(this_str(&this)?.contains(needle("Contains", &args[0])?.as_str())))
}

fn string_starts_with(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("StartsWith", &args, 1, 1)?;
    Ok(Value::Bool(this_str(&this)?.starts_with(needle("StartsWith", &args[0])?.as_str())))
}

fn string_ends_with(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("EndsWith", &args, 1, 1)?;
    Ok(Value::Bool(this_str(&this)?.ends_with(needle("EndsWith", &args[0])?.as_str())))
}

fn string_index_of(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IndexOf", &args, 1, 2)?;
    let haystack = chars_of(&this_str(&this)?);
    let needle = chars_of(&needle("IndexOf", &args[0])?);
    let start = match args.get(1) {
        Some(v) => to_int("IndexOf", v)?,
        None => 0,
    };
    if start < 0 || start as usize > haystack.len() {
        return Err(ScriptError::argument_out_of_range("startIndex"));
    }
    let start = start as usize;
    if needle.is_empty() {
        return Ok(Value::Int(start as i32));
    }
    let found = (start..haystack.len())
        .find(|i| haystack[*i..].starts_with(&needle))
        .map_or(-1, |i| i as i32);
    Ok(Value::Int(found))
}

fn string_substring(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Substring", &args, 1, 2)?;
    let chars = chars_of(&this_str(&this)?);
    let start = to_int("Substring", &args[0])?;
    if start < 0 || start as usize > chars.len() {
        return Err(ScriptError::argument_out_of_range("startIndex"));
    }
    let start = start as usize;
    let length = match args.get(1) {
        Some(v) => {
            let length = to_int("Substring", v)?;
            if length < 0 || start + length as usize > chars.len() {
                return Err(ScriptError::argument_out_of_range("length"));
            }
            length as usize
        }
        None => chars.len() - start,
    };
    Ok(Value::string(&chars[start..start + length].iter().collect::<String>()))
}

fn string_replace(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Replace", &args, 2, 2)?;
    let s = this_str(&this)?;
    let from = needle("Replace", &args[0])?;
    if from.is_empty() {
        return Err(ScriptError::argument(
            "String cannot be of zero length. (Parameter 'oldValue')",
        ));
    }
    let to = match &args[1] {
        Value::Null => String::new(),
        other => needle("Replace", other)?,
    };
    let replaced = s.replace(from.as_str(), &to);
    ctx.check_str_len(replaced.len())?;
    Ok(Value::string(&replaced))
}

fn string_split(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let s = this_str(&this)?;
    let parts: Vec<Value> = match args.first() {
        None => s.split(char::is_whitespace).map(Value::string).collect(),
        Some(Value::Char(c)) => s.split(*c).map(Value::string).collect(),
        Some(Value::String(sep)) if !sep.is_empty() => {
            s.split(sep.as_ref()).map(Value::string).collect()
        }
        Some(Value::String(_)) => vec![Value::String(s.clone())],
        Some(other) => {
            let set = trim_set("Split", std::slice::from_ref(other))?.unwrap_or_default();
            s.split(set.as_slice()).map(Value::string).collect()
        }
    };
    Ok(Value::new_array(TypeDesc::of(TypeKind::String), parts))
}

fn pad(ctx: &mut EvalContext, this: Value, args: Vec<Value>, left: bool) -> Result<Value, ScriptError> {
    let name = if left { "PadLeft" } else { "PadRight" };
    arg_count(name, &args, 1, 2)?;
    let s = this_str(&this)?;
    let width = to_int(name, &args[0])?;
    if width < 0 {
        return Err(ScriptError::argument_out_of_range("totalWidth"));
    }
    ctx.check_str_len(width as usize)?;
    let fill = match args.get(1) {
        Some(Value::Char(c)) => *c,
        Some(other) => {
            return Err(ScriptError::binder(format!(
                "Argument 2: cannot convert from '{}' to 'char'",
                other.friendly_type_name()
            )))
        }
        None => ' ',
    };
    let len = s.chars().count();
    let padding: String = std::iter::repeat(fill)
        .take((width as usize).saturating_sub(len))
        .collect();
    Ok(Value::string(&if left {
        format!("{}{}", padding, s)
    } else {
        format!("{}{}", s, padding)
    }))
}

fn string_pad_left(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    pad(ctx, this, args, true)
}

fn string_pad_right(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    pad(ctx, this, args, false)
}

fn string_to_char_array(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToCharArray", &args, 0, 0)?;
    let chars = this_str(&this)?.chars().map(Value::Char).collect();
    Ok(Value::new_array(TypeDesc::of(TypeKind::Char), chars))
}

fn string_to_string(_ctx: &mut EvalContext, this: Value, _args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::String(this_str(&this)?))
}

// ── Composite formatting ──────────────────────────────────────

/// Expands `{index[,alignment][:format]}` holes; `{{` and `}}` escape braces.
/// Output longer than `max_len` bytes fails with `OutOfMemoryException`.
pub fn format_composite(format: &str, args: &[Value], max_len: usize) -> Result<String, ScriptError> {
    let invalid = || ScriptError::format("Input string was not in a correct format.");
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(invalid()),
            '{' => {
                let mut hole = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => hole.push(ch),
                        None => return Err(invalid()),
                    }
                }
                let (head, spec) = match hole.split_once(':') {
                    Some((h, s)) => (h, s),
                    None => (hole.as_str(), ""),
                };
                let (index, alignment) = match head.split_once(',') {
                    Some((i, a)) => (i, Some(a)),
                    None => (head, None),
                };
                let index: usize = index.trim().parse().map_err(|_| invalid())?;
                let value = args.get(index).ok_or_else(|| {
                    ScriptError::format(
                        "Index (zero based) must be greater than or equal to zero and less than the size of the argument list.",
                    )
                })?;
                let text = format_value(value, spec)?;
                let width: i64 = match alignment {
                    Some(a) => a.trim().parse().map_err(|_| invalid())?,
                    None => 0,
                };
                let len = text.chars().count() as i64;
                let fill_len = (width.saturating_abs() - len).max(0) as usize;
                if out.len() + text.len() + fill_len > max_len {
                    return Err(ScriptError::out_of_memory("string"));
                }
                let fill = " ".repeat(fill_len);
                if width >= 0 {
                    out.push_str(&fill);
                    out.push_str(&text);
                } else {
                    out.push_str(&text);
                    out.push_str(&fill);
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// First argument of a formatting call: composite when more arguments follow.
pub fn render_arguments(args: &[Value], max_len: usize) -> Result<String, ScriptError> {
    match args {
        [] => Ok(String::new()),
        [single] => Ok(single.to_display_string()),
        [Value::String(format), rest @ ..] => format_composite(format, rest, max_len),
        _ => Ok(arg(args, 0).to_display_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_format_handles_alignment_and_escapes() {
        let args = [Value::Int(42), Value::string("x")];
        assert_eq!(format_composite("{0,5}|{1,-3}|{{}}", &args, 64).unwrap(), "   42|x  |{}");
        assert_eq!(format_composite("{0:X}", &args, 64).unwrap(), "2A");
        assert!(format_composite("{2}", &args, 64).is_err());
        assert!(format_composite("{0", &args, 64).is_err());
    }

    #[test]
    fn composite_format_alignment_is_capped() {
        let err = format_composite("{0,2000000000}", &[Value::Int(1)], 1024).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OutOfMemoryException);
    }

    #[test]
    fn concat_respects_string_cap() {
        let mut ctx = EvalContext::default();
        ctx.limits.max_string_len = 8;
        let parts = vec![Value::string("abcd"), Value::string("efgh")];
        assert!(string_concat(&mut ctx, Value::Null, parts.clone()).is_ok());
        let mut more = parts;
        more.push(Value::string("i"));
        let err = string_concat(&mut ctx, Value::Null, more).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OutOfMemoryException);
    }
}
