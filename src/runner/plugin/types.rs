//! Core types for native built-ins.

use std::collections::HashMap;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;

/// Request-scoped console output buffer. Output beyond `limit` bytes is
/// dropped and the sink remembers that it was truncated.
#[derive(Debug)]
pub struct ConsoleSink {
    buffer: String,
    limit: usize,
    truncated: bool,
}

impl ConsoleSink {
    pub fn new(limit: usize) -> Self {
        ConsoleSink {
            buffer: String::new(),
            limit,
            truncated: false,
        }
    }

    pub fn write(&mut self, text: &str) {
        let room = self.limit.saturating_sub(self.buffer.len());
        if text.len() <= room {
            self.buffer.push_str(text);
            return;
        }
        let mut cut = room;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        self.buffer.push_str(&text[..cut]);
        self.truncated = true;
    }

    pub fn contents(&self) -> &str {
        &self.buffer
    }

    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Resource caps enforced while a script runs.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_call_depth: usize,
    pub max_collection_len: usize,
    /// Longest string a script may build, in UTF-8 bytes.
    pub max_string_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_call_depth: 1000,
            max_collection_len: 4_000_000,
            max_string_len: 4_000_000,
        }
    }
}

/// Execution context passed to native functions.
pub struct EvalContext {
    pub console: ConsoleSink,
    pub limits: Limits,
}

impl EvalContext {
    pub fn new(console_limit: usize, limits: Limits) -> Self {
        EvalContext {
            console: ConsoleSink::new(console_limit),
            limits,
        }
    }

    /// Fails with `OutOfMemoryException` when a collection would exceed the cap.
    pub fn check_len(&self, len: usize, what: &str) -> Result<(), ScriptError> {
        if len > self.limits.max_collection_len {
            Err(ScriptError::out_of_memory(what))
        } else {
            Ok(())
        }
    }

    /// Fails with `OutOfMemoryException` when a string would exceed the cap.
    pub fn check_str_len(&self, len: usize) -> Result<(), ScriptError> {
        if len > self.limits.max_string_len {
            Err(ScriptError::out_of_memory("string"))
        } else {
            Ok(())
        }
    }

    /// Materializes an enumerable, refusing lazy sequences over the cap.
    pub fn items(&self, value: &Value) -> Result<Vec<Value>, ScriptError> {
        if let Value::Sequence(sequence) = value {
            self.check_len(sequence.len(), "sequence")?;
        }
        items_of(value)
    }
}

impl Default for EvalContext {
    fn default() -> Self {
        EvalContext::new(1024 * 1024, Limits::default())
    }
}

/// Signature of built-in methods: context, receiver (`Null` for statics)
/// and arguments.
pub type NativeFn =
    fn(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError>;

pub type GetterFn = fn(ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError>;

pub type SetterFn =
    fn(ctx: &mut EvalContext, this: Value, value: Value) -> Result<(), ScriptError>;

/// Constructors receive the constructed type so generic arguments are known.
pub type ConstructorFn =
    fn(ctx: &mut EvalContext, target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError>;

/// Native surface of one catalog type.
pub struct BuiltInObject {
    pub name: String,
    pub kind: TypeKind,
    pub methods: HashMap<String, NativeFn>,
    pub properties: HashMap<String, GetterFn>,
    pub instance_methods: HashMap<String, NativeFn>,
    pub instance_properties: HashMap<String, GetterFn>,
    pub instance_setters: HashMap<String, SetterFn>,
    pub constructor: Option<ConstructorFn>,
}

impl BuiltInObject {
    pub fn new(kind: TypeKind) -> Self {
        BuiltInObject {
            name: kind.name().to_string(),
            kind,
            methods: HashMap::new(),
            properties: HashMap::new(),
            instance_methods: HashMap::new(),
            instance_properties: HashMap::new(),
            instance_setters: HashMap::new(),
            constructor: None,
        }
    }

    /// Add a static method.
    pub fn add_method(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        self.methods.insert(name.into(), func);
        self
    }

    /// Add a static property.
    pub fn add_property(mut self, name: impl Into<String>, getter: GetterFn) -> Self {
        self.properties.insert(name.into(), getter);
        self
    }

    pub fn add_instance_method(mut self, name: impl Into<String>, func: NativeFn) -> Self {
        self.instance_methods.insert(name.into(), func);
        self
    }

    pub fn add_instance_property(mut self, name: impl Into<String>, getter: GetterFn) -> Self {
        self.instance_properties.insert(name.into(), getter);
        self
    }

    pub fn add_instance_setter(mut self, name: impl Into<String>, setter: SetterFn) -> Self {
        self.instance_setters.insert(name.into(), setter);
        self
    }

    pub fn with_constructor(mut self, constructor: ConstructorFn) -> Self {
        self.constructor = Some(constructor);
        self
    }
}

// ── Argument helpers ──────────────────────────────────────────

/// Fails unless `args.len()` lies in `min..=max`.
pub fn arg_count(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        return Err(ScriptError::binder(format!(
            "No overload for method '{}' takes {} arguments",
            name,
            args.len()
        )));
    }
    Ok(())
}

pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn argument_error(name: &str, value: &Value, expected: &str) -> ScriptError {
    ScriptError::binder(format!(
        "The best overloaded method match for '{}' has some invalid arguments: cannot convert from '{}' to '{}'",
        name,
        value.friendly_type_name(),
        expected
    ))
}

pub fn to_int(name: &str, value: &Value) -> Result<i32, ScriptError> {
    match value {
        Value::Int(v) => Ok(*v),
        Value::Short(v) => Ok(*v as i32),
        Value::UShort(v) => Ok(*v as i32),
        Value::Byte(v) => Ok(*v as i32),
        Value::SByte(v) => Ok(*v as i32),
        Value::Char(c) => Ok(*c as i32),
        other => Err(argument_error(name, other, "int")),
    }
}

pub fn to_long(name: &str, value: &Value) -> Result<i64, ScriptError> {
    match value {
        Value::Long(v) => Ok(*v),
        Value::UInt(v) => Ok(*v as i64),
        other => to_int(name, other).map(|v| v as i64).map_err(|_| argument_error(name, other, "long")),
    }
}

pub fn to_f64(name: &str, value: &Value) -> Result<f64, ScriptError> {
    match value {
        Value::Double(v) => Ok(*v),
        Value::Float(v) => Ok(*v as f64),
        Value::ULong(v) => Ok(*v as f64),
        Value::Int128(v) => Ok(*v as f64),
        Value::UInt128(v) => Ok(*v as f64),
        Value::Decimal(d) => Ok(d.to_f64()),
        other => to_long(name, other).map(|v| v as f64).map_err(|_| argument_error(name, other, "double")),
    }
}

pub fn to_str(name: &str, value: &Value) -> Result<Option<String>, ScriptError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.to_string())),
        other => Err(argument_error(name, other, "string")),
    }
}

/// Like `to_str` but null is rejected with `ArgumentNullException`.
pub fn required_str(name: &str, param: &str, value: &Value) -> Result<String, ScriptError> {
    to_str(name, value)?.ok_or_else(|| ScriptError::argument_null(param))
}

/// Items of an enumerable value, materialized.
pub fn items_of(value: &Value) -> Result<Vec<Value>, ScriptError> {
    Ok(match value {
        Value::Null => return Err(ScriptError::argument_null("source")),
        Value::Array(a) => a.borrow().items.clone(),
        Value::List(l) => l.borrow().items.clone(),
        Value::Dictionary(d) => {
            let d = d.borrow();
            d.entries
                .iter()
                .map(|(k, v)| {
                    Value::KeyValuePair(std::rc::Rc::new(crate::runner::ds::value::PairData {
                        key: k.clone(),
                        value: v.clone(),
                        key_type: d.key_type.clone(),
                        value_type: d.value_type.clone(),
                    }))
                })
                .collect()
        }
        Value::String(s) => s.chars().map(Value::Char).collect(),
        Value::Sequence(s) => (0..s.len()).map(|i| s.nth(i)).collect(),
        other => {
            return Err(ScriptError::binder(format!(
                "'{}' is not enumerable",
                other.friendly_type_name()
            )))
        }
    })
}

/// Static element type of an enumerable value.
pub fn element_type_of(value: &Value) -> TypeDesc {
    match value {
        Value::Array(a) => a.borrow().element.clone(),
        Value::List(l) => l.borrow().element.clone(),
        Value::Dictionary(d) => {
            let d = d.borrow();
            TypeDesc::Named(
                TypeKind::KeyValuePair,
                vec![d.key_type.clone(), d.value_type.clone()],
            )
        }
        Value::String(_) => TypeDesc::of(TypeKind::Char),
        Value::Sequence(s) => s.element_type(),
        _ => TypeDesc::object(),
    }
}

pub fn is_enumerable(value: &Value) -> bool {
    matches!(
        value,
        Value::Array(_) | Value::List(_) | Value::Dictionary(_) | Value::String(_) | Value::Sequence(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_sink_truncates_at_limit() {
        let mut sink = ConsoleSink::new(5);
        sink.write("abc");
        sink.write("défg");
        assert_eq!(sink.contents(), "abcd");
        assert!(sink.is_truncated());
    }

    #[test]
    fn arg_count_reports_overload_failure() {
        let err = arg_count("Pow", &[Value::Int(1)], 2, 2).unwrap_err();
        assert_eq!(err.kind(), TypeKind::RuntimeBinderException);
        assert!(err.message().contains("takes 1 arguments"));
    }
}
