//! Exception types.
//!
//! Every catalog exception gets a constructor accepting `()`, `(message)` and
//! `(message, inner)`. The argument exceptions follow their own overloads,
//! where the first string is a parameter name.

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind, ALL_TYPES};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, to_str, BuiltInObject, EvalContext};

/// Register all exception types with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    // Base Exception carries the shared instance surface
    let exception = BuiltInObject::new(TypeKind::Exception)
        .with_constructor(exception_constructor)
        .add_instance_property("Message", exception_message)
        .add_instance_property("HResult", exception_hresult)
        .add_instance_property("StackTrace", exception_null_member)
        .add_instance_property("InnerException", exception_null_member)
        .add_instance_property("Source", exception_null_member);
    registry.register_object(exception);

    for kind in ALL_TYPES.iter().filter(|k| k.is_exception() && **k != TypeKind::Exception) {
        registry.register_object(BuiltInObject::new(*kind).with_constructor(exception_constructor));
    }
}

fn exception_constructor(_ctx: &mut EvalContext, target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    let kind = target.kind().unwrap_or(TypeKind::Exception);
    arg_count(kind.name(), &args, 0, 2)?;
    let first = match args.first() {
        Some(v) => to_str(kind.name(), v)?,
        None => None,
    };
    let message = match kind {
        TypeKind::ArgumentNullException | TypeKind::ArgumentOutOfRangeException => {
            let second = match args.get(1) {
                Some(v) => to_str(kind.name(), v)?,
                None => None,
            };
            let base = second.unwrap_or_else(|| kind.default_message());
            match first {
                Some(param) => format!("{} (Parameter '{}')", base, param),
                None => base,
            }
        }
        TypeKind::ArgumentException => {
            let param = match args.get(1) {
                Some(Value::String(s)) => Some(s.to_string()),
                _ => None,
            };
            let base = first.unwrap_or_else(|| kind.default_message());
            match param {
                Some(param) => format!("{} (Parameter '{}')", base, param),
                None => base,
            }
        }
        // The optional second argument is the inner exception; it is not retained.
        _ => first.unwrap_or_else(|| kind.default_message()),
    };
    Ok(Value::new_exception(kind, message))
}

fn exception_message(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    match this {
        Value::Exception(e) => Ok(Value::string(&e.message)),
        _ => Err(ScriptError::null_reference()),
    }
}

fn exception_hresult(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    match this {
        Value::Exception(e) => Ok(Value::Int(e.kind.hresult())),
        _ => Err(ScriptError::null_reference()),
    }
}

fn exception_null_member(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn construct(kind: TypeKind, args: Vec<Value>) -> String {
        let mut ctx = EvalContext::default();
        match exception_constructor(&mut ctx, &TypeDesc::of(kind), args).unwrap() {
            Value::Exception(e) => e.message.clone(),
            other => panic!("not an exception: {:?}", other),
        }
    }

    #[test]
    fn message_overloads() {
        assert_eq!(construct(TypeKind::Exception, vec![Value::string("boom")]), "boom");
        assert_eq!(
            construct(TypeKind::DivideByZeroException, vec![]),
            "Attempted to divide by zero."
        );
        assert_eq!(
            construct(TypeKind::ArgumentNullException, vec![Value::string("x")]),
            "Value cannot be null. (Parameter 'x')"
        );
        assert_eq!(
            construct(
                TypeKind::ArgumentException,
                vec![Value::string("bad"), Value::string("y")]
            ),
            "bad (Parameter 'y')"
        );
        let inner = Value::new_exception(TypeKind::Exception, "inner".into());
        assert_eq!(
            construct(TypeKind::InvalidOperationException, vec![Value::string("outer"), inner]),
            "outer"
        );
    }
}
