//! Object built-in.
//!
//! `System.Object` members every value inherits, plus the `ExpandoObject`
//! constructor.

use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::{DictKey, ObjectData, ObjectKind, Value};
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, BuiltInObject, EvalContext};

/// Register the Object built-in with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    let object = BuiltInObject::new(TypeKind::Object)
        .add_instance_method("ToString", object_to_string)
        .add_instance_method("GetType", object_get_type)
        .add_instance_method("Equals", object_equals)
        .add_instance_method("GetHashCode", object_get_hash_code)
        .add_method("ReferenceEquals", object_reference_equals);
    registry.register_object(object);

    let expando = BuiltInObject::new(TypeKind::ExpandoObject).with_constructor(expando_constructor);
    registry.register_object(expando);
}

pub fn new_expando() -> Value {
    Value::Object(Rc::new(RefCell::new(ObjectData {
        kind: ObjectKind::Expando,
        members: vec![],
    })))
}

fn expando_constructor(_ctx: &mut EvalContext, _target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ExpandoObject", &args, 0, 0)?;
    Ok(new_expando())
}

/// Object.ToString
fn object_to_string(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToString", &args, 0, 0)?;
    Ok(Value::string(&this.to_display_string()))
}

fn object_get_type(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetType", &args, 0, 0)?;
    this.type_desc()
        .map(Value::type_value)
        .ok_or_else(ScriptError::null_reference)
}

fn object_equals(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Equals", &args, 1, 1)?;
    Ok(Value::Bool(this.equals(&args[0])))
}

fn object_reference_equals(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ReferenceEquals", &args, 2, 2)?;
    let same = match (&args[0], &args[1]) {
        (Value::Null, Value::Null) => true,
        (a, b) => matches!((a.reference_id(), b.reference_id()), (Some(x), Some(y)) if x == y),
    };
    Ok(Value::Bool(same))
}

fn object_get_hash_code(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetHashCode", &args, 0, 0)?;
    let mut hasher = DefaultHasher::new();
    match (this.reference_id(), DictKey::from_value(&this)) {
        (Some(id), _) => id.hash(&mut hasher),
        (None, Ok(key)) => key.hash(&mut hasher),
        (None, Err(_)) => this.to_display_string().hash(&mut hasher),
    }
    Ok(Value::Int(hasher.finish() as i32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_hash_codes() {
        let mut ctx = EvalContext::default();
        let a = object_get_hash_code(&mut ctx, Value::string("abc"), vec![]).unwrap();
        let b = object_get_hash_code(&mut ctx, Value::string("abc"), vec![]).unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn get_type_of_null_throws() {
        let mut ctx = EvalContext::default();
        let err = object_get_type(&mut ctx, Value::Null, vec![]).unwrap_err();
        assert_eq!(err.kind(), TypeKind::NullReferenceException);
    }
}
