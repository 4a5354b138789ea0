//! `Encoding.UTF8` and `SHA256.HashData`.

use sha2::{Digest, Sha256};

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, required_str, BuiltInObject, EvalContext};

pub fn register(registry: &mut BuiltInRegistry) {
    let encoding = BuiltInObject::new(TypeKind::Encoding)
        .add_property("UTF8", encoding_utf8)
        .add_instance_method("GetBytes", encoding_get_bytes)
        .add_instance_method("GetString", encoding_get_string)
        .add_instance_property("WebName", encoding_web_name);
    registry.register_object(encoding);

    let sha = BuiltInObject::new(TypeKind::Sha256).add_method("HashData", sha256_hash_data);
    registry.register_object(sha);
}

/// Raw bytes of a `byte[]` or `List<byte>` argument.
pub fn bytes_of(name: &str, value: &Value) -> Result<Vec<u8>, ScriptError> {
    let items = match value {
        Value::Null => return Err(ScriptError::argument_null("source")),
        Value::Array(a) if a.borrow().is_byte_vector() => a.borrow().items.clone(),
        Value::List(l) if l.borrow().element.is(TypeKind::Byte) => l.borrow().items.clone(),
        other => {
            return Err(ScriptError::binder(format!(
                "The best overloaded method match for '{}' has some invalid arguments: cannot convert from '{}' to 'byte[]'",
                name,
                other.friendly_type_name()
            )))
        }
    };
    Ok(items
        .iter()
        .map(|v| match v {
            Value::Byte(b) => *b,
            _ => 0,
        })
        .collect())
}

fn byte_array(bytes: &[u8]) -> Value {
    Value::new_array(
        TypeDesc::of(TypeKind::Byte),
        bytes.iter().map(|b| Value::Byte(*b)).collect(),
    )
}

fn encoding_utf8(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Utf8Encoding)
}

fn encoding_web_name(_ctx: &mut EvalContext, _this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string("utf-8"))
}

fn encoding_get_bytes(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetBytes", &args, 1, 1)?;
    let text = required_str("GetBytes", "s", &args[0])?;
    ctx.check_len(text.len(), "byte[]")?;
    Ok(byte_array(text.as_bytes()))
}

fn encoding_get_string(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetString", &args, 1, 1)?;
    let bytes = bytes_of("GetString", &args[0])?;
    Ok(Value::string(&String::from_utf8_lossy(&bytes)))
}

fn sha256_hash_data(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("HashData", &args, 1, 1)?;
    let bytes = bytes_of("HashData", &args[0])?;
    let digest = Sha256::digest(&bytes);
    Ok(byte_array(digest.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_of_utf8_bytes() {
        let mut ctx = EvalContext::default();
        let bytes = encoding_get_bytes(&mut ctx, Value::Utf8Encoding, vec![Value::string("abc")]).unwrap();
        let hash = sha256_hash_data(&mut ctx, Value::Null, vec![bytes]).unwrap();
        let raw = bytes_of("test", &hash).unwrap();
        let hex: String = raw.iter().map(|b| format!("{:02x}", b)).collect();
        assert_eq!(
            hex,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn non_byte_input_is_rejected() {
        let ints = Value::new_array(TypeDesc::of(TypeKind::Int32), vec![Value::Int(1)]);
        let err = bytes_of("HashData", &ints).unwrap_err();
        assert_eq!(err.kind(), TypeKind::RuntimeBinderException);
    }
}
