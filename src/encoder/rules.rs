//! The ordered rule chain that turns script values into JSON.
//!
//! Each value is matched against [`RULE_CHAIN`] in order and encoded by the
//! first rule that applies. [`Rule::Structural`] applies to everything, so
//! selection always succeeds.

use std::collections::HashSet;

use serde_json::{Map, Number, Value as Json};

use crate::runner::ds::array::ArrayData;
use crate::runner::ds::types::TypeKind;
use crate::runner::ds::value::{format_single, Value};

use super::{EncodeError, EncoderLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// null, bool, char, integers up to 64 bits, floats and strings.
    Primitive,
    /// `Int128`, `UInt128` and `decimal`.
    NumberLike,
    /// Reflection handles and encodings, written as their names.
    Handle,
    Directory,
    /// `byte[]` and `List<byte>`, written as integer arrays.
    ByteSequence,
    /// Arrays of rank two or more, written as nested arrays.
    MultiDimensional,
    /// Sequences, dictionaries, objects, pairs and exceptions.
    Structural,
}

pub const RULE_CHAIN: [Rule; 7] = [
    Rule::Primitive,
    Rule::NumberLike,
    Rule::Handle,
    Rule::Directory,
    Rule::ByteSequence,
    Rule::MultiDimensional,
    Rule::Structural,
];

impl Rule {
    pub fn applies(self, value: &Value) -> bool {
        match self {
            Rule::Primitive => matches!(
                value,
                Value::Null
                    | Value::Bool(_)
                    | Value::Char(_)
                    | Value::Byte(_)
                    | Value::SByte(_)
                    | Value::Short(_)
                    | Value::UShort(_)
                    | Value::Int(_)
                    | Value::UInt(_)
                    | Value::Long(_)
                    | Value::ULong(_)
                    | Value::Float(_)
                    | Value::Double(_)
                    | Value::String(_)
            ),
            Rule::NumberLike => matches!(value, Value::Int128(_) | Value::UInt128(_) | Value::Decimal(_)),
            Rule::Handle => matches!(
                value,
                Value::Type(_) | Value::Assembly(_) | Value::Module(_) | Value::TypeHandle(_) | Value::Utf8Encoding
            ),
            Rule::Directory => matches!(value, Value::Directory(_)),
            Rule::ByteSequence => match value {
                Value::Array(a) => a.borrow().is_byte_vector(),
                Value::List(l) => l.borrow().element.is(TypeKind::Byte),
                _ => false,
            },
            Rule::MultiDimensional => match value {
                Value::Array(a) => a.borrow().rank() >= 2,
                _ => false,
            },
            Rule::Structural => true,
        }
    }
}

pub fn select_rule(value: &Value) -> Rule {
    RULE_CHAIN
        .iter()
        .copied()
        .find(|rule| rule.applies(value))
        .unwrap_or(Rule::Structural)
}

fn float(v: f64) -> Json {
    match Number::from_f64(v) {
        Some(n) => Json::Number(n),
        None if v.is_nan() => Json::String("NaN".to_string()),
        None if v > 0.0 => Json::String("Infinity".to_string()),
        None => Json::String("-Infinity".to_string()),
    }
}

/// Walks one value graph. References currently being encoded are tracked
/// so cycles are cut instead of followed.
pub struct Encoder {
    limits: EncoderLimits,
    nodes: usize,
    path: HashSet<usize>,
}

impl Encoder {
    pub fn new(limits: EncoderLimits) -> Self {
        Encoder {
            limits,
            nodes: 0,
            path: HashSet::new(),
        }
    }

    pub fn encode(&mut self, value: &Value) -> Result<Json, EncodeError> {
        self.encode_at(value, 0)
    }

    fn on_path(&self, value: &Value) -> bool {
        value.reference_id().map_or(false, |id| self.path.contains(&id))
    }

    fn encode_at(&mut self, value: &Value, depth: usize) -> Result<Json, EncodeError> {
        self.nodes += 1;
        if self.nodes > self.limits.max_nodes {
            return Err(EncodeError::TooManyNodes(self.limits.max_nodes));
        }
        if depth > self.limits.max_depth {
            return Err(EncodeError::TooDeep(self.limits.max_depth));
        }
        match select_rule(value) {
            Rule::Primitive => Ok(Self::primitive(value)),
            Rule::NumberLike => Ok(Self::number_like(value)),
            Rule::Handle => Ok(Self::handle(value)),
            Rule::Directory => Ok(match value {
                Value::Directory(d) => Json::String(d.full_name.clone()),
                _ => Json::Null,
            }),
            Rule::ByteSequence => self.byte_sequence(value, depth),
            Rule::MultiDimensional => self.with_reference(value, |encoder| match value {
                Value::Array(a) => {
                    let data = a.borrow();
                    let mut cursor = Vec::with_capacity(data.rank());
                    encoder.dimension(&data, &mut cursor, depth)
                }
                _ => Ok(Json::Null),
            }),
            Rule::Structural => self.with_reference(value, |encoder| encoder.structural(value, depth)),
        }
    }

    /// Runs `f` with `value` marked as being on the current path.
    fn with_reference<F>(&mut self, value: &Value, f: F) -> Result<Json, EncodeError>
    where
        F: FnOnce(&mut Self) -> Result<Json, EncodeError>,
    {
        let id = value.reference_id();
        if let Some(id) = id {
            self.path.insert(id);
        }
        let result = f(self);
        if let Some(id) = id {
            self.path.remove(&id);
        }
        result
    }

    fn primitive(value: &Value) -> Json {
        match value {
            Value::Bool(b) => Json::Bool(*b),
            Value::Char(c) => Json::String(c.to_string()),
            Value::Byte(v) => Json::from(*v),
            Value::SByte(v) => Json::from(*v),
            Value::Short(v) => Json::from(*v),
            Value::UShort(v) => Json::from(*v),
            Value::Int(v) => Json::from(*v),
            Value::UInt(v) => Json::from(*v),
            Value::Long(v) => Json::from(*v),
            Value::ULong(v) => Json::from(*v),
            Value::Float(v) if v.is_finite() => float(format_single(*v).parse().unwrap_or(*v as f64)),
            Value::Float(v) => float(*v as f64),
            Value::Double(v) => float(*v),
            Value::String(s) => Json::String(s.to_string()),
            _ => Json::Null,
        }
    }

    /// Integral values become JSON integers when they fit the 64-bit range of
    /// their signedness: `Int128` and `decimal` must fit `i64`, `UInt128` must
    /// fit `u64`. Anything else, including a signed value above `i64::MAX`,
    /// is written as invariant text so it is never truncated.
    fn number_like(value: &Value) -> Json {
        match value {
            Value::Int128(v) => i64::try_from(*v)
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(v.to_string())),
            Value::UInt128(v) => u64::try_from(*v)
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(v.to_string())),
            Value::Decimal(d) if d.is_integer() => i64::try_from(d.trunc_i128())
                .map(Json::from)
                .unwrap_or_else(|_| Json::String(d.to_string())),
            Value::Decimal(d) => Json::String(d.to_string()),
            _ => Json::Null,
        }
    }

    fn handle(value: &Value) -> Json {
        let name = match value {
            Value::Type(desc) | Value::TypeHandle(desc) => desc.full_name(),
            Value::Assembly(library) => library.display_name(),
            Value::Module(library) => library.module_path(),
            Value::Utf8Encoding => "System.Text.UTF8Encoding".to_string(),
            _ => return Json::Null,
        };
        Json::String(name)
    }

    /// Bytes take the generic integer-sequence path.
    fn byte_sequence(&mut self, value: &Value, depth: usize) -> Result<Json, EncodeError> {
        let bytes: Vec<Value> = match value {
            Value::Array(a) => a.borrow().items.clone(),
            Value::List(l) => l.borrow().items.clone(),
            _ => vec![],
        };
        let mut out = Vec::with_capacity(bytes.len());
        for byte in &bytes {
            out.push(self.encode_at(byte, depth + 1)?);
        }
        Ok(Json::Array(out))
    }

    /// Encodes the slice of a multi-dimensional array selected by `cursor`,
    /// walking each rank from its lower to its upper bound.
    fn dimension(&mut self, data: &ArrayData, cursor: &mut Vec<i64>, depth: usize) -> Result<Json, EncodeError> {
        let rank = cursor.len();
        let mut out = vec![];
        for index in data.lower_bound(rank)..=data.upper_bound(rank) {
            cursor.push(index);
            let item = if rank + 1 == data.rank() {
                let element = data
                    .get(cursor)
                    .map_err(|e| EncodeError::NotSupported(e.message().to_string()))?;
                self.element(&element, depth + 1)?
            } else {
                self.dimension(data, cursor, depth + 1)?
            };
            cursor.pop();
            out.push(item);
        }
        Ok(Json::Array(out))
    }

    /// A sequence slot: back-references become `null`.
    fn element(&mut self, item: &Value, depth: usize) -> Result<Json, EncodeError> {
        if self.on_path(item) {
            return Ok(Json::Null);
        }
        self.encode_at(item, depth)
    }

    fn sequence<I>(&mut self, items: I, depth: usize) -> Result<Json, EncodeError>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut out = vec![];
        for item in items {
            out.push(self.element(&item, depth + 1)?);
        }
        Ok(Json::Array(out))
    }

    fn structural(&mut self, value: &Value, depth: usize) -> Result<Json, EncodeError> {
        match value {
            Value::Array(a) => {
                let items = a.borrow().items.clone();
                self.sequence(items, depth)
            }
            Value::List(l) => {
                let items = l.borrow().items.clone();
                self.sequence(items, depth)
            }
            Value::Sequence(s) => self.sequence((0..s.len()).map(|i| s.nth(i)), depth),
            Value::Dictionary(d) => {
                let entries = d.borrow().entries.clone();
                let mut map = Map::new();
                for (key, item) in entries {
                    let key = dictionary_key(&key)?;
                    if self.on_path(&item) {
                        continue;
                    }
                    let encoded = self.encode_at(&item, depth + 1)?;
                    map.insert(key, encoded);
                }
                Ok(Json::Object(map))
            }
            Value::Object(o) => {
                let members = o.borrow().members.clone();
                let mut map = Map::new();
                for (name, item) in members {
                    if self.on_path(&item) {
                        continue;
                    }
                    let encoded = self.encode_at(&item, depth + 1)?;
                    map.insert(name, encoded);
                }
                Ok(Json::Object(map))
            }
            Value::KeyValuePair(pair) => {
                let mut map = Map::new();
                for (name, item) in [("key", &pair.key), ("value", &pair.value)] {
                    if self.on_path(item) {
                        continue;
                    }
                    let encoded = self.encode_at(item, depth + 1)?;
                    map.insert(name.to_string(), encoded);
                }
                Ok(Json::Object(map))
            }
            Value::Exception(e) => {
                let mut map = Map::new();
                map.insert("message".into(), Json::String(e.message.clone()));
                map.insert("data".into(), Json::Object(Map::new()));
                map.insert("innerException".into(), Json::Null);
                map.insert("helpLink".into(), Json::Null);
                map.insert("source".into(), Json::Null);
                map.insert("hResult".into(), Json::from(e.kind.hresult()));
                map.insert("stackTrace".into(), Json::Null);
                Ok(Json::Object(map))
            }
            Value::Iterator(_) => Ok(Json::Object(Map::new())),
            other => Err(EncodeError::NotSupported(format!(
                "Serialization of '{}' instances is not supported.",
                other.type_name()
            ))),
        }
    }
}

/// Dictionary keys must have a textual form.
fn dictionary_key(key: &Value) -> Result<String, EncodeError> {
    match key {
        Value::String(s) => Ok(s.to_string()),
        Value::Char(c) => Ok(c.to_string()),
        Value::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
        Value::Byte(_)
        | Value::SByte(_)
        | Value::Short(_)
        | Value::UShort(_)
        | Value::Int(_)
        | Value::UInt(_)
        | Value::Long(_)
        | Value::ULong(_)
        | Value::Int128(_)
        | Value::UInt128(_)
        | Value::Float(_)
        | Value::Double(_)
        | Value::Decimal(_) => Ok(key.to_display_string()),
        other => Err(EncodeError::NotSupported(format!(
            "The type '{}' is not a supported dictionary key type.",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ds::decimal::Decimal;
    use crate::runner::ds::types::TypeDesc;

    fn encode(value: &Value) -> Result<Json, EncodeError> {
        Encoder::new(EncoderLimits::default()).encode(value)
    }

    #[test]
    fn rules_are_selected_in_order() {
        assert_eq!(select_rule(&Value::Int(1)), Rule::Primitive);
        assert_eq!(select_rule(&Value::Int128(1)), Rule::NumberLike);
        let bytes = Value::new_array(TypeDesc::of(TypeKind::Byte), vec![Value::Byte(1)]);
        assert_eq!(select_rule(&bytes), Rule::ByteSequence);
        let ints = Value::new_array(TypeDesc::of(TypeKind::Int32), vec![]);
        assert_eq!(select_rule(&ints), Rule::Structural);
    }

    #[test]
    fn non_finite_doubles_are_strings() {
        assert_eq!(encode(&Value::Double(f64::NAN)).unwrap(), Json::String("NaN".into()));
        assert_eq!(encode(&Value::Double(f64::NEG_INFINITY)).unwrap(), Json::String("-Infinity".into()));
        assert_eq!(encode(&Value::Float(0.1)).unwrap().to_string(), "0.1");
    }

    #[test]
    fn wide_numbers_fall_back_to_strings() {
        assert_eq!(encode(&Value::Int128(1 << 63)).unwrap(), Json::String("9223372036854775808".into()));
        assert_eq!(encode(&Value::UInt128(1 << 63)).unwrap(), Json::from(1u64 << 63));
        let d = Decimal::parse("12.50").unwrap();
        assert_eq!(encode(&Value::Decimal(d)).unwrap(), Json::String("12.50".into()));
    }

    #[test]
    fn unsupported_dictionary_keys_fail() {
        let key = Value::new_list(TypeDesc::of(TypeKind::Int32), vec![]);
        assert!(matches!(dictionary_key(&key), Err(EncodeError::NotSupported(_))));
    }

    #[test]
    fn node_limit_is_enforced() {
        let items = (0..20).map(Value::Int).collect();
        let list = Value::new_list(TypeDesc::of(TypeKind::Int32), items);
        let limits = EncoderLimits {
            max_depth: 256,
            max_nodes: 10,
        };
        let err = Encoder::new(limits).encode(&list).unwrap_err();
        assert!(matches!(err, EncodeError::TooManyNodes(10)));
    }
}
