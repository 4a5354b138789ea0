use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::array::ArrayData;
use super::decimal::Decimal;
use super::error::{ExceptionData, ScriptError};
use super::types::{Library, TypeDesc, TypeKind};

pub type ArrayRef = Rc<RefCell<ArrayData>>;
pub type ListRef = Rc<RefCell<ListData>>;
pub type DictRef = Rc<RefCell<DictData>>;
pub type ObjectRef = Rc<RefCell<ObjectData>>;

/// A script value. Reference types share state through `Rc`.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    Byte(u8),
    SByte(i8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Int128(i128),
    UInt128(u128),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(Rc<str>),
    Array(ArrayRef),
    List(ListRef),
    Dictionary(DictRef),
    Object(ObjectRef),
    KeyValuePair(Rc<PairData>),
    Exception(Rc<ExceptionData>),
    Sequence(Rc<SequenceData>),
    Directory(Rc<DirectoryData>),
    Type(Rc<TypeDesc>),
    Assembly(Library),
    Module(Library),
    TypeHandle(Rc<TypeDesc>),
    Utf8Encoding,
    Iterator(Rc<RefCell<IteratorState>>),
}

#[derive(Debug)]
pub struct ListData {
    pub element: TypeDesc,
    pub items: Vec<Value>,
    /// Bumped on every mutation so live enumerators can detect it.
    pub version: u64,
}

impl ListData {
    pub fn new(element: TypeDesc, items: Vec<Value>) -> Self {
        ListData {
            element,
            items,
            version: 0,
        }
    }

    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::list_of(self.element.clone())
    }
}

/// Hashable identity of a dictionary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DictKey {
    Bool(bool),
    Char(char),
    Integer(TypeKind, i128),
    UInt128(u128),
    Float(TypeKind, u64),
    Decimal(Decimal),
    String(Rc<str>),
    Type(String),
    Reference(usize),
}

impl DictKey {
    pub fn from_value(value: &Value) -> Result<DictKey, ScriptError> {
        Ok(match value {
            Value::Null => return Err(ScriptError::argument_null("key")),
            Value::Bool(b) => DictKey::Bool(*b),
            Value::Char(c) => DictKey::Char(*c),
            Value::Byte(v) => DictKey::Integer(TypeKind::Byte, *v as i128),
            Value::SByte(v) => DictKey::Integer(TypeKind::SByte, *v as i128),
            Value::Short(v) => DictKey::Integer(TypeKind::Int16, *v as i128),
            Value::UShort(v) => DictKey::Integer(TypeKind::UInt16, *v as i128),
            Value::Int(v) => DictKey::Integer(TypeKind::Int32, *v as i128),
            Value::UInt(v) => DictKey::Integer(TypeKind::UInt32, *v as i128),
            Value::Long(v) => DictKey::Integer(TypeKind::Int64, *v as i128),
            Value::ULong(v) => DictKey::Integer(TypeKind::UInt64, *v as i128),
            Value::Int128(v) => DictKey::Integer(TypeKind::Int128, *v),
            Value::UInt128(v) => DictKey::UInt128(*v),
            Value::Float(v) => DictKey::Float(TypeKind::Single, (*v as f64).to_bits()),
            Value::Double(v) => DictKey::Float(TypeKind::Double, v.to_bits()),
            Value::Decimal(d) => DictKey::Decimal(*d),
            Value::String(s) => DictKey::String(s.clone()),
            Value::Type(t) => DictKey::Type(t.full_name()),
            other => DictKey::Reference(other.reference_id().unwrap_or(0)),
        })
    }
}

#[derive(Debug)]
pub struct DictData {
    pub key_type: TypeDesc,
    pub value_type: TypeDesc,
    /// Insertion-ordered entries.
    pub entries: Vec<(Value, Value)>,
    pub index: HashMap<DictKey, usize>,
    pub version: u64,
}

impl DictData {
    pub fn new(key_type: TypeDesc, value_type: TypeDesc) -> Self {
        DictData {
            key_type,
            value_type,
            entries: Vec::new(),
            index: HashMap::new(),
            version: 0,
        }
    }

    pub fn type_desc(&self) -> TypeDesc {
        TypeDesc::Named(
            TypeKind::Dictionary,
            vec![self.key_type.clone(), self.value_type.clone()],
        )
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, ScriptError> {
        let k = DictKey::from_value(key)?;
        Ok(self.index.get(&k).map(|i| self.entries[*i].1.clone()))
    }

    /// Inserts or replaces; `overwrite == false` rejects an existing key.
    pub fn insert(&mut self, key: Value, value: Value, overwrite: bool) -> Result<(), ScriptError> {
        let k = DictKey::from_value(&key)?;
        match self.index.get(&k) {
            Some(i) if overwrite => self.entries[*i].1 = value,
            Some(_) => {
                return Err(ScriptError::argument(format!(
                    "An item with the same key has already been added. Key: {}",
                    key.to_display_string()
                )))
            }
            None => {
                self.index.insert(k, self.entries.len());
                self.entries.push((key, value));
            }
        }
        self.version += 1;
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<bool, ScriptError> {
        let k = DictKey::from_value(key)?;
        let Some(position) = self.index.remove(&k) else {
            return Ok(false);
        };
        self.entries.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        self.version += 1;
        Ok(true)
    }
}

#[derive(Debug)]
pub enum ObjectKind {
    Anonymous(TypeDesc),
    Expando,
}

/// Anonymous objects (fixed members) and expando objects (open members).
#[derive(Debug)]
pub struct ObjectData {
    pub kind: ObjectKind,
    pub members: Vec<(String, Value)>,
}

impl ObjectData {
    pub fn get(&self, name: &str) -> Option<Value> {
        self.members
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn type_desc(&self) -> TypeDesc {
        match &self.kind {
            ObjectKind::Anonymous(desc) => desc.clone(),
            ObjectKind::Expando => TypeDesc::of(TypeKind::ExpandoObject),
        }
    }
}

#[derive(Debug)]
pub struct PairData {
    pub key: Value,
    pub value: Value,
    pub key_type: TypeDesc,
    pub value_type: TypeDesc,
}

/// Lazily produced LINQ sequences.
#[derive(Debug)]
pub enum SequenceData {
    Range { start: i32, count: i32 },
    Repeat { value: Value, count: i32, element: TypeDesc },
    Reverse { items: Vec<Value>, element: TypeDesc },
}

impl SequenceData {
    pub fn type_desc(&self) -> TypeDesc {
        match self {
            SequenceData::Range { .. } => TypeDesc::of(TypeKind::RangeIterator),
            SequenceData::Repeat { element, .. } => {
                TypeDesc::Named(TypeKind::RepeatIterator, vec![element.clone()])
            }
            SequenceData::Reverse { element, .. } => {
                TypeDesc::Named(TypeKind::ReverseIterator, vec![element.clone()])
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SequenceData::Range { count, .. } | SequenceData::Repeat { count, .. } => *count as usize,
            SequenceData::Reverse { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> TypeDesc {
        match self {
            SequenceData::Range { .. } => TypeDesc::of(TypeKind::Int32),
            SequenceData::Repeat { element, .. } | SequenceData::Reverse { element, .. } => {
                element.clone()
            }
        }
    }

    pub fn nth(&self, index: usize) -> Value {
        match self {
            SequenceData::Range { start, .. } => Value::Int(start.wrapping_add(index as i32)),
            SequenceData::Repeat { value, .. } => value.clone(),
            SequenceData::Reverse { items, .. } => items[index].clone(),
        }
    }
}

/// A directory handle. The absolute path is resolved when the value is made.
#[derive(Debug)]
pub struct DirectoryData {
    pub original: String,
    pub full_name: String,
}

impl DirectoryData {
    pub fn new(path: &str) -> Self {
        DirectoryData {
            original: path.to_string(),
            full_name: normalize_path(path),
        }
    }

    pub fn name(&self) -> String {
        let trimmed = self.full_name.trim_end_matches('/');
        match trimmed.rsplit_once('/') {
            Some((_, name)) if !name.is_empty() => name.to_string(),
            _ => "/".to_string(),
        }
    }
}

/// Absolute, `.`/`..`-free form of `path` against the working directory.
pub fn normalize_path(path: &str) -> String {
    let base = if path.starts_with('/') {
        String::new()
    } else {
        std::env::current_dir()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "/".to_string())
    };
    let joined = format!("{}/{}", base, path);
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    let mut out = format!("/{}", parts.join("/"));
    if path.ends_with('/') && out.len() > 1 {
        out.push('/');
    }
    out
}

/// Cursor state of a `foreach` loop.
#[derive(Debug)]
pub enum IteratorState {
    Array { array: ArrayRef, index: usize },
    List { list: ListRef, index: usize, version: u64 },
    Dictionary { dict: DictRef, index: usize, version: u64 },
    Chars { chars: Vec<char>, index: usize },
    Sequence { sequence: Rc<SequenceData>, index: usize },
    Members { items: Vec<Value>, index: usize },
}

impl IteratorState {
    /// Produces the next element, `None` when exhausted.
    pub fn next(&mut self) -> Result<Option<Value>, ScriptError> {
        let modified = || {
            ScriptError::invalid_operation(
                "Collection was modified; enumeration operation may not execute.",
            )
        };
        Ok(match self {
            IteratorState::Array { array, index } => {
                let array = array.borrow();
                let item = array.items.get(*index).cloned();
                *index += 1;
                item
            }
            IteratorState::List {
                list,
                index,
                version,
            } => {
                let list = list.borrow();
                if list.version != *version {
                    return Err(modified());
                }
                let item = list.items.get(*index).cloned();
                *index += 1;
                item
            }
            IteratorState::Dictionary {
                dict,
                index,
                version,
            } => {
                let dict = dict.borrow();
                if dict.version != *version {
                    return Err(modified());
                }
                let item = dict.entries.get(*index).map(|(k, v)| {
                    Value::KeyValuePair(Rc::new(PairData {
                        key: k.clone(),
                        value: v.clone(),
                        key_type: dict.key_type.clone(),
                        value_type: dict.value_type.clone(),
                    }))
                });
                *index += 1;
                item
            }
            IteratorState::Chars { chars, index } => {
                let item = chars.get(*index).map(|c| Value::Char(*c));
                *index += 1;
                item
            }
            IteratorState::Sequence { sequence, index } => {
                if *index >= sequence.len() {
                    None
                } else {
                    let item = sequence.nth(*index);
                    *index += 1;
                    Some(item)
                }
            }
            IteratorState::Members { items, index } => {
                let item = items.get(*index).cloned();
                *index += 1;
                item
            }
        })
    }
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    pub fn type_value(desc: TypeDesc) -> Value {
        Value::Type(Rc::new(desc))
    }

    pub fn new_list(element: TypeDesc, items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(ListData::new(element, items))))
    }

    pub fn new_array(element: TypeDesc, items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(ArrayData::from_items(element, items))))
    }

    pub fn new_exception(kind: TypeKind, message: String) -> Value {
        Value::Exception(Rc::new(ExceptionData { kind, message }))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Default value of a field or array slot of type `desc`.
    pub fn default_for(desc: &TypeDesc) -> Value {
        match desc.kind() {
            Some(TypeKind::Boolean) => Value::Bool(false),
            Some(TypeKind::Char) => Value::Char('\0'),
            Some(TypeKind::Byte) => Value::Byte(0),
            Some(TypeKind::SByte) => Value::SByte(0),
            Some(TypeKind::Int16) => Value::Short(0),
            Some(TypeKind::UInt16) => Value::UShort(0),
            Some(TypeKind::Int32) => Value::Int(0),
            Some(TypeKind::UInt32) => Value::UInt(0),
            Some(TypeKind::Int64) => Value::Long(0),
            Some(TypeKind::UInt64) => Value::ULong(0),
            Some(TypeKind::Int128) => Value::Int128(0),
            Some(TypeKind::UInt128) => Value::UInt128(0),
            Some(TypeKind::Single) => Value::Float(0.0),
            Some(TypeKind::Double) => Value::Double(0.0),
            Some(TypeKind::Decimal) => Value::Decimal(Decimal::ZERO),
            _ => Value::Null,
        }
    }

    /// Runtime type, as `GetType()` reports it. `None` for null.
    pub fn type_desc(&self) -> Option<TypeDesc> {
        let kind = match self {
            Value::Null => return None,
            Value::Bool(_) => TypeKind::Boolean,
            Value::Char(_) => TypeKind::Char,
            Value::Byte(_) => TypeKind::Byte,
            Value::SByte(_) => TypeKind::SByte,
            Value::Short(_) => TypeKind::Int16,
            Value::UShort(_) => TypeKind::UInt16,
            Value::Int(_) => TypeKind::Int32,
            Value::UInt(_) => TypeKind::UInt32,
            Value::Long(_) => TypeKind::Int64,
            Value::ULong(_) => TypeKind::UInt64,
            Value::Int128(_) => TypeKind::Int128,
            Value::UInt128(_) => TypeKind::UInt128,
            Value::Float(_) => TypeKind::Single,
            Value::Double(_) => TypeKind::Double,
            Value::Decimal(_) => TypeKind::Decimal,
            Value::String(_) => TypeKind::String,
            Value::Array(a) => return Some(a.borrow().type_desc()),
            Value::List(l) => return Some(l.borrow().type_desc()),
            Value::Dictionary(d) => return Some(d.borrow().type_desc()),
            Value::Object(o) => return Some(o.borrow().type_desc()),
            Value::KeyValuePair(p) => {
                return Some(TypeDesc::Named(
                    TypeKind::KeyValuePair,
                    vec![p.key_type.clone(), p.value_type.clone()],
                ))
            }
            Value::Exception(e) => e.kind,
            Value::Sequence(s) => return Some(s.type_desc()),
            Value::Directory(_) => TypeKind::DirectoryInfo,
            Value::Type(_) => TypeKind::RuntimeType,
            Value::Assembly(_) => TypeKind::RuntimeAssembly,
            Value::Module(_) => TypeKind::RuntimeModule,
            Value::TypeHandle(_) => TypeKind::RuntimeTypeHandle,
            Value::Utf8Encoding => TypeKind::Utf8Encoding,
            Value::Iterator(_) => TypeKind::Object,
        };
        Some(TypeDesc::of(kind))
    }

    pub fn type_name(&self) -> String {
        self.type_desc()
            .map(|t| t.full_name())
            .unwrap_or_else(|| "null".to_string())
    }

    pub fn friendly_type_name(&self) -> String {
        self.type_desc()
            .map(|t| t.friendly_name())
            .unwrap_or_else(|| "null".to_string())
    }

    /// Address of the shared allocation for reference values.
    pub fn reference_id(&self) -> Option<usize> {
        Some(match self {
            Value::Array(r) => Rc::as_ptr(r) as *const () as usize,
            Value::List(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Dictionary(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Object(r) => Rc::as_ptr(r) as *const () as usize,
            Value::KeyValuePair(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Exception(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Sequence(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Directory(r) => Rc::as_ptr(r) as *const () as usize,
            Value::Iterator(r) => Rc::as_ptr(r) as *const () as usize,
            _ => return None,
        })
    }

    /// `object.Equals` semantics: same runtime type and value, or same
    /// reference.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Assembly(a), Value::Assembly(b)) | (Value::Module(a), Value::Module(b)) => a == b,
            (Value::TypeHandle(a), Value::TypeHandle(b)) => a == b,
            (Value::Utf8Encoding, Value::Utf8Encoding) => true,
            (Value::KeyValuePair(a), Value::KeyValuePair(b)) => {
                a.key.equals(&b.key) && a.value.equals(&b.value)
            }
            (a, b) => match (a.reference_id(), b.reference_id()) {
                (Some(x), Some(y)) => x == y,
                (None, None) => match (DictKey::from_value(a), DictKey::from_value(b)) {
                    (Ok(x), Ok(y)) => x == y,
                    _ => false,
                },
                _ => false,
            },
        }
    }

    /// `ToString()` using invariant formatting. Null renders empty.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Char(c) => c.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::SByte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::UShort(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::ULong(v) => v.to_string(),
            Value::Int128(v) => v.to_string(),
            Value::UInt128(v) => v.to_string(),
            Value::Float(v) => format_single(*v),
            Value::Double(v) => format_double(*v),
            Value::Decimal(d) => d.to_string(),
            Value::String(s) => s.to_string(),
            Value::Object(o) => {
                let o = o.borrow();
                match &o.kind {
                    ObjectKind::Anonymous(_) => {
                        if o.members.is_empty() {
                            return "{ }".to_string();
                        }
                        let members: Vec<String> = o
                            .members
                            .iter()
                            .map(|(n, v)| format!("{} = {}", n, v.to_display_string()))
                            .collect();
                        format!("{{ {} }}", members.join(", "))
                    }
                    ObjectKind::Expando => "System.Dynamic.ExpandoObject".to_string(),
                }
            }
            Value::KeyValuePair(p) => format!(
                "[{}, {}]",
                p.key.to_display_string(),
                p.value.to_display_string()
            ),
            Value::Exception(e) => format!("{}: {}", e.full_type_name(), e.message),
            Value::Directory(d) => d.original.clone(),
            Value::Type(t) => t.full_name(),
            Value::Assembly(lib) => lib.display_name(),
            Value::Module(lib) => format!("{}.dll", lib.assembly_name()),
            Value::Utf8Encoding => "System.Text.UTF8Encoding+UTF8EncodingSealed".to_string(),
            other => other.type_name(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

/// Shortest round-trip text, switching to exponent form like the CLR.
fn format_float(scientific: String, max_exponent: i32) -> String {
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if exponent >= max_exponent || exponent < -4 {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push_str(&format!(
            "E{}{:02}",
            if exponent < 0 { '-' } else { '+' },
            exponent.abs()
        ));
    } else if exponent >= 0 {
        let int_len = exponent as usize + 1;
        if digits.len() <= int_len {
            out.push_str(&digits);
            out.push_str(&"0".repeat(int_len - digits.len()));
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    } else {
        out.push_str("0.");
        out.push_str(&"0".repeat((-exponent - 1) as usize));
        out.push_str(&digits);
    }
    out
}

pub fn format_double(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format_float(format!("{:e}", v), 15)
    }
}

pub fn format_single(v: f32) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format_float(format!("{:e}", v), 7)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_format_like_the_clr() {
        assert_eq!(format_double(2.0), "2");
        assert_eq!(format_double(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_double(1e15), "1E+15");
        assert_eq!(format_double(123456789012345.0), "123456789012345");
        assert_eq!(format_double(0.0001), "0.0001");
        assert_eq!(format_double(0.00001), "1E-05");
        assert_eq!(format_double(-1.5), "-1.5");
        assert_eq!(format_single(1e7), "1E+07");
        assert_eq!(format_single(0.5), "0.5");
    }

    #[test]
    fn paths_are_normalized() {
        assert_eq!(normalize_path("/tmp/a/../b/./c"), "/tmp/b/c");
        assert_eq!(normalize_path("/"), "/");
        assert!(normalize_path("relative").starts_with('/'));
    }

    #[test]
    fn equality_is_type_sensitive() {
        assert!(Value::Int(1).equals(&Value::Int(1)));
        assert!(!Value::Int(1).equals(&Value::Long(1)));
        assert!(Value::string("a").equals(&Value::string("a")));
        let list = Value::new_list(TypeDesc::of(TypeKind::Int32), vec![]);
        assert!(list.equals(&list.clone()));
        assert!(!list.equals(&Value::new_list(TypeDesc::of(TypeKind::Int32), vec![])));
    }
}
