//! `List<T>`, `Dictionary<K,V>`, `KeyValuePair<K,V>` and `System.Array`.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use crate::runner::ds::array::ArrayData;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::operations::test_and_comparison::compare_values;
use crate::runner::ds::operations::type_conversion::implicit_convert;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::{DictData, ListData, ListRef, DictRef, Value};
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{
    arg_count, is_enumerable, to_int, BuiltInObject, EvalContext,
};

/// Register the collection types with the registry.
pub fn register(registry: &mut BuiltInRegistry) {
    let list = BuiltInObject::new(TypeKind::List)
        .with_constructor(list_construct)
        .add_instance_property("Count", list_count)
        .add_instance_method("Add", list_add)
        .add_instance_method("AddRange", list_add_range)
        .add_instance_method("Insert", list_insert)
        .add_instance_method("Remove", list_remove)
        .add_instance_method("RemoveAt", list_remove_at)
        .add_instance_method("Clear", list_clear)
        .add_instance_method("Contains", list_contains)
        .add_instance_method("IndexOf", list_index_of)
        .add_instance_method("Sort", list_sort)
        .add_instance_method("Reverse", list_reverse);
    registry.register_object(list);

    let dictionary = BuiltInObject::new(TypeKind::Dictionary)
        .with_constructor(dictionary_construct)
        .add_instance_property("Count", dictionary_count)
        .add_instance_property("Keys", dictionary_keys)
        .add_instance_property("Values", dictionary_values)
        .add_instance_method("Add", dictionary_add)
        .add_instance_method("Remove", dictionary_remove)
        .add_instance_method("Clear", dictionary_clear)
        .add_instance_method("ContainsKey", dictionary_contains_key)
        .add_instance_method("ContainsValue", dictionary_contains_value);
    registry.register_object(dictionary);

    let pair = BuiltInObject::new(TypeKind::KeyValuePair)
        .add_instance_property("Key", pair_key)
        .add_instance_property("Value", pair_value);
    registry.register_object(pair);

    let array = BuiltInObject::new(TypeKind::Array)
        .add_method("CreateInstance", array_create_instance)
        .add_method("Sort", array_sort)
        .add_method("Reverse", array_reverse)
        .add_method("IndexOf", array_index_of)
        .add_instance_property("Length", array_length)
        .add_instance_property("Rank", array_rank)
        .add_instance_method("GetLength", array_get_length)
        .add_instance_method("GetLowerBound", array_get_lower_bound)
        .add_instance_method("GetUpperBound", array_get_upper_bound)
        .add_instance_method("GetValue", array_get_value)
        .add_instance_method("SetValue", array_set_value);
    registry.register_object(array);
}

/// Sorts with the shared comparer, surfacing the first comparison failure.
pub fn sort_values(items: &mut [Value]) -> Result<(), ScriptError> {
    let mut failure = None;
    items.sort_by(|a, b| match compare_values(a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    match failure {
        Some(e) => Err(ScriptError::invalid_operation(format!(
            "Failed to compare two elements in the array. {}",
            e.message()
        ))),
        None => Ok(()),
    }
}

// ── List<T> ───────────────────────────────────────────────────

fn this_list(this: &Value) -> Result<ListRef, ScriptError> {
    match this {
        Value::List(l) => Ok(l.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn list_construct(ctx: &mut EvalContext, target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("List", &args, 0, 1)?;
    let element = target.args().first().cloned().unwrap_or_else(TypeDesc::object);
    let items = match args.first() {
        None => vec![],
        Some(source) if is_enumerable(source) => ctx
            .items(source)?
            .into_iter()
            .map(|v| implicit_convert(v, &element))
            .collect::<Result<Vec<_>, _>>()?,
        Some(capacity) => {
            let capacity = to_int("List", capacity)?;
            if capacity < 0 {
                return Err(ScriptError::argument_out_of_range("capacity"));
            }
            ctx.check_len(capacity as usize, "list")?;
            vec![]
        }
    };
    Ok(Value::List(Rc::new(RefCell::new(ListData::new(element, items)))))
}

fn list_count(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Int(this_list(&this)?.borrow().items.len() as i32))
}

fn list_add(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Add", &args, 1, 1)?;
    let list = this_list(&this)?;
    let element = list.borrow().element.clone();
    let item = implicit_convert(args.into_iter().next().unwrap_or(Value::Null), &element)?;
    let mut list = list.borrow_mut();
    ctx.check_len(list.items.len() + 1, "list")?;
    list.items.push(item);
    list.version += 1;
    Ok(Value::Null)
}

fn list_add_range(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("AddRange", &args, 1, 1)?;
    let list = this_list(&this)?;
    let element = list.borrow().element.clone();
    let incoming = ctx
        .items(&args[0])?
        .into_iter()
        .map(|v| implicit_convert(v, &element))
        .collect::<Result<Vec<_>, _>>()?;
    let mut list = list.borrow_mut();
    ctx.check_len(list.items.len() + incoming.len(), "list")?;
    list.items.extend(incoming);
    list.version += 1;
    Ok(Value::Null)
}

fn list_insert(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Insert", &args, 2, 2)?;
    let list = this_list(&this)?;
    let element = list.borrow().element.clone();
    let item = implicit_convert(args[1].clone(), &element)?;
    let mut list = list.borrow_mut();
    let index = to_int("Insert", &args[0])?;
    if index < 0 || index as usize > list.items.len() {
        return Err(ScriptError::argument_out_of_range("index"));
    }
    ctx.check_len(list.items.len() + 1, "list")?;
    list.items.insert(index as usize, item);
    list.version += 1;
    Ok(Value::Null)
}

fn list_remove(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Remove", &args, 1, 1)?;
    let list = this_list(&this)?;
    let mut list = list.borrow_mut();
    match list.items.iter().position(|v| v.equals(&args[0])) {
        Some(position) => {
            list.items.remove(position);
            list.version += 1;
            Ok(Value::Bool(true))
        }
        None => Ok(Value::Bool(false)),
    }
}

fn list_remove_at(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("RemoveAt", &args, 1, 1)?;
    let list = this_list(&this)?;
    let mut list = list.borrow_mut();
    let index = to_int("RemoveAt", &args[0])?;
    if index < 0 || index as usize >= list.items.len() {
        return Err(ScriptError::argument_out_of_range("index"));
    }
    list.items.remove(index as usize);
    list.version += 1;
    Ok(Value::Null)
}

fn list_clear(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Clear", &args, 0, 0)?;
    let list = this_list(&this)?;
    let mut list = list.borrow_mut();
    list.items.clear();
    list.version += 1;
    Ok(Value::Null)
}

fn list_contains(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Contains", &args, 1, 1)?;
    let list = this_list(&this)?;
    let found = list.borrow().items.iter().any(|v| v.equals(&args[0]));
    Ok(Value::Bool(found))
}

fn list_index_of(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IndexOf", &args, 1, 1)?;
    let list = this_list(&this)?;
    let position = list.borrow().items.iter().position(|v| v.equals(&args[0]));
    Ok(Value::Int(position.map_or(-1, |p| p as i32)))
}

fn list_sort(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Sort", &args, 0, 0)?;
    let list = this_list(&this)?;
    let mut list = list.borrow_mut();
    sort_values(&mut list.items)?;
    list.version += 1;
    Ok(Value::Null)
}

fn list_reverse(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Reverse", &args, 0, 0)?;
    let list = this_list(&this)?;
    let mut list = list.borrow_mut();
    list.items.reverse();
    list.version += 1;
    Ok(Value::Null)
}

// ── Dictionary<K,V> ───────────────────────────────────────────

fn this_dictionary(this: &Value) -> Result<DictRef, ScriptError> {
    match this {
        Value::Dictionary(d) => Ok(d.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn dictionary_construct(_ctx: &mut EvalContext, target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Dictionary", &args, 0, 1)?;
    let key_type = target.args().first().cloned().unwrap_or_else(TypeDesc::object);
    let value_type = target.args().get(1).cloned().unwrap_or_else(TypeDesc::object);
    let mut data = DictData::new(key_type, value_type);
    if let Some(Value::Dictionary(source)) = args.first() {
        for (k, v) in source.borrow().entries.iter() {
            data.insert(k.clone(), v.clone(), false)?;
        }
    }
    Ok(Value::Dictionary(Rc::new(RefCell::new(data))))
}

/// Inserts with the dictionary's key/value conversions applied.
pub fn dictionary_insert(
    ctx: &EvalContext,
    dict: &DictRef,
    key: Value,
    value: Value,
    overwrite: bool,
) -> Result<(), ScriptError> {
    let (key_type, value_type) = {
        let dict = dict.borrow();
        (dict.key_type.clone(), dict.value_type.clone())
    };
    let key = implicit_convert(key, &key_type)?;
    let value = implicit_convert(value, &value_type)?;
    let mut dict = dict.borrow_mut();
    ctx.check_len(dict.entries.len() + 1, "dictionary")?;
    dict.insert(key, value, overwrite)
}

fn dictionary_count(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Int(this_dictionary(&this)?.borrow().entries.len() as i32))
}

fn dictionary_keys(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    let dict = this_dictionary(&this)?;
    let dict = dict.borrow();
    let keys = dict.entries.iter().map(|(k, _)| k.clone()).collect();
    Ok(Value::new_list(dict.key_type.clone(), keys))
}

fn dictionary_values(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    let dict = this_dictionary(&this)?;
    let dict = dict.borrow();
    let values = dict.entries.iter().map(|(_, v)| v.clone()).collect();
    Ok(Value::new_list(dict.value_type.clone(), values))
}

fn dictionary_add(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Add", &args, 2, 2)?;
    let dict = this_dictionary(&this)?;
    let mut args = args.into_iter();
    let key = args.next().unwrap_or(Value::Null);
    let value = args.next().unwrap_or(Value::Null);
    dictionary_insert(ctx, &dict, key, value, false)?;
    Ok(Value::Null)
}

fn dictionary_remove(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Remove", &args, 1, 1)?;
    let dict = this_dictionary(&this)?;
    let removed = dict.borrow_mut().remove(&args[0])?;
    Ok(Value::Bool(removed))
}

fn dictionary_clear(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Clear", &args, 0, 0)?;
    let dict = this_dictionary(&this)?;
    let mut dict = dict.borrow_mut();
    dict.entries.clear();
    dict.index.clear();
    dict.version += 1;
    Ok(Value::Null)
}

fn dictionary_contains_key(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ContainsKey", &args, 1, 1)?;
    let dict = this_dictionary(&this)?;
    let found = dict.borrow().get(&args[0])?.is_some();
    Ok(Value::Bool(found))
}

fn dictionary_contains_value(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ContainsValue", &args, 1, 1)?;
    let dict = this_dictionary(&this)?;
    let found = dict.borrow().entries.iter().any(|(_, v)| v.equals(&args[0]));
    Ok(Value::Bool(found))
}

fn pair_key(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    match this {
        Value::KeyValuePair(p) => Ok(p.key.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn pair_value(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    match this {
        Value::KeyValuePair(p) => Ok(p.value.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

// ── System.Array ──────────────────────────────────────────────

fn this_array(this: &Value) -> Result<crate::runner::ds::value::ArrayRef, ScriptError> {
    match this {
        Value::Array(a) => Ok(a.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

/// Integers of an `int[]` argument, or the scalar arguments themselves.
fn int_list(name: &str, values: &[Value]) -> Result<Vec<i64>, ScriptError> {
    match values {
        [Value::Array(a)] => a
            .borrow()
            .items
            .iter()
            .map(|v| to_int(name, v).map(|i| i as i64))
            .collect(),
        scalars => scalars
            .iter()
            .map(|v| to_int(name, v).map(|i| i as i64))
            .collect(),
    }
}

/// `Array.CreateInstance(type, lengths...)` or
/// `Array.CreateInstance(type, int[] lengths, int[] lowerBounds)`.
fn array_create_instance(ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("CreateInstance", &args, 2, 33)?;
    let element = match &args[0] {
        Value::Type(t) => (**t).clone(),
        Value::Null => return Err(ScriptError::argument_null("elementType")),
        other => {
            return Err(ScriptError::binder(format!(
                "Argument 1: cannot convert from '{}' to 'System.Type'",
                other.friendly_type_name()
            )))
        }
    };
    if element.is(TypeKind::Void) {
        return Err(ScriptError::not_supported("Arrays of System.Void are not supported."));
    }
    let (lengths, lower_bounds) = match &args[1..] {
        [lengths @ Value::Array(_), bounds @ Value::Array(_)] => (
            int_list("CreateInstance", std::slice::from_ref(lengths))?,
            int_list("CreateInstance", std::slice::from_ref(bounds))?,
        ),
        rest => {
            let lengths = int_list("CreateInstance", rest)?;
            let bounds = vec![0; lengths.len()];
            (lengths, bounds)
        }
    };
    if lengths.is_empty() {
        return Err(ScriptError::argument("Must provide at least one rank."));
    }
    if lengths.len() != lower_bounds.len() {
        return Err(ScriptError::argument(
            "The length of the arrays must be the same.",
        ));
    }
    if lengths.iter().any(|l| *l < 0) {
        return Err(ScriptError::argument_out_of_range("lengths"));
    }
    let total = lengths
        .iter()
        .try_fold(1usize, |acc, l| acc.checked_mul(*l as usize))
        .ok_or_else(|| ScriptError::out_of_memory("array"))?;
    ctx.check_len(total, "array")?;
    let lengths = lengths.into_iter().map(|l| l as usize).collect();
    Ok(Value::Array(Rc::new(RefCell::new(ArrayData::with_bounds(
        element,
        lengths,
        lower_bounds,
    )))))
}

fn array_length(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Int(this_array(&this)?.borrow().len() as i32))
}

fn array_rank(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Int(this_array(&this)?.borrow().rank() as i32))
}

fn dimension(name: &str, array: &ArrayData, args: &[Value]) -> Result<usize, ScriptError> {
    arg_count(name, args, 1, 1)?;
    let dimension = to_int(name, &args[0])?;
    if dimension < 0 || dimension as usize >= array.rank() {
        return Err(ScriptError::new(
            TypeKind::IndexOutOfRangeException,
            TypeKind::IndexOutOfRangeException.default_message(),
        ));
    }
    Ok(dimension as usize)
}

fn array_get_length(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let array = this_array(&this)?;
    let array = array.borrow();
    let d = dimension("GetLength", &array, &args)?;
    Ok(Value::Int(array.lengths[d] as i32))
}

fn array_get_lower_bound(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let array = this_array(&this)?;
    let array = array.borrow();
    let d = dimension("GetLowerBound", &array, &args)?;
    Ok(Value::Int(array.lower_bound(d) as i32))
}

fn array_get_upper_bound(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let array = this_array(&this)?;
    let array = array.borrow();
    let d = dimension("GetUpperBound", &array, &args)?;
    Ok(Value::Int(array.upper_bound(d) as i32))
}

fn array_get_value(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    let array = this_array(&this)?;
    let indices = int_list("GetValue", &args)?;
    let value = array.borrow().get(&indices)?;
    Ok(value)
}

fn array_set_value(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("SetValue", &args, 2, 33)?;
    let array = this_array(&this)?;
    let indices = int_list("SetValue", &args[1..])?;
    let element = array.borrow().element.clone();
    let value = implicit_convert(args[0].clone(), &element)?;
    array.borrow_mut().set(&indices, value)?;
    Ok(Value::Null)
}

fn array_sort(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Sort", &args, 1, 1)?;
    let array = match &args[0] {
        Value::Null => return Err(ScriptError::argument_null("array")),
        other => this_array(other)?,
    };
    let mut array = array.borrow_mut();
    if array.rank() != 1 {
        return Err(ScriptError::new(
            TypeKind::ArgumentException,
            "Only single dimensional arrays are supported for the requested action.",
        ));
    }
    sort_values(&mut array.items)?;
    Ok(Value::Null)
}

fn array_reverse(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Reverse", &args, 1, 1)?;
    let array = match &args[0] {
        Value::Null => return Err(ScriptError::argument_null("array")),
        other => this_array(other)?,
    };
    array.borrow_mut().items.reverse();
    Ok(Value::Null)
}

fn array_index_of(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("IndexOf", &args, 2, 2)?;
    let array = match &args[0] {
        Value::Null => return Err(ScriptError::argument_null("array")),
        other => this_array(other)?,
    };
    let position = array.borrow().items.iter().position(|v| v.equals(&args[1]));
    Ok(Value::Int(position.map_or(-1, |p| p as i32)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_list_value(items: &[i32]) -> Value {
        Value::new_list(
            TypeDesc::of(TypeKind::Int32),
            items.iter().map(|i| Value::Int(*i)).collect(),
        )
    }

    #[test]
    fn list_add_converts_and_bumps_version() {
        let mut ctx = EvalContext::default();
        let list = int_list_value(&[]);
        list_add(&mut ctx, list.clone(), vec![Value::Int(3)]).unwrap();
        assert!(list_add(&mut ctx, list.clone(), vec![Value::string("x")]).is_err());
        let Value::List(l) = &list else { unreachable!() };
        assert_eq!(l.borrow().items.len(), 1);
        assert_eq!(l.borrow().version, 1);
    }

    #[test]
    fn create_instance_honours_lower_bounds() {
        let mut ctx = EvalContext::default();
        let ints = |v: &[i32]| Value::new_array(TypeDesc::of(TypeKind::Int32), v.iter().map(|i| Value::Int(*i)).collect());
        let array = array_create_instance(
            &mut ctx,
            Value::Null,
            vec![
                Value::type_value(TypeDesc::of(TypeKind::Int32)),
                ints(&[3, 2]),
                ints(&[1, 5]),
            ],
        )
        .unwrap();
        let upper = array_get_upper_bound(&mut ctx, array.clone(), vec![Value::Int(1)]).unwrap();
        assert!(matches!(upper, Value::Int(6)));
        assert!(matches!(array_length(&mut ctx, array).unwrap(), Value::Int(6)));
    }

    #[test]
    fn sorting_mixed_types_fails_cleanly() {
        let mut items = vec![Value::Int(2), Value::string("a")];
        let err = sort_values(&mut items).unwrap_err();
        assert_eq!(err.kind(), TypeKind::InvalidOperationException);
    }
}
