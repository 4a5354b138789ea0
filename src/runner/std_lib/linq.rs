//! `System.Linq.Enumerable`: the `Range`/`Repeat` generators and the
//! parameterless extension methods over any enumerable receiver.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::runner::ds::decimal::Decimal;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::operations::test_and_comparison::compare_values;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::{SequenceData, Value};
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{
    arg_count, element_type_of, is_enumerable, to_int, BuiltInObject, EvalContext,
};

/// Register Enumerable with the registry. Extension methods are stored as
/// instance methods so the registry can offer them to enumerable receivers.
pub fn register(registry: &mut BuiltInRegistry) {
    let enumerable = BuiltInObject::new(TypeKind::Enumerable)
        .add_method("Range", enumerable_range)
        .add_method("Repeat", enumerable_repeat)
        .add_instance_method("Sum", linq_sum)
        .add_instance_method("Average", linq_average)
        .add_instance_method("Min", linq_min)
        .add_instance_method("Max", linq_max)
        .add_instance_method("Count", linq_count)
        .add_instance_method("Any", linq_any)
        .add_instance_method("Contains", linq_contains)
        .add_instance_method("First", linq_first)
        .add_instance_method("Last", linq_last)
        .add_instance_method("ElementAt", linq_element_at)
        .add_instance_method("ToArray", linq_to_array)
        .add_instance_method("ToList", linq_to_list)
        .add_instance_method("Reverse", linq_reverse);

    registry.register_object(enumerable);
}

fn no_elements() -> ScriptError {
    ScriptError::invalid_operation("Sequence contains no elements")
}

fn source_items(ctx: &EvalContext, name: &str, this: &Value) -> Result<Vec<Value>, ScriptError> {
    if this.is_null() {
        return Err(ScriptError::argument_null("source"));
    }
    if !is_enumerable(this) {
        return Err(ScriptError::binder(format!(
            "'{}' does not contain a definition for '{}'",
            this.friendly_type_name(),
            name
        )));
    }
    ctx.items(this)
}

fn enumerable_range(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Range", &args, 2, 2)?;
    let start = to_int("Range", &args[0])?;
    let count = to_int("Range", &args[1])?;
    if count < 0 || (start as i64 + count as i64 - 1) > i32::MAX as i64 {
        return Err(ScriptError::argument_out_of_range("count"));
    }
    Ok(Value::Sequence(Rc::new(SequenceData::Range { start, count })))
}

fn enumerable_repeat(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Repeat", &args, 2, 2)?;
    let count = to_int("Repeat", &args[1])?;
    if count < 0 {
        return Err(ScriptError::argument_out_of_range("count"));
    }
    let element = args[0].type_desc().unwrap_or_else(TypeDesc::object);
    Ok(Value::Sequence(Rc::new(SequenceData::Repeat {
        value: args[0].clone(),
        count,
        element,
    })))
}

fn unsupported(name: &str, element: &TypeDesc) -> ScriptError {
    ScriptError::binder(format!(
        "'IEnumerable<{}>' does not contain a definition for '{}'",
        element.friendly_name(),
        name
    ))
}

/// Checked sum over the element type: `int` and `long` overflow throws.
fn linq_sum(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Sum", &args, 0, 0)?;
    let items = source_items(ctx, "Sum", &this)?;
    let element = element_type_of(&this);
    let overflow = ScriptError::overflow;
    Ok(match element.kind() {
        Some(TypeKind::Int32) => {
            let mut total: i32 = 0;
            for item in &items {
                if let Value::Int(v) = item {
                    total = total.checked_add(*v).ok_or_else(overflow)?;
                }
            }
            Value::Int(total)
        }
        Some(TypeKind::Int64) => {
            let mut total: i64 = 0;
            for item in &items {
                if let Value::Long(v) = item {
                    total = total.checked_add(*v).ok_or_else(overflow)?;
                }
            }
            Value::Long(total)
        }
        Some(TypeKind::Single) => Value::Float(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::Float(f) => Some(*f),
                    _ => None,
                })
                .sum(),
        ),
        Some(TypeKind::Double) => Value::Double(
            items
                .iter()
                .filter_map(|v| match v {
                    Value::Double(f) => Some(*f),
                    _ => None,
                })
                .sum(),
        ),
        Some(TypeKind::Decimal) => {
            let mut total = Decimal::ZERO;
            for item in &items {
                if let Value::Decimal(d) = item {
                    total = total.add(d)?;
                }
            }
            Value::Decimal(total)
        }
        _ => return Err(unsupported("Sum", &element)),
    })
}

fn linq_average(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Average", &args, 0, 0)?;
    let items = source_items(ctx, "Average", &this)?;
    let element = element_type_of(&this);
    if items.is_empty() {
        return Err(no_elements());
    }
    let count = items.len();
    Ok(match element.kind() {
        Some(TypeKind::Decimal) => {
            let mut total = Decimal::ZERO;
            for item in &items {
                if let Value::Decimal(d) = item {
                    total = total.add(d)?;
                }
            }
            Value::Decimal(total.div(&Decimal::from_i64(count as i64))?)
        }
        Some(TypeKind::Single) => {
            let total: f64 = items
                .iter()
                .filter_map(|v| match v {
                    Value::Float(f) => Some(*f as f64),
                    _ => None,
                })
                .sum();
            Value::Float((total / count as f64) as f32)
        }
        Some(TypeKind::Int32 | TypeKind::Int64 | TypeKind::Double) => {
            let mut total = 0f64;
            for item in &items {
                total += match item {
                    Value::Int(v) => *v as f64,
                    Value::Long(v) => *v as f64,
                    Value::Double(v) => *v,
                    _ => 0.0,
                };
            }
            Value::Double(total / count as f64)
        }
        _ => return Err(unsupported("Average", &element)),
    })
}

fn extreme(ctx: &EvalContext, name: &str, this: &Value, keep: Ordering) -> Result<Value, ScriptError> {
    let items = source_items(ctx, name, this)?;
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return if element_type_of(this).kind().map_or(true, |k| {
            crate::runner::ds::operations::type_conversion::is_numeric_kind(k)
                || k == TypeKind::Boolean
        }) {
            Err(no_elements())
        } else {
            Ok(Value::Null)
        };
    };
    for item in iter {
        if compare_values(&item, &best)? == keep {
            best = item;
        }
    }
    Ok(best)
}

fn linq_min(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Min", &args, 0, 0)?;
    extreme(ctx, "Min", &this, Ordering::Less)
}

fn linq_max(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Max", &args, 0, 0)?;
    extreme(ctx, "Max", &this, Ordering::Greater)
}

fn linq_count(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Count", &args, 0, 0)?;
    let count = match &this {
        Value::Sequence(s) => s.len(),
        other => source_items(ctx, "Count", other)?.len(),
    };
    Ok(Value::Int(count as i32))
}

fn linq_any(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Any", &args, 0, 0)?;
    let any = match &this {
        Value::Sequence(s) => !s.is_empty(),
        other => !source_items(ctx, "Any", other)?.is_empty(),
    };
    Ok(Value::Bool(any))
}

fn linq_contains(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Contains", &args, 1, 1)?;
    let items = source_items(ctx, "Contains", &this)?;
    Ok(Value::Bool(items.iter().any(|v| v.equals(&args[0]))))
}

fn linq_first(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("First", &args, 0, 0)?;
    match &this {
        Value::Sequence(s) if !s.is_empty() => Ok(s.nth(0)),
        other => source_items(ctx, "First", other)?
            .into_iter()
            .next()
            .ok_or_else(no_elements),
    }
}

fn linq_last(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Last", &args, 0, 0)?;
    match &this {
        Value::Sequence(s) if !s.is_empty() => Ok(s.nth(s.len() - 1)),
        other => source_items(ctx, "Last", other)?
            .pop()
            .ok_or_else(no_elements),
    }
}

fn linq_element_at(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ElementAt", &args, 1, 1)?;
    let index = to_int("ElementAt", &args[0])?;
    let items = source_items(ctx, "ElementAt", &this)?;
    if index < 0 {
        return Err(ScriptError::argument_out_of_range("index"));
    }
    items
        .get(index as usize)
        .cloned()
        .ok_or_else(|| ScriptError::argument_out_of_range("index"))
}

fn linq_to_array(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToArray", &args, 0, 0)?;
    let items = source_items(ctx, "ToArray", &this)?;
    Ok(Value::new_array(element_type_of(&this), items))
}

fn linq_to_list(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("ToList", &args, 0, 0)?;
    let items = source_items(ctx, "ToList", &this)?;
    Ok(Value::new_list(element_type_of(&this), items))
}

/// Lazy reversed view; the source is snapshotted when the call is made.
fn linq_reverse(ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Reverse", &args, 0, 0)?;
    let mut items = source_items(ctx, "Reverse", &this)?;
    items.reverse();
    Ok(Value::Sequence(Rc::new(SequenceData::Reverse {
        items,
        element: element_type_of(&this),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i32]) -> Value {
        Value::new_array(
            TypeDesc::of(TypeKind::Int32),
            values.iter().map(|v| Value::Int(*v)).collect(),
        )
    }

    #[test]
    fn sum_is_checked() {
        let mut ctx = EvalContext::default();
        assert!(matches!(linq_sum(&mut ctx, ints(&[1, 2, 3]), vec![]).unwrap(), Value::Int(6)));
        let err = linq_sum(&mut ctx, ints(&[i32::MAX, 1]), vec![]).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OverflowException);
    }

    #[test]
    fn range_is_lazy_and_validated() {
        let mut ctx = EvalContext::default();
        let range = enumerable_range(&mut ctx, Value::Null, vec![Value::Int(1), Value::Int(5)]).unwrap();
        assert!(matches!(linq_count(&mut ctx, range.clone(), vec![]).unwrap(), Value::Int(5)));
        assert!(matches!(linq_last(&mut ctx, range, vec![]).unwrap(), Value::Int(5)));
        assert!(enumerable_range(&mut ctx, Value::Null, vec![Value::Int(i32::MAX), Value::Int(2)]).is_err());
    }

    #[test]
    fn huge_sequences_hit_the_collection_cap() {
        let mut ctx = EvalContext::default();
        let range = enumerable_range(&mut ctx, Value::Null, vec![Value::Int(0), Value::Int(i32::MAX)]).unwrap();
        let err = linq_to_array(&mut ctx, range, vec![]).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OutOfMemoryException);
    }

    #[test]
    fn empty_min_throws() {
        let mut ctx = EvalContext::default();
        let err = linq_min(&mut ctx, ints(&[]), vec![]).unwrap_err();
        assert_eq!(err.message(), "Sequence contains no elements");
        assert!(matches!(linq_max(&mut ctx, ints(&[3, 9, 2]), vec![]).unwrap(), Value::Int(9)));
    }
}
