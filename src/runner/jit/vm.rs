//! Stack-based bytecode virtual machine.
//!
//! Executes the units emitted by the compiler with a flat instruction
//! dispatch loop. Calls between methods of a unit push frames instead of
//! recursing on the native stack, so deep script recursion is bounded by
//! [`Limits::max_call_depth`](crate::runner::plugin::types::Limits) rather
//! than by the host thread.

use std::cell::RefCell;
use std::rc::Rc;

use crate::parser::ast::{BinaryOperator, UnaryOperator};
use crate::runner::ds::array::ArrayData;
use crate::runner::ds::error::ScriptError;
use crate::runner::ds::operations::arithmetic::{binary, coerce_compound, step, unary};
use crate::runner::ds::operations::test_and_comparison::truthiness;
use crate::runner::ds::operations::type_conversion::{explicit_convert, implicit_convert};
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::{IteratorState, ObjectData, ObjectKind, PairData, Value};
use crate::runner::plugin::registry::CORE_REGISTRY;
use crate::runner::plugin::types::{to_int, to_long, EvalContext};
use crate::runner::std_lib::collections::dictionary_insert;

use super::bytecode::{Instruction, OpCode, Unit};

/// An active protected region of a frame.
#[derive(Debug, Clone, Copy)]
struct Handler {
    target: usize,
    stack_len: usize,
}

/// Activation record of one method call.
#[derive(Debug)]
struct Frame {
    method: usize,
    ip: usize,
    locals: Vec<Value>,
    args: Vec<Value>,
    /// Operand stack height when the frame was entered.
    stack_base: usize,
    handlers: Vec<Handler>,
}

/// The bytecode virtual machine.
pub struct Vm<'a> {
    unit: &'a Unit,
    frames: Vec<Frame>,
    /// Operand stack shared by all frames.
    stack: Vec<Value>,
    ctx: &'a mut EvalContext,
}

/// Runs the unit's entry method to completion.
pub fn execute(unit: &Unit, ctx: &mut EvalContext) -> Result<Value, ScriptError> {
    let mut vm = Vm::new(unit, ctx);
    vm.run()
}

fn binder_missing_member(value: &Value, name: &str) -> ScriptError {
    ScriptError::binder(format!(
        "'{}' does not contain a definition for '{}'",
        value.friendly_type_name(),
        name
    ))
}

fn binary_operator(op: OpCode) -> Option<BinaryOperator> {
    Some(match op {
        OpCode::Add => BinaryOperator::Add,
        OpCode::Sub => BinaryOperator::Subtract,
        OpCode::Mul => BinaryOperator::Multiply,
        OpCode::Div => BinaryOperator::Divide,
        OpCode::Rem => BinaryOperator::Remainder,
        OpCode::Shl => BinaryOperator::ShiftLeft,
        OpCode::Shr => BinaryOperator::ShiftRight,
        OpCode::BitAnd => BinaryOperator::BitAnd,
        OpCode::BitOr => BinaryOperator::BitOr,
        OpCode::BitXor => BinaryOperator::BitXor,
        OpCode::Ceq => BinaryOperator::Equal,
        OpCode::Cne => BinaryOperator::NotEqual,
        OpCode::Clt => BinaryOperator::LessThan,
        OpCode::Cle => BinaryOperator::LessThanOrEqual,
        OpCode::Cgt => BinaryOperator::GreaterThan,
        OpCode::Cge => BinaryOperator::GreaterThanOrEqual,
        _ => return None,
    })
}

impl<'a> Vm<'a> {
    pub fn new(unit: &'a Unit, ctx: &'a mut EvalContext) -> Self {
        Vm {
            unit,
            frames: Vec::new(),
            stack: Vec::with_capacity(256),
            ctx,
        }
    }

    /// Run the entry method. Exceptions no handler catches are returned as
    /// errors.
    pub fn run(&mut self) -> Result<Value, ScriptError> {
        self.push_frame(self.unit.entry, vec![])?;
        loop {
            match self.step() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) => self.unwind(err)?,
            }
        }
    }

    fn push_frame(&mut self, method: usize, args: Vec<Value>) -> Result<(), ScriptError> {
        if self.frames.len() >= self.ctx.limits.max_call_depth {
            return Err(ScriptError::of(TypeKind::InsufficientExecutionStackException));
        }
        let unit = self.unit;
        let Some(target) = unit.methods.get(method) else {
            return Err(ScriptError::invalid_operation(format!("Method {} not found", method)));
        };
        let mut converted = Vec::with_capacity(args.len());
        for (arg, param) in args.into_iter().zip(&target.params) {
            converted.push(implicit_convert(arg, &param.declared_type)?);
        }
        let locals = target
            .chunk
            .locals
            .iter()
            .map(|slot| slot.declared_type.as_ref().map_or(Value::Null, Value::default_for))
            .collect();
        self.frames.push(Frame {
            method,
            ip: 0,
            locals,
            args: converted,
            stack_base: self.stack.len(),
            handlers: vec![],
        });
        Ok(())
    }

    /// Transfers control to the innermost handler, popping frames that have
    /// none. Fails when the exception leaves the entry method.
    fn unwind(&mut self, err: ScriptError) -> Result<(), ScriptError> {
        while let Some(frame) = self.frames.last_mut() {
            if let Some(handler) = frame.handlers.pop() {
                frame.ip = handler.target;
                self.stack.truncate(handler.stack_len);
                self.stack.push(Value::Exception(err.0.clone()));
                return Ok(());
            }
            let base = frame.stack_base;
            self.frames.pop();
            self.stack.truncate(base);
        }
        Err(err)
    }

    #[inline]
    fn pop(&mut self) -> Value {
        self.stack.pop().unwrap_or(Value::Null)
    }

    fn pop_n(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn frame(&mut self) -> Result<&mut Frame, ScriptError> {
        self.frames
            .last_mut()
            .ok_or_else(|| ScriptError::invalid_operation("No active frame"))
    }

    /// Executes one instruction. Returns the script's result once the entry
    /// method returns.
    fn step(&mut self) -> Result<Option<Value>, ScriptError> {
        let unit = self.unit;
        let (method_idx, ip) = {
            let frame = self.frame()?;
            (frame.method, frame.ip)
        };
        let chunk = &unit.methods[method_idx].chunk;
        let Some(instr) = chunk.code.get(ip) else {
            self.stack.push(Value::Null);
            return self.ret();
        };
        let Instruction {
            op,
            operand,
            operand2,
            operand3,
        } = *instr;
        self.frame()?.ip = ip + 1;

        match op {
            OpCode::Nop => {}

            // ── Constants & Literals ──────────────────────
            OpCode::LoadConst => self.stack.push(chunk.constants[operand as usize].clone()),
            OpCode::LoadNull => self.stack.push(Value::Null),

            // ── Locals & Arguments ───────────────────────
            OpCode::LoadLocal => {
                let value = self.frame()?.locals[operand as usize].clone();
                self.stack.push(value);
            }
            OpCode::StoreLocal => {
                let value = self.pop();
                let value = match &chunk.locals[operand as usize].declared_type {
                    Some(desc) => implicit_convert(value, desc)?,
                    None => value,
                };
                self.frame()?.locals[operand as usize] = value;
            }
            OpCode::LoadArg => {
                let value = self.frame()?.args[operand as usize].clone();
                self.stack.push(value);
            }
            OpCode::StoreArg => {
                let value = self.pop();
                let desc = &unit.methods[method_idx].params[operand as usize].declared_type;
                let value = implicit_convert(value, desc)?;
                self.frame()?.args[operand as usize] = value;
            }

            // ── Stack manipulation ───────────────────────
            OpCode::Pop => {
                self.pop();
            }
            OpCode::Dup => {
                let top = self.stack.last().cloned().unwrap_or(Value::Null);
                self.stack.push(top);
            }

            // ── Arithmetic & Comparison ──────────────────
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Shl
            | OpCode::Shr
            | OpCode::BitAnd
            | OpCode::BitOr
            | OpCode::BitXor
            | OpCode::Ceq
            | OpCode::Cne
            | OpCode::Clt
            | OpCode::Cle
            | OpCode::Cgt
            | OpCode::Cge => {
                let b = self.pop();
                let a = self.pop();
                let Some(operator) = binary_operator(op) else {
                    return Err(ScriptError::invalid_operation("Not a binary operator"));
                };
                let mut result = binary(operator, &a, &b)?;
                if let Value::String(text) = &result {
                    self.ctx.check_str_len(text.len())?;
                }
                if operand == 1 {
                    result = coerce_compound(result, &a)?;
                }
                self.stack.push(result);
            }

            // ── Unary ────────────────────────────────────
            OpCode::Neg | OpCode::Plus | OpCode::Not | OpCode::BitNot => {
                let operator = match op {
                    OpCode::Neg => UnaryOperator::Negate,
                    OpCode::Plus => UnaryOperator::Plus,
                    OpCode::Not => UnaryOperator::Not,
                    _ => UnaryOperator::BitNot,
                };
                let value = self.pop();
                self.stack.push(unary(operator, &value)?);
            }
            OpCode::Inc | OpCode::Dec => {
                let value = self.pop();
                self.stack.push(step(&value, op == OpCode::Inc)?);
            }

            // ── Control Flow ─────────────────────────────
            OpCode::Br => self.frame()?.ip = operand as usize,
            OpCode::BrTrue | OpCode::BrFalse => {
                let value = self.pop();
                if truthiness(&value)? == (op == OpCode::BrTrue) {
                    self.frame()?.ip = operand as usize;
                }
            }
            OpCode::BrNonNull => {
                if !self.pop().is_null() {
                    self.frame()?.ip = operand as usize;
                }
            }

            // ── Types ────────────────────────────────────
            OpCode::IsInst => {
                let value = self.pop();
                let target = chunk.get_type(operand);
                let matches = value
                    .type_desc()
                    .map_or(false, |desc| desc.is_assignable_to(target));
                self.stack.push(if matches { value } else { Value::Null });
            }
            OpCode::CastClass => {
                let value = self.pop();
                self.stack.push(explicit_convert(value, chunk.get_type(operand))?);
            }
            OpCode::ConvImplicit => {
                let value = self.pop();
                self.stack.push(implicit_convert(value, chunk.get_type(operand))?);
            }
            OpCode::LoadToken => {
                self.stack.push(Value::type_value(chunk.get_type(operand).clone()));
            }

            // ── Objects & Arrays ─────────────────────────
            OpCode::NewObj => {
                let args = self.pop_n(operand2 as usize);
                let target = chunk.get_type(operand);
                let constructor = target.kind().and_then(|kind| CORE_REGISTRY.get_constructor(kind));
                let Some(constructor) = constructor else {
                    return Err(ScriptError::binder(format!(
                        "'{}' does not contain a constructor that takes {} arguments",
                        target.friendly_name(),
                        operand2
                    )));
                };
                let value = constructor(self.ctx, target, args)?;
                self.stack.push(value);
            }
            OpCode::NewArr => {
                let lengths = self.pop_n(operand2 as usize);
                let array = self.new_array(chunk.get_type(operand).clone(), &lengths)?;
                self.stack.push(array);
            }
            OpCode::NewArrInfer => {
                let items = self.pop_n(operand as usize);
                let array = self.new_inferred_array(items)?;
                self.stack.push(array);
            }
            OpCode::NewAnon => {
                let shape = &chunk.shapes[operand as usize];
                let values = self.pop_n(shape.members.len());
                let args = values
                    .iter()
                    .map(|v| v.type_desc().unwrap_or_else(TypeDesc::object))
                    .collect();
                let desc = TypeDesc::Anonymous {
                    index: shape.index,
                    members: shape.members.clone(),
                    args,
                };
                let members = shape.members.iter().cloned().zip(values).collect();
                self.stack.push(Value::Object(Rc::new(RefCell::new(ObjectData {
                    kind: ObjectKind::Anonymous(desc),
                    members,
                }))));
            }
            OpCode::LdElem => {
                let indices = self.pop_n(operand as usize);
                let object = self.pop();
                let value = self.load_element(&object, &indices)?;
                self.stack.push(value);
            }
            OpCode::StElem => {
                let value = self.pop();
                let indices = self.pop_n(operand as usize);
                let object = self.pop();
                self.store_element(&object, &indices, value)?;
            }
            OpCode::LdFld => {
                let object = self.pop();
                let value = self.load_member(object, chunk.get_name(operand))?;
                self.stack.push(value);
            }
            OpCode::StFld => {
                let value = self.pop();
                let object = self.pop();
                self.store_member(object, chunk.get_name(operand), value)?;
            }
            OpCode::LdSFld => {
                let target = chunk.get_type(operand);
                let name = chunk.get_name(operand2);
                let getter = target.kind().and_then(|kind| CORE_REGISTRY.get_property(kind, name));
                let Some(getter) = getter else {
                    return Err(ScriptError::binder(format!(
                        "'{}' does not contain a definition for '{}'",
                        target.full_name(),
                        name
                    )));
                };
                let value = getter(self.ctx, Value::Null)?;
                self.stack.push(value);
            }

            // ── Calls ────────────────────────────────────
            OpCode::Call => {
                let args = self.pop_n(operand2 as usize);
                self.push_frame(operand as usize, args)?;
            }
            OpCode::CallStatic => {
                let mut args = self.pop_n(operand3 as usize);
                let target = chunk.get_type(operand);
                let name = chunk.get_name(operand2);
                let Some(kind) = target.kind() else {
                    return Err(binder_missing_member(&Value::type_value(target.clone()), name));
                };
                let value = match CORE_REGISTRY.get_method(kind, name) {
                    Some(func) => func(self.ctx, Value::Null, args)?,
                    None => match CORE_REGISTRY.extension_method(name) {
                        Some(func) if kind == TypeKind::Enumerable && !args.is_empty() => {
                            let this = args.remove(0);
                            if this.is_null() {
                                return Err(ScriptError::argument_null("source"));
                            }
                            func(self.ctx, this, args)?
                        }
                        _ => {
                            return Err(ScriptError::binder(format!(
                                "No overload for method '{}' takes {} arguments",
                                name, operand3
                            )))
                        }
                    },
                };
                self.stack.push(value);
            }
            OpCode::CallVirt => {
                let args = self.pop_n(operand2 as usize);
                let object = self.pop();
                let name = chunk.get_name(operand);
                if object.is_null() {
                    return Err(ScriptError::null_reference());
                }
                let Some(func) = CORE_REGISTRY.find_instance_method(&object, name) else {
                    return Err(binder_missing_member(&object, name));
                };
                let value = func(self.ctx, object, args)?;
                self.stack.push(value);
            }

            // ── Exceptions ───────────────────────────────
            OpCode::Throw => {
                return Err(match self.pop() {
                    Value::Exception(data) => ScriptError(data),
                    Value::Null => ScriptError::null_reference(),
                    other => ScriptError::binder(format!(
                        "The type caught or thrown must be derived from System.Exception, not '{}'",
                        other.friendly_type_name()
                    )),
                });
            }
            OpCode::EnterTry => {
                let stack_len = self.stack.len();
                self.frame()?.handlers.push(Handler {
                    target: operand as usize,
                    stack_len,
                });
            }
            OpCode::LeaveTry => {
                self.frame()?.handlers.pop();
            }

            // ── Iteration ────────────────────────────────
            OpCode::GetIter => {
                let collection = self.pop();
                let iterator = Self::iterator_of(collection)?;
                self.stack.push(Value::Iterator(Rc::new(RefCell::new(iterator))));
            }
            OpCode::IterNext => {
                let next = match self.pop() {
                    Value::Iterator(state) => state.borrow_mut().next()?,
                    _ => return Err(ScriptError::invalid_operation("Enumerator expected")),
                };
                match next {
                    Some(value) => self.stack.push(value),
                    None => self.frame()?.ip = operand as usize,
                }
            }

            OpCode::Ret => return self.ret(),
        }
        Ok(None)
    }

    fn ret(&mut self) -> Result<Option<Value>, ScriptError> {
        let value = self.pop();
        let Some(frame) = self.frames.pop() else {
            return Ok(Some(value));
        };
        self.stack.truncate(frame.stack_base);
        if self.frames.is_empty() {
            return Ok(Some(value));
        }
        self.stack.push(value);
        Ok(None)
    }

    // ── Arrays ───────────────────────────────────────────────

    fn new_array(&self, element: TypeDesc, lengths: &[Value]) -> Result<Value, ScriptError> {
        let mut dims = Vec::with_capacity(lengths.len());
        let mut total: usize = 1;
        for length in lengths {
            let n = to_long("array size", length)?;
            if n < 0 {
                return Err(ScriptError::overflow());
            }
            total = total
                .checked_mul(n as usize)
                .ok_or_else(|| ScriptError::out_of_memory("array"))?;
            dims.push(n as usize);
        }
        self.ctx.check_len(total, "array")?;
        Ok(Value::Array(Rc::new(RefCell::new(ArrayData::new(element, dims)))))
    }

    /// `new[] { ... }`: the element type is the item type every other item
    /// converts to.
    fn new_inferred_array(&self, items: Vec<Value>) -> Result<Value, ScriptError> {
        let mut candidates: Vec<TypeDesc> = vec![];
        for desc in items.iter().filter_map(Value::type_desc) {
            if !candidates.contains(&desc) {
                candidates.push(desc);
            }
        }
        let best = candidates.into_iter().find(|candidate| {
            items
                .iter()
                .all(|item| implicit_convert(item.clone(), candidate).is_ok())
        });
        let Some(element) = best else {
            return Err(ScriptError::binder("No best type found for implicitly-typed array"));
        };
        let mut converted = Vec::with_capacity(items.len());
        for item in items {
            converted.push(implicit_convert(item, &element)?);
        }
        Ok(Value::new_array(element, converted))
    }

    fn load_element(&self, object: &Value, indices: &[Value]) -> Result<Value, ScriptError> {
        match object {
            Value::Null => Err(ScriptError::null_reference()),
            Value::Array(array) => {
                let mut idx = Vec::with_capacity(indices.len());
                for index in indices {
                    idx.push(to_long("index", index)?);
                }
                array.borrow().get(&idx)
            }
            Value::List(list) => {
                let index = Self::single_int(indices)?;
                let list = list.borrow();
                usize::try_from(index)
                    .ok()
                    .and_then(|i| list.items.get(i).cloned())
                    .ok_or_else(|| ScriptError::argument_out_of_range("index"))
            }
            Value::Dictionary(dict) => {
                let key = Self::single(indices)?;
                match dict.borrow().get(key)? {
                    Some(value) => Ok(value),
                    None => Err(ScriptError::key_not_found(&key.to_display_string())),
                }
            }
            Value::String(s) => {
                let index = Self::single_int(indices)?;
                usize::try_from(index)
                    .ok()
                    .and_then(|i| s.chars().nth(i))
                    .map(Value::Char)
                    .ok_or_else(ScriptError::index_out_of_range)
            }
            other => Err(ScriptError::binder(format!(
                "Cannot apply indexing with [] to an expression of type '{}'",
                other.friendly_type_name()
            ))),
        }
    }

    fn store_element(&self, object: &Value, indices: &[Value], value: Value) -> Result<(), ScriptError> {
        match object {
            Value::Null => Err(ScriptError::null_reference()),
            Value::Array(array) => {
                let mut idx = Vec::with_capacity(indices.len());
                for index in indices {
                    idx.push(to_long("index", index)?);
                }
                let element = array.borrow().element.clone();
                let value = implicit_convert(value, &element)?;
                array.borrow_mut().set(&idx, value)
            }
            Value::List(list) => {
                let index = Self::single_int(indices)?;
                let element = list.borrow().element.clone();
                let value = implicit_convert(value, &element)?;
                let mut list = list.borrow_mut();
                let slot = usize::try_from(index)
                    .ok()
                    .filter(|i| *i < list.items.len())
                    .ok_or_else(|| ScriptError::argument_out_of_range("index"))?;
                list.items[slot] = value;
                list.version += 1;
                Ok(())
            }
            Value::Dictionary(dict) => {
                let key = Self::single(indices)?.clone();
                dictionary_insert(&*self.ctx, dict, key, value, true)
            }
            other => Err(ScriptError::binder(format!(
                "Property or indexer '{}.this[]' cannot be assigned to -- it is read only",
                other.friendly_type_name()
            ))),
        }
    }

    fn single(indices: &[Value]) -> Result<&Value, ScriptError> {
        match indices {
            [index] => Ok(index),
            _ => Err(ScriptError::binder(format!(
                "Wrong number of indices inside []; expected 1, got {}",
                indices.len()
            ))),
        }
    }

    fn single_int(indices: &[Value]) -> Result<i32, ScriptError> {
        to_int("index", Self::single(indices)?)
    }

    // ── Members ──────────────────────────────────────────────

    fn load_member(&mut self, object: Value, name: &str) -> Result<Value, ScriptError> {
        if let Value::Object(data) = &object {
            if let Some(value) = data.borrow().get(name) {
                return Ok(value);
            }
        }
        if object.is_null() {
            return Err(ScriptError::null_reference());
        }
        match CORE_REGISTRY.find_instance_property(&object, name) {
            Some(getter) => getter(self.ctx, object),
            None => Err(binder_missing_member(&object, name)),
        }
    }

    fn store_member(&mut self, object: Value, name: &str, value: Value) -> Result<(), ScriptError> {
        match &object {
            Value::Null => Err(ScriptError::null_reference()),
            Value::Object(data) => {
                let mut data = data.borrow_mut();
                if let ObjectKind::Anonymous(desc) = &data.kind {
                    return Err(ScriptError::binder(format!(
                        "Property or indexer '{}.{}' cannot be assigned to -- it is read only",
                        desc.friendly_name(),
                        name
                    )));
                }
                match data.members.iter_mut().find(|(n, _)| n == name) {
                    Some((_, slot)) => *slot = value,
                    None => data.members.push((name.to_string(), value)),
                }
                Ok(())
            }
            _ => match CORE_REGISTRY.find_instance_setter(&object, name) {
                Some(setter) => setter(self.ctx, object, value),
                None => Err(binder_missing_member(&object, name)),
            },
        }
    }

    // ── Iteration ────────────────────────────────────────────

    fn iterator_of(collection: Value) -> Result<IteratorState, ScriptError> {
        Ok(match collection {
            Value::Null => return Err(ScriptError::null_reference()),
            Value::Array(array) => IteratorState::Array { array, index: 0 },
            Value::List(list) => {
                let version = list.borrow().version;
                IteratorState::List {
                    list,
                    index: 0,
                    version,
                }
            }
            Value::Dictionary(dict) => {
                let version = dict.borrow().version;
                IteratorState::Dictionary {
                    dict,
                    index: 0,
                    version,
                }
            }
            Value::String(s) => IteratorState::Chars {
                chars: s.chars().collect(),
                index: 0,
            },
            Value::Sequence(sequence) => IteratorState::Sequence { sequence, index: 0 },
            Value::Object(data) if matches!(data.borrow().kind, ObjectKind::Expando) => {
                let items = data
                    .borrow()
                    .members
                    .iter()
                    .map(|(name, value)| {
                        Value::KeyValuePair(Rc::new(PairData {
                            key: Value::string(name),
                            value: value.clone(),
                            key_type: TypeDesc::of(TypeKind::String),
                            value_type: TypeDesc::object(),
                        }))
                    })
                    .collect();
                IteratorState::Members { items, index: 0 }
            }
            other => {
                let name = other.friendly_type_name();
                return Err(ScriptError::binder(format!(
                    "foreach statement cannot operate on variables of type '{}' because '{}' does not contain a public instance or extension definition for 'GetEnumerator'",
                    name, name
                )));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::context::ExecutionContext;
    use crate::runner::jit::compiler::compile;

    fn run(source: &str) -> Result<Value, ScriptError> {
        let compilation = compile(&ExecutionContext::new(source), "test");
        let unit = compilation.unit.expect("compiles");
        let mut ctx = EvalContext::default();
        execute(&unit, &mut ctx)
    }

    #[test]
    fn arithmetic_and_locals() {
        let value = run("var a = 2; var b = a * 20; b + 2").unwrap();
        assert!(matches!(value, Value::Int(42)));
    }

    #[test]
    fn finally_runs_on_break() {
        let value = run(
            "var log = \"\"; for (var i = 0; i < 3; i++) { try { if (i == 1) break; } finally { log += i; } } log",
        )
        .unwrap();
        assert_eq!(value.to_display_string(), "01");
    }

    #[test]
    fn string_doubling_hits_the_cap() {
        let err = run("var s = \"x\"; for (int i = 0; i < 40; i++) { s = s + s; } s.Length").unwrap_err();
        assert_eq!(err.kind(), TypeKind::OutOfMemoryException);

        let value = run(
            "var s = \"x\"; try { while (true) s += s; } catch (OutOfMemoryException) { s = \"caught\"; } s",
        )
        .unwrap();
        assert_eq!(value.to_display_string(), "caught");
    }

    #[test]
    fn interpolation_is_capped() {
        let compilation = compile(
            &ExecutionContext::new("var s = \"abcd\"; $\"{s}{s}{s}\""),
            "test",
        );
        let unit = compilation.unit.expect("compiles");
        let mut ctx = EvalContext::default();
        ctx.limits.max_string_len = 10;
        let err = execute(&unit, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), TypeKind::OutOfMemoryException);
    }

    #[test]
    fn uncaught_exception_escapes() {
        let err = run("throw new InvalidOperationException(\"nope\");").unwrap_err();
        assert_eq!(err.kind(), TypeKind::InvalidOperationException);
        assert_eq!(err.message(), "nope");
    }

    #[test]
    fn deep_recursion_is_capped() {
        let err = run("int F(int n) { return F(n + 1); } F(0)").unwrap_err();
        assert_eq!(err.kind(), TypeKind::InsufficientExecutionStackException);
    }

    #[test]
    fn negative_array_length_overflows() {
        let err = run("var n = -1; new int[n]").unwrap_err();
        assert_eq!(err.kind(), TypeKind::OverflowException);
    }
}
