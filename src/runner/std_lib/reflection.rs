//! Reflection handles: `Type`, `Assembly`, `Module` and `RuntimeTypeHandle`.

use std::rc::Rc;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{Library, TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, BuiltInObject, EvalContext};

pub fn register(registry: &mut BuiltInRegistry) {
    let type_object = BuiltInObject::new(TypeKind::Type)
        .add_instance_property("Name", type_name)
        .add_instance_property("FullName", type_full_name)
        .add_instance_property("Namespace", type_namespace)
        .add_instance_property("AssemblyQualifiedName", type_assembly_qualified_name)
        .add_instance_property("Assembly", type_assembly)
        .add_instance_property("Module", type_module)
        .add_instance_property("TypeHandle", type_type_handle)
        .add_instance_property("BaseType", type_base_type)
        .add_instance_property("IsArray", type_is_array)
        .add_instance_property("IsGenericType", type_is_generic_type)
        .add_instance_method("GetElementType", type_get_element_type)
        .add_instance_method("GetGenericArguments", type_get_generic_arguments);
    registry.register_object(type_object);

    let assembly = BuiltInObject::new(TypeKind::Assembly)
        .add_method("GetExecutingAssembly", assembly_get_executing_assembly)
        .add_instance_property("FullName", assembly_full_name)
        .add_instance_property("ManifestModule", assembly_manifest_module)
        .add_instance_property("Location", assembly_location);
    registry.register_object(assembly);

    let module = BuiltInObject::new(TypeKind::Module)
        .add_instance_property("Name", module_name)
        .add_instance_property("ScopeName", module_name)
        .add_instance_property("FullyQualifiedName", module_fully_qualified_name)
        .add_instance_property("Assembly", module_assembly);
    registry.register_object(module);

    let handle = BuiltInObject::new(TypeKind::RuntimeTypeHandle)
        .add_instance_property("Value", handle_value);
    registry.register_object(handle);
}

fn this_type(this: &Value) -> Result<Rc<TypeDesc>, ScriptError> {
    match this {
        Value::Type(t) => Ok(t.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn this_library(this: &Value) -> Result<Library, ScriptError> {
    match this {
        Value::Assembly(lib) | Value::Module(lib) => Ok(*lib),
        _ => Err(ScriptError::null_reference()),
    }
}

fn type_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_type(&this)?.name()))
}

fn type_full_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_type(&this)?.full_name()))
}

fn type_namespace(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    let namespace = this_type(&this)?.namespace();
    Ok(if namespace.is_empty() {
        Value::Null
    } else {
        Value::string(namespace)
    })
}

fn type_assembly_qualified_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_type(&this)?.assembly_qualified_name()))
}

fn type_assembly(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Assembly(this_type(&this)?.library()))
}

fn type_module(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Module(this_type(&this)?.library()))
}

fn type_type_handle(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::TypeHandle(this_type(&this)?))
}

fn type_base_type(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    let base = match &*this_type(&this)? {
        TypeDesc::Named(kind, _) => kind.base().map(TypeDesc::of),
        TypeDesc::Array(..) => Some(TypeDesc::of(TypeKind::Array)),
        TypeDesc::Anonymous { .. } => Some(TypeDesc::object()),
    };
    Ok(base.map_or(Value::Null, Value::type_value))
}

fn type_is_array(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Bool(matches!(&*this_type(&this)?, TypeDesc::Array(..))))
}

fn type_is_generic_type(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Bool(!this_type(&this)?.args().is_empty()))
}

fn type_get_element_type(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetElementType", &args, 0, 0)?;
    Ok(this_type(&this)?
        .element_type()
        .cloned()
        .map_or(Value::Null, Value::type_value))
}

fn type_get_generic_arguments(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetGenericArguments", &args, 0, 0)?;
    let arguments = this_type(&this)?
        .args()
        .iter()
        .cloned()
        .map(Value::type_value)
        .collect();
    Ok(Value::new_array(TypeDesc::of(TypeKind::Type), arguments))
}

fn assembly_get_executing_assembly(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetExecutingAssembly", &args, 0, 0)?;
    Ok(Value::Assembly(Library::Host))
}

fn assembly_full_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_library(&this)?.display_name()))
}

fn assembly_manifest_module(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Module(this_library(&this)?))
}

fn assembly_location(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_library(&this)?.module_path()))
}

fn module_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&format!("{}.dll", this_library(&this)?.assembly_name())))
}

fn module_fully_qualified_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_library(&this)?.module_path()))
}

fn module_assembly(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Assembly(this_library(&this)?))
}

fn handle_value(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    match this {
        Value::TypeHandle(t) => Ok(Value::Long(t.handle_value())),
        _ => Err(ScriptError::null_reference()),
    }
}
