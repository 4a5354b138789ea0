//! `System.IO.Directory` and `DirectoryInfo` over the host file system.

use std::path::Path;
use std::rc::Rc;

use crate::runner::ds::error::ScriptError;
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::{normalize_path, DirectoryData, Value};
use crate::runner::plugin::registry::BuiltInRegistry;
use crate::runner::plugin::types::{arg_count, required_str, BuiltInObject, EvalContext};

pub fn register(registry: &mut BuiltInRegistry) {
    let directory = BuiltInObject::new(TypeKind::Directory)
        .add_method("GetCurrentDirectory", directory_get_current_directory)
        .add_method("Exists", directory_exists)
        .add_method("CreateDirectory", directory_create_directory)
        .add_method("GetDirectories", directory_get_directories)
        .add_method("GetFiles", directory_get_files);
    registry.register_object(directory);

    let info = BuiltInObject::new(TypeKind::DirectoryInfo)
        .with_constructor(directory_info_construct)
        .add_instance_property("FullName", directory_info_full_name)
        .add_instance_property("Name", directory_info_name)
        .add_instance_property("Exists", directory_info_exists)
        .add_instance_property("Parent", directory_info_parent)
        .add_instance_method("GetDirectories", directory_info_get_directories);
    registry.register_object(info);
}

fn path_arg(name: &str, value: &Value) -> Result<String, ScriptError> {
    let path = required_str(name, "path", value)?;
    if path.is_empty() {
        return Err(ScriptError::argument(
            "The value cannot be an empty string. (Parameter 'path')",
        ));
    }
    Ok(path)
}

fn not_found(path: &str) -> ScriptError {
    ScriptError::new(
        TypeKind::DirectoryNotFoundException,
        format!("Could not find a part of the path '{}'.", path),
    )
}

/// Sorted full paths of the entries under `path` matching `want_dirs`.
fn list_entries(path: &str, want_dirs: bool) -> Result<Vec<String>, ScriptError> {
    let full = normalize_path(path);
    let entries = std::fs::read_dir(&full).map_err(|_| not_found(&full))?;
    let mut found: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map_or(false, |t| t.is_dir() == want_dirs))
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect();
    found.sort();
    Ok(found)
}

fn string_array(items: Vec<String>) -> Value {
    Value::new_array(
        TypeDesc::of(TypeKind::String),
        items.iter().map(|s| Value::string(s)).collect(),
    )
}

fn directory_get_current_directory(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetCurrentDirectory", &args, 0, 0)?;
    let cwd = std::env::current_dir()
        .map_err(|e| ScriptError::invalid_operation(e.to_string()))?;
    Ok(Value::string(&cwd.to_string_lossy()))
}

fn directory_exists(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("Exists", &args, 1, 1)?;
    let exists = match &args[0] {
        Value::String(s) if !s.is_empty() => Path::new(&normalize_path(s)).is_dir(),
        _ => false,
    };
    Ok(Value::Bool(exists))
}

fn directory_create_directory(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("CreateDirectory", &args, 1, 1)?;
    let path = path_arg("CreateDirectory", &args[0])?;
    std::fs::create_dir_all(normalize_path(&path))
        .map_err(|e| ScriptError::invalid_operation(e.to_string()))?;
    Ok(Value::Directory(Rc::new(DirectoryData::new(&path))))
}

fn directory_get_directories(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetDirectories", &args, 1, 1)?;
    let path = path_arg("GetDirectories", &args[0])?;
    Ok(string_array(list_entries(&path, true)?))
}

fn directory_get_files(_ctx: &mut EvalContext, _this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetFiles", &args, 1, 1)?;
    let path = path_arg("GetFiles", &args[0])?;
    Ok(string_array(list_entries(&path, false)?))
}

fn directory_info_construct(_ctx: &mut EvalContext, _target: &TypeDesc, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("DirectoryInfo", &args, 1, 1)?;
    let path = path_arg("DirectoryInfo", &args[0])?;
    Ok(Value::Directory(Rc::new(DirectoryData::new(&path))))
}

fn this_directory(this: &Value) -> Result<Rc<DirectoryData>, ScriptError> {
    match this {
        Value::Directory(d) => Ok(d.clone()),
        _ => Err(ScriptError::null_reference()),
    }
}

fn directory_info_full_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_directory(&this)?.full_name))
}

fn directory_info_name(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::string(&this_directory(&this)?.name()))
}

fn directory_info_exists(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    Ok(Value::Bool(Path::new(&this_directory(&this)?.full_name).is_dir()))
}

fn directory_info_parent(_ctx: &mut EvalContext, this: Value) -> Result<Value, ScriptError> {
    let dir = this_directory(&this)?;
    let trimmed = dir.full_name.trim_end_matches('/');
    Ok(match trimmed.rsplit_once('/') {
        Some((parent, name)) if !name.is_empty() => {
            let parent = if parent.is_empty() { "/" } else { parent };
            Value::Directory(Rc::new(DirectoryData::new(parent)))
        }
        _ => Value::Null,
    })
}

fn directory_info_get_directories(_ctx: &mut EvalContext, this: Value, args: Vec<Value>) -> Result<Value, ScriptError> {
    arg_count("GetDirectories", &args, 0, 0)?;
    let dir = this_directory(&this)?;
    let children = list_entries(&dir.full_name, true)?
        .iter()
        .map(|p| Value::Directory(Rc::new(DirectoryData::new(p))))
        .collect();
    Ok(Value::new_array(TypeDesc::of(TypeKind::DirectoryInfo), children))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_of_nested_directory() {
        let mut ctx = EvalContext::default();
        let dir = Value::Directory(Rc::new(DirectoryData::new("/tmp/a/b")));
        let parent = directory_info_parent(&mut ctx, dir).unwrap();
        assert_eq!(parent.to_display_string(), "/tmp/a");
        let root = Value::Directory(Rc::new(DirectoryData::new("/")));
        assert!(directory_info_parent(&mut ctx, root).unwrap().is_null());
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = list_entries("/definitely/not/here", true).unwrap_err();
        assert_eq!(err.kind(), TypeKind::DirectoryNotFoundException);
    }
}
