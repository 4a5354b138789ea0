//! Built-in registry: native surfaces of catalog types.

use std::collections::HashMap;

use super::types::{is_enumerable, BuiltInObject, ConstructorFn, GetterFn, NativeFn, SetterFn};
use crate::runner::ds::types::{TypeDesc, TypeKind};
use crate::runner::ds::value::Value;
use crate::runner::std_lib::register_core_builtins;

lazy_static! {
    /// The registry shared by every evaluation. Entries are plain function
    /// pointers, so it is immutable and thread-safe once built.
    pub static ref CORE_REGISTRY: BuiltInRegistry = BuiltInRegistry::with_core();
}

/// Registry for built-in objects, keyed by catalog type.
pub struct BuiltInRegistry {
    objects: HashMap<TypeKind, BuiltInObject>,
}

impl BuiltInRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        BuiltInRegistry {
            objects: HashMap::new(),
        }
    }

    /// Create a registry with every bundled library registered.
    pub fn with_core() -> Self {
        let mut registry = Self::new();
        register_core_builtins(&mut registry);
        log::debug!("Registered {} built-in types", registry.objects.len());
        registry
    }

    /// Register a built-in object, replacing any earlier one for the same type.
    pub fn register_object(&mut self, obj: BuiltInObject) {
        self.objects.insert(obj.kind, obj);
    }

    pub fn get_object(&self, kind: TypeKind) -> Option<&BuiltInObject> {
        self.objects.get(&kind)
    }

    pub fn has_object(&self, kind: TypeKind) -> bool {
        self.objects.contains_key(&kind)
    }

    pub fn get_method(&self, kind: TypeKind, name: &str) -> Option<NativeFn> {
        self.objects.get(&kind).and_then(|o| o.methods.get(name).copied())
    }

    pub fn get_property(&self, kind: TypeKind, name: &str) -> Option<GetterFn> {
        self.objects
            .get(&kind)
            .and_then(|o| o.properties.get(name).copied())
    }

    pub fn has_method(&self, kind: TypeKind, name: &str) -> bool {
        self.get_method(kind, name).is_some()
    }

    /// Whether `Type.name` names a static method or property. Extension
    /// methods on `Enumerable` also count since they may be called statically.
    pub fn has_static_member(&self, kind: TypeKind, name: &str) -> bool {
        self.get_method(kind, name).is_some()
            || self.get_property(kind, name).is_some()
            || (kind == TypeKind::Enumerable && self.extension_method(name).is_some())
    }

    pub fn get_constructor(&self, kind: TypeKind) -> Option<ConstructorFn> {
        self.objects.get(&kind).and_then(|o| o.constructor)
    }

    /// Linq extension methods, registered as instance methods of `Enumerable`.
    pub fn extension_method(&self, name: &str) -> Option<NativeFn> {
        self.objects
            .get(&TypeKind::Enumerable)
            .and_then(|o| o.instance_methods.get(name).copied())
    }

    /// Types whose instance members apply to `value`, most derived first.
    fn member_chain(value: &Value) -> Vec<TypeKind> {
        let mut chain = vec![];
        match value.type_desc() {
            Some(TypeDesc::Named(kind, _)) => {
                let mut current = Some(kind);
                while let Some(k) = current {
                    chain.push(k);
                    current = k.base();
                }
            }
            Some(TypeDesc::Array(..)) => chain.extend([TypeKind::Array, TypeKind::Object]),
            Some(TypeDesc::Anonymous { .. }) => chain.push(TypeKind::Object),
            None => {}
        }
        chain
    }

    /// Resolves `value.name(...)`, falling back to Linq extension methods for
    /// enumerable receivers.
    pub fn find_instance_method(&self, value: &Value, name: &str) -> Option<NativeFn> {
        Self::member_chain(value)
            .into_iter()
            .find_map(|kind| {
                self.objects
                    .get(&kind)
                    .and_then(|o| o.instance_methods.get(name).copied())
            })
            .or_else(|| {
                if is_enumerable(value) {
                    self.extension_method(name)
                } else {
                    None
                }
            })
    }

    pub fn find_instance_property(&self, value: &Value, name: &str) -> Option<GetterFn> {
        Self::member_chain(value).into_iter().find_map(|kind| {
            self.objects
                .get(&kind)
                .and_then(|o| o.instance_properties.get(name).copied())
        })
    }

    pub fn find_instance_setter(&self, value: &Value, name: &str) -> Option<SetterFn> {
        Self::member_chain(value).into_iter().find_map(|kind| {
            self.objects
                .get(&kind)
                .and_then(|o| o.instance_setters.get(name).copied())
        })
    }

    /// Get list of all registered types.
    pub fn object_kinds(&self) -> Vec<TypeKind> {
        self.objects.keys().copied().collect()
    }
}

impl Default for BuiltInRegistry {
    fn default() -> Self {
        Self::with_core()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_members_walk_the_base_chain() {
        let registry = BuiltInRegistry::with_core();
        let error = Value::new_exception(TypeKind::DivideByZeroException, "x".to_string());
        assert!(registry.find_instance_property(&error, "Message").is_some());
        assert!(registry.find_instance_method(&error, "GetType").is_some());
    }

    #[test]
    fn enumerables_see_extension_methods() {
        let registry = BuiltInRegistry::with_core();
        let array = Value::new_array(TypeDesc::of(TypeKind::Int32), vec![Value::Int(1)]);
        assert!(registry.find_instance_method(&array, "Sum").is_some());
        assert!(registry.find_instance_method(&Value::Int(1), "Sum").is_none());
        assert!(registry.has_static_member(TypeKind::Enumerable, "Range"));
        assert!(registry.has_static_member(TypeKind::Enumerable, "Sum"));
    }
}
