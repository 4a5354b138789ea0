use std::rc::Rc;

use thiserror::Error;

use super::types::TypeKind;

/// Payload of a script exception object.
#[derive(Debug, PartialEq)]
pub struct ExceptionData {
    pub kind: TypeKind,
    pub message: String,
}

impl ExceptionData {
    pub fn type_name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn full_type_name(&self) -> String {
        format!("{}.{}", self.kind.namespace(), self.kind.name())
    }
}

/// A script-level exception travelling through native code and the VM.
#[derive(Debug, Clone, Error)]
#[error("{}: {}", .0.kind.name(), .0.message)]
pub struct ScriptError(pub Rc<ExceptionData>);

impl ScriptError {
    pub fn new(kind: TypeKind, message: impl Into<String>) -> Self {
        ScriptError(Rc::new(ExceptionData {
            kind,
            message: message.into(),
        }))
    }

    /// Exception of `kind` carrying its default message.
    pub fn of(kind: TypeKind) -> Self {
        Self::new(kind, kind.default_message())
    }

    pub fn kind(&self) -> TypeKind {
        self.0.kind
    }

    pub fn message(&self) -> &str {
        &self.0.message
    }

    pub fn null_reference() -> Self {
        Self::of(TypeKind::NullReferenceException)
    }

    pub fn divide_by_zero() -> Self {
        Self::of(TypeKind::DivideByZeroException)
    }

    pub fn overflow() -> Self {
        Self::of(TypeKind::OverflowException)
    }

    pub fn overflow_with(message: impl Into<String>) -> Self {
        Self::new(TypeKind::OverflowException, message)
    }

    pub fn arithmetic_nan() -> Self {
        Self::new(
            TypeKind::ArithmeticException,
            "Function does not accept floating point Not-a-Number values.",
        )
    }

    pub fn decimal_overflow() -> Self {
        Self::new(
            TypeKind::OverflowException,
            "Value was either too large or too small for a Decimal.",
        )
    }

    pub fn index_out_of_range() -> Self {
        Self::of(TypeKind::IndexOutOfRangeException)
    }

    pub fn argument_out_of_range(param: &str) -> Self {
        Self::new(
            TypeKind::ArgumentOutOfRangeException,
            format!(
                "{} (Parameter '{}')",
                TypeKind::ArgumentOutOfRangeException.default_message(),
                param
            ),
        )
    }

    pub fn argument_null(param: &str) -> Self {
        Self::new(
            TypeKind::ArgumentNullException,
            format!("Value cannot be null. (Parameter '{}')", param),
        )
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(TypeKind::ArgumentException, message)
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::new(TypeKind::InvalidOperationException, message)
    }

    pub fn invalid_cast(from: &str, to: &str) -> Self {
        Self::new(
            TypeKind::InvalidCastException,
            format!("Unable to cast object of type '{}' to type '{}'.", from, to),
        )
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(TypeKind::FormatException, message)
    }

    pub fn key_not_found(key: &str) -> Self {
        Self::new(
            TypeKind::KeyNotFoundException,
            format!("The given key '{}' was not present in the dictionary.", key),
        )
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new(TypeKind::NotSupportedException, message)
    }

    /// Late-bound member or operator failure.
    pub fn binder(message: impl Into<String>) -> Self {
        Self::new(TypeKind::RuntimeBinderException, message)
    }

    pub fn out_of_memory(what: &str) -> Self {
        Self::new(
            TypeKind::OutOfMemoryException,
            format!("Insufficient memory to allocate {}.", what),
        )
    }
}
