//! Per-request compilation context: source text, imports and references.

use std::collections::HashSet;

use crate::runner::ds::types::{Library, TypeKind, ALL_LIBRARIES};

/// Namespaces every script sees without a `using` directive.
pub const DEFAULT_IMPORTS: [&str; 12] = [
    "System",
    "System.Collections.Generic",
    "System.Diagnostics",
    "System.Dynamic",
    "System.IO",
    "System.Linq",
    "System.Numerics",
    "System.Reflection",
    "System.Security.Cryptography",
    "System.Text",
    "System.Threading",
    "Eval",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Top-level statements with an optional trailing expression.
    Script,
    /// The body of `object Main()`.
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationLevel {
    /// Keeps a `nop` at every statement boundary.
    Debug,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    pub kind: SourceKind,
    pub optimization: OptimizationLevel,
    pub allow_unsafe: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            kind: SourceKind::Script,
            optimization: OptimizationLevel::Release,
            allow_unsafe: false,
        }
    }
}

/// Mutable only while pre-processing runs; the compiler borrows it shared.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub source: String,
    pub imports: HashSet<String>,
    pub references: HashSet<Library>,
    pub options: CompileOptions,
}

impl ExecutionContext {
    /// Script context with the default imports and every bundled library.
    pub fn new(source: impl Into<String>) -> Self {
        ExecutionContext {
            source: source.into(),
            imports: DEFAULT_IMPORTS.iter().map(|s| s.to_string()).collect(),
            references: ALL_LIBRARIES.iter().copied().collect(),
            options: CompileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    /// Whether a type written without a namespace resolves to `kind`.
    pub fn imports_type(&self, kind: TypeKind) -> bool {
        self.references(kind) && self.imports.contains(kind.namespace())
    }

    pub fn references(&self, kind: TypeKind) -> bool {
        self.references.contains(&kind.library())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_sees_console_and_linq() {
        let context = ExecutionContext::new("1");
        assert!(context.imports_type(TypeKind::Console));
        assert!(context.imports_type(TypeKind::Enumerable));
        assert!(context.imports_type(TypeKind::Globals));
    }

    #[test]
    fn dropping_a_reference_hides_its_types() {
        let mut context = ExecutionContext::new("1");
        context.references.remove(&Library::Console);
        assert!(!context.imports_type(TypeKind::Console));
        assert!(context.imports_type(TypeKind::Math));
    }
}
