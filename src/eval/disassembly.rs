//! IL-style listings of a code fragment compiled as a method body.

use uuid::Uuid;

use crate::runner::jit::bytecode::MethodKind;
use crate::runner::jit::compile;

use super::context::{CompileOptions, ExecutionContext, OptimizationLevel, SourceKind};
use super::result::Diagnostic;

/// Namespaces imported for every disassembled fragment.
pub const DISASSEMBLY_IMPORTS: [&str; 7] = [
    "System",
    "System.IO",
    "System.Linq",
    "System.Collections.Generic",
    "System.Text",
    "System.Threading",
    "System.Reflection",
];

#[derive(Debug)]
pub enum DisassemblyResult {
    /// One listing per method, in declaration order.
    Listing(Vec<String>),
    EmitFailed(Vec<Diagnostic>),
}

impl DisassemblyResult {
    /// Plain-text rendering returned by the `/il` endpoint.
    pub fn render(&self) -> String {
        match self {
            DisassemblyResult::Listing(methods) => {
                let mut out = String::new();
                for listing in methods {
                    out.push_str(listing);
                    out.push_str("\n\n");
                }
                out
            }
            DisassemblyResult::EmitFailed(diagnostics) => {
                let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
                format!("Emit Failed\n{}\n", messages.join("\n"))
            }
        }
    }
}

/// Compiles fragments as the body of `object Eval.Code.Main()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisassemblyEngine;

impl DisassemblyEngine {
    pub fn disassemble(&self, fragment: &str) -> DisassemblyResult {
        let context = ExecutionContext::new(fragment)
            .with_imports(DISASSEMBLY_IMPORTS)
            .with_options(CompileOptions {
                kind: SourceKind::Method,
                optimization: OptimizationLevel::Debug,
                allow_unsafe: true,
            });
        let compilation = compile(&context, &Uuid::new_v4().to_string());
        match compilation.unit {
            Some(unit) => {
                log::debug!("Disassembling {} methods of {}", unit.methods.len(), unit.name);
                let listings = unit
                    .methods
                    .iter()
                    .enumerate()
                    .filter(|(_, method)| method.kind != MethodKind::Constructor)
                    .map(|(index, _)| unit.disassemble_method(index))
                    .collect();
                DisassemblyResult::Listing(listings)
            }
            None => DisassemblyResult::EmitFailed(compilation.diagnostics),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_return_fails_to_emit() {
        let result = DisassemblyEngine.disassemble("var x = 1;");
        let text = result.render();
        assert!(text.starts_with("Emit Failed\n"));
        assert!(text.contains("not all code paths return a value"));
    }

    #[test]
    fn constructor_is_omitted() {
        let text = DisassemblyEngine.disassemble("return 1;").render();
        assert!(text.contains("Main()"));
        assert!(!text.contains(".ctor()"));
    }
}
