//! Pre-processing of the raw source before compilation.
//!
//! Directives at the top of a submission adjust the compilation
//! environment: `using X;` adds an import and `#r "Library"` adds a
//! reference. Handled lines are blanked so diagnostic positions still point
//! at the original text.

use thiserror::Error;

use crate::runner::ds::types::Library;

use super::context::ExecutionContext;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("Unable to resolve reference '{0}'")]
    UnresolvedReference(String),
    #[error("Malformed directive: {0}")]
    MalformedDirective(String),
}

/// Rewrites an [`ExecutionContext`] before it is compiled. `log` receives a
/// human-readable line for every action taken.
pub trait PreProcessor: Send + Sync {
    fn preprocess(&self, context: &mut ExecutionContext, log: &mut dyn FnMut(&str)) -> Result<(), PreprocessError>;
}

/// Handles leading `using` and `#r` directives.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectivePreProcessor;

enum Directive {
    Using(String),
    Reference(String),
}

fn parse_directive(line: &str) -> Result<Option<Directive>, PreprocessError> {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix("#r") {
        let target = rest.trim();
        let unquoted = target
            .strip_prefix('"')
            .and_then(|t| t.strip_suffix('"'))
            .ok_or_else(|| PreprocessError::MalformedDirective(trimmed.to_string()))?;
        return Ok(Some(Directive::Reference(unquoted.to_string())));
    }
    if let Some(rest) = trimmed.strip_prefix("using ") {
        // `using var x = ...;` and `using (...)` are statements
        let Some(namespace) = rest.trim().strip_suffix(';') else {
            return Ok(None);
        };
        let namespace = namespace.trim();
        let is_namespace = !namespace.is_empty()
            && namespace
                .split('.')
                .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
        if is_namespace {
            return Ok(Some(Directive::Using(namespace.to_string())));
        }
    }
    Ok(None)
}

impl PreProcessor for DirectivePreProcessor {
    fn preprocess(&self, context: &mut ExecutionContext, log: &mut dyn FnMut(&str)) -> Result<(), PreprocessError> {
        let mut lines: Vec<&str> = context.source.split('\n').collect();
        let mut changed = false;
        for line in lines.iter_mut() {
            if line.trim().is_empty() || line.trim_start().starts_with("//") {
                continue;
            }
            match parse_directive(line)? {
                Some(Directive::Using(namespace)) => {
                    log(&format!("Importing namespace {}", namespace));
                    context.imports.insert(namespace);
                }
                Some(Directive::Reference(name)) => {
                    let library = Library::from_reference(&name)
                        .ok_or_else(|| PreprocessError::UnresolvedReference(name.clone()))?;
                    log(&format!("Referencing {} for '{}'", library.assembly_name(), name));
                    context.references.insert(library);
                }
                None => break,
            }
            *line = "";
            changed = true;
        }
        if changed {
            context.source = lines.join("\n");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> (Result<(), PreprocessError>, ExecutionContext, Vec<String>) {
        let mut context = ExecutionContext::new(source).with_imports(["System"]);
        let mut messages = vec![];
        let result = DirectivePreProcessor.preprocess(&mut context, &mut |m| messages.push(m.to_string()));
        (result, context, messages)
    }

    #[test]
    fn leading_usings_become_imports() {
        let (result, context, messages) = run("using System.Text;\nusing System.Linq;\nvar x = 1;\nusing Foo;");
        assert!(result.is_ok());
        assert!(context.imports.contains("System.Text"));
        assert!(context.imports.contains("System.Linq"));
        assert!(!context.imports.contains("Foo"));
        assert_eq!(context.source, "\n\nvar x = 1;\nusing Foo;");
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn unknown_reference_fails() {
        let (result, _, _) = run("#r \"Nope.Library\"\n1");
        assert_eq!(
            result.unwrap_err().to_string(),
            "Unable to resolve reference 'Nope.Library'"
        );
    }

    #[test]
    fn known_reference_is_added() {
        let mut context = ExecutionContext::new("#r \"System.Linq.dll\"\n1");
        context.references.clear();
        DirectivePreProcessor.preprocess(&mut context, &mut |_| {}).unwrap();
        assert!(context.references.contains(&Library::Linq));
    }

    #[test]
    fn using_statements_are_left_alone() {
        let (result, context, _) = run("using var x = Foo();");
        assert!(result.is_ok());
        assert_eq!(context.source, "using var x = Foo();");
    }
}
