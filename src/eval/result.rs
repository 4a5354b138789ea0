//! Evaluation outcomes and compiler diagnostics.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::parser::ast::Meta;
use crate::runner::ds::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Source span of a diagnostic. Lines and columns are zero based; a
/// synthesized diagnostic has an all-zero location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub start: usize,
    pub end: usize,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl From<&Meta> for Location {
    fn from(meta: &Meta) -> Self {
        Location {
            start: meta.start_index,
            end: meta.end_index,
            start_line: meta.start_line.saturating_sub(1),
            start_column: meta.start_column.saturating_sub(1),
            end_line: meta.end_line.saturating_sub(1),
            end_column: meta.end_column.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub location: Location,
}

impl Diagnostic {
    pub fn error(id: impl Into<String>, message: impl Into<String>, meta: &Meta) -> Self {
        Diagnostic {
            id: id.into(),
            message: message.into(),
            severity: Severity::Error,
            location: Location::from(meta),
        }
    }

    pub fn warning(id: impl Into<String>, message: impl Into<String>, meta: &Meta) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(id, message, meta)
        }
    }

    /// A diagnostic raised outside the compiler, with an empty location.
    pub fn synthesized(id: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic {
            id: id.into(),
            message: message.into(),
            severity: Severity::Error,
            location: Location::default(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{}): {} {}: {}",
            self.location.start_line + 1,
            self.location.start_column + 1,
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Info => "info",
            },
            self.id,
            self.message
        )
    }
}

/// Exactly one of these is reported per evaluation.
#[derive(Debug)]
pub enum Outcome {
    /// `return_type` is `None` when the script produced no value.
    Success {
        return_value: Value,
        return_type: Option<String>,
    },
    Exception {
        exception_type: String,
        message: String,
    },
    Diagnostics(Vec<Diagnostic>),
}

#[derive(Debug)]
pub struct EvaluationResult {
    pub code: String,
    pub console_out: String,
    pub compile_time: Duration,
    pub execution_time: Duration,
    pub outcome: Outcome,
}

impl EvaluationResult {
    pub fn return_value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Success { return_value, .. } => Some(return_value),
            _ => None,
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        match &self.outcome {
            Outcome::Diagnostics(diagnostics) => diagnostics,
            _ => &[],
        }
    }

    pub fn exception(&self) -> Option<(&str, &str)> {
        match &self.outcome {
            Outcome::Exception {
                exception_type,
                message,
            } => Some((exception_type, message)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_are_zero_based() {
        let meta = Meta {
            start_index: 4,
            end_index: 6,
            start_line: 2,
            start_column: 3,
            end_line: 2,
            end_column: 5,
        };
        let location = Location::from(&meta);
        assert_eq!((location.start_line, location.start_column), (1, 2));
        let diagnostic = Diagnostic::error("E0103", "missing", &meta);
        assert_eq!(diagnostic.to_string(), "(2,3): error E0103: missing");
    }
}
