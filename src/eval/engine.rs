//! The evaluation pipeline: preprocess, compile, execute, report.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use uuid::Uuid;

use crate::encoder::{self, EncoderLimits};
use crate::runner::jit::{compile, execute};
use crate::runner::plugin::types::{EvalContext, Limits};

use super::context::ExecutionContext;
use super::preprocess::{DirectivePreProcessor, PreProcessor};
use super::result::{Diagnostic, EvaluationResult, Outcome};

/// Exception type reported when the interpreter itself fails.
const ENGINE_FAILURE: &str = "ExecutionEngineException";

/// Resource caps applied to every evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Bytes of console output kept per evaluation.
    pub max_console_output: usize,
    pub limits: Limits,
    pub encoder: EncoderLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_console_output: 1024 * 1024,
            limits: Limits::default(),
            encoder: EncoderLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_console_output(mut self, bytes: usize) -> Self {
        self.max_console_output = bytes;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.limits.max_call_depth = depth;
        self
    }

    pub fn with_encoder_limits(mut self, encoder: EncoderLimits) -> Self {
        self.encoder = encoder;
        self
    }
}

/// Compiles and runs untrusted script source. Every call builds a fresh
/// context and console sink, so nothing is shared between evaluations.
pub struct ScriptEngine {
    config: EngineConfig,
    preprocessor: Box<dyn PreProcessor>,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "The interpreter failed unexpectedly".to_string()
    }
}

impl ScriptEngine {
    pub fn new(config: EngineConfig) -> Self {
        ScriptEngine {
            config,
            preprocessor: Box::new(DirectivePreProcessor),
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn PreProcessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluate(&self, source: &str) -> EvaluationResult {
        let mut context = ExecutionContext::new(source);
        let started = Instant::now();
        if let Err(err) = self
            .preprocessor
            .preprocess(&mut context, &mut |message| log::info!("{}", message))
        {
            log::error!("Pre-processing failed: {}", err);
            let elapsed = started.elapsed();
            return EvaluationResult {
                code: source.to_string(),
                console_out: String::new(),
                compile_time: elapsed,
                execution_time: elapsed,
                outcome: Outcome::Diagnostics(vec![Diagnostic::synthesized(
                    "preprocess-error",
                    err.to_string(),
                )]),
            };
        }

        let compile_started = Instant::now();
        let unit_name = format!("cseval-{}", Uuid::new_v4());
        let compilation = match catch_unwind(AssertUnwindSafe(|| compile(&context, &unit_name))) {
            Ok(compilation) => compilation,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Compiler panicked: {}", message);
                let elapsed = compile_started.elapsed();
                return EvaluationResult {
                    code: source.to_string(),
                    console_out: String::new(),
                    compile_time: elapsed,
                    execution_time: elapsed,
                    outcome: Outcome::Diagnostics(vec![Diagnostic::synthesized("internal-error", message)]),
                };
            }
        };
        let compile_time = compile_started.elapsed();
        log::debug!(
            "Compiled {} in {:?} with {} diagnostics",
            unit_name,
            compile_time,
            compilation.diagnostics.len()
        );

        let errors: Vec<Diagnostic> = compilation
            .diagnostics
            .into_iter()
            .filter(Diagnostic::is_error)
            .collect();
        let unit = match compilation.unit {
            Some(unit) if errors.is_empty() => unit,
            _ => {
                return EvaluationResult {
                    code: source.to_string(),
                    console_out: String::new(),
                    compile_time,
                    execution_time: compile_started.elapsed(),
                    outcome: Outcome::Diagnostics(errors),
                };
            }
        };

        let execution_started = Instant::now();
        let mut ctx = EvalContext::new(self.config.max_console_output, self.config.limits);
        let run = catch_unwind(AssertUnwindSafe(|| execute(&unit, &mut ctx)));
        let execution_time = execution_started.elapsed();
        log::debug!("Executed {} in {:?}", unit_name, execution_time);

        let outcome = match run {
            Ok(Ok(value)) => Outcome::Success {
                return_type: value.type_desc().map(|_| value.friendly_type_name()),
                return_value: value,
            },
            Ok(Err(err)) => Outcome::Exception {
                exception_type: err.kind().name().to_string(),
                message: err.message().to_string(),
            },
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("Interpreter panicked: {}", message);
                Outcome::Exception {
                    exception_type: ENGINE_FAILURE.to_string(),
                    message,
                }
            }
        };
        if ctx.console.is_truncated() {
            log::warn!("Console output of {} was truncated", unit_name);
        }

        EvaluationResult {
            code: source.to_string(),
            console_out: ctx.console.take(),
            compile_time,
            execution_time,
            outcome,
        }
    }

    /// Evaluates and encodes the result in one step. Encoding never fails:
    /// an unencodable result is replaced by the fallback payload.
    pub fn evaluate_to_json(&self, source: &str) -> Vec<u8> {
        let result = self.evaluate(source);
        encoder::encode_result(&result, &self.config.encoder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::preprocess::PreprocessError;

    struct Failing;

    impl PreProcessor for Failing {
        fn preprocess(&self, _context: &mut ExecutionContext, _log: &mut dyn FnMut(&str)) -> Result<(), PreprocessError> {
            Err(PreprocessError::UnresolvedReference("Missing".into()))
        }
    }

    #[test]
    fn preprocess_failure_is_a_single_diagnostic() {
        let engine = ScriptEngine::default().with_preprocessor(Box::new(Failing));
        let result = engine.evaluate("1 + 1");
        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "preprocess-error");
        assert_eq!(diagnostics[0].message, "Unable to resolve reference 'Missing'");
        assert_eq!(diagnostics[0].location.end, 0);
    }

    #[test]
    fn warnings_do_not_block_execution() {
        let result = ScriptEngine::default().evaluate("return 1; Console.WriteLine(2);");
        assert!(matches!(result.return_value(), Some(crate::runner::ds::value::Value::Int(1))));
    }

    #[test]
    fn console_is_request_scoped() {
        let engine = ScriptEngine::default();
        let first = engine.evaluate("Console.Write(\"a\");");
        let second = engine.evaluate("Console.Write(\"b\");");
        assert_eq!(first.console_out, "a");
        assert_eq!(second.console_out, "b");
    }
}
