//! The evaluation service layer on top of the interpreter.
//!
//! [`ScriptEngine`] runs the request pipeline (pre-process, compile,
//! execute, capture) and [`DisassemblyEngine`] renders compiled fragments
//! as IL-style listings.

pub mod context;
pub mod disassembly;
pub mod engine;
pub mod preprocess;
pub mod result;

pub use self::context::{CompileOptions, ExecutionContext, OptimizationLevel, SourceKind};
pub use self::disassembly::{DisassemblyEngine, DisassemblyResult};
pub use self::engine::{EngineConfig, ScriptEngine};
pub use self::preprocess::{DirectivePreProcessor, PreProcessor, PreprocessError};
pub use self::result::{Diagnostic, EvaluationResult, Location, Outcome, Severity};
