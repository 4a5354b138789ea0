//! # cseval - untrusted script evaluation service
//!
//! A self-contained evaluator for short C#-style scripts, hosted over HTTP:
//! - PEG parser producing a typed AST
//! - Compiler to a stack bytecode with compiler diagnostics
//! - Stack VM with a request-scoped console and resource caps
//! - Safe JSON encoding of arbitrary result graphs
//! - IL-style disassembly of method fragments
//! - A lifecycle guard that ends the process when a request runs away
//!
//! ## Quick Start
//!
//! ### Evaluating a script
//!
//! ```
//! use cseval::eval::ScriptEngine;
//! use cseval::runner::ds::value::Value;
//!
//! let engine = ScriptEngine::default();
//! let result = engine.evaluate("Console.WriteLine(\"hi\"); 5");
//! assert_eq!(result.console_out, "hi\n");
//! assert!(matches!(result.return_value(), Some(Value::Int(5))));
//! ```
//!
//! ### Encoding the result
//!
//! ```
//! use cseval::eval::ScriptEngine;
//!
//! let json = ScriptEngine::default().evaluate_to_json("1 + 1");
//! let doc: serde_json::Value = serde_json::from_slice(&json).unwrap();
//! assert_eq!(doc["returnValue"], 2);
//! assert_eq!(doc["returnTypeName"], "int");
//! ```
//!
//! ### Disassembling a fragment
//!
//! ```
//! use cseval::eval::DisassemblyEngine;
//!
//! let listing = DisassemblyEngine.disassemble("return 42;").render();
//! assert!(listing.contains(".method"));
//! ```
//!
//! ## Built-ins
//!
//! The native surface (Console, Math, collections, Linq, reflection, IO) is
//! registered once into the shared [`CORE_REGISTRY`](runner::plugin::registry::CORE_REGISTRY).
//! Each type's statics and instance members live on a
//! [`BuiltInObject`](runner::plugin::types::BuiltInObject); the VM resolves
//! calls against it at run time.
//!
//! ## Architecture
//!
//! - **[`parser`]** - PEG grammar and AST types
//! - **[`runner`]** - Runtime
//!   - **[`runner::ds`]** - Values, types, arrays, decimals and errors
//!   - **[`runner::jit`]** - Compiler, bytecode and VM
//!   - **[`runner::plugin`]** - Built-in registry and native call context
//!   - **[`runner::std_lib`]** - The bundled libraries
//! - **[`eval`]** - Request pipeline, pre-processing and disassembly
//! - **[`encoder`]** - Rule-chain JSON encoder with fallback
//! - **[`guard`]** - Process lifecycle watchdog
//! - **[`server`]** - axum host

#[macro_use]
extern crate lazy_static;

pub mod encoder;
pub mod eval;
pub mod guard;
pub mod parser;
pub mod runner;
pub mod server;
