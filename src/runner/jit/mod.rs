//! Bytecode compilation and execution.
//!
//! The pipeline is:
//!
//! ```text
//! source → Parser → AST → Compiler → Unit (bytecode) → VM → Value
//! ```
//!
//! A [`Unit`](bytecode::Unit) holds every method of one compilation: the
//! script or `Main` body, its local functions and, for method units, the
//! implicit constructor. The same unit feeds both the VM and the IL-style
//! listing used by the disassembler.

pub mod bytecode;
pub mod compiler;
pub mod vm;

pub use self::compiler::{compile, Compilation};
pub use self::vm::execute;
