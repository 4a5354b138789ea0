//! The interpreter: runtime data structures, the bytecode compiler and VM,
//! the native built-in registry and the bundled standard library.

pub mod ds;
pub mod jit;
pub mod plugin;
pub mod std_lib;
