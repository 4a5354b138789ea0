//! Standard library built-in objects.
//!
//! This module contains the native surface of the bundled libraries:
//! Console, Math, string, numerics, collections, Linq, reflection, IO,
//! encoding, exceptions and the host globals.

pub mod core;
pub mod collections;
pub mod console;
pub mod encoding;
pub mod error;
pub mod io;
pub mod linq;
pub mod math;
pub mod numerics;
pub mod object;
pub mod process;
pub mod reflection;
pub mod string;

pub use core::register_core_builtins;
