//! Core built-ins registration.
//!
//! This module provides the function to register every bundled library
//! with the BuiltInRegistry.

use crate::runner::plugin::registry::BuiltInRegistry;

use super::collections;
use super::console;
use super::encoding;
use super::error;
use super::io;
use super::linq;
use super::math;
use super::numerics;
use super::object;
use super::process;
use super::reflection;
use super::string;

/// Register all core built-in objects with the registry.
pub fn register_core_builtins(registry: &mut BuiltInRegistry) {
    // Object first: later types may replace its members for their own kind
    object::register(registry);
    numerics::register(registry);
    string::register(registry);
    math::register(registry);
    collections::register(registry);
    linq::register(registry);
    reflection::register(registry);
    io::register(registry);
    encoding::register(registry);
    error::register(registry);
    console::register(registry);
    process::register(registry);
}
