//! Native built-ins.
//!
//! Every catalog type with behaviour (statics, instance members, a
//! constructor) has one [`BuiltInObject`](types::BuiltInObject) describing it.
//! The std_lib modules build these objects and register them into a
//! [`BuiltInRegistry`](registry::BuiltInRegistry); the VM consults the shared
//! [`CORE_REGISTRY`](registry::CORE_REGISTRY) when it dispatches calls.
//!
//! ```text
//! Member lookup for a receiver value:
//! 1. Anonymous / expando members
//! 2. Instance members of the runtime type, then of each base type
//! 3. Linq extension methods when the receiver is enumerable
//! ```
//!
//! Native functions receive an [`EvalContext`](types::EvalContext) which
//! carries the request-scoped console sink and the resource limits.

pub mod registry;
pub mod types;
