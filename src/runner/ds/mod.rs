//! Runtime data structures: values, types, arrays, decimals and errors.

pub mod array;
pub mod decimal;
pub mod error;
pub mod operations;
pub mod types;
pub mod value;
