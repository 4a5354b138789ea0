//! Safe JSON encoding of evaluation results.
//!
//! Script values are attacker-controlled, so encoding is bounded in depth
//! and node count and never fails the request: any error swaps the payload
//! for a primitives-only fallback that reports what went wrong.

pub mod rules;
pub mod wire;

use serde_json::Value as Json;
use thiserror::Error;

use crate::eval::result::EvaluationResult;
use crate::runner::ds::value::Value;

pub use rules::{Rule, RULE_CHAIN};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("{0}")]
    NotSupported(String),
    #[error("The object graph exceeds the maximum allowed depth of {0}.")]
    TooDeep(usize),
    #[error("The object graph exceeds the maximum allowed node count of {0}.")]
    TooManyNodes(usize),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EncodeError {
    /// Exception type name reported in the fallback payload.
    pub fn kind(&self) -> &'static str {
        match self {
            EncodeError::NotSupported(_) => "NotSupportedException",
            EncodeError::TooDeep(_) | EncodeError::TooManyNodes(_) | EncodeError::Json(_) => "JsonException",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderLimits {
    pub max_depth: usize,
    pub max_nodes: usize,
}

impl Default for EncoderLimits {
    fn default() -> Self {
        EncoderLimits {
            max_depth: 256,
            max_nodes: 100_000,
        }
    }
}

/// Encodes a single script value.
pub fn encode_value(value: &Value, limits: &EncoderLimits) -> Result<Json, EncodeError> {
    rules::Encoder::new(*limits).encode(value)
}

/// Encodes a whole result. Always produces a document.
pub fn encode_result(result: &EvaluationResult, limits: &EncoderLimits) -> Vec<u8> {
    match wire::to_bytes(result, limits) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("Falling back after result encoding failed: {}: {}", err.kind(), err);
            wire::fallback_bytes(result, &err)
        }
    }
}
