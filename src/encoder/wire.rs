//! The JSON document returned by `/eval`.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value as Json;

use crate::eval::result::{Diagnostic, EvaluationResult, Outcome};

use super::{rules::Encoder, EncodeError, EncoderLimits};

/// Formats a duration the way a .NET `TimeSpan` prints: `hh:mm:ss.fffffff`,
/// prefixed with `d.` once it spans a day.
pub fn time_span(duration: Duration) -> String {
    let ticks = duration.as_nanos() / 100;
    let fraction = ticks % 10_000_000;
    let total_seconds = ticks / 10_000_000;
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = (total_seconds / 3600) % 24;
    let days = total_seconds / 86_400;
    if days > 0 {
        format!("{}.{:02}:{:02}:{:02}.{:07}", days, hours, minutes, seconds, fraction)
    } else {
        format!("{:02}:{:02}:{:02}.{:07}", hours, minutes, seconds, fraction)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireResult<'a> {
    code: &'a str,
    console_out: &'a str,
    compile_time: String,
    execution_time: String,
    exception: Option<&'a str>,
    exception_type: Option<&'a str>,
    return_value: Json,
    return_type_name: Option<&'a str>,
    diagnostics: &'a [Diagnostic],
}

impl<'a> WireResult<'a> {
    fn base(result: &'a EvaluationResult) -> Self {
        WireResult {
            code: &result.code,
            console_out: &result.console_out,
            compile_time: time_span(result.compile_time),
            execution_time: time_span(result.execution_time),
            exception: None,
            exception_type: None,
            return_value: Json::Null,
            return_type_name: None,
            diagnostics: &[],
        }
    }
}

pub fn to_bytes(result: &EvaluationResult, limits: &EncoderLimits) -> Result<Vec<u8>, EncodeError> {
    let mut wire = WireResult::base(result);
    match &result.outcome {
        Outcome::Success {
            return_value,
            return_type,
        } => {
            wire.return_value = Encoder::new(*limits).encode(return_value)?;
            wire.return_type_name = return_type.as_deref();
        }
        Outcome::Exception {
            exception_type,
            message,
        } => {
            wire.exception = Some(message);
            wire.exception_type = Some(exception_type);
        }
        Outcome::Diagnostics(diagnostics) => wire.diagnostics = diagnostics,
    }
    Ok(serde_json::to_vec(&wire)?)
}

/// The degraded payload: primitives only, so it cannot fail to encode.
pub fn fallback_bytes(result: &EvaluationResult, err: &EncodeError) -> Vec<u8> {
    let message = format!(
        "An exception occurred when serializing the response: {}: {}",
        err.kind(),
        err
    );
    let wire = WireResult {
        exception: Some(&message),
        exception_type: Some(err.kind()),
        ..WireResult::base(result)
    };
    serde_json::to_vec(&wire).unwrap_or_else(|_| b"{}".to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_span_text() {
        assert_eq!(time_span(Duration::from_micros(1_234_567)), "00:00:01.2345670");
        assert_eq!(time_span(Duration::from_secs(3_725)), "01:02:05.0000000");
        assert_eq!(time_span(Duration::from_secs(90_000)), "1.01:00:00.0000000");
    }
}
