//! Turning a response body into the text shown to the user.

use serde_json::Value;

/// Prefix for error payloads returned by the remote service.
pub const REMOTE_ERROR_PREFIX: &str = "Error: ";
/// Prefix for requests that never produced a usable body.
pub const TRANSPORT_ERROR_PREFIX: &str = "Request failed: ";

/// Renders a parsed response body as answer text.
///
/// A truthy `error` field wins: its `detail` string, else the field itself
/// when it is a string, else the whole body serialized. Without an error the
/// `answer` string is used, falling back to the serialized body.
pub fn render_answer(body: &Value) -> String {
    if let Some(error) = body.get("error").filter(|error| is_truthy(error)) {
        let message = error
            .get("detail")
            .and_then(non_empty_str)
            .or_else(|| non_empty_str(error))
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string());
        return format!("{REMOTE_ERROR_PREFIX}{message}");
    }

    body.get("answer")
        .and_then(non_empty_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// Renders a request that failed before a body could be read.
pub fn render_failure(message: impl std::fmt::Display) -> String {
    format!("{TRANSPORT_ERROR_PREFIX}{message}")
}

fn non_empty_str(value: &Value) -> Option<&str> {
    value.as_str().filter(|s| !s.is_empty())
}

// Browser truthiness: null, false, zero and "" are falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
