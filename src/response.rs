//! Wire-level error and success envelopes.
//!
//! Handlers surface failures as [`ApiError`] values carrying a machine
//! readable `code` and a human readable `message`. The router encodes them
//! as `{"error": <code>, "message": <message>}` at the handler-chosen (or
//! default) status. Successful data payloads are wrapped in
//! `{"success": true, "data": ...}`.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Structured error returned by handlers and middleware.
///
/// The `code` is a stable machine-readable identifier (`"not_found"`,
/// `"rate_limit_exceeded"`, `"payload_too_large"`, ...); the `message` is
/// free-form text for humans.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Generic error with the default `"error"` code, for failures that
    /// carry no structured identity of their own.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("error", message)
    }
}

/// `{"error": <code>, "message": <message>}`
pub fn error_envelope(err: &ApiError) -> Value {
    json!({
        "error": err.code,
        "message": err.message,
    })
}

/// `{"success": true, "data": <data>}`
pub fn success_envelope(data: Value) -> Value {
    json!({
        "success": true,
        "data": data,
    })
}
