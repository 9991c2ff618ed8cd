//! Request body size limits.
//!
//! Oversized bodies short-circuit the chain with `413 payload_too_large`.
//! Only methods that carry bodies (POST, PUT, PATCH) are checked; other
//! methods and configured skip paths pass straight through.

use std::sync::Arc;

use http::Method;
use thiserror::Error;

use super::core::{Handler, HandlerResult, Middleware};
use crate::context::Context;
use crate::response::ApiError;

pub const B: i64 = 1;
pub const KB: i64 = 1024 * B;
pub const MB: i64 = 1024 * KB;
pub const GB: i64 = 1024 * MB;

/// Sensible cap for standard JSON APIs.
pub const DEFAULT_API_LIMIT: i64 = MB;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseSizeError {
    #[error("invalid size format: {0:?}")]
    InvalidFormat(String),
    #[error("unknown unit {0:?} (use B, KB, MB, or GB)")]
    UnknownUnit(String),
}

/// Body-size-limit middleware.
///
/// ```ignore
/// router.use_middleware([BodyLimit::new(middleware::DEFAULT_API_LIMIT).into_arc()]);
/// let uploads = router.group_with("/uploads", vec![BodyLimit::new(100 * MB).into_arc()]);
/// ```
pub struct BodyLimit {
    max_bytes: i64,
    error_message: String,
    skip_paths: Vec<String>,
}

impl BodyLimit {
    /// # Panics
    ///
    /// Panics if `max_bytes` is not positive.
    pub fn new(max_bytes: i64) -> Self {
        assert!(max_bytes > 0, "max_bytes must be positive");
        Self {
            max_bytes,
            error_message: format!(
                "request body too large, maximum size is {}",
                format_bytes(max_bytes)
            ),
            skip_paths: Vec::new(),
        }
    }

    /// Parse a human-readable size such as `"1MB"` or `"2.5GB"`.
    pub fn from_size(size: &str) -> Result<Self, ParseSizeError> {
        Ok(Self::new(parse_size(size)?))
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Paths exempt from the limit (health checks, metrics).
    pub fn with_skip_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_arc(self) -> Arc<dyn Middleware> {
        Arc::new(self)
    }
}

impl Middleware for BodyLimit {
    fn wrap(&self, next: Handler) -> Handler {
        let max = self.max_bytes;
        let message = self.error_message.clone();
        let skip = self.skip_paths.clone();
        Arc::new(move |ctx: &mut Context| {
            if skip.iter().any(|p| p == &ctx.request.path) {
                return next(ctx);
            }
            let m = &ctx.request.method;
            if *m != Method::POST && *m != Method::PUT && *m != Method::PATCH {
                return next(ctx);
            }
            if ctx.request.body.len() as i64 > max {
                return HandlerResult::error(
                    413,
                    ApiError::new("payload_too_large", message.clone()),
                );
            }
            next(ctx)
        })
    }
}

/// Convert a size string to bytes. Supports `B`, `KB`, `MB`, `GB`
/// (case-insensitive, `K`/`M`/`G` accepted) and decimals like `1.5MB`.
pub fn parse_size(size: &str) -> Result<i64, ParseSizeError> {
    let size = size.trim().to_ascii_uppercase();

    let split = size
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(size.len());
    let (number, unit) = size.split_at(split);
    if number.is_empty() {
        return Err(ParseSizeError::InvalidFormat(size.clone()));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| ParseSizeError::InvalidFormat(size.clone()))?;

    let multiplier = match unit {
        "" | "B" => B,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        other => return Err(ParseSizeError::UnknownUnit(other.to_string())),
    };
    Ok((value * multiplier as f64) as i64)
}

/// Human-readable rendering of a byte count.
pub fn format_bytes(bytes: i64) -> String {
    if bytes >= GB {
        format!("{:.2}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024"), Ok(1024));
        assert_eq!(parse_size("1KB"), Ok(KB));
        assert_eq!(parse_size("10mb"), Ok(10 * MB));
        assert_eq!(parse_size("2.5GB"), Ok((2.5 * GB as f64) as i64));
        assert_eq!(parse_size(" 500 "), Ok(500));
        assert!(matches!(
            parse_size("MB"),
            Err(ParseSizeError::InvalidFormat(_))
        ));
        assert!(matches!(
            parse_size("1TB"),
            Err(ParseSizeError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(KB), "1.00KB");
        assert_eq!(format_bytes(5 * MB), "5.00MB");
        assert_eq!(format_bytes(2 * GB), "2.00GB");
    }
}
