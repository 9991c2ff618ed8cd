//! Structured request logging.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use super::core::{Handler, Middleware};
use crate::context::Context;

/// Logs one line per request with method, path, effective status and
/// latency. Register it first so it observes everything, 404s included.
pub struct RequestLogger;

impl Middleware for RequestLogger {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |ctx: &mut Context| {
            let start = Instant::now();
            let method = ctx.request.method.clone();
            let path = ctx.request.path.clone();

            let result = next(ctx);

            let status = if result.status != 0 {
                result.status
            } else if result.error.is_some() {
                500
            } else if ctx.writer.is_written() {
                ctx.writer.status()
            } else {
                200
            };
            info!(
                method = %method,
                path = %path,
                status,
                latency_ms = start.elapsed().as_millis() as u64,
                "request complete"
            );
            result
        })
    }
}
