//! Request deadlines.
//!
//! The pooled context is borrowed for exactly one handler invocation and
//! must not cross to another task, so this middleware cannot race the
//! handler against a timer the way a spawn-and-select implementation
//! would. Instead it propagates a deadline through the context — handlers
//! can poll `ctx.deadline()` and bail out early — and replaces the
//! response of an overrunning handler with `504 timeout`, provided the
//! handler has not already written.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use super::core::{Handler, HandlerResult, Middleware};
use crate::context::Context;
use crate::response::ApiError;

pub struct Timeout {
    timeout: Duration,
    skip_paths: Vec<String>,
}

impl Timeout {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            skip_paths: Vec::new(),
        }
    }

    /// Paths exempt from the deadline (long-polling, streaming).
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

impl Middleware for Timeout {
    fn wrap(&self, next: Handler) -> Handler {
        let timeout = self.timeout;
        let skip = self.skip_paths.clone();
        Arc::new(move |ctx: &mut Context| {
            if skip.iter().any(|p| p == &ctx.request.path) {
                return next(ctx);
            }
            let deadline = Instant::now() + timeout;
            ctx.set_deadline(deadline);

            let result = next(ctx);

            if Instant::now() > deadline && !ctx.writer.is_written() {
                warn!(path = %ctx.request.path, timeout_ms = timeout.as_millis() as u64, "handler exceeded deadline");
                return HandlerResult::error(
                    504,
                    ApiError::new("timeout", "request timeout exceeded"),
                );
            }
            result
        })
    }
}
