//! Panic recovery.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::core::{Handler, HandlerResult, Middleware};
use crate::context::Context;
use crate::response::ApiError;

/// Catches panics from the rest of the chain and converts them into a
/// `500 internal_error` response, so one faulting handler cannot take the
/// worker down.
pub struct Recovery;

impl Middleware for Recovery {
    fn wrap(&self, next: Handler) -> Handler {
        Arc::new(move |ctx: &mut Context| {
            match panic::catch_unwind(AssertUnwindSafe(|| next(ctx))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    error!(panic = %message, "handler panicked");
                    HandlerResult::error(
                        500,
                        ApiError::new("internal_error", "internal server error"),
                    )
                }
            }
        })
    }
}
