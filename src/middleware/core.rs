//! Handler and middleware contracts.
//!
//! A handler receives the request [`Context`] and returns a
//! [`HandlerResult`] triple: the data to encode, an HTTP status, and an
//! optional error. Status `0` means the handler already wrote the response
//! through the context's writer (HTML, plain text, redirects).
//!
//! A middleware takes the next handler and returns a wrapped handler.
//! Composition happens once, at registration time; the dispatch path calls
//! a single pre-built function and never allocates closures.

use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::response::ApiError;

/// The `(data, status, error)` triple a handler returns.
///
/// Interpretation (performed by the router after the chain returns):
///
/// | status | error | meaning |
/// |---|---|---|
/// | 0 | none | response already written, leave the writer alone |
/// | 0 | some | error at the default 500 |
/// | n | some | error envelope at `n` |
/// | 204 | none | no content |
/// | 200 | none, data none | treated as no content |
/// | n | none, data some | success envelope at `n` |
#[derive(Debug)]
pub struct HandlerResult {
    pub data: Option<Value>,
    pub status: u16,
    pub error: Option<ApiError>,
}

impl HandlerResult {
    /// Success: encode `data` as JSON at `status`.
    pub fn ok(data: Value, status: u16) -> Self {
        Self {
            data: Some(data),
            status,
            error: None,
        }
    }

    /// The response was already written through the context.
    pub fn written() -> Self {
        Self {
            data: None,
            status: 0,
            error: None,
        }
    }

    /// Error envelope at `status` (0 selects the default 500).
    pub fn error(status: u16, error: ApiError) -> Self {
        Self {
            data: None,
            status,
            error: Some(error),
        }
    }

    /// 204 No Content.
    pub fn no_content() -> Self {
        Self {
            data: None,
            status: 204,
            error: None,
        }
    }
}

/// A request handler. Shared so the same handler can live in the static
/// map, the radix tree, and any number of compiled chains.
pub type Handler = Arc<dyn Fn(&mut Context) -> HandlerResult + Send + Sync>;

/// Wrap a closure into a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Middleware contract: take the next handler, return a wrapped handler.
///
/// The wrapped handler may short-circuit by not invoking `next`, and may
/// transform the result on the way out. Stateful middleware (a logger with
/// a sink, a rate limiter with its buckets) owns its state and must be safe
/// under concurrent invocation.
pub trait Middleware: Send + Sync {
    fn wrap(&self, next: Handler) -> Handler;
}

/// Plain closures of shape `Fn(Handler) -> Handler` are middleware too.
impl<F> Middleware for F
where
    F: Fn(Handler) -> Handler + Send + Sync,
{
    fn wrap(&self, next: Handler) -> Handler {
        self(next)
    }
}

/// Fold `middlewares` around `handler`, right to left, so the first entry
/// runs outermost: `compose([A, B], H)` yields `A(B(H))`.
pub fn compose(middlewares: &[Arc<dyn Middleware>], handler: Handler) -> Handler {
    let mut wrapped = handler;
    for mw in middlewares.iter().rev() {
        wrapped = mw.wrap(wrapped);
    }
    wrapped
}
