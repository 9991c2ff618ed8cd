//! Route objects and their documentation metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use http::Method;
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::middleware::{Handler, Middleware};

/// Documentation metadata attached to a route for tooling that walks the
/// routing table read-only (OpenAPI generators and the like). The core
/// never reads it during dispatch.
#[derive(Debug, Clone, Default)]
pub struct RouteMetadata {
    pub summary: String,
    pub description: String,
    pub tags: Vec<String>,
    pub operation_id: String,
    /// JSON-schema handle for the request body, if documented.
    pub request_schema: Option<Value>,
    /// Example responses by status code.
    pub response_examples: HashMap<u16, Value>,
}

/// A registered route. Immutable after creation: the handler, pattern and
/// middleware list never change, and metadata can be attached exactly once.
///
/// Identity is the `Arc` pointer — two routes registered with equal
/// patterns are still distinct, which is what keys the compiled-chain map.
pub struct Route {
    method: Method,
    pattern: String,
    handler: Handler,
    middlewares: Vec<Arc<dyn Middleware>>,
    metadata: OnceCell<RouteMetadata>,
}

impl Route {
    pub(crate) fn new(
        method: Method,
        pattern: String,
        handler: Handler,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            method,
            pattern,
            handler,
            middlewares,
            metadata: OnceCell::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn metadata(&self) -> Option<&RouteMetadata> {
        self.metadata.get()
    }

    /// One-shot metadata attach. Returns false if metadata was already set.
    pub(crate) fn attach_metadata(&self, metadata: RouteMetadata) -> bool {
        self.metadata.set(metadata).is_ok()
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }

    pub(crate) fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.middlewares
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .finish()
    }
}
