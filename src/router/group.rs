//! Route groups: registration-time prefix and shared-middleware builders.
//!
//! A group holds no routing state. It concatenates its prefix onto each
//! registered path and prepends its shared middleware to the route's own
//! list before delegating to the router, then disappears — groups are not
//! present in the routing table.

use std::sync::Arc;

use http::Method;

use super::core::{RouteError, Router};
use crate::middleware::{Handler, Middleware};

pub struct Group<'r> {
    router: &'r Router,
    prefix: String,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl<'r> Group<'r> {
    pub(crate) fn new(
        router: &'r Router,
        prefix: String,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        Self {
            router,
            prefix,
            middlewares,
        }
    }

    /// Append middleware shared by every route registered through this
    /// group from now on.
    pub fn use_middleware<I>(&mut self, middleware: I)
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        self.middlewares.extend(middleware);
    }

    pub fn add_route(
        &self,
        method: Method,
        path: &str,
        handler: Handler,
    ) -> Result<(), RouteError> {
        self.add_route_with(method, path, handler, Vec::new())
    }

    /// Register `prefix + path` with the group's middleware running before
    /// the route's own.
    pub fn add_route_with(
        &self,
        method: Method,
        path: &str,
        handler: Handler,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouteError> {
        let full_path = format!("{}{}", self.prefix, path);
        let mut all = self.middlewares.clone();
        all.extend(middleware);
        self.router.add_route_with(method, &full_path, handler, all)
    }

    /// Nest a group: prefixes concatenate, shared middleware concatenates
    /// outer-first.
    pub fn group(&self, prefix: impl Into<String>) -> Group<'r> {
        self.group_with(prefix, Vec::new())
    }

    pub fn group_with(
        &self,
        prefix: impl Into<String>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Group<'r> {
        let mut all = self.middlewares.clone();
        all.extend(middleware);
        Group {
            router: self.router,
            prefix: format!("{}{}", self.prefix, prefix.into()),
            middlewares: all,
        }
    }
}
