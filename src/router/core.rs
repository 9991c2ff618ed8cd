//! Router: lock-free dispatch over atomically swapped immutable snapshots.
//!
//! Reads never lock. A dispatch performs one atomic load of the table
//! pointer and holds that snapshot for the rest of the request; a snapshot
//! that becomes stale mid-request stays valid until the request drops it.
//!
//! Writes (route registration, global middleware changes, 404 replacement,
//! cleanup registration) serialize on a single mutex, build a complete new
//! table, and publish it with one atomic store. Readers never observe a
//! partially constructed table.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use http::Method;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::group::Group;
use super::radix::Tree;
use super::route::{Route, RouteMetadata};
use super::table::{build_all_chains, build_chain, is_static_pattern, ChainKey, RoutingTable};
use crate::context::Context;
use crate::middleware::{handler, Handler, HandlerResult, Middleware};
use crate::response::{error_envelope, success_envelope, ApiError};

/// Registration-time pattern errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// A `:` or `*` segment without a capture name.
    #[error("capture segment has no name in pattern {0:?}")]
    EmptyCapture(String),
    /// A `*name` segment that is not the final segment.
    #[error("wildcard must be the final segment in pattern {0:?}")]
    WildcardNotLast(String),
}

/// HTTP router with pre-compiled middleware chains.
pub struct Router {
    table: ArcSwap<RoutingTable>,
    // Serializes all table writers; also owns the shutdown callbacks that
    // middleware registers (rate-limiter reapers and the like).
    write: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        let not_found = Arc::new(Route::new(
            Method::GET,
            String::new(),
            handler(|_ctx| {
                HandlerResult::error(404, ApiError::new("not_found", "route not found"))
            }),
            Vec::new(),
        ));
        Self {
            table: ArcSwap::from_pointee(RoutingTable::initial(not_found)),
            write: Mutex::new(Vec::new()),
        }
    }

    /// Register a route. See [`Router::add_route_with`].
    pub fn add_route(
        &self,
        method: Method,
        pattern: &str,
        handler: Handler,
    ) -> Result<(), RouteError> {
        self.add_route_with(method, pattern, handler, Vec::new())
    }

    /// Register a route with route-specific middleware.
    ///
    /// The new route's chain is compiled here, once; sibling routes keep
    /// their existing chains by reference. Re-registering an existing
    /// `(method, pattern)` is last-write-wins and evicts the replaced
    /// route's chain from the new snapshot.
    pub fn add_route_with(
        &self,
        method: Method,
        pattern: &str,
        handler: Handler,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Result<(), RouteError> {
        let pattern = normalize_pattern(pattern)?;
        let _guard = self.write.lock().expect("router writer lock");
        let old = self.table.load_full();

        let route = Arc::new(Route::new(method.clone(), pattern.clone(), handler, middleware));

        let mut static_routes = old.static_routes.clone();
        let mut trees = old.trees.clone();
        let mut replaced = None;

        if is_static_pattern(&pattern) {
            let row = static_routes.entry(method.clone()).or_default();
            if let Some(prev) = row.insert(pattern.clone(), route.clone()) {
                replaced = Some(ChainKey::of(&prev));
            }
        }

        // Every route also goes into its tree, which stays authoritative
        // for documentation traversal.
        let tree = trees.entry(method).or_insert_with(Tree::new);
        if replaced.is_none() {
            if let Some(prev) = tree.find_pattern(&pattern) {
                replaced = Some(ChainKey::of(&prev));
            }
        }
        *tree = tree.insert_with_copy(&pattern, route.clone());

        let mut chains = old.chains.clone();
        if let Some(key) = replaced {
            chains.remove(&key);
        }
        chains.insert(ChainKey::of(&route), build_chain(&route, &old.middlewares));

        info!(method = %route.method(), pattern = %route.pattern(), "route registered");

        self.table.store(Arc::new(RoutingTable {
            static_routes,
            trees,
            middlewares: old.middlewares.clone(),
            // Route additions do not bump the generation.
            generation: old.generation,
            not_found: old.not_found.clone(),
            chains,
        }));
        Ok(())
    }

    /// Append global middleware. Rebuilds every chain (the 404 included)
    /// against the new list and bumps the table generation. Cheapest when
    /// called before routes are registered.
    pub fn use_middleware<I>(&self, middleware: I)
    where
        I: IntoIterator<Item = Arc<dyn Middleware>>,
    {
        let _guard = self.write.lock().expect("router writer lock");
        let old = self.table.load_full();

        let mut middlewares = old.middlewares.clone();
        middlewares.extend(middleware);

        let chains = build_all_chains(&old.static_routes, &old.trees, &old.not_found, &middlewares);

        info!(
            globals = middlewares.len(),
            generation = old.generation + 1,
            "global middleware updated, chains rebuilt"
        );

        self.table.store(Arc::new(RoutingTable {
            static_routes: old.static_routes.clone(),
            trees: old.trees.clone(),
            middlewares,
            generation: old.generation + 1,
            not_found: old.not_found.clone(),
            chains,
        }));
    }

    /// Install a custom 404 handler. Only the 404 chain is rebuilt.
    pub fn not_found(&self, handler: Handler) {
        let _guard = self.write.lock().expect("router writer lock");
        let old = self.table.load_full();

        let route = Arc::new(Route::new(Method::GET, String::new(), handler, Vec::new()));
        let mut chains = old.chains.clone();
        chains.remove(&ChainKey::of(&old.not_found));
        chains.insert(ChainKey::of(&route), build_chain(&route, &old.middlewares));

        self.table.store(Arc::new(RoutingTable {
            static_routes: old.static_routes.clone(),
            trees: old.trees.clone(),
            middlewares: old.middlewares.clone(),
            generation: old.generation,
            not_found: route,
            chains,
        }));
    }

    /// A builder that registers routes under `prefix`.
    pub fn group(&self, prefix: impl Into<String>) -> Group<'_> {
        Group::new(self, prefix.into(), Vec::new())
    }

    /// A builder that registers routes under `prefix` with shared
    /// middleware prepended to each route's own list.
    pub fn group_with(
        &self,
        prefix: impl Into<String>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Group<'_> {
        Group::new(self, prefix.into(), middleware)
    }

    /// One-shot metadata attach for documentation tooling. Returns false if
    /// the route does not exist or already has metadata.
    pub fn with_metadata(&self, method: &Method, pattern: &str, metadata: RouteMetadata) -> bool {
        let _guard = self.write.lock().expect("router writer lock");
        let table = self.table.load();
        let Some(tree) = table.trees.get(method) else {
            return false;
        };
        match tree.find_pattern(pattern) {
            Some(route) => route.attach_metadata(metadata),
            None => false,
        }
    }

    /// Every route reachable from the current snapshot's trees, for
    /// read-only documentation traversal.
    pub fn collect_routes(&self) -> Vec<Arc<Route>> {
        let table = self.table.load();
        let mut routes = Vec::new();
        for tree in table.trees.values() {
            routes.extend(tree.collect_routes());
        }
        routes
    }

    /// Current table generation; increments only on global middleware
    /// changes.
    pub fn generation(&self) -> u64 {
        self.table.load().generation
    }

    /// Register a callback to run on [`Router::shutdown`]. Middleware with
    /// background work (rate-limiter reapers) registers itself here.
    pub fn register_cleanup(&self, cleanup: impl FnOnce() + Send + 'static) {
        self.write
            .lock()
            .expect("router writer lock")
            .push(Box::new(cleanup));
    }

    /// Run all registered cleanup callbacks. Each runs at most once; a
    /// second shutdown is a no-op.
    pub fn shutdown(&self) {
        let cleanups: Vec<_> = {
            let mut guard = self.write.lock().expect("router writer lock");
            guard.drain(..).collect()
        };
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Dispatch one request: a single atomic table load, a static-map or
    /// tree lookup, one chain-map read, one call. No locks, no closure
    /// allocation.
    pub fn dispatch(&self, ctx: &mut Context) {
        let table = self.table.load();

        // Fast path: exact match for static patterns.
        if let Some(row) = table.static_routes.get(&ctx.request.method) {
            let path = if ctx.request.path.is_empty() {
                "/"
            } else {
                ctx.request.path.as_str()
            };
            if let Some(route) = row.get(path) {
                debug!(method = %ctx.request.method, path = %route.pattern(), "static route matched");
                match table.chain_for(route) {
                    Some(chain) => execute_chain(ctx, chain),
                    None => execute_chain(ctx, table.not_found_chain()),
                }
                return;
            }
        }

        // Parameterized routes go through the tree.
        let hit = table.trees.get(&ctx.request.method).and_then(|tree| {
            let path = if ctx.request.path.is_empty() {
                "/"
            } else {
                ctx.request.path.as_str()
            };
            tree.search(path)
        });
        if let Some((route, params)) = hit {
            debug!(
                method = %ctx.request.method,
                pattern = %route.pattern(),
                "route matched"
            );
            if params.is_some() {
                ctx.path_params = params;
            }
            match table.chain_for(&route) {
                Some(chain) => execute_chain(ctx, chain),
                None => execute_chain(ctx, table.not_found_chain()),
            }
            return;
        }

        warn!(method = %ctx.request.method, path = %ctx.request.path, "no route matched");
        // The 404 chain is pre-wrapped with all global middleware, so
        // logging, recovery and friends see unmatched requests too.
        execute_chain(ctx, table.not_found_chain());
    }
}

/// Interpret the handler's `(data, status, error)` triple and finish the
/// response.
fn execute_chain(ctx: &mut Context, chain: &Handler) {
    let HandlerResult { data, status, error } = chain(ctx);

    // Status 0 with no error: the handler already wrote the response.
    if status == 0 && error.is_none() {
        return;
    }

    if let Some(err) = error {
        let status = if status == 0 { 500 } else { status };
        let _ = ctx.json(status, &error_envelope(&err));
        return;
    }

    let status = if status == 0 { 200 } else { status };
    // Explicit 204, or a bare 200 with no data, sends no body.
    if status == 204 || (data.is_none() && status == 200) {
        ctx.writer.write_status(204);
        return;
    }

    let _ = ctx.json(status, &success_envelope(data.unwrap_or(Value::Null)));
}

/// Normalize and validate a registration pattern. Empty patterns become
/// `/`; a missing leading slash is added.
fn normalize_pattern(pattern: &str) -> Result<String, RouteError> {
    let pattern = if pattern.is_empty() {
        "/".to_string()
    } else if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{pattern}")
    };

    let segments: Vec<&str> = pattern.split('/').skip(1).collect();
    for (i, segment) in segments.iter().enumerate() {
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(RouteError::EmptyCapture(pattern.clone()));
            }
        } else if let Some(name) = segment.strip_prefix('*') {
            if name.is_empty() {
                return Err(RouteError::EmptyCapture(pattern.clone()));
            }
            if i != segments.len() - 1 {
                return Err(RouteError::WildcardNotLast(pattern.clone()));
            }
        }
    }
    Ok(pattern)
}
