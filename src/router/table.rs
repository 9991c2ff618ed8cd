//! Immutable routing-table snapshots and the middleware chain compiler.
//!
//! A [`RoutingTable`] is built once, published through the router's atomic
//! pointer, and never mutated afterwards. Writers clone the previous
//! snapshot shallowly (routes and tree nodes are shared by `Arc`), change
//! the one field they care about, and store the result.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;

use super::radix::Tree;
use super::route::Route;
use crate::middleware::{compose, Handler, Middleware};

/// Chain-map key: route identity, i.e. the `Arc` pointer. Two routes with
/// equal patterns are distinct keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ChainKey(usize);

impl ChainKey {
    pub fn of(route: &Arc<Route>) -> Self {
        ChainKey(Arc::as_ptr(route) as usize)
    }
}

pub(crate) struct RoutingTable {
    /// Exact-match map for capture-free patterns: method -> path -> route.
    pub static_routes: HashMap<Method, HashMap<String, Arc<Route>>>,
    /// Per-method radix trees. Authoritative for every route, including the
    /// static ones, so documentation traversal only ever walks the trees.
    pub trees: HashMap<Method, Tree>,
    /// Global middleware, first entry outermost.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    /// Bumped only when the global middleware list changes; route additions
    /// leave it alone.
    pub generation: u64,
    /// Synthetic route whose handler produces the 404 response.
    pub not_found: Arc<Route>,
    /// Pre-compiled chains: one entry per reachable route plus the 404.
    /// Dispatch is a map read and a call, no closure allocation.
    pub chains: HashMap<ChainKey, Handler>,
}

impl RoutingTable {
    pub fn initial(not_found: Arc<Route>) -> Self {
        let mut chains = HashMap::new();
        chains.insert(ChainKey::of(&not_found), build_chain(&not_found, &[]));
        Self {
            static_routes: HashMap::new(),
            trees: HashMap::new(),
            middlewares: Vec::new(),
            generation: 0,
            not_found,
            chains,
        }
    }

    pub fn chain_for(&self, route: &Arc<Route>) -> Option<&Handler> {
        self.chains.get(&ChainKey::of(route))
    }

    /// The 404 chain is installed at construction and re-installed on every
    /// rebuild, so it is always present.
    pub fn not_found_chain(&self) -> &Handler {
        self.chains
            .get(&ChainKey::of(&self.not_found))
            .expect("404 chain present in every table")
    }
}

/// A pattern with no `:` or `*` segment is eligible for the exact-match map.
pub(crate) fn is_static_pattern(pattern: &str) -> bool {
    !pattern.bytes().any(|b| b == b':' || b == b'*')
}

/// Compile one route's chain: route middleware wraps the handler, global
/// middleware wraps the result, so globals run outermost.
pub(crate) fn build_chain(route: &Arc<Route>, globals: &[Arc<dyn Middleware>]) -> Handler {
    let inner = compose(route.middlewares(), route.handler().clone());
    compose(globals, inner)
}

/// Rebuild every chain against a new global middleware list. Called only
/// when the global list changes.
pub(crate) fn build_all_chains(
    static_routes: &HashMap<Method, HashMap<String, Arc<Route>>>,
    trees: &HashMap<Method, Tree>,
    not_found: &Arc<Route>,
    globals: &[Arc<dyn Middleware>],
) -> HashMap<ChainKey, Handler> {
    let mut chains = HashMap::new();
    for routes in static_routes.values() {
        for route in routes.values() {
            chains.insert(ChainKey::of(route), build_chain(route, globals));
        }
    }
    // A static route is in its tree as well; the entry check keeps one
    // chain per route identity.
    for tree in trees.values() {
        for route in tree.collect_routes() {
            chains
                .entry(ChainKey::of(&route))
                .or_insert_with(|| build_chain(&route, globals));
        }
    }
    chains.insert(ChainKey::of(not_found), build_chain(not_found, globals));
    chains
}
