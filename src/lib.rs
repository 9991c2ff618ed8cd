//! Nimbus: a lock-free HTTP router and request-dispatch framework.
//!
//! The routing core is an immutable table swapped under a single atomic
//! pointer. Dispatch performs one atomic load, an exact-match or radix-tree
//! lookup, one read from the pre-compiled chain map, and one call — no
//! locks and no closure allocation. Writers (route registration, global
//! middleware changes, 404 replacement) serialize on one mutex and publish
//! complete new snapshots; a copy-on-write radix tree keeps those snapshot
//! builds cheap by sharing every untouched subtree.
//!
//! ```ignore
//! use nimbus::{handler, HandlerResult, Router};
//! use http::Method;
//! use serde_json::json;
//!
//! let router = std::sync::Arc::new(Router::new());
//! router.add_route(
//!     Method::GET,
//!     "/users/:id",
//!     handler(|ctx| {
//!         let id = ctx.param("id").unwrap_or("").to_string();
//!         HandlerResult::ok(json!({"id": id}), 200)
//!     }),
//! )?;
//! let server = nimbus::server::serve(router, "0.0.0.0:8080")?;
//! server.join().unwrap();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod context;
pub mod middleware;
pub mod response;
pub mod router;
pub mod server;

pub use context::{Context, RequestParts};
pub use middleware::{compose, handler, Handler, HandlerResult, Middleware};
pub use response::ApiError;
pub use router::{Group, Route, RouteError, RouteMetadata, Router};
