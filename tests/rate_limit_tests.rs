use std::thread;
use std::time::Duration;

use http::Method;
use nimbus::middleware::RateLimit;
use nimbus::{handler, HandlerResult, Middleware, RequestParts, Router};

mod common;
use common::dispatch_parts;

fn request_from(addr: &str, path: &str) -> RequestParts {
    let mut parts = RequestParts::new(Method::GET, path);
    parts.remote_addr = addr.to_string();
    parts
}

#[test]
fn test_burst_then_deny_then_refill() {
    let router = Router::new();
    let limiter = RateLimit::per_ip(&router, 10, 3);
    router.use_middleware([limiter as std::sync::Arc<dyn Middleware>]);
    router
        .add_route(Method::GET, "/api", handler(|_| HandlerResult::no_content()))
        .unwrap();

    let mut statuses = Vec::new();
    for _ in 0..5 {
        let (status, _) = dispatch_parts(&router, request_from("10.0.0.1:5000", "/api"));
        statuses.push(status);
    }
    assert_eq!(statuses, [204, 204, 204, 429, 429]);

    // ~2 tokens refill at 10/s over 200ms; one attempt is admitted.
    thread::sleep(Duration::from_millis(200));
    let (status, _) = dispatch_parts(&router, request_from("10.0.0.1:5000", "/api"));
    assert_eq!(status, 204);

    router.shutdown();
}

#[test]
fn test_denial_shape() {
    let router = Router::new();
    let limiter = RateLimit::per_ip(&router, 1, 1);
    router.use_middleware([limiter as std::sync::Arc<dyn Middleware>]);
    router
        .add_route(Method::GET, "/api", handler(|_| HandlerResult::no_content()))
        .unwrap();

    let (status, _) = dispatch_parts(&router, request_from("10.0.0.9:1", "/api"));
    assert_eq!(status, 204);
    let (status, body) = dispatch_parts(&router, request_from("10.0.0.9:1", "/api"));
    assert_eq!(status, 429);
    assert_eq!(body["error"], "rate_limit_exceeded");

    router.shutdown();
}

#[test]
fn test_clients_are_limited_independently() {
    let router = Router::new();
    let limiter = RateLimit::per_ip(&router, 1, 1);
    router.use_middleware([limiter as std::sync::Arc<dyn Middleware>]);
    router
        .add_route(Method::GET, "/api", handler(|_| HandlerResult::no_content()))
        .unwrap();

    let (status, _) = dispatch_parts(&router, request_from("192.0.2.1:1", "/api"));
    assert_eq!(status, 204);
    let (status, _) = dispatch_parts(&router, request_from("192.0.2.1:1", "/api"));
    assert_eq!(status, 429);
    // A different client still has its full burst.
    let (status, _) = dispatch_parts(&router, request_from("192.0.2.2:1", "/api"));
    assert_eq!(status, 204);

    router.shutdown();
}

#[test]
fn test_header_key_with_remote_addr_fallback() {
    let router = Router::new();
    let limiter = RateLimit::by_header(&router, "x-api-key", 1, 1);
    router.use_middleware([limiter as std::sync::Arc<dyn Middleware>]);
    router
        .add_route(Method::GET, "/api", handler(|_| HandlerResult::no_content()))
        .unwrap();

    let keyed = |key: &str| {
        let mut parts = request_from("198.51.100.1:1", "/api");
        parts.headers.push(("x-api-key".to_string(), key.to_string()));
        parts
    };

    // Two different API keys from the same address are separate buckets.
    let (status, _) = dispatch_parts(&router, keyed("alpha"));
    assert_eq!(status, 204);
    let (status, _) = dispatch_parts(&router, keyed("alpha"));
    assert_eq!(status, 429);
    let (status, _) = dispatch_parts(&router, keyed("beta"));
    assert_eq!(status, 204);

    // No header: the remote address is the key.
    let (status, _) = dispatch_parts(&router, request_from("198.51.100.1:1", "/api"));
    assert_eq!(status, 204);
    let (status, _) = dispatch_parts(&router, request_from("198.51.100.1:1", "/api"));
    assert_eq!(status, 429);

    router.shutdown();
}

#[test]
fn test_shutdown_stops_reaper_and_is_idempotent() {
    let router = Router::new();
    let limiter = RateLimit::per_ip(&router, 10, 3);
    router.use_middleware([limiter as std::sync::Arc<dyn Middleware>]);
    router
        .add_route(Method::GET, "/api", handler(|_| HandlerResult::no_content()))
        .unwrap();

    let (status, _) = dispatch_parts(&router, request_from("203.0.113.5:1", "/api"));
    assert_eq!(status, 204);

    // shutdown() joins the reaper thread; returning at all proves the
    // background thread exited. The second call is a no-op.
    router.shutdown();
    router.shutdown();

    // Admission still works after shutdown, just without sweeping.
    let (status, _) = dispatch_parts(&router, request_from("203.0.113.5:1", "/api"));
    assert_eq!(status, 204);
}
