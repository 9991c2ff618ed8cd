#![allow(dead_code)]

use std::sync::Once;

use http::Method;
use nimbus::{Context, RequestParts, Router};
use serde_json::Value;

static INIT: Once = Once::new();

/// Route tracing output through the test harness, once per test binary.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("info")
            .with_test_writer()
            .try_init();
    });
}

/// Drive one request through the router and return the written status and
/// decoded JSON body (Null when the body is empty or not JSON).
pub fn dispatch(router: &Router, method: Method, path: &str) -> (u16, Value) {
    dispatch_parts(router, RequestParts::new(method, path))
}

pub fn dispatch_parts(router: &Router, parts: RequestParts) -> (u16, Value) {
    let mut ctx = Context::acquire(parts);
    router.dispatch(&mut ctx);
    let status = ctx.writer.status();
    let body = if ctx.writer.body().is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(ctx.writer.body()).unwrap_or(Value::Null)
    };
    ctx.release();
    (status, body)
}
