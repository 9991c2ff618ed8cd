use criterion::{black_box, criterion_group, criterion_main, Criterion};
use http::Method;
use nimbus::{handler, Context, HandlerResult, RequestParts, Router};
use serde_json::json;

fn build_router(n: usize) -> Router {
    let router = Router::new();
    for i in 0..n {
        router
            .add_route(
                Method::GET,
                &format!("/api/v1/resource{i}/:id/action/:action"),
                handler(|_| HandlerResult::ok(json!("ok"), 200)),
            )
            .unwrap();
    }
    router
        .add_route(
            Method::GET,
            "/health",
            handler(|_| HandlerResult::ok(json!({"status": "ok"}), 200)),
        )
        .unwrap();
    router
}

/// Path-copying insert against a populated table versus rebuilding the
/// whole table from scratch.
fn bench_registration(c: &mut Criterion) {
    c.bench_function("add_route_cow_100", |b| {
        let router = build_router(100);
        b.iter(|| {
            router
                .add_route(
                    Method::POST,
                    "/api/v1/newresource/:id/action/:action",
                    handler(|_| HandlerResult::no_content()),
                )
                .unwrap();
        });
    });

    c.bench_function("rebuild_table_100", |b| {
        b.iter(|| {
            black_box(build_router(100));
        });
    });
}

fn bench_dispatch(c: &mut Criterion) {
    let router = build_router(100);

    c.bench_function("dispatch_static", |b| {
        b.iter(|| {
            let mut ctx = Context::acquire(RequestParts::new(Method::GET, "/health"));
            router.dispatch(&mut ctx);
            black_box(ctx.writer.status());
            ctx.release();
        });
    });

    c.bench_function("dispatch_param", |b| {
        b.iter(|| {
            let mut ctx = Context::acquire(RequestParts::new(
                Method::GET,
                "/api/v1/resource42/123/action/delete",
            ));
            router.dispatch(&mut ctx);
            black_box(ctx.writer.status());
            ctx.release();
        });
    });
}

criterion_group!(benches, bench_registration, bench_dispatch);
criterion_main!(benches);
