//! The router as a `may_minihttp` service.

use std::io;
use std::sync::Arc;

use may_minihttp::{HttpService, Request, Response};

use super::request::parse_request;
use super::response::write_response;
use crate::context::Context;
use crate::router::Router;

/// One pooled context per request: parse, dispatch, copy the response out,
/// release. The context never escapes the call.
#[derive(Clone)]
pub struct RouterService(pub Arc<Router>);

impl HttpService for RouterService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let parts = parse_request(req);
        let mut ctx = Context::acquire(parts);
        self.0.dispatch(&mut ctx);
        write_response(res, &ctx.writer);
        ctx.release();
        Ok(())
    }
}
