//! Pooled per-request context.
//!
//! A [`Context`] carries the parsed request, the response accumulator, the
//! captured path parameters, a parse-once query cache, and a key/value bag
//! for middleware. Contexts are recycled through a lock-free pool; the two
//! lazy maps are only allocated when a request actually needs them, which
//! keeps static-route dispatch allocation-free.
//!
//! A context must never outlive the handler invocation it was handed to.
//! Work spawned from a handler has to copy out the values it needs; holding
//! on to a released context is a use-after-return bug.

use std::collections::HashMap;
use std::time::Instant;

use crossbeam_queue::ArrayQueue;
use http::Method;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

use crate::middleware::HandlerResult;
use crate::response::ApiError;

/// Header list with inline storage for the typical small request.
pub type HeaderVec = SmallVec<[(String, String); 8]>;

/// Maps at or below this many entries are cleared in place on release;
/// larger ones are dropped so a pooled context cannot pin a huge bucket.
const MAP_REUSE_MAX: usize = 8;

const POOL_CAPACITY: usize = 256;

static CONTEXT_POOL: Lazy<ArrayQueue<Box<Context>>> =
    Lazy::new(|| ArrayQueue::new(POOL_CAPACITY));

/// The parsed, owned pieces of an incoming request.
///
/// Header names are stored lowercase; lookups are case-insensitive anyway.
/// `remote_addr` is whatever the transport could determine (empty when it
/// could not), and is the key source for the per-IP rate limiter.
#[derive(Debug, Clone, Default)]
pub struct RequestParts {
    pub method: Method,
    pub path: String,
    pub raw_query: String,
    pub headers: HeaderVec,
    pub remote_addr: String,
    pub body: Vec<u8>,
}

impl RequestParts {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    /// Case-insensitive header lookup (first match wins).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn clear(&mut self) {
        self.method = Method::GET;
        self.path.clear();
        self.raw_query.clear();
        self.headers.clear();
        self.remote_addr.clear();
        self.body.clear();
    }
}

/// Owned response accumulator.
///
/// Handlers write into this through the context helpers; the transport
/// copies the finished status/headers/body out after dispatch returns.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: u16,
    headers: HeaderVec,
    body: Vec<u8>,
    written: bool,
}

impl ResponseWriter {
    pub fn status(&self) -> u16 {
        self.status
    }

    /// True once a status has been committed.
    pub fn is_written(&self) -> bool {
        self.written
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a response header, replacing an existing one of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        for (k, v) in self.headers.iter_mut() {
            if k.eq_ignore_ascii_case(&name) {
                *v = value;
                return;
            }
        }
        self.headers.push((name, value));
    }

    /// Commit a status with no body (204 and friends).
    pub fn write_status(&mut self, status: u16) {
        self.status = status;
        self.written = true;
    }

    /// Commit status and body.
    pub fn write(&mut self, status: u16, body: Vec<u8>) {
        self.status = status;
        self.body = body;
        self.written = true;
    }

    fn clear(&mut self) {
        self.status = 0;
        self.headers.clear();
        self.body.clear();
        self.written = false;
    }
}

/// Request-scoped state handed to every handler in the chain.
pub struct Context {
    pub writer: ResponseWriter,
    pub request: RequestParts,
    /// Captured path parameters. Stays `None` for static-route requests so
    /// the hot path never allocates the map.
    pub path_params: Option<HashMap<String, String>>,
    // Parsed query string, populated on the first query() call.
    query_cache: Option<HashMap<String, String>>,
    // Middleware/handler key-value bag, allocated on the first set().
    values: Option<HashMap<String, Value>>,
    deadline: Option<Instant>,
}

impl Context {
    fn empty() -> Self {
        Self {
            writer: ResponseWriter::default(),
            request: RequestParts::default(),
            path_params: None,
            query_cache: None,
            values: None,
            deadline: None,
        }
    }

    /// Borrow a context from the pool and bind the request to it.
    pub fn acquire(request: RequestParts) -> Box<Context> {
        let mut ctx = CONTEXT_POOL
            .pop()
            .unwrap_or_else(|| Box::new(Context::empty()));
        ctx.request = request;
        ctx
    }

    /// Return the context to the pool. All fields are invalid afterwards.
    pub fn release(mut self: Box<Self>) {
        self.reset();
        // Pool full: let the context drop instead of growing without bound.
        let _ = CONTEXT_POOL.push(self);
    }

    fn reset(&mut self) {
        self.writer.clear();
        self.request.clear();
        self.query_cache = None;
        self.deadline = None;

        // Small maps keep their allocation; oversized ones are dropped and
        // reallocated lazily on the next request that needs them.
        match &mut self.path_params {
            Some(map) if map.len() <= MAP_REUSE_MAX => map.clear(),
            Some(_) => self.path_params = None,
            None => {}
        }
        match &mut self.values {
            Some(map) if map.len() <= MAP_REUSE_MAX => map.clear(),
            Some(_) => self.values = None,
            None => {}
        }
    }

    /// A captured path parameter (`:id` in the pattern).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params
            .as_ref()
            .and_then(|p| p.get(name))
            .map(String::as_str)
    }

    /// A query-string parameter. The raw query is parsed on the first call
    /// and cached for the rest of the request.
    pub fn query(&mut self, name: &str) -> Option<&str> {
        if self.query_cache.is_none() {
            let mut parsed = HashMap::new();
            for (k, v) in url::form_urlencoded::parse(self.request.raw_query.as_bytes()) {
                parsed.entry(k.into_owned()).or_insert_with(|| v.into_owned());
            }
            self.query_cache = Some(parsed);
        }
        self.query_cache
            .as_ref()
            .and_then(|q| q.get(name))
            .map(String::as_str)
    }

    /// Store a value for later middleware/handlers in this request.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values
            .get_or_insert_with(|| HashMap::with_capacity(MAP_REUSE_MAX))
            .insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.as_ref().and_then(|v| v.get(key))
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    /// Set a response header.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.writer.set_header(name, value);
    }

    /// Deadline installed by the timeout middleware, if any. Cooperative
    /// handlers can check it and bail out early.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Write `data` as JSON at `status` and signal "already written".
    pub fn json<T: Serialize + ?Sized>(&mut self, status: u16, data: &T) -> HandlerResult {
        match serde_json::to_vec(data) {
            Ok(bytes) => self.data(status, "application/json", bytes),
            Err(e) => HandlerResult::error(0, ApiError::message(e.to_string())),
        }
    }

    /// Write a plain-text response and signal "already written".
    pub fn string(&mut self, status: u16, text: impl Into<String>) -> HandlerResult {
        self.data(status, "text/plain", text.into().into_bytes())
    }

    /// Write an HTML response and signal "already written".
    pub fn html(&mut self, status: u16, html: impl Into<String>) -> HandlerResult {
        self.data(status, "text/html; charset=utf-8", html.into().into_bytes())
    }

    /// Write raw bytes with the given content type and signal "already
    /// written".
    pub fn data(&mut self, status: u16, content_type: &str, bytes: Vec<u8>) -> HandlerResult {
        self.writer.set_header("content-type", content_type);
        self.writer.write(status, bytes);
        HandlerResult::written()
    }

    /// Write a redirect (301/302/307/308) to `location`.
    pub fn redirect(&mut self, status: u16, location: impl Into<String>) -> HandlerResult {
        self.writer.set_header("location", location);
        self.writer.write_status(status);
        HandlerResult::written()
    }
}
