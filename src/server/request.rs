//! Parse an incoming `may_minihttp` request into owned [`RequestParts`].

use std::io::Read;

use http::Method;
use may_minihttp::Request;

use crate::context::{HeaderVec, RequestParts};

/// Split a raw request target into path and query string.
pub(crate) fn split_path_query(raw: &str) -> (String, String) {
    match raw.split_once('?') {
        Some((path, query)) => (path.to_string(), query.to_string()),
        None => (raw.to_string(), String::new()),
    }
}

/// Client address as the transport saw it. `may_minihttp` does not surface
/// the peer socket address, so the first `X-Forwarded-For` hop is used and
/// the field stays empty when no proxy header is present.
pub(crate) fn remote_addr_from(headers: &HeaderVec) -> String {
    headers
        .iter()
        .find(|(k, _)| k == "x-forwarded-for")
        .map(|(_, v)| v.split(',').next().unwrap_or("").trim().to_string())
        .unwrap_or_default()
}

pub fn parse_request(req: Request) -> RequestParts {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or(Method::GET);
    let (path, raw_query) = split_path_query(req.path());

    let mut headers = HeaderVec::new();
    for h in req.headers().iter() {
        headers.push((
            h.name.to_ascii_lowercase(),
            String::from_utf8_lossy(h.value).to_string(),
        ));
    }
    let remote_addr = remote_addr_from(&headers);

    let mut body_str = String::new();
    let body = match req.body().read_to_string(&mut body_str) {
        Ok(n) if n > 0 => body_str.into_bytes(),
        _ => Vec::new(),
    };

    RequestParts {
        method,
        path,
        raw_query,
        headers,
        remote_addr,
        body,
    }
}
