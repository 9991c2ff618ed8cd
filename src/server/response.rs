//! Copy an accumulated response onto the `may_minihttp` wire.

use std::collections::HashSet;
use std::sync::Mutex;

use may_minihttp::Response;
use once_cell::sync::Lazy;

use crate::context::ResponseWriter;

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "OK",
    }
}

// `may_minihttp::Response::header` only accepts `&'static str` lines, so
// dynamic headers are interned in a process-wide cache and leaked once per
// distinct line. An application's header lines form a small stable set
// (content types, redirect targets, fixed middleware headers); per-request
// unique values belong in the body, not in headers. See DESIGN.md.
static HEADER_LINES: Lazy<Mutex<HashSet<&'static str>>> =
    Lazy::new(|| Mutex::new(HashSet::new()));

fn intern_header_line(line: String) -> &'static str {
    let mut cache = HEADER_LINES.lock().expect("header line cache lock");
    if let Some(existing) = cache.get(line.as_str()) {
        return *existing;
    }
    let leaked: &'static str = Box::leak(line.into_boxed_str());
    cache.insert(leaked);
    leaked
}

/// `Name: value` with canonical dash-separated capitalization; header
/// names arrive lowercase from the context.
fn header_line(name: &str, value: &str) -> String {
    let mut line = String::with_capacity(name.len() + value.len() + 2);
    for (i, part) in name.split('-').enumerate() {
        if i > 0 {
            line.push('-');
        }
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            line.push(first.to_ascii_uppercase());
            line.push_str(chars.as_str());
        }
    }
    line.push_str(": ");
    line.push_str(value);
    line
}

/// The header lines exactly as they will hit the wire, one per header the
/// handlers and middleware accumulated.
fn wire_header_lines(writer: &ResponseWriter) -> Vec<&'static str> {
    writer
        .headers()
        .iter()
        .map(|(name, value)| intern_header_line(header_line(name, value)))
        .collect()
}

pub fn write_response(res: &mut Response, writer: &ResponseWriter) {
    let status = if writer.status() == 0 {
        200
    } else {
        writer.status()
    };
    res.status_code(status as usize, status_reason(status));
    for line in wire_header_lines(writer) {
        res.header(line);
    }
    if !writer.body().is_empty() {
        res.body_vec(writer.body().to_vec());
    }
}
