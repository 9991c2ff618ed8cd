//! Middleware contract and the built-in middleware set.

mod body_limit;
mod core;
mod logger;
mod rate_limit;
mod recovery;
mod timeout;

pub use self::body_limit::{
    format_bytes, parse_size, BodyLimit, ParseSizeError, DEFAULT_API_LIMIT, GB, KB, MB,
};
pub use self::core::{compose, handler, Handler, HandlerResult, Middleware};
pub use self::logger::RequestLogger;
pub use self::rate_limit::{RateLimit, RateLimiter};
pub use self::recovery::Recovery;
pub use self::timeout::Timeout;
