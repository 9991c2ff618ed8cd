//! Lock-free per-key token-bucket rate limiting.
//!
//! Buckets live in a concurrent map and consist of two atomics: the token
//! count and the nanosecond timestamp of the last successful update. All
//! bucket updates go through compare-and-swap loops; there is no mutex
//! anywhere on the admission path.
//!
//! A background reaper sweeps buckets that have been idle for longer than
//! the cleanup interval. [`RateLimiter::close`] stops the reaper and is
//! idempotent; the middleware constructors register it with the router so
//! `router.shutdown()` tears the thread down.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use tracing::debug;

use super::core::{Handler, HandlerResult, Middleware};
use crate::context::Context;
use crate::response::ApiError;
use crate::router::Router;

const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
const NANOS_PER_SEC: i128 = 1_000_000_000;

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

struct TokenBucket {
    tokens: AtomicI64,
    /// Unix nanoseconds of the last successful update.
    last_seen: AtomicI64,
}

/// Token-bucket limiter: `rate` tokens per second refill, bursts up to
/// `capacity`.
pub struct RateLimiter {
    rate: i64,
    capacity: i64,
    buckets: Arc<DashMap<String, Arc<TokenBucket>>>,
    // Dropping the sender wakes the reaper; taking the pair makes close()
    // idempotent.
    reaper: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

impl RateLimiter {
    /// # Panics
    ///
    /// Panics if `rate` or `capacity` is not positive.
    pub fn new(rate: i64, capacity: i64) -> Arc<Self> {
        Self::with_cleanup_interval(rate, capacity, DEFAULT_CLEANUP_INTERVAL)
    }

    pub fn with_cleanup_interval(
        rate: i64,
        capacity: i64,
        cleanup_interval: Duration,
    ) -> Arc<Self> {
        assert!(rate > 0, "rate must be positive");
        assert!(capacity > 0, "capacity must be positive");

        let buckets: Arc<DashMap<String, Arc<TokenBucket>>> = Arc::new(DashMap::new());
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let reaper_buckets = Arc::clone(&buckets);
        let handle = thread::Builder::new()
            .name("nimbus-ratelimit-reaper".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(cleanup_interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let threshold = now_nanos() - cleanup_interval.as_nanos() as i64;
                        // A concurrent allow() on a reaped key simply
                        // recreates the bucket through load-or-store.
                        reaper_buckets
                            .retain(|_, b| b.last_seen.load(Ordering::Relaxed) >= threshold);
                    }
                    _ => return,
                }
            })
            .expect("spawn rate-limit reaper");

        Arc::new(Self {
            rate,
            capacity,
            buckets,
            reaper: Mutex::new(Some((stop_tx, handle))),
        })
    }

    /// Admit or deny one request for `key`.
    pub fn allow(&self, key: &str) -> bool {
        let now = now_nanos();

        if let Some(bucket) = self.buckets.get(key).map(|b| Arc::clone(b.value())) {
            return self.take_token(&bucket, now);
        }

        match self.buckets.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                let bucket = Arc::clone(entry.get());
                drop(entry);
                self.take_token(&bucket, now)
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                // The first request on a fresh bucket is always admitted.
                entry.insert(Arc::new(TokenBucket {
                    tokens: AtomicI64::new(self.capacity - 1),
                    last_seen: AtomicI64::new(now),
                }));
                true
            }
        }
    }

    fn take_token(&self, bucket: &TokenBucket, now: i64) -> bool {
        loop {
            let tokens = bucket.tokens.load(Ordering::Acquire);
            let last_seen = bucket.last_seen.load(Ordering::Acquire);

            let elapsed = now.saturating_sub(last_seen).max(0);
            let refill = ((elapsed as i128 * self.rate as i128) / NANOS_PER_SEC) as i64;
            let new_tokens = tokens.saturating_add(refill).min(self.capacity);

            if new_tokens <= 0 {
                // Denied. Best-effort timestamp refresh so it cannot go
                // stale; losing this race is harmless.
                let _ = bucket.last_seen.compare_exchange(
                    last_seen,
                    now,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                return false;
            }

            if bucket
                .tokens
                .compare_exchange(tokens, new_tokens - 1, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                let _ = bucket.last_seen.compare_exchange(
                    last_seen,
                    now,
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                );
                return true;
            }
            // Lost the token CAS to another thread; reload and retry.
        }
    }

    /// Stop the reaper thread. Idempotent; returns once the thread exited.
    pub fn close(&self) {
        let reaper = self.reaper.lock().expect("rate limiter reaper lock").take();
        if let Some((stop_tx, handle)) = reaper {
            drop(stop_tx);
            let _ = handle.join();
        }
    }
}

#[derive(Clone)]
enum KeySource {
    RemoteAddr,
    Header(String),
}

/// Rate-limiting middleware. Denials short-circuit the chain with
/// `429 rate_limit_exceeded`.
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
    key: KeySource,
}

impl RateLimit {
    /// Limit per client address. The limiter's reaper is registered as a
    /// router cleanup so `router.shutdown()` stops it.
    pub fn per_ip(router: &Router, rate: i64, burst: i64) -> Arc<Self> {
        Self::with_limiter(router, RateLimiter::new(rate, burst), KeySource::RemoteAddr)
    }

    /// Limit per named request header (API keys and the like), falling back
    /// to the client address when the header is absent.
    pub fn by_header(router: &Router, header: impl Into<String>, rate: i64, burst: i64) -> Arc<Self> {
        Self::with_limiter(
            router,
            RateLimiter::new(rate, burst),
            KeySource::Header(header.into()),
        )
    }

    fn with_limiter(router: &Router, limiter: Arc<RateLimiter>, key: KeySource) -> Arc<Self> {
        let cleanup = Arc::clone(&limiter);
        router.register_cleanup(move || cleanup.close());
        Arc::new(Self { limiter, key })
    }
}

impl Middleware for RateLimit {
    fn wrap(&self, next: Handler) -> Handler {
        let limiter = Arc::clone(&self.limiter);
        let key = self.key.clone();
        Arc::new(move |ctx: &mut Context| {
            let k = match &key {
                KeySource::RemoteAddr => ctx.request.remote_addr.clone(),
                KeySource::Header(name) => match ctx.request_header(name) {
                    Some(v) if !v.is_empty() => v.to_string(),
                    _ => ctx.request.remote_addr.clone(),
                },
            };
            if !limiter.allow(&k) {
                debug!(key = %k, "rate limit exceeded");
                return HandlerResult::error(
                    429,
                    ApiError::new(
                        "rate_limit_exceeded",
                        "too many requests, please try again later",
                    ),
                );
            }
            next(ctx)
        })
    }
}
