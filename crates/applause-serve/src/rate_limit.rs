//! Per-client fixed-window rate limiting.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;

use crate::error::ApiError;
use crate::state::AppState;

/// Length of one rate limit window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Most clients tracked at once. Clients seen after the table is full share
/// one budget until expired entries are pruned.
pub const MAX_TRACKED_CLIENTS: usize = 100_000;

/// Key of the shared budget used once the table is full.
const OVERFLOW_KEY: &str = "\0overflow";

pub const RATELIMIT_POLICY: HeaderName = HeaderName::from_static("ratelimit-policy");
pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Time until the client's window restarts.
    pub reset_after: Duration,
    pub retry_after: Option<Duration>,
}

struct RateState {
    window_start: Instant,
    count: u64,
}

struct Clients {
    states: HashMap<String, RateState>,
    last_prune: Instant,
}

/// Fixed-window request counter keyed by client.
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    max_clients: usize,
    inner: Mutex<Clients>,
}

impl RateLimiter {
    /// Allow `limit` requests per client per [`WINDOW`]. A limit of 0 disables
    /// the limiter.
    pub fn new(limit: u64) -> Self {
        Self::with_window(limit, WINDOW, MAX_TRACKED_CLIENTS)
    }

    pub fn with_window(limit: u64, window: Duration, max_clients: usize) -> Self {
        Self {
            limit,
            window,
            max_clients: max_clients.max(1),
            inner: Mutex::new(Clients {
                states: HashMap::new(),
                last_prune: Instant::now(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.inner.lock().states.len()
    }

    /// Count one request for `key` at time `now`.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitOutcome {
        if !self.is_enabled() {
            return RateLimitOutcome {
                allowed: true,
                limit: 0,
                remaining: u64::MAX,
                reset_after: Duration::ZERO,
                retry_after: None,
            };
        }

        let mut guard = self.inner.lock();
        let clients = &mut *guard;

        // Expired windows are dropped at most once per window.
        if now.duration_since(clients.last_prune) >= self.window {
            let window = self.window;
            clients
                .states
                .retain(|_, state| now.duration_since(state.window_start) < window);
            clients.last_prune = now;
        }

        let key = if clients.states.contains_key(key) || clients.states.len() < self.max_clients {
            key
        } else {
            OVERFLOW_KEY
        };

        let entry = clients
            .states
            .entry(key.to_string())
            .or_insert(RateState {
                window_start: now,
                count: 0,
            });

        if now.duration_since(entry.window_start) >= self.window {
            entry.window_start = now;
            entry.count = 0;
        }

        entry.count += 1;
        let reset_after = self
            .window
            .saturating_sub(now.duration_since(entry.window_start));

        if entry.count > self.limit {
            return RateLimitOutcome {
                allowed: false,
                limit: self.limit,
                remaining: 0,
                reset_after,
                retry_after: Some(reset_after),
            };
        }

        RateLimitOutcome {
            allowed: true,
            limit: self.limit,
            remaining: self.limit - entry.count,
            reset_after,
            retry_after: None,
        }
    }

    pub fn check(&self, key: &str) -> RateLimitOutcome {
        self.check_at(key, Instant::now())
    }
}

/// Identify the client: the last `X-Forwarded-For` hop, which the one trusted
/// proxy in front of the service appends, else the peer address. Earlier hops
/// are written by the client and ignored.
pub fn client_key(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .rsplit(',')
                .map(str::trim)
                .find(|hop| !hop.is_empty())
        });

    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write the `RateLimit-*` headers describing `outcome`.
fn insert_rate_limit_headers(headers: &mut HeaderMap, window: Duration, outcome: &RateLimitOutcome) {
    let reset_secs = outcome.reset_after.as_secs_f64().ceil() as u64;
    let policy = format!("{};w={}", outcome.limit, window.as_secs());

    if let Ok(policy) = HeaderValue::from_str(&policy) {
        headers.insert(RATELIMIT_POLICY, policy);
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(outcome.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(outcome.remaining));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_secs));
}

/// Middleware rejecting clients over their request budget with 429.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = &state.rate_limiter;
    if !limiter.is_enabled() {
        return next.run(request).await;
    }

    let key = client_key(&request);
    let outcome = limiter.check(&key);

    let mut response = if outcome.allowed {
        next.run(request).await
    } else {
        let retry_after_secs = outcome
            .retry_after
            .map(|dur| dur.as_secs_f64().ceil() as u64)
            .unwrap_or(WINDOW.as_secs())
            .max(1);
        tracing::debug!(client = %key, retry_after_secs, "rate limited");
        ApiError::RateLimited { retry_after_secs }.into_response()
    };

    insert_rate_limit_headers(response.headers_mut(), limiter.window(), &outcome);
    response
}
