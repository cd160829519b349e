//! Rate limiting for the credential endpoints.
//!
//! Uses a token bucket per client IP so a burst of failed logins or signups
//! cannot turn into an online guessing run.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc};

/// Per-IP keyed limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for password logins (10 attempts per minute)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for account creation (5 requests per minute)
    pub register: Arc<IpLimiter>,
}

const LOGIN_PER_MIN: u32 = 10;
const REGISTER_PER_MIN: u32 = 5;

impl RateLimitConfig {
    /// Create rate limiters with the default quotas.
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(LOGIN_PER_MIN).unwrap(),
            ))),
            register: Arc::new(RateLimiter::keyed(Quota::per_minute(
                NonZeroU32::new(REGISTER_PER_MIN).unwrap(),
            ))),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Limiter key for a request: the peer address when the server was started
/// with connection info, otherwise a fixed key (in-process tests).
fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

/// Middleware for rate limiting password logins.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    match config.login.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many authentication attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}

/// Middleware for rate limiting account creation.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    match config.register.check_key(&key) {
        Ok(_) => next.run(request).await,
        Err(_) => (
            StatusCode::TOO_MANY_REQUESTS,
            "Too many signup attempts. Please wait before trying again.",
        )
            .into_response(),
    }
}
