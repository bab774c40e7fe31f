//! Rate limiting for authentication endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};

use crate::auth::client_ip;
use crate::api::ApiError;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Key used when the peer address is unavailable (e.g. no connect info).
const UNKNOWN_CLIENT: &str = "unknown";

const LOGIN_PER_SEC: u32 = 1;
const LOGIN_BURST: u32 = 5;
const REGISTER_PER_MIN: u32 = 3;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registrations
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Create rate limiters with the production quotas:
    /// 5 login attempts then 1 per second, 3 registrations per minute.
    pub fn new() -> Self {
        Self::with_quotas(LOGIN_PER_SEC, LOGIN_BURST, REGISTER_PER_MIN)
    }

    /// Create rate limiters with custom quotas. Zero values are raised to 1.
    pub fn with_quotas(login_per_sec: u32, login_burst: u32, register_per_min: u32) -> Self {
        let login_quota = Quota::per_second(non_zero(login_per_sec)).allow_burst(non_zero(login_burst));
        let register_quota = Quota::per_minute(non_zero(register_per_min));

        Self {
            login: Arc::new(RateLimiter::keyed(login_quota)),
            register: Arc::new(RateLimiter::keyed(register_quota)),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn non_zero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

fn too_many_requests(message: &str) -> Response {
    ApiError::too_many_requests(message).into_response()
}

fn limiter_key(request: &Request) -> String {
    client_ip(request).unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = limiter_key(&request);

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Login rate limit exceeded");
            too_many_requests("Too many login attempts. Please wait before trying again.")
        }
    }
}

/// Middleware for rate limiting registrations.
pub async fn rate_limit_register(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = limiter_key(&request);

    match config.register.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(ip = %ip, "Registration rate limit exceeded");
            too_many_requests("Too many signup attempts. Please wait before trying again.")
        }
    }
}
