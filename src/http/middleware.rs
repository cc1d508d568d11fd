//! Per-route rate limiting middleware for axum routers.
//!
//! Attach with `axum::middleware::from_fn_with_state`, one state per traffic
//! class:
//!
//! ```ignore
//! let auth = RateLimitState::for_preset(limiter.clone(), Preset::Authentication);
//! let router = Router::new()
//!     .route("/login", post(login))
//!     .layer(middleware::from_fn_with_state(auth, rate_limit_middleware));
//! ```

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

use super::{apply_rate_limit_headers, too_many_requests, ErrorResponse};
use crate::error::Result;
use crate::ratelimit::{Limiter, Policy, Preset};

/// State for one rate-limited traffic class.
#[derive(Clone)]
pub struct RateLimitState {
    /// Shared limiter
    pub limiter: Arc<Limiter>,
    /// Class name appended to the client address to form the key
    pub class: String,
    /// Policy enforced for this class
    pub policy: Policy,
}

impl RateLimitState {
    /// Create state for a traffic class, rejecting a policy that cannot be
    /// enforced.
    pub fn new(limiter: Arc<Limiter>, class: impl Into<String>, policy: Policy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            limiter,
            class: class.into(),
            policy,
        })
    }

    /// State enforcing a preset, keyed by the preset's name.
    pub fn for_preset(limiter: Arc<Limiter>, preset: Preset) -> Self {
        Self {
            limiter,
            class: preset.name().to_string(),
            policy: preset.policy(),
        }
    }
}

/// Best-effort client address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the peer address, else `unknown-ip`.
pub fn extract_ip(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|h| h.to_str().ok())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown-ip".to_string())
}

/// Rate limiting middleware.
///
/// Admitted requests run the inner service and carry the `X-RateLimit-*`
/// headers; denied requests get `429` with the same headers plus
/// `Retry-After`. A failed check is a server misconfiguration and yields
/// `500`.
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_ip(&request);
    let key = format!("{}:{}", ip, state.class);

    let decision = match state.limiter.check(&key, &state.policy) {
        Ok(decision) => decision,
        Err(e) => {
            error!(key = %key, error = %e, "Rate limit check failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "Rate limit check failed".to_string(),
                    retry_after: None,
                }),
            )
                .into_response();
        }
    };
    let projection = decision.headers(state.policy.max_requests);

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_rate_limit_headers(response.headers_mut(), &projection);
        response
    } else {
        let retry_after = decision.retry_after(Utc::now());
        warn!(
            ip = %ip,
            class = %state.class,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );
        too_many_requests(&projection, retry_after)
    }
}
