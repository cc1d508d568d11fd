//! HTTP surface: per-route middleware and the admission service.

mod middleware;
mod server;
mod service;

pub use middleware::{extract_ip, rate_limit_middleware, RateLimitState};
pub use server::HttpServer;
pub use service::{router, AppState, CheckRequest, CheckResponse, HealthResponse};

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::RatekeeperError;
use crate::ratelimit::RateLimitHeaders;

/// JSON body returned for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Attach the `X-RateLimit-*` headers to a response.
pub(crate) fn apply_rate_limit_headers(headers: &mut HeaderMap, projection: &RateLimitHeaders) {
    for (name, value) in projection.iter() {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            headers.insert(name, value);
        }
    }
}

/// Build a `429 Too Many Requests` response with rate limit metadata.
pub(crate) fn too_many_requests(projection: &RateLimitHeaders, retry_after: Duration) -> Response {
    let secs = retry_after.as_secs();
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorResponse {
            code: "RATE_LIMIT_EXCEEDED".to_string(),
            message: format!("Rate limit exceeded. Please retry after {} seconds.", secs),
            retry_after: Some(secs),
        }),
    )
        .into_response();

    let headers = response.headers_mut();
    apply_rate_limit_headers(headers, projection);
    headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
    response
}

impl IntoResponse for RatekeeperError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            RatekeeperError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            RatekeeperError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "INVALID_KEY"),
            RatekeeperError::InvalidPolicy(_) => (StatusCode::BAD_REQUEST, "INVALID_POLICY"),
            RatekeeperError::UnknownPolicy(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_POLICY"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message: self.to_string(),
                retry_after: None,
            }),
        )
            .into_response()
    }
}
