//! Admission service: answers rate limit checks over HTTP/JSON.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{apply_rate_limit_headers, too_many_requests};
use crate::error::RatekeeperError;
use crate::ratelimit::{Limiter, PolicyTable};

/// Shared state for the admission routes.
#[derive(Clone)]
pub struct AppState {
    /// The limiter instance
    pub limiter: Arc<Limiter>,
    /// Named policies callers may select
    pub policies: Arc<PolicyTable>,
}

impl AppState {
    pub fn new(limiter: Arc<Limiter>, policies: PolicyTable) -> Self {
        Self {
            limiter,
            policies: Arc::new(policies),
        }
    }
}

/// Body of `POST /v1/check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Caller-derived key, e.g. `"<ip>:<route>"` or a user ID
    pub key: String,
    /// Name of the policy to enforce
    pub policy: String,
}

/// Body returned for an admitted check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    pub limit: u32,
}

/// Body of `GET /healthz`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub tracked_keys: usize,
}

/// Build the admission router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/check", post(check_handler))
        .route("/healthz", get(health_handler))
        .with_state(state)
}

/// Decide whether the caller identified by `key` may proceed.
///
/// Returns `200` with the decision when admitted and `429` when denied; both
/// carry the `X-RateLimit-*` headers. A malformed body, an empty key or an
/// unknown policy is a `400`.
#[instrument(skip_all)]
async fn check_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Response, RatekeeperError> {
    let Json(request) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Received malformed rate limit check");
        RatekeeperError::InvalidRequest(rejection.body_text())
    })?;

    debug!(key = %request.key, policy = %request.policy, "Processing rate limit check");

    if request.key.is_empty() {
        warn!("Received rate limit check with empty key");
        return Err(RatekeeperError::InvalidKey("key is required".to_string()));
    }

    let policy = state.policies.resolve(&request.policy).map_err(|e| {
        warn!(policy = %request.policy, "Received rate limit check for unknown policy");
        e
    })?;

    let decision = state.limiter.check(&request.key, &policy)?;
    let projection = decision.headers(policy.max_requests);

    info!(
        key = %request.key,
        policy = %request.policy,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Rate limit decision made"
    );

    if !decision.allowed {
        return Ok(too_many_requests(
            &projection,
            decision.retry_after(Utc::now()),
        ));
    }

    let mut response = (
        StatusCode::OK,
        Json(CheckResponse {
            allowed: decision.allowed,
            remaining: decision.remaining,
            reset_at: decision.reset_at,
            limit: policy.max_requests,
        }),
    )
        .into_response();
    apply_rate_limit_headers(response.headers_mut(), &projection);
    Ok(response)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        tracked_keys: state.limiter.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ErrorResponse;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn state() -> AppState {
        AppState::new(Arc::new(Limiter::new()), PolicyTable::new())
    }

    fn check_request(key: &str, policy: &str) -> Request<Body> {
        let body = serde_json::to_vec(&CheckRequest {
            key: key.to_string(),
            policy: policy.to_string(),
        })
        .unwrap();
        Request::builder()
            .method("POST")
            .uri("/v1/check")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body<T: DeserializeOwned>(response: Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_request_returns_ok() {
        let app = router(state());

        let response = app
            .oneshot(check_request("198.51.100.2:/api/generate", "expensive-generation"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "10");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "9");

        let body: CheckResponse = json_body(response).await;
        assert!(body.allowed);
        assert_eq!(body.remaining, 9);
        assert_eq!(body.limit, 10);
    }

    #[tokio::test]
    async fn test_exhausted_key_returns_429() {
        let state = state();

        for _ in 0..3 {
            let response = router(state.clone())
                .oneshot(check_request("user-42", "payment"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = router(state.clone())
            .oneshot(check_request("user-42", "payment"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert!(response.headers().contains_key("retry-after"));

        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.code, "RATE_LIMIT_EXCEEDED");
        assert!(body.retry_after.is_some());
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let state = state();
        let response = router(state.clone())
            .oneshot(check_request("", "general-api"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.code, "INVALID_KEY");
        assert!(state.limiter.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_shape() {
        let state = state();
        let bodies = [
            ("application/json", "{\"key\": "),
            ("application/json", "{\"key\": \"user-42\"}"),
            ("text/plain", "key=user-42"),
        ];

        for (content_type, body) in bodies {
            let request = Request::builder()
                .method("POST")
                .uri("/v1/check")
                .header("content-type", content_type)
                .body(Body::from(body))
                .unwrap();
            let response = router(state.clone()).oneshot(request).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
            let error: ErrorResponse = json_body(response).await;
            assert_eq!(error.code, "INVALID_REQUEST");
            assert!(!error.message.is_empty());
        }
        assert!(state.limiter.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_policy_rejected() {
        let response = router(state())
            .oneshot(check_request("user-42", "unlimited"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = json_body(response).await;
        assert_eq!(body.code, "UNKNOWN_POLICY");
    }

    #[tokio::test]
    async fn test_health_reports_tracked_keys() {
        let state = state();
        router(state.clone())
            .oneshot(check_request("user-42", "read-heavy"))
            .await
            .unwrap();

        let response = router(state)
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: HealthResponse = json_body(response).await;
        assert_eq!(body.status, "ok");
        assert_eq!(body.tracked_keys, 1);
    }
}
