//! Request middleware: bearer auth, in-flight limit, request metrics.
//!
//! All three read `ApiContext` from request extensions (the router installs
//! it as the outermost layer).

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::observability;

fn context(req: &Request<Body>) -> Result<ApiContext, ApiError> {
    req.extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))
}

/// Compare without short-circuiting on the first differing byte.
fn tokens_match(given: &[u8], expected: &[u8]) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .iter()
        .zip(expected)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Require `Authorization: Bearer <CLINICD_API_TOKEN>`.
pub async fn require_auth(req: Request<Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(req: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let ctx = context(&req)?;
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| tokens_match(t.as_bytes(), ctx.api_token.as_bytes()));

    if !authorized {
        metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
        tracing::warn!(path = %req.uri().path(), "rejected request without valid token");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

/// Reject with 503 once `CLINICD_MAX_CONNECTIONS` requests are in flight.
pub async fn limit_in_flight(req: Request<Body>, next: Next) -> Response {
    let ctx = match context(&req) {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };
    let Ok(_permit) = ctx.in_flight.clone().try_acquire_owned() else {
        tracing::warn!("in-flight limit reached, rejecting {}", req.uri().path());
        metrics::counter!(observability::REQUESTS_REJECTED_TOTAL).increment(1);
        return ApiError::Overloaded.into_response();
    };

    metrics::gauge!(observability::REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(req).await;
    metrics::gauge!(observability::REQUESTS_IN_FLIGHT).decrement(1.0);
    response
}

/// Count and time every request by method, matched route and status class.
pub async fn record_metrics(req: Request<Body>, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());
    let method = req.method().as_str().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = observability::status_class(response.status().as_u16());
    metrics::counter!(
        observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(started.elapsed().as_secs_f64());
    response
}
