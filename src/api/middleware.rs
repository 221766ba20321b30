//! Rate limiting in front of the turn endpoint

use super::handlers::ApiError;
use super::AppState;
use crate::rate_limit::{retry_after_secs, RateDecision};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Reject over-budget clients before the orchestrator sees the request
pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), peer);
    let limit = state.rate_limiter.limit();

    match state.rate_limiter.check(&client) {
        RateDecision::Rejected { retry_after } => {
            tracing::warn!(client = %client, limit, "Rate limit exceeded");
            ApiError::RateLimited {
                retry_after_secs: retry_after_secs(retry_after),
                limit,
            }
            .into_response()
        }
        RateDecision::Admitted { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limit));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));
            response
        }
    }
}

/// Client identity: first `X-Forwarded-For` hop, then `X-Real-IP`, then the peer
pub fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string())
}
