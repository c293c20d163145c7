//! Rate limiting middleware

use super::dto::AddrQuery;
use crate::domain::rate_limit::RateLimiter;
use axum::{
    extract::{ConnectInfo, Query, Request, State},
    http::{StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Header carrying a carrier credential
pub const CARRIER_AUTH_HEADER: &str = "x-carrier-auth";

/// Decoded `addr` query parameter, if present and non-empty
fn addr_param(uri: &Uri) -> Option<String> {
    let Query(query) = Query::<AddrQuery>::try_from_uri(uri).ok()?;
    let addr = query.addr.trim();
    (!addr.is_empty()).then(|| addr.to_string())
}

/// Reject the request with 429 once its window is exhausted
pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let addr = addr_param(request.uri())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(peer)| peer.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    let credential = request
        .headers()
        .get(CARRIER_AUTH_HEADER)
        .and_then(|v| v.to_str().ok());
    let tier = limiter.tier_for(credential);

    if !limiter.check(tier, &addr) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            format!("Rate limit exhausted from {}", addr),
        )
            .into_response();
    }

    next.run(request).await
}
