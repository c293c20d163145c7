//! Routing API integration tests

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use common::*;
use routeplane::domain::media_server::MediaFleet;
use routeplane::domain::rate_limit::RateLimiter;
use routeplane::interface::api::rate_limit::CARRIER_AUTH_HEADER;
use routeplane::interface::api::{build_router, AppState};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot`

async fn app() -> Router {
    let state = AppState {
        engine: Arc::new(engine().await),
    };
    build_router(state, None, None)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn json(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (status, body) = get(app().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["data"], "OK");
}

#[tokio::test]
async fn test_did_validation_verdict() {
    let (status, body) = get(
        app().await,
        "/user/incomingDIDValidation?did=%2B15550001&number=%2B15551234&source=10.0.0.5",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body), Value::String("network_managed".to_string()));
}

#[tokio::test]
async fn test_did_validation_rejections() {
    let (status, body) = get(
        app().await,
        "/user/incomingDIDValidation?did=%2B15550001&number=%2B15551234&source=8.8.8.8",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(json(&body)["error"].is_string());

    let (status, _) = get(
        app().await,
        "/user/incomingDIDValidation?did=%2B15550404&number=%2B15551234&source=10.0.0.5",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_verify_caller_endpoints() {
    let (status, body) = get(app().await, "/user/verifyCaller?workspace_id=1&number=%2B15551234").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["valid"], true);

    let (status, _) = get(app().await, "/user/verifyCaller?workspace_id=abc&number=%2B15551234").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(
        app().await,
        "/user/verifyCallerByDomain?domain=w1.lineroute.io&number=%2B15550000",
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_whitelist_lookup_statuses() {
    let (status, _) = get(app().await, "/user/ipWhitelistLookup?ip=10.0.0.5&domain=w1.lineroute.io").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(app().await, "/user/ipWhitelistLookup?ip=10.0.0.6&domain=w1.lineroute.io").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assigned_ip_is_plain_text() {
    let (status, body) = get(
        app().await,
        "/user/getUserAssignedIP?rtcOptimized=true&domain=w1.lineroute.io&routerip=",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"10.1.0.3");

    let (status, body) = get(app().await, "/user/getTrunkAssignedIP").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"10.1.0.2");
}

#[tokio::test]
async fn test_empty_fleet_is_unavailable() {
    let engine = engine_with(seeded_store().await, settings(), Arc::new(MediaFleet::empty()));
    let app = build_router(AppState { engine: Arc::new(engine) }, None, None);

    let (status, body) = get(app, "/user/getDIDAssignedIP").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_pstn_provider_json() {
    let (status, body) = get(
        app().await,
        "/user/getPSTNProviderIP?from=%2B15551234&to=%2B442071234567&domain=w1.lineroute.io",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let route = json(&body);
    assert_eq!(route["provider_id"], 2);
    assert_eq!(route["ip_address"], "192.0.2.2");

    let (status, _) = get(
        app().await,
        "/user/getPSTNProviderIP?from=%2B15551234&to=%2B442071234567&domain=w2.lineroute.io",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sip_trunk_routes() {
    let (status, body) = get(app().await, "/user/processSIPTrunkCall?did=%2B15550002").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"sip:pbx.w1.example");

    let (status, body) = get(app().await, "/user/incomingTrunkValidation?fromdomain=203.0.113.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["trunk_id"], 10);
}

#[tokio::test]
async fn test_media_server_validation_statuses() {
    let (status, _) = get(app().await, "/user/incomingMediaServerValidation?source=10.1.0.1").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = get(app().await, "/user/incomingMediaServerValidation?source=10.9.9.9").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json(&body)["error"].is_string());
}

#[tokio::test]
async fn test_store_registration_form() {
    let store = seeded_store().await;
    let engine = Arc::new(engine_with(store.clone(), settings(), fleet()));
    let app = build_router(AppState { engine: engine.clone() }, None, None);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/user/storeRegistration")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("domain=w1.lineroute.io&user=alice&expires=300"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.registration_count().await, 1);

    // Unusable expiry still answers 204
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/user/storeRegistration")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("domain=w1.lineroute.io&user=bob&expires=later"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(store.registration_count().await, 1);
}

#[tokio::test]
async fn test_rate_limit_exhaustion() {
    let state = AppState {
        engine: Arc::new(engine().await),
    };
    let limiter = Arc::new(RateLimiter::new(2, 10).with_carrier_credentials(vec!["carrier-key".to_string()]));
    let app = build_router(state, None, Some(limiter));

    let uri = "/user/getTrunkAssignedIP?addr=203.0.113.9";
    for _ in 0..2 {
        let (status, _) = get(app.clone(), uri).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = get(app.clone(), uri).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(String::from_utf8(body).unwrap(), "Rate limit exhausted from 203.0.113.9");

    // The carrier tier has its own budget
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .header(CARRIER_AUTH_HEADER, "carrier-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Health is never limited
    let (status, _) = get(app, "/health?addr=203.0.113.9").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_rate_limit_key_is_decoded() {
    let state = AppState {
        engine: Arc::new(engine().await),
    };
    let app = build_router(state, None, Some(Arc::new(RateLimiter::new(2, 10))));

    let (status, _) = get(app.clone(), "/user/getTrunkAssignedIP?addr=2001:db8::1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = get(app.clone(), "/user/getTrunkAssignedIP?addr=2001%3Adb8%3A%3A1").await;
    assert_eq!(status, StatusCode::OK);

    // Both spellings draw on the same window
    let (status, body) = get(app, "/user/getTrunkAssignedIP?addr=2001%3adb8%3a%3a1").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(String::from_utf8(body).unwrap(), "Rate limit exhausted from 2001:db8::1");
}
