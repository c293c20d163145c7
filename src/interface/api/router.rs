//! API Router configuration

use super::metrics_handler::{metrics_handler, track_metrics};
use super::rate_limit::rate_limit;
use super::routing_handler::{
    get_caller_id_to_use, get_code_flow_info, get_did_accept_option, get_did_assigned_ip,
    get_did_number_data, get_extension_flow_info, get_flow_info, get_pstn_provider_ip,
    get_pstn_provider_ip_for_trunk, get_settings, get_trunk_assigned_ip, get_user_assigned_ip,
    get_user_by_did, get_user_by_domain, get_user_by_trunk_source_ip, get_workspace_macros,
    health_check, incoming_did_validation, incoming_media_server_validation,
    incoming_trunk_validation, ip_whitelist_lookup, lookup_sip_trunk_by_did,
    process_sip_trunk_call, store_registration, verify_caller, verify_caller_by_domain, AppState,
};
use crate::domain::rate_limit::RateLimiter;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the API router.
///
/// `/metrics` is mounted only with a Prometheus handle; the `/user` routes
/// are rate limited only with a limiter.
pub fn build_router(
    state: AppState,
    prometheus_handle: Option<PrometheusHandle>,
    limiter: Option<Arc<RateLimiter>>,
) -> Router {
    // Health check route (never rate limited)
    let health_routes = Router::new().route("/health", get(health_check));

    // Routing queries from the signaling proxy
    let mut user_routes = Router::new()
        .route("/user/verifyCaller", get(verify_caller))
        .route("/user/verifyCallerByDomain", get(verify_caller_by_domain))
        .route("/user/getUserByDomain", get(get_user_by_domain))
        .route("/user/getUserByDID", get(get_user_by_did))
        .route("/user/getUserByTrunkSourceIp", get(get_user_by_trunk_source_ip))
        .route("/user/getWorkspaceMacros", get(get_workspace_macros))
        .route("/user/getDIDNumberData", get(get_did_number_data))
        .route("/user/getPSTNProviderIP", get(get_pstn_provider_ip))
        .route("/user/getPSTNProviderIPForTrunk", get(get_pstn_provider_ip_for_trunk))
        .route("/user/ipWhitelistLookup", get(ip_whitelist_lookup))
        .route("/user/getDIDAcceptOption", get(get_did_accept_option))
        .route("/user/getDIDAssignedIP", get(get_did_assigned_ip))
        .route("/user/getUserAssignedIP", get(get_user_assigned_ip))
        .route("/user/getTrunkAssignedIP", get(get_trunk_assigned_ip))
        .route("/user/getCallerIdToUse", get(get_caller_id_to_use))
        .route("/user/getExtensionFlowInfo", get(get_extension_flow_info))
        .route("/user/getFlowInfo", get(get_flow_info))
        .route("/user/getCodeFlowInfo", get(get_code_flow_info))
        .route("/user/incomingDIDValidation", get(incoming_did_validation))
        .route("/user/incomingTrunkValidation", get(incoming_trunk_validation))
        .route("/user/lookupSIPTrunkByDID", get(lookup_sip_trunk_by_did))
        .route("/user/incomingMediaServerValidation", get(incoming_media_server_validation))
        .route("/user/storeRegistration", post(store_registration))
        .route("/user/getSettings", get(get_settings))
        .route("/user/processSIPTrunkCall", get(process_sip_trunk_call));

    if let Some(limiter) = limiter {
        user_routes = user_routes.route_layer(middleware::from_fn_with_state(limiter, rate_limit));
    }

    let mut app = Router::new()
        .merge(health_routes)
        .merge(user_routes)
        .with_state(state);

    // Metrics route (separate state)
    if let Some(handle) = prometheus_handle {
        let metrics_routes = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    app.route_layer(middleware::from_fn(track_metrics))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
