//! Routing query handlers
//!
//! Each handler maps query parameters onto one engine call and the outcome
//! onto a status code.

use super::dto::{
    ApiError, ApiResponse, CallerIdQuery, CodeFlowQuery, DidQuery, DidValidationQuery,
    DomainNumberQuery, DomainQuery, ExtensionFlowQuery, FlowQuery, NumberQuery, PstnQuery,
    SourceIpQuery, SourceQuery, StoreRegistrationForm, TrunkValidationQuery, UserAssignedQuery,
    VerifyCallerQuery, VerifyNumberResponse, WhitelistQuery, WorkspaceQuery,
};
use crate::application::RoutingEngine;
use crate::domain::call_config::{CallFlow, CallerIdInfo, CodeFlow, ExtensionFlow, MacroFunction, PlatformSettings};
use crate::domain::did::DidInfo;
use crate::domain::pstn::PstnRoute;
use crate::domain::sip_trunk::{TrunkMatch, TrunkRoute};
use crate::domain::tenant::WorkspaceProfile;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Form,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RoutingEngine>,
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::success("OK"))
}

pub async fn verify_caller(
    State(state): State<AppState>,
    Query(q): Query<VerifyCallerQuery>,
) -> ApiResult<Json<VerifyNumberResponse>> {
    let valid = state.engine.verify_caller(&q.workspace_id, &q.number).await?;
    Ok(Json(VerifyNumberResponse { valid }))
}

pub async fn verify_caller_by_domain(
    State(state): State<AppState>,
    Query(q): Query<DomainNumberQuery>,
) -> ApiResult<StatusCode> {
    state.engine.verify_caller_by_domain(&q.domain, &q.number).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user_by_domain(
    State(state): State<AppState>,
    Query(q): Query<DomainQuery>,
) -> ApiResult<Json<WorkspaceProfile>> {
    info!("API: user by domain {}", q.domain);
    Ok(Json(state.engine.user_by_domain(&q.domain).await?))
}

pub async fn get_user_by_did(
    State(state): State<AppState>,
    Query(q): Query<DidQuery>,
) -> ApiResult<Json<WorkspaceProfile>> {
    Ok(Json(state.engine.user_by_did(&q.did).await?))
}

pub async fn get_user_by_trunk_source_ip(
    State(state): State<AppState>,
    Query(q): Query<SourceIpQuery>,
) -> ApiResult<Json<WorkspaceProfile>> {
    Ok(Json(state.engine.user_by_trunk_source_ip(&q.source_ip).await?))
}

pub async fn get_workspace_macros(
    State(state): State<AppState>,
    Query(q): Query<WorkspaceQuery>,
) -> ApiResult<Json<Vec<MacroFunction>>> {
    Ok(Json(state.engine.workspace_macros(&q.workspace).await?))
}

pub async fn get_did_number_data(
    State(state): State<AppState>,
    Query(q): Query<NumberQuery>,
) -> ApiResult<Json<DidInfo>> {
    Ok(Json(state.engine.did_number_data(&q.number).await?))
}

pub async fn get_pstn_provider_ip(
    State(state): State<AppState>,
    Query(q): Query<PstnQuery>,
) -> ApiResult<Json<PstnRoute>> {
    Ok(Json(state.engine.pstn_provider(&q.from, &q.to, &q.domain).await?))
}

pub async fn get_pstn_provider_ip_for_trunk(
    State(state): State<AppState>,
    Query(q): Query<PstnQuery>,
) -> ApiResult<Json<PstnRoute>> {
    Ok(Json(state.engine.pstn_provider_for_trunk(&q.from, &q.to).await?))
}

/// 204 when the address is whitelisted, 404 otherwise
pub async fn ip_whitelist_lookup(
    State(state): State<AppState>,
    Query(q): Query<WhitelistQuery>,
) -> ApiResult<StatusCode> {
    if state.engine.ip_whitelist_lookup(&q.ip, &q.domain).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}

pub async fn get_did_accept_option(
    State(state): State<AppState>,
    Query(q): Query<DidQuery>,
) -> ApiResult<Json<String>> {
    Ok(Json(state.engine.did_accept_option(&q.did).await?))
}

pub async fn get_did_assigned_ip(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.engine.did_assigned_server().await?.private_ip_address)
}

pub async fn get_user_assigned_ip(
    State(state): State<AppState>,
    Query(q): Query<UserAssignedQuery>,
) -> ApiResult<String> {
    let server = state
        .engine
        .user_assigned_server(&q.rtc_optimized, &q.domain, &q.router_ip)
        .await?;
    Ok(server.private_ip_address)
}

pub async fn get_trunk_assigned_ip(State(state): State<AppState>) -> ApiResult<String> {
    Ok(state.engine.trunk_assigned_server().await?.private_ip_address)
}

pub async fn get_caller_id_to_use(
    State(state): State<AppState>,
    Query(q): Query<CallerIdQuery>,
) -> ApiResult<Json<CallerIdInfo>> {
    Ok(Json(state.engine.caller_id_to_use(&q.domain, &q.extension).await?))
}

pub async fn get_extension_flow_info(
    State(state): State<AppState>,
    Query(q): Query<ExtensionFlowQuery>,
) -> ApiResult<Json<ExtensionFlow>> {
    Ok(Json(state.engine.extension_flow(&q.workspace, &q.extension).await?))
}

pub async fn get_flow_info(
    State(state): State<AppState>,
    Query(q): Query<FlowQuery>,
) -> ApiResult<Json<CallFlow>> {
    Ok(Json(state.engine.flow(&q.workspace, &q.flow_id).await?))
}

pub async fn get_code_flow_info(
    State(state): State<AppState>,
    Query(q): Query<CodeFlowQuery>,
) -> ApiResult<Json<CodeFlow>> {
    Ok(Json(state.engine.code_flow(&q.workspace, &q.code).await?))
}

/// Verdict as a JSON string
pub async fn incoming_did_validation(
    State(state): State<AppState>,
    Query(q): Query<DidValidationQuery>,
) -> ApiResult<Json<&'static str>> {
    let verdict = state
        .engine
        .incoming_did_validation(&q.did, &q.number, &q.source)
        .await?;
    Ok(Json(verdict.as_str()))
}

pub async fn incoming_trunk_validation(
    State(state): State<AppState>,
    Query(q): Query<TrunkValidationQuery>,
) -> ApiResult<Json<TrunkMatch>> {
    Ok(Json(state.engine.incoming_trunk_validation(&q.fromdomain).await?))
}

pub async fn lookup_sip_trunk_by_did(
    State(state): State<AppState>,
    Query(q): Query<DidQuery>,
) -> ApiResult<Json<TrunkRoute>> {
    Ok(Json(state.engine.lookup_trunk_by_did(&q.did).await?))
}

pub async fn process_sip_trunk_call(
    State(state): State<AppState>,
    Query(q): Query<DidQuery>,
) -> ApiResult<String> {
    Ok(state.engine.process_sip_trunk_call(&q.did).await?)
}

/// 204 for one of our media servers, 404 otherwise
pub async fn incoming_media_server_validation(
    State(state): State<AppState>,
    Query(q): Query<SourceQuery>,
) -> Response {
    if state.engine.incoming_media_server_validation(&q.source) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no media server found at {}", q.source) })),
        )
            .into_response()
    }
}

pub async fn store_registration(
    State(state): State<AppState>,
    Form(form): Form<StoreRegistrationForm>,
) -> ApiResult<StatusCode> {
    state
        .engine
        .store_registration(&form.domain, &form.user, &form.expires)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<PlatformSettings>> {
    Ok(Json(state.engine.settings().await?))
}
