//! Request and response types for the routing API

use crate::domain::shared::{Rejection, RoutingError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, warn};

/// Generic API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Result of a caller verification
#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyNumberResponse {
    pub valid: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyCallerQuery {
    pub workspace_id: String,
    pub number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DomainNumberQuery {
    pub domain: String,
    pub number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DomainQuery {
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DidQuery {
    pub did: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NumberQuery {
    pub number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceIpQuery {
    pub source_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceQuery {
    pub workspace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PstnQuery {
    pub from: String,
    pub to: String,
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WhitelistQuery {
    pub ip: String,
    pub domain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserAssignedQuery {
    pub rtc_optimized: String,
    #[serde(rename = "domain")]
    pub domain: String,
    #[serde(rename = "routerip")]
    pub router_ip: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CallerIdQuery {
    pub domain: String,
    pub extension: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExtensionFlowQuery {
    pub workspace: String,
    pub extension: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FlowQuery {
    pub workspace: String,
    pub flow_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CodeFlowQuery {
    pub workspace: String,
    pub code: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DidValidationQuery {
    pub did: String,
    pub number: String,
    pub source: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrunkValidationQuery {
    pub fromdomain: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SourceQuery {
    pub source: String,
}

/// Client address a rate-limited request is charged to
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AddrQuery {
    pub addr: String,
}

/// Form body of `POST /user/storeRegistration`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StoreRegistrationForm {
    pub domain: String,
    pub user: String,
    pub expires: String,
}

/// HTTP status for each routing outcome
pub fn status_for(err: &RoutingError) -> StatusCode {
    match err {
        RoutingError::NotFound(_) => StatusCode::NOT_FOUND,
        RoutingError::Unauthorized(_) => StatusCode::FORBIDDEN,
        RoutingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RoutingError::Resolution(_) => StatusCode::BAD_GATEWAY,
        RoutingError::Config(_) => StatusCode::BAD_REQUEST,
        RoutingError::NoCapacity => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Routing error rendered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(pub RoutingError);

impl From<RoutingError> for ApiError {
    fn from(err: RoutingError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        match &self.0 {
            RoutingError::NotFound(what) => debug!("Not found: {}", what),
            RoutingError::Unauthorized(Rejection::SourceNotWhitelisted) => {
                warn!("Rejected: source not whitelisted")
            }
            RoutingError::Unauthorized(Rejection::CallerNotValid) => warn!("Rejected: caller not valid"),
            other => error!("Routing request failed: {}", other),
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
