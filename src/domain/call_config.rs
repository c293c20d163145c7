//! Tenant call configuration: caller ids, extension/code/generic flows, macros

use super::shared::{Result, RoutingError, WorkspaceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdInfo {
    pub caller_id: String,
}

/// Flow attached to an extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionFlow {
    pub workspace_id: WorkspaceId,
    pub extension: String,
    pub flow_id: i64,
    pub flow_json: String,
}

/// Flow attached to a numeric dial code (e.g. `*97`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFlow {
    pub workspace_id: WorkspaceId,
    pub code: String,
    pub flow_id: i64,
    pub flow_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFlow {
    pub workspace_id: WorkspaceId,
    pub flow_id: i64,
    pub name: String,
    pub flow_json: String,
}

/// User-defined macro function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroFunction {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub title: String,
    pub code: String,
}

/// Platform-wide settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub values: BTreeMap<String, String>,
}

/// Storage contract for call configuration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallConfigRepository: Send + Sync {
    async fn caller_id(&self, workspace_id: WorkspaceId, extension: &str) -> Result<Option<String>>;

    async fn extension_flow(
        &self,
        workspace_id: WorkspaceId,
        extension: &str,
    ) -> Result<Option<ExtensionFlow>>;

    async fn code_flow(&self, workspace_id: WorkspaceId, code: &str) -> Result<Option<CodeFlow>>;

    async fn flow(&self, workspace_id: WorkspaceId, flow_id: i64) -> Result<Option<CallFlow>>;

    async fn workspace_macros(&self, workspace_id: WorkspaceId) -> Result<Vec<MacroFunction>>;

    async fn settings(&self) -> Result<Option<PlatformSettings>>;
}

/// Call configuration resolver
pub struct CallConfigResolver {
    repository: Arc<dyn CallConfigRepository>,
}

impl CallConfigResolver {
    pub fn new(repository: Arc<dyn CallConfigRepository>) -> Self {
        Self { repository }
    }

    pub async fn caller_id_to_use(&self, workspace_id: WorkspaceId, extension: &str) -> Result<CallerIdInfo> {
        info!("Caller id lookup {}@{}", extension, workspace_id);
        self.repository
            .caller_id(workspace_id, extension)
            .await?
            .map(|caller_id| CallerIdInfo { caller_id })
            .ok_or_else(|| RoutingError::not_found(format!("caller id for extension {}", extension)))
    }

    pub async fn extension_flow(&self, workspace_id: WorkspaceId, extension: &str) -> Result<ExtensionFlow> {
        info!("Extension flow lookup {}@{}", extension, workspace_id);
        self.repository
            .extension_flow(workspace_id, extension)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("flow for extension {}", extension)))
    }

    pub async fn code_flow(&self, workspace_id: WorkspaceId, code: &str) -> Result<CodeFlow> {
        info!("Code flow lookup {}@{}", code, workspace_id);
        self.repository
            .code_flow(workspace_id, code)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("flow for code {}", code)))
    }

    pub async fn flow(&self, workspace_id: WorkspaceId, flow_id: i64) -> Result<CallFlow> {
        info!("Flow lookup {}@{}", flow_id, workspace_id);
        self.repository
            .flow(workspace_id, flow_id)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("flow {}", flow_id)))
    }

    /// Macros for a workspace; an empty list is not a miss
    pub async fn workspace_macros(&self, workspace_id: WorkspaceId) -> Result<Vec<MacroFunction>> {
        self.repository.workspace_macros(workspace_id).await
    }

    pub async fn settings(&self) -> Result<PlatformSettings> {
        self.repository
            .settings()
            .await?
            .ok_or_else(|| RoutingError::not_found("platform settings"))
    }
}
