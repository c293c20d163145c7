//! Tenant directory: resolves the workspace that owns a piece of signaling
use super::shared::{Result, RoutingError, WorkspaceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Workspace (tenant). Read-only to the routing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub creator_id: i64,
    /// Customer may bring their own carriers
    pub byo_enabled: bool,
    pub outbound_macro_id: Option<i64>,
}

impl Workspace {
    pub fn new(id: i64, name: impl Into<String>, creator_id: i64) -> Self {
        Self {
            id: WorkspaceId::new(id),
            name: name.into(),
            creator_id,
            byo_enabled: false,
            outbound_macro_id: None,
        }
    }

    pub fn with_byo_enabled(mut self, enabled: bool) -> Self {
        self.byo_enabled = enabled;
        self
    }

    pub fn with_outbound_macro(mut self, macro_id: i64) -> Self {
        self.outbound_macro_id = Some(macro_id);
        self
    }

    /// Signaling domain, `{name}.{platform_domain}`
    pub fn domain(&self, platform_domain: &str) -> String {
        format!("{}.{}", self.name, platform_domain)
    }
}

/// Free-form per-workspace settings
pub type WorkspaceParams = BTreeMap<String, String>;

/// Workspace as handed to the signaling proxy, with its creator and params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceProfile {
    /// Creator (owning user) id
    pub id: i64,
    pub workspace: Workspace,
    pub workspace_params: WorkspaceParams,
    pub workspace_name: String,
    pub workspace_domain: String,
    pub workspace_id: WorkspaceId,
    pub outbound_macro_id: Option<i64>,
}

/// Storage contract for workspaces
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkspaceRepository: Send + Sync {
    /// Find a workspace by its name (the first label of its domain)
    async fn find_by_name(&self, name: &str) -> Result<Option<Workspace>>;

    /// Find a workspace by id
    async fn find_by_id(&self, id: WorkspaceId) -> Result<Option<Workspace>>;

    /// Find the workspace owning a DID (managed or BYO)
    async fn find_by_did(&self, did: &str) -> Result<Option<Workspace>>;

    /// Find the workspace owning a trunk with the given source address
    async fn find_by_trunk_source_ip(&self, ip: &str) -> Result<Option<Workspace>>;

    /// Workspace parameters; empty when none are configured
    async fn workspace_params(&self, id: WorkspaceId) -> Result<WorkspaceParams>;
}

/// Tenant directory
pub struct TenantDirectory {
    repository: Arc<dyn WorkspaceRepository>,
    platform_domain: String,
}

impl TenantDirectory {
    pub fn new(repository: Arc<dyn WorkspaceRepository>, platform_domain: impl Into<String>) -> Self {
        Self {
            repository,
            platform_domain: platform_domain.into().to_ascii_lowercase(),
        }
    }

    pub fn platform_domain(&self) -> &str {
        &self.platform_domain
    }

    /// Extract the workspace name from `{name}.{platform_domain}`
    fn workspace_name<'a>(&self, domain: &'a str) -> Option<&'a str> {
        let domain = domain.trim().trim_end_matches('.');
        let cut = domain.len().checked_sub(self.platform_domain.len())?;
        if cut < 2 || !domain.is_char_boundary(cut) {
            return None;
        }
        let (name, suffix) = domain.split_at(cut);
        let name = name.strip_suffix('.')?;
        if !suffix.eq_ignore_ascii_case(&self.platform_domain) || name.contains('.') {
            return None;
        }
        Some(name)
    }

    pub async fn resolve_by_domain(&self, domain: &str) -> Result<Workspace> {
        debug!("Resolving workspace for domain {}", domain);
        let name = self
            .workspace_name(domain)
            .ok_or_else(|| RoutingError::not_found(format!("domain {} is not hosted here", domain)))?;

        self.repository
            .find_by_name(&name.to_ascii_lowercase())
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("workspace for domain {}", domain)))
    }

    pub async fn resolve_by_id(&self, id: WorkspaceId) -> Result<Workspace> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("workspace {}", id)))
    }

    /// Domain of the workspace owning `did`
    pub async fn resolve_by_did(&self, did: &str) -> Result<String> {
        let workspace = self
            .repository
            .find_by_did(did)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("workspace for DID {}", did)))?;
        Ok(workspace.domain(&self.platform_domain))
    }

    /// Domain of the workspace owning a trunk that sends from `ip`
    pub async fn resolve_by_source_ip(&self, ip: &str) -> Result<String> {
        let workspace = self
            .repository
            .find_by_trunk_source_ip(ip)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("workspace for trunk source {}", ip)))?;
        Ok(workspace.domain(&self.platform_domain))
    }

    pub async fn workspace_params(&self, id: WorkspaceId) -> Result<WorkspaceParams> {
        self.repository.workspace_params(id).await
    }

    pub async fn profile(&self, workspace: Workspace) -> Result<WorkspaceProfile> {
        let params = self.repository.workspace_params(workspace.id).await?;
        Ok(WorkspaceProfile {
            id: workspace.creator_id,
            workspace_params: params,
            workspace_name: workspace.name.clone(),
            workspace_domain: workspace.domain(&self.platform_domain),
            workspace_id: workspace.id,
            outbound_macro_id: workspace.outbound_macro_id,
            workspace,
        })
    }

    pub async fn profile_by_domain(&self, domain: &str) -> Result<WorkspaceProfile> {
        info!("Profile lookup by domain {}", domain);
        let workspace = self.resolve_by_domain(domain).await?;
        self.profile(workspace).await
    }

    pub async fn profile_by_did(&self, did: &str) -> Result<WorkspaceProfile> {
        info!("Profile lookup by DID {}", did);
        let domain = self.resolve_by_did(did).await?;
        let workspace = self.resolve_by_domain(&domain).await?;
        self.profile(workspace).await
    }

    pub async fn profile_by_source_ip(&self, ip: &str) -> Result<WorkspaceProfile> {
        info!("Profile lookup by trunk source {}", ip);
        let domain = self.resolve_by_source_ip(ip).await?;
        let workspace = self.resolve_by_domain(&domain).await?;
        self.profile(workspace).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn acme() -> Workspace {
        Workspace::new(7, "acme", 100).with_outbound_macro(3)
    }

    fn directory(repo: MockWorkspaceRepository) -> TenantDirectory {
        TenantDirectory::new(Arc::new(repo), "lineroute.io")
    }

    #[test]
    fn test_workspace_domain() {
        assert_eq!(acme().domain("lineroute.io"), "acme.lineroute.io");
    }

    #[test]
    fn test_workspace_name_extraction() {
        let dir = directory(MockWorkspaceRepository::new());
        assert_eq!(dir.workspace_name("acme.lineroute.io"), Some("acme"));
        assert_eq!(dir.workspace_name("acme.LineRoute.io."), Some("acme"));
        assert_eq!(dir.workspace_name("lineroute.io"), None);
        assert_eq!(dir.workspace_name("acme.example.com"), None);
        assert_eq!(dir.workspace_name("a.b.lineroute.io"), None);
        assert_eq!(dir.workspace_name("acmelineroute.io"), None);
    }

    #[tokio::test]
    async fn test_resolve_by_domain() {
        let mut repo = MockWorkspaceRepository::new();
        repo.expect_find_by_name()
            .with(eq("acme"))
            .returning(|_| Ok(Some(acme())));

        let workspace = directory(repo).resolve_by_domain("ACME.lineroute.io").await.unwrap();
        assert_eq!(workspace.id, WorkspaceId::new(7));
    }

    #[tokio::test]
    async fn test_foreign_domain_is_not_found_without_storage_call() {
        let mut repo = MockWorkspaceRepository::new();
        repo.expect_find_by_name().never();

        let err = directory(repo).resolve_by_domain("acme.example.com").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let mut repo = MockWorkspaceRepository::new();
        repo.expect_find_by_id()
            .returning(|_| Err(RoutingError::storage("connection refused")));

        let err = directory(repo).resolve_by_id(WorkspaceId::new(1)).await.unwrap_err();
        assert!(matches!(err, RoutingError::Storage(_)));
    }

    #[tokio::test]
    async fn test_resolve_by_did_returns_domain() {
        let mut repo = MockWorkspaceRepository::new();
        repo.expect_find_by_did()
            .with(eq("+15550001"))
            .returning(|_| Ok(Some(acme())));
        repo.expect_find_by_did().returning(|_| Ok(None));

        let dir = directory(repo);
        assert_eq!(dir.resolve_by_did("+15550001").await.unwrap(), "acme.lineroute.io");
        assert!(dir.resolve_by_did("+15559999").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_profile_by_source_ip() {
        let mut repo = MockWorkspaceRepository::new();
        repo.expect_find_by_trunk_source_ip()
            .with(eq("203.0.113.9"))
            .returning(|_| Ok(Some(acme())));
        repo.expect_find_by_name().returning(|_| Ok(Some(acme())));
        repo.expect_workspace_params().returning(|_| {
            let mut params = WorkspaceParams::new();
            params.insert("recording".to_string(), "on".to_string());
            Ok(params)
        });

        let profile = directory(repo).profile_by_source_ip("203.0.113.9").await.unwrap();
        assert_eq!(profile.id, 100);
        assert_eq!(profile.workspace_domain, "acme.lineroute.io");
        assert_eq!(profile.outbound_macro_id, Some(3));
        assert_eq!(profile.workspace_params.get("recording").map(String::as_str), Some("on"));
    }
}
