//! DID resolution
//!
//! Decides where an inbound call to a DID goes:
//!
//! ```text
//! managed lookup ──hit──> trunk id set? ──yes──> user_sip_trunk
//!      │                        │no
//!      │                        └──> whitelist ─> caller ─> network_managed
//!      └─miss─> BYO lookup ─hit─> whitelist ─> caller ─> byo_carrier
//!                    └─miss─> NotFound
//! ```
//!
//! The managed table always wins; the BYO table is consulted only on a
//! managed miss. Gates short-circuit: a whitelist miss never reaches the
//! caller check.

use super::authorization::{AuthorizationGate, WhitelistScope};
use super::shared::{Rejection, Result, RoutingError, SourceAddr, WorkspaceId};
use super::tenant::{TenantDirectory, WorkspaceParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The two disjoint DID tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DidTable {
    /// Platform-managed numbers
    Managed,
    /// Customer-supplied numbers
    Byo,
}

impl DidTable {
    /// Whitelist the source address is checked against for this table
    pub fn whitelist_scope(&self) -> WhitelistScope {
        match self {
            DidTable::Managed => WhitelistScope::Workspace,
            DidTable::Byo => WhitelistScope::ByoCarrier,
        }
    }

    /// Verdict on a fully authorized, non-trunk call
    fn verdict(&self) -> DidVerdict {
        match self {
            DidTable::Managed => DidVerdict::NetworkManaged,
            DidTable::Byo => DidVerdict::ByoCarrier,
        }
    }
}

/// A DID number row from either table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidNumber {
    pub number: String,
    pub workspace_id: WorkspaceId,
    /// Non-zero routes the DID to a customer SIP trunk
    pub trunk_id: i64,
    pub flow_json: Option<String>,
    pub accept_option: String,
    pub table: DidTable,
}

impl DidNumber {
    pub fn managed(number: impl Into<String>, workspace_id: WorkspaceId) -> Self {
        Self {
            number: number.into(),
            workspace_id,
            trunk_id: 0,
            flow_json: None,
            accept_option: "accept-call".to_string(),
            table: DidTable::Managed,
        }
    }

    pub fn byo(number: impl Into<String>, workspace_id: WorkspaceId) -> Self {
        Self {
            table: DidTable::Byo,
            ..Self::managed(number, workspace_id)
        }
    }

    pub fn with_trunk(mut self, trunk_id: i64) -> Self {
        self.trunk_id = trunk_id;
        self
    }

    pub fn with_flow(mut self, flow_json: impl Into<String>) -> Self {
        self.flow_json = Some(flow_json.into());
        self
    }

    pub fn with_accept_option(mut self, option: impl Into<String>) -> Self {
        self.accept_option = option.into();
        self
    }

    pub fn routes_to_trunk(&self) -> bool {
        self.trunk_id != 0
    }
}

/// Routing verdict for an inbound DID call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DidVerdict {
    UserSipTrunk,
    NetworkManaged,
    ByoCarrier,
}

impl DidVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidVerdict::UserSipTrunk => "user_sip_trunk",
            DidVerdict::NetworkManaged => "network_managed",
            DidVerdict::ByoCarrier => "byo_carrier",
        }
    }
}

impl fmt::Display for DidVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// DID with its workspace parameters, as served to the proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidInfo {
    #[serde(flatten)]
    pub did: DidNumber,
    pub workspace_params: WorkspaceParams,
}

/// Storage contract for DID tables
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DidRepository: Send + Sync {
    async fn find_did(&self, table: DidTable, number: &str) -> Result<Option<DidNumber>>;
}

/// DID resolution resolver
pub struct DidResolver {
    repository: Arc<dyn DidRepository>,
    gate: Arc<AuthorizationGate>,
    directory: Arc<TenantDirectory>,
}

impl DidResolver {
    pub fn new(
        repository: Arc<dyn DidRepository>,
        gate: Arc<AuthorizationGate>,
        directory: Arc<TenantDirectory>,
    ) -> Self {
        Self {
            repository,
            gate,
            directory,
        }
    }

    /// Managed first; BYO only when the managed table misses
    async fn lookup(&self, number: &str) -> Result<Option<DidNumber>> {
        if let Some(did) = self.repository.find_did(DidTable::Managed, number).await? {
            return Ok(Some(did));
        }
        debug!("No managed DID {}, looking up BYO DIDs", number);
        self.repository.find_did(DidTable::Byo, number).await
    }

    /// Resolve an inbound DID call to a verdict
    pub async fn resolve(
        &self,
        did: &str,
        calling_number: &str,
        source: &SourceAddr,
    ) -> Result<DidVerdict> {
        info!("Incoming DID validation: did={} from={} source={}", did, calling_number, source);

        let record = self
            .lookup(did)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("no DID match found for {}", did)))?;

        if record.table == DidTable::Managed && record.routes_to_trunk() {
            info!("DID {} is bound to trunk {}, routing to user SIP trunk", did, record.trunk_id);
            return Ok(DidVerdict::UserSipTrunk);
        }

        self.authorize(&record, calling_number, source).await?;

        let verdict = record.table.verdict();
        info!("Matched incoming DID {}: {}", did, verdict);
        Ok(verdict)
    }

    /// Whitelist gate, then caller gate, against the record's own table
    async fn authorize(&self, record: &DidNumber, calling_number: &str, source: &SourceAddr) -> Result<()> {
        let scope = record.table.whitelist_scope();
        if !self
            .gate
            .ip_whitelisted_in(scope, source, record.workspace_id)
            .await?
        {
            warn!("DID {}: source {} not whitelisted ({:?})", record.number, source, scope);
            return Err(RoutingError::Unauthorized(Rejection::SourceNotWhitelisted));
        }

        if !self
            .gate
            .verify_caller(record.workspace_id, calling_number)
            .await?
        {
            warn!("DID {}: caller {} not valid", record.number, calling_number);
            return Err(RoutingError::Unauthorized(Rejection::CallerNotValid));
        }

        Ok(())
    }

    /// DID record with flow document and workspace params
    pub async fn did_info(&self, number: &str) -> Result<DidInfo> {
        info!("DID number data lookup: {}", number);
        let did = self
            .lookup(number)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("DID {}", number)))?;
        let workspace_params = self.directory.workspace_params(did.workspace_id).await?;
        Ok(DidInfo {
            did,
            workspace_params,
        })
    }

    /// Accept action configured on the DID
    pub async fn accept_option(&self, number: &str) -> Result<String> {
        self.lookup(number)
            .await?
            .map(|did| did.accept_option)
            .ok_or_else(|| RoutingError::not_found(format!("DID {}", number)))
    }

    /// The raw DID row, for trunk routing
    pub async fn find(&self, number: &str) -> Result<DidNumber> {
        self.lookup(number)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("DID {}", number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::authorization::MockAuthorizationRepository;
    use crate::domain::tenant::MockWorkspaceRepository;
    use mockall::predicate::eq;

    const DID: &str = "+15550001";

    fn ws() -> WorkspaceId {
        WorkspaceId::new(1)
    }

    fn resolver(dids: MockDidRepository, auth: MockAuthorizationRepository) -> DidResolver {
        let mut workspaces = MockWorkspaceRepository::new();
        workspaces
            .expect_workspace_params()
            .returning(|_| Ok(WorkspaceParams::new()));
        DidResolver::new(
            Arc::new(dids),
            Arc::new(AuthorizationGate::new(Arc::new(auth), true)),
            Arc::new(TenantDirectory::new(Arc::new(workspaces), "lineroute.io")),
        )
    }

    fn managed_only(did: DidNumber) -> MockDidRepository {
        let mut dids = MockDidRepository::new();
        dids.expect_find_did()
            .with(eq(DidTable::Managed), eq(DID))
            .returning(move |_, _| Ok(Some(did.clone())));
        dids.expect_find_did()
            .with(eq(DidTable::Byo), eq(DID))
            .never();
        dids
    }

    fn byo_only(did: DidNumber) -> MockDidRepository {
        let mut dids = MockDidRepository::new();
        dids.expect_find_did()
            .with(eq(DidTable::Managed), eq(DID))
            .returning(|_, _| Ok(None));
        dids.expect_find_did()
            .with(eq(DidTable::Byo), eq(DID))
            .returning(move |_, _| Ok(Some(did.clone())));
        dids
    }

    fn passing_gates(scope: WhitelistScope) -> MockAuthorizationRepository {
        let mut auth = MockAuthorizationRepository::new();
        auth.expect_whitelist_entries()
            .with(eq(scope), eq(ws()))
            .returning(|_, _| Ok(vec!["10.0.0.0/24".to_string()]));
        auth.expect_is_caller_verified()
            .with(eq(ws()), eq("+15551234"))
            .returning(|_, _| Ok(true));
        auth.expect_is_caller_verified().returning(|_, _| Ok(false));
        auth
    }

    #[tokio::test]
    async fn test_managed_did_network_managed() {
        let r = resolver(
            managed_only(DidNumber::managed(DID, ws())),
            passing_gates(WhitelistScope::Workspace),
        );
        let verdict = r.resolve(DID, "+15551234", &"10.0.0.5".into()).await.unwrap();
        assert_eq!(verdict, DidVerdict::NetworkManaged);
        assert_eq!(verdict.as_str(), "network_managed");
    }

    #[tokio::test]
    async fn test_trunk_did_short_circuits_gates() {
        let mut auth = MockAuthorizationRepository::new();
        auth.expect_whitelist_entries().never();
        auth.expect_is_caller_verified().never();

        let r = resolver(managed_only(DidNumber::managed(DID, ws()).with_trunk(9)), auth);
        let verdict = r.resolve(DID, "+15550000", &"8.8.8.8".into()).await.unwrap();
        assert_eq!(verdict, DidVerdict::UserSipTrunk);
    }

    #[tokio::test]
    async fn test_whitelist_miss_skips_caller_gate() {
        let mut auth = MockAuthorizationRepository::new();
        auth.expect_whitelist_entries()
            .returning(|_, _| Ok(vec!["10.0.0.5".to_string()]));
        auth.expect_is_caller_verified().never();

        let r = resolver(managed_only(DidNumber::managed(DID, ws())), auth);
        let err = r.resolve(DID, "+15551234", &"8.8.8.8".into()).await.unwrap_err();
        assert_eq!(err, RoutingError::Unauthorized(Rejection::SourceNotWhitelisted));
    }

    #[tokio::test]
    async fn test_invalid_caller_is_unauthorized() {
        let r = resolver(
            managed_only(DidNumber::managed(DID, ws())),
            passing_gates(WhitelistScope::Workspace),
        );
        let err = r.resolve(DID, "+15550000", &"10.0.0.5".into()).await.unwrap_err();
        assert_eq!(err, RoutingError::Unauthorized(Rejection::CallerNotValid));
    }

    #[tokio::test]
    async fn test_byo_did_uses_carrier_whitelist() {
        let r = resolver(
            byo_only(DidNumber::byo(DID, ws())),
            passing_gates(WhitelistScope::ByoCarrier),
        );
        let verdict = r.resolve(DID, "+15551234", &"10.0.0.9".into()).await.unwrap();
        assert_eq!(verdict, DidVerdict::ByoCarrier);
    }

    #[tokio::test]
    async fn test_byo_did_gate_failure() {
        let mut auth = MockAuthorizationRepository::new();
        auth.expect_whitelist_entries().returning(|_, _| Ok(vec![]));
        auth.expect_is_caller_verified().never();

        let r = resolver(byo_only(DidNumber::byo(DID, ws())), auth);
        let err = r.resolve(DID, "+15551234", &"10.0.0.9".into()).await.unwrap_err();
        assert_eq!(err, RoutingError::Unauthorized(Rejection::SourceNotWhitelisted));
    }

    #[tokio::test]
    async fn test_unknown_did_is_not_found() {
        let mut dids = MockDidRepository::new();
        dids.expect_find_did().times(2).returning(|_, _| Ok(None));
        let mut auth = MockAuthorizationRepository::new();
        auth.expect_whitelist_entries().never();

        let err = resolver(dids, auth)
            .resolve(DID, "+15551234", &"10.0.0.5".into())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_managed_storage_error_does_not_fall_back() {
        let mut dids = MockDidRepository::new();
        dids.expect_find_did()
            .with(eq(DidTable::Managed), eq(DID))
            .returning(|_, _| Err(RoutingError::storage("connection reset")));
        dids.expect_find_did()
            .with(eq(DidTable::Byo), eq(DID))
            .never();

        let err = resolver(dids, MockAuthorizationRepository::new())
            .resolve(DID, "+15551234", &"10.0.0.5".into())
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Storage(_)));
    }

    #[tokio::test]
    async fn test_accept_option_falls_back_to_byo() {
        let r = resolver(
            byo_only(DidNumber::byo(DID, ws()).with_accept_option("accept-fax")),
            MockAuthorizationRepository::new(),
        );
        assert_eq!(r.accept_option(DID).await.unwrap(), "accept-fax");
    }

    #[tokio::test]
    async fn test_did_info_includes_flow() {
        let r = resolver(
            managed_only(DidNumber::managed(DID, ws()).with_flow(r#"{"cells":[]}"#)),
            MockAuthorizationRepository::new(),
        );
        let info = r.did_info(DID).await.unwrap();
        assert_eq!(info.did.flow_json.as_deref(), Some(r#"{"cells":[]}"#));
        assert!(info.workspace_params.is_empty());
    }
}
