//! SIP trunk records and inbound trunk validation
use super::did::{DidRepository, DidTable};
use super::shared::{Result, RoutingError, WorkspaceId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Who operates the far end of the trunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrunkKind {
    /// Platform-hosted trunk
    Hosted,
    /// Customer-supplied trunk
    Byo,
}

/// Where calls terminating on the trunk are sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkTermination {
    pub sip_uri: String,
    pub online: bool,
}

/// SIP trunk registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trunk {
    pub id: i64,
    pub workspace_id: WorkspaceId,
    pub name: String,
    pub kind: TrunkKind,
    /// Addresses the customer's PBX sends from
    pub source_ips: Vec<String>,
    /// Termination targets in preference order
    pub terminations: Vec<TrunkTermination>,
}

impl Trunk {
    pub fn new(id: i64, workspace_id: WorkspaceId, name: impl Into<String>, kind: TrunkKind) -> Self {
        Self {
            id,
            workspace_id,
            name: name.into(),
            kind,
            source_ips: Vec::new(),
            terminations: Vec::new(),
        }
    }

    /// Add an allowed source address
    pub fn add_source_ip(&mut self, ip: impl Into<String>) {
        let ip = ip.into();
        if !self.source_ips.contains(&ip) {
            self.source_ips.push(ip);
        }
    }

    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.add_source_ip(ip);
        self
    }

    pub fn with_termination(mut self, sip_uri: impl Into<String>, online: bool) -> Self {
        self.terminations.push(TrunkTermination {
            sip_uri: sip_uri.into(),
            online,
        });
        self
    }

    /// Exact address equality against the registered source addresses
    pub fn is_ip_allowed(&self, ip: IpAddr) -> bool {
        self.source_ips
            .iter()
            .filter_map(|allowed| allowed.trim().parse::<IpAddr>().ok())
            .any(|allowed| allowed == ip)
    }

    /// First termination currently online
    pub fn online_termination(&self) -> Option<&TrunkTermination> {
        self.terminations.iter().find(|t| t.online)
    }
}

/// Result of a successful inbound trunk validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkMatch {
    pub trunk_id: i64,
    pub workspace_id: WorkspaceId,
    pub kind: TrunkKind,
    pub ip_address: String,
}

/// Where a trunk-routed DID is delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkRoute {
    pub trunk_id: i64,
    pub workspace_id: WorkspaceId,
    pub sip_uri: String,
}

/// Storage contract for trunks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrunkRepository: Send + Sync {
    /// All trunks, ordered by id
    async fn list_trunks(&self) -> Result<Vec<Trunk>>;

    async fn find_trunk(&self, trunk_id: i64) -> Result<Option<Trunk>>;
}

/// Resolves a signaling domain to an address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Fails with `RoutingError::Resolution`
    async fn resolve(&self, domain: &str) -> Result<IpAddr>;
}

/// SIP trunk validator
pub struct SipTrunkValidator {
    trunks: Arc<dyn TrunkRepository>,
    dids: Arc<dyn DidRepository>,
    resolver: Arc<dyn AddressResolver>,
}

impl SipTrunkValidator {
    pub fn new(
        trunks: Arc<dyn TrunkRepository>,
        dids: Arc<dyn DidRepository>,
        resolver: Arc<dyn AddressResolver>,
    ) -> Self {
        Self {
            trunks,
            dids,
            resolver,
        }
    }

    /// Authorize inbound trunk traffic signaled from `from_domain`
    pub async fn validate_inbound(&self, from_domain: &str) -> Result<TrunkMatch> {
        info!("Incoming trunk validation for {}", from_domain);

        let ip = self.resolver.resolve(from_domain).await?;
        debug!("From domain {} trunk IP is {}", from_domain, ip);

        let trunks = self.trunks.list_trunks().await?;
        let matched = trunks
            .into_iter()
            .find(|trunk| trunk.is_ip_allowed(ip))
            .ok_or_else(|| {
                warn!("Checked all SIP trunks, none matched {}", ip);
                RoutingError::not_found(format!("no trunk found for {}", ip))
            })?;

        info!("Trunk {} ({:?}) matched {}", matched.id, matched.kind, ip);
        Ok(TrunkMatch {
            trunk_id: matched.id,
            workspace_id: matched.workspace_id,
            kind: matched.kind,
            ip_address: ip.to_string(),
        })
    }

    /// Trunk and online termination a trunk-routed DID is delivered to
    pub async fn trunk_for_did(&self, did: &str) -> Result<TrunkRoute> {
        info!("Looking up SIP trunk for DID {}", did);

        let record = self
            .dids
            .find_did(DidTable::Managed, did)
            .await?
            .filter(|record| record.routes_to_trunk())
            .ok_or_else(|| RoutingError::not_found(format!("no trunk bound to DID {}", did)))?;

        let trunk = self
            .trunks
            .find_trunk(record.trunk_id)
            .await?
            .ok_or_else(|| RoutingError::not_found(format!("trunk {}", record.trunk_id)))?;

        let termination = trunk.online_termination().ok_or_else(|| {
            warn!("Trunk {} has no online termination", trunk.id);
            RoutingError::not_found(format!("no online termination on trunk {}", trunk.id))
        })?;

        Ok(TrunkRoute {
            trunk_id: trunk.id,
            workspace_id: trunk.workspace_id,
            sip_uri: termination.sip_uri.clone(),
        })
    }
}
