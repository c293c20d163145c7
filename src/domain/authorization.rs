//! Authorization gate: caller verification, source whitelists and registrations

use super::shared::{Result, SourceAddr, WorkspaceId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which whitelist a source address is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhitelistScope {
    /// The workspace's own IP whitelist
    Workspace,
    /// Addresses of the workspace's bring-your-own carriers
    ByoCarrier,
}

/// A whitelist entry: a single address or a CIDR block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRule {
    Exact(IpAddr),
    Cidr { network: IpAddr, prefix: u8 },
}

impl IpRule {
    /// IPv4-mapped IPv6 sources are matched as IPv4
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        match *self {
            IpRule::Exact(addr) => addr == ip,
            IpRule::Cidr { network, prefix } => match (network, ip) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
                    u32::from(net) & mask == u32::from(addr) & mask
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
                    u128::from(net) & mask == u128::from(addr) & mask
                }
                _ => false,
            },
        }
    }
}

impl FromStr for IpRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let Some((addr, prefix)) = s.split_once('/') else {
            return s
                .parse()
                .map(IpRule::Exact)
                .map_err(|_| format!("invalid address: {}", s));
        };

        let network: IpAddr = addr.parse().map_err(|_| format!("invalid network: {}", s))?;
        let prefix: u8 = prefix.parse().map_err(|_| format!("invalid prefix: {}", s))?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        if prefix > max {
            return Err(format!("prefix out of range: {}", s));
        }
        Ok(IpRule::Cidr { network, prefix })
    }
}

impl fmt::Display for IpRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpRule::Exact(addr) => write!(f, "{}", addr),
            IpRule::Cidr { network, prefix } => write!(f, "{}/{}", network, prefix),
        }
    }
}

/// SIP registration; stale once `expires_at` has passed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub workspace_id: WorkspaceId,
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(workspace_id: WorkspaceId, user: impl Into<String>, ttl_secs: u32) -> Self {
        Self {
            workspace_id,
            user: user.into(),
            expires_at: Utc::now() + Duration::seconds(i64::from(ttl_secs)),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

/// Parse a registration TTL in seconds. `None` means the value is unusable.
pub fn parse_ttl(expires: &str) -> Option<u32> {
    expires.trim().parse().ok()
}

/// Storage contract for the authorization gate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    /// Whether `number` is registered/verified for the workspace
    async fn is_caller_verified(&self, workspace_id: WorkspaceId, number: &str) -> Result<bool>;

    /// Raw whitelist entries (addresses or CIDR blocks)
    async fn whitelist_entries(
        &self,
        scope: WhitelistScope,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<String>>;

    async fn find_registration(
        &self,
        workspace_id: WorkspaceId,
        user: &str,
    ) -> Result<Option<Registration>>;

    /// Insert or refresh a registration
    async fn upsert_registration(&self, registration: Registration) -> Result<()>;
}

/// Authorization gate shared by the DID, trunk and PSTN resolvers
pub struct AuthorizationGate {
    repository: Arc<dyn AuthorizationRepository>,
    validate_caller_id: bool,
}

impl AuthorizationGate {
    pub fn new(repository: Arc<dyn AuthorizationRepository>, validate_caller_id: bool) -> Self {
        Self {
            repository,
            validate_caller_id,
        }
    }

    /// True iff the number is verified for the workspace.
    ///
    /// With caller-id validation switched off every number passes and
    /// storage is not consulted.
    pub async fn verify_caller(&self, workspace_id: WorkspaceId, number: &str) -> Result<bool> {
        if !self.validate_caller_id {
            debug!("Caller-id validation disabled, accepting {}", number);
            return Ok(true);
        }
        let valid = self.repository.is_caller_verified(workspace_id, number).await?;
        debug!("Caller {} for workspace {}: valid={}", number, workspace_id, valid);
        Ok(valid)
    }

    pub async fn ip_whitelisted(&self, source: &SourceAddr, workspace_id: WorkspaceId) -> Result<bool> {
        self.ip_whitelisted_in(WhitelistScope::Workspace, source, workspace_id)
            .await
    }

    pub async fn ip_whitelisted_in(
        &self,
        scope: WhitelistScope,
        source: &SourceAddr,
        workspace_id: WorkspaceId,
    ) -> Result<bool> {
        let Some(ip) = source.ip() else {
            warn!("Unparsable source address {:?}, treating as not whitelisted", source.as_str());
            return Ok(false);
        };

        let entries = self.repository.whitelist_entries(scope, workspace_id).await?;
        let matched = entries.iter().any(|entry| match entry.parse::<IpRule>() {
            Ok(rule) => rule.contains(ip),
            Err(e) => {
                warn!("Skipping whitelist entry for workspace {}: {}", workspace_id, e);
                false
            }
        });

        debug!(
            "Whitelist {:?} for workspace {}: {} matched={}",
            scope, workspace_id, ip, matched
        );
        Ok(matched)
    }

    pub async fn registration_valid(&self, workspace_id: WorkspaceId, user: &str) -> Result<bool> {
        let registration = self.repository.find_registration(workspace_id, user).await?;
        Ok(registration.is_some_and(|r| !r.is_expired()))
    }

    /// Upsert a registration expiring `ttl_secs` from now
    pub async fn store_registration(
        &self,
        workspace_id: WorkspaceId,
        user: &str,
        ttl_secs: u32,
    ) -> Result<()> {
        debug!("Storing registration {}@{} for {}s", user, workspace_id, ttl_secs);
        self.repository
            .upsert_registration(Registration::new(workspace_id, user, ttl_secs))
            .await
    }
}
