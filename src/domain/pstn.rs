//! PSTN provider selection
//!
//! A workspace with bring-your-own carriers enabled is routed only through
//! its own carriers; everyone else (including trunk-originated calls with no
//! known workspace) goes through the platform pool. A miss in the chosen pool
//! is a miss: pools are never substituted for one another.
//!
//! Ranking within a pool is deterministic:
//! 1. longest dial prefix matching the called number
//! 2. lowest priority value
//! 3. lowest per-minute cost
//! 4. lowest provider id

use super::shared::{Result, RoutingError, WorkspaceId};
use super::tenant::Workspace;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderPool {
    Platform,
    Byo,
}

/// Carrier entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PstnProvider {
    pub id: i64,
    pub name: String,
    pub pool: ProviderPool,
    /// Owning workspace for BYO carriers
    pub workspace_id: Option<WorkspaceId>,
    pub ip_address: String,
    pub tech_prefix: Option<String>,
    /// Called-number prefixes this carrier terminates; `""` matches all
    pub dial_prefixes: Vec<String>,
    /// Calling-number prefixes accepted; empty accepts all
    pub caller_prefixes: Vec<String>,
    pub priority: i32,
    pub cost_per_minute: f64,
}

impl PstnProvider {
    pub fn platform(id: i64, name: impl Into<String>, ip_address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            pool: ProviderPool::Platform,
            workspace_id: None,
            ip_address: ip_address.into(),
            tech_prefix: None,
            dial_prefixes: vec![String::new()],
            caller_prefixes: Vec::new(),
            priority: 0,
            cost_per_minute: 0.0,
        }
    }

    pub fn byo(
        id: i64,
        workspace_id: WorkspaceId,
        name: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            pool: ProviderPool::Byo,
            workspace_id: Some(workspace_id),
            ..Self::platform(id, name, ip_address)
        }
    }

    pub fn with_dial_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.dial_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_caller_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.caller_prefixes = prefixes.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cost(mut self, cost_per_minute: f64) -> Self {
        self.cost_per_minute = cost_per_minute;
        self
    }

    pub fn with_tech_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tech_prefix = Some(prefix.into());
        self
    }

    /// Length of the longest dial prefix matching `to`, if any matches
    fn specificity(&self, to: &str) -> Option<usize> {
        let to = normalize(to);
        self.dial_prefixes
            .iter()
            .map(|p| normalize(p))
            .filter(|p| to.starts_with(p))
            .map(str::len)
            .max()
    }

    fn accepts_caller(&self, from: &str) -> bool {
        let from = normalize(from);
        self.caller_prefixes.is_empty()
            || self
                .caller_prefixes
                .iter()
                .any(|p| from.starts_with(normalize(p)))
    }
}

/// Numbers are compared without a leading `+`
fn normalize(number: &str) -> &str {
    number.trim().trim_start_matches('+')
}

/// Selected carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PstnRoute {
    pub provider_id: i64,
    pub name: String,
    pub ip_address: String,
    pub tech_prefix: Option<String>,
    pub pool: ProviderPool,
}

impl From<PstnProvider> for PstnRoute {
    fn from(provider: PstnProvider) -> Self {
        Self {
            provider_id: provider.id,
            name: provider.name,
            ip_address: provider.ip_address,
            tech_prefix: provider.tech_prefix,
            pool: provider.pool,
        }
    }
}

/// Storage contract for carriers
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn platform_providers(&self) -> Result<Vec<PstnProvider>>;

    async fn byo_providers(&self, workspace_id: WorkspaceId) -> Result<Vec<PstnProvider>>;
}

/// Pick the best provider in `pool` for the number pair
pub fn rank(pool: Vec<PstnProvider>, from: &str, to: &str) -> Option<PstnProvider> {
    pool.into_iter()
        .filter(|p| p.accepts_caller(from))
        .filter_map(|p| p.specificity(to).map(|len| (len, p)))
        .min_by(|(len_a, a), (len_b, b)| {
            len_b
                .cmp(len_a)
                .then(a.priority.cmp(&b.priority))
                .then(a.cost_per_minute.total_cmp(&b.cost_per_minute))
                .then(a.id.cmp(&b.id))
        })
        .map(|(_, p)| p)
}

/// PSTN provider selector
pub struct PstnProviderSelector {
    repository: Arc<dyn ProviderRepository>,
}

impl PstnProviderSelector {
    pub fn new(repository: Arc<dyn ProviderRepository>) -> Self {
        Self { repository }
    }

    /// Select a carrier for `from -> to`.
    ///
    /// Without a workspace (trunk-originated calls) the platform pool is used.
    pub async fn select(&self, from: &str, to: &str, workspace: Option<&Workspace>) -> Result<PstnRoute> {
        info!("PSTN provider request {} -> {}", from, to);

        let (pool, providers) = match workspace {
            Some(ws) if ws.byo_enabled => {
                debug!("Workspace {} has BYO carriers enabled", ws.id);
                let providers = self.repository.byo_providers(ws.id).await?;
                // A carrier belonging to another workspace must never leak through.
                let own: Vec<_> = providers
                    .into_iter()
                    .filter(|p| p.pool == ProviderPool::Byo && p.workspace_id == Some(ws.id))
                    .collect();
                (ProviderPool::Byo, own)
            }
            _ => {
                let providers = self.repository.platform_providers().await?;
                let platform: Vec<_> = providers
                    .into_iter()
                    .filter(|p| p.pool == ProviderPool::Platform)
                    .collect();
                (ProviderPool::Platform, platform)
            }
        };

        let provider = rank(providers, from, to).ok_or_else(|| {
            warn!("No {:?} provider for {} -> {}", pool, from, to);
            RoutingError::not_found(format!("no {:?} PSTN provider for {}", pool, to).to_lowercase())
        })?;

        info!("Selected provider {} ({}) at {}", provider.id, provider.name, provider.ip_address);
        Ok(provider.into())
    }

    /// Calls originating from a customer trunk always use the platform pool
    pub async fn select_for_trunk(&self, from: &str, to: &str) -> Result<PstnRoute> {
        self.select(from, to, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ws() -> WorkspaceId {
        WorkspaceId::new(1)
    }

    fn platform_pool() -> Vec<PstnProvider> {
        vec![
            PstnProvider::platform(1, "global", "192.0.2.1").with_priority(5),
            PstnProvider::platform(2, "uk-direct", "192.0.2.2")
                .with_dial_prefixes(&["+44"])
                .with_priority(9),
            PstnProvider::platform(3, "uk-london", "192.0.2.3")
                .with_dial_prefixes(&["+44207"])
                .with_priority(9)
                .with_cost(0.02),
            PstnProvider::platform(4, "uk-london-cheap", "192.0.2.4")
                .with_dial_prefixes(&["44207"])
                .with_priority(9)
                .with_cost(0.01),
        ]
    }

    fn selector(byo: Vec<PstnProvider>) -> PstnProviderSelector {
        let mut repo = MockProviderRepository::new();
        repo.expect_platform_providers()
            .returning(|| Ok(platform_pool()));
        repo.expect_byo_providers()
            .returning(move |_| Ok(byo.clone()));
        PstnProviderSelector::new(Arc::new(repo))
    }

    #[test]
    fn test_rank_prefers_specific_prefix_then_cost() {
        let best = rank(platform_pool(), "+15551234", "+442071234567").unwrap();
        assert_eq!(best.id, 4);

        let best = rank(platform_pool(), "+15551234", "+441611234567").unwrap();
        assert_eq!(best.id, 2);

        let best = rank(platform_pool(), "+15551234", "+15559876").unwrap();
        assert_eq!(best.id, 1);
    }

    #[test]
    fn test_rank_priority_then_id() {
        let pool = vec![
            PstnProvider::platform(8, "b", "192.0.2.8").with_priority(2),
            PstnProvider::platform(7, "a", "192.0.2.7").with_priority(2),
            PstnProvider::platform(6, "c", "192.0.2.6").with_priority(3),
        ];
        assert_eq!(rank(pool, "1", "2").unwrap().id, 7);
    }

    #[test]
    fn test_rank_unknown_cost_is_order_independent() {
        let priced = PstnProvider::platform(9, "priced", "192.0.2.9").with_cost(0.05);
        let unpriced = PstnProvider::platform(3, "unpriced", "192.0.2.3").with_cost(f64::NAN);

        let forward = rank(vec![priced.clone(), unpriced.clone()], "+15551234", "+15559876");
        let reverse = rank(vec![unpriced, priced], "+15551234", "+15559876");
        assert_eq!(forward.map(|p| p.id), Some(9));
        assert_eq!(reverse.map(|p| p.id), Some(9));
    }

    #[test]
    fn test_rank_caller_prefix_filter() {
        let pool = vec![
            PstnProvider::platform(1, "us-only", "192.0.2.1").with_caller_prefixes(&["+1"]),
        ];
        assert!(rank(pool.clone(), "+15551234", "+44123").is_some());
        assert!(rank(pool, "+33123456", "+44123").is_none());
    }

    #[tokio::test]
    async fn test_byo_disabled_uses_platform_pool() {
        let byo = vec![PstnProvider::byo(50, ws(), "own", "198.51.100.1")];
        let workspace = Workspace::new(1, "acme", 1);

        let route = selector(byo)
            .select("+15551234", "+442071234567", Some(&workspace))
            .await
            .unwrap();
        assert_eq!(route.pool, ProviderPool::Platform);
        assert_eq!(route.provider_id, 4);
    }

    #[tokio::test]
    async fn test_byo_enabled_uses_own_carrier() {
        let byo = vec![PstnProvider::byo(50, ws(), "own", "198.51.100.1").with_tech_prefix("991#")];
        let workspace = Workspace::new(1, "acme", 1).with_byo_enabled(true);

        let route = selector(byo)
            .select("+15551234", "+442071234567", Some(&workspace))
            .await
            .unwrap();
        assert_eq!(route.pool, ProviderPool::Byo);
        assert_eq!(route.provider_id, 50);
        assert_eq!(route.tech_prefix.as_deref(), Some("991#"));
    }

    #[tokio::test]
    async fn test_byo_miss_does_not_fall_back() {
        let byo = vec![PstnProvider::byo(50, ws(), "us-only", "198.51.100.1").with_dial_prefixes(&["+1"])];
        let workspace = Workspace::new(1, "acme", 1).with_byo_enabled(true);

        let err = selector(byo)
            .select("+15551234", "+442071234567", Some(&workspace))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_foreign_byo_carrier_is_ignored() {
        let byo = vec![PstnProvider::byo(60, WorkspaceId::new(2), "theirs", "198.51.100.2")];
        let workspace = Workspace::new(1, "acme", 1).with_byo_enabled(true);

        let err = selector(byo)
            .select("+15551234", "+15559876", Some(&workspace))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_trunk_calls_use_platform_pool() {
        let route = selector(vec![])
            .select_for_trunk("+15551234", "+15559876")
            .await
            .unwrap();
        assert_eq!(route.provider_id, 1);
    }
}
