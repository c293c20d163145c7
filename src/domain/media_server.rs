//! Media server fleet and server assignment
//!
//! The fleet is published as immutable, versioned snapshots behind an
//! `ArcSwap`. A resolver loads one snapshot per request and never observes a
//! refresh halfway through.

use super::shared::{Result, RoutingError, SourceAddr};
use super::tenant::Workspace;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Online,
    Draining,
    Offline,
}

/// Running media/signaling server instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaServer {
    pub id: i64,
    pub name: String,
    pub private_ip_address: String,
    pub status: ServerStatus,
    pub active_calls: u32,
    pub capacity: u32,
    pub webrtc_optimized: bool,
    /// Edge routers this server is reachable from
    pub router_affinity: Vec<String>,
}

impl MediaServer {
    pub fn new(id: i64, name: impl Into<String>, private_ip_address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            private_ip_address: private_ip_address.into(),
            status: ServerStatus::Online,
            active_calls: 0,
            capacity: 100,
            webrtc_optimized: false,
            router_affinity: Vec::new(),
        }
    }

    pub fn with_load(mut self, active_calls: u32, capacity: u32) -> Self {
        self.active_calls = active_calls;
        self.capacity = capacity;
        self
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn webrtc(mut self) -> Self {
        self.webrtc_optimized = true;
        self
    }

    pub fn with_router(mut self, router: impl Into<String>) -> Self {
        self.router_affinity.push(router.into());
        self
    }

    pub fn is_available(&self) -> bool {
        self.status == ServerStatus::Online && self.active_calls < self.capacity
    }

    pub fn load_ratio(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        f64::from(self.active_calls) / f64::from(self.capacity)
    }

    fn reachable_from(&self, router: &str) -> bool {
        self.router_affinity.iter().any(|r| r == router)
    }
}

/// Immutable view of the fleet
#[derive(Debug, Clone, Default)]
pub struct FleetSnapshot {
    pub version: u64,
    pub servers: Vec<MediaServer>,
}

/// Shared fleet handle
pub struct MediaFleet {
    current: ArcSwap<FleetSnapshot>,
}

impl MediaFleet {
    pub fn new(servers: Vec<MediaServer>) -> Self {
        Self {
            current: ArcSwap::from_pointee(FleetSnapshot { version: 1, servers }),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// The snapshot in effect right now
    pub fn snapshot(&self) -> Arc<FleetSnapshot> {
        self.current.load_full()
    }

    /// Publish a new server list; returns the new version
    pub fn replace(&self, servers: Vec<MediaServer>) -> u64 {
        let previous = self.current.rcu(|old| FleetSnapshot {
            version: old.version + 1,
            servers: servers.clone(),
        });
        let version = previous.version + 1;
        debug!("Fleet snapshot v{} published", version);
        version
    }
}

impl Default for MediaFleet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Storage contract for the fleet list
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaServerRepository: Send + Sync {
    async fn list_media_servers(&self) -> Result<Vec<MediaServer>>;
}

/// Chosen server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAssignment {
    pub server_id: i64,
    pub private_ip_address: String,
    pub fleet_version: u64,
}

/// Lowest load first, then lowest id
fn least_loaded<'a>(servers: impl Iterator<Item = &'a MediaServer>) -> Option<&'a MediaServer> {
    servers.min_by(|a, b| {
        a.load_ratio()
            .total_cmp(&b.load_ratio())
            .then(a.id.cmp(&b.id))
    })
}

/// Server assignment resolver
pub struct ServerAssignmentResolver {
    fleet: Arc<MediaFleet>,
}

impl ServerAssignmentResolver {
    pub fn new(fleet: Arc<MediaFleet>) -> Self {
        Self { fleet }
    }

    /// Pick a server for a user-originated call.
    ///
    /// A non-empty `router_hint` narrows the candidates to servers reachable
    /// from that router; if none are, the whole fleet is considered.
    /// `rtc_optimized` prefers WebRTC-optimized servers and falls back to the
    /// rest when none is available.
    pub async fn assign(
        &self,
        rtc_optimized: bool,
        workspace: Option<&Workspace>,
        router_hint: &str,
    ) -> Result<ServerAssignment> {
        let snapshot = self.fleet.snapshot();
        info!(
            "Finding server for workspace {:?}, rtc_optimized={}, router={:?}",
            workspace.map(|w| w.id.as_i64()),
            rtc_optimized,
            router_hint
        );

        let available: Vec<&MediaServer> = snapshot.servers.iter().filter(|s| s.is_available()).collect();

        let router_hint = router_hint.trim();
        let mut candidates: Vec<&MediaServer> = if router_hint.is_empty() {
            available.clone()
        } else {
            available
                .iter()
                .copied()
                .filter(|s| s.reachable_from(router_hint))
                .collect()
        };
        if candidates.is_empty() && !router_hint.is_empty() {
            debug!("No server affiliated with router {}, using whole fleet", router_hint);
            candidates = available;
        }

        let chosen = if rtc_optimized {
            least_loaded(candidates.iter().copied().filter(|s| s.webrtc_optimized))
                .or_else(|| least_loaded(candidates.iter().copied()))
        } else {
            least_loaded(candidates.iter().copied())
        };

        let server = chosen.ok_or_else(|| {
            warn!("No media server available (fleet v{})", snapshot.version);
            RoutingError::NoCapacity
        })?;

        info!("Found server {} at {}", server.id, server.private_ip_address);
        Ok(ServerAssignment {
            server_id: server.id,
            private_ip_address: server.private_ip_address.clone(),
            fleet_version: snapshot.version,
        })
    }

    /// Server for an inbound DID call
    pub async fn assign_for_did(&self) -> Result<ServerAssignment> {
        self.assign(false, None, "").await
    }

    /// Server for an inbound trunk call
    pub async fn assign_for_trunk(&self) -> Result<ServerAssignment> {
        self.assign(false, None, "").await
    }

    /// True iff `source` is one of the fleet's private addresses
    pub fn validate_media_server(&self, source: &SourceAddr) -> bool {
        let Some(ip) = source.ip() else {
            return false;
        };
        self.fleet
            .snapshot()
            .servers
            .iter()
            .filter_map(|s| s.private_ip_address.parse::<std::net::IpAddr>().ok())
            .any(|addr| addr == ip)
    }
}
