//! Periodic media server list refresh

use crate::domain::media_server::{MediaFleet, MediaServerRepository};
use crate::domain::shared::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reload the server list and publish it as a new snapshot
pub async fn reload_fleet(repository: &dyn MediaServerRepository, fleet: &MediaFleet) -> Result<u64> {
    let servers = repository.list_media_servers().await?;
    let count = servers.len();
    let version = fleet.replace(servers);
    debug!("Fleet reloaded: {} servers, v{}", count, version);
    Ok(version)
}

/// Spawn the background refresh loop.
///
/// A failed reload keeps the previous snapshot in place.
pub fn spawn_fleet_refresh(
    repository: Arc<dyn MediaServerRepository>,
    fleet: Arc<MediaFleet>,
    interval: Duration,
) -> JoinHandle<()> {
    info!("Media fleet refresh every {:?}", interval);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; the initial load happens at startup.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = reload_fleet(repository.as_ref(), &fleet).await {
                warn!("Fleet refresh failed, keeping v{}: {}", fleet.snapshot().version, e);
            }
        }
    })
}
