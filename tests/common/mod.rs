//! Shared fixtures for integration tests

#![allow(dead_code)]

use routeplane::application::{RoutingEngine, RoutingRepositories};
use routeplane::config::RoutingSettings;
use routeplane::domain::authorization::WhitelistScope;
use routeplane::domain::call_config::{CallFlow, ExtensionFlow, MacroFunction};
use routeplane::domain::did::DidNumber;
use routeplane::domain::media_server::{MediaFleet, MediaServer};
use routeplane::domain::pstn::PstnProvider;
use routeplane::domain::shared::WorkspaceId;
use routeplane::domain::sip_trunk::{Trunk, TrunkKind};
use routeplane::domain::tenant::Workspace;
use routeplane::infrastructure::dns::DnsAddressResolver;
use routeplane::infrastructure::persistence::InMemoryStore;
use std::sync::Arc;

pub const PLATFORM: &str = "lineroute.io";

pub fn w1() -> WorkspaceId {
    WorkspaceId::new(1)
}

pub fn w2() -> WorkspaceId {
    WorkspaceId::new(2)
}

pub fn settings() -> RoutingSettings {
    RoutingSettings {
        platform_domain: PLATFORM.to_string(),
        validate_caller_id: true,
    }
}

/// Two workspaces: `w1` (platform carriers) and `w2` (BYO carriers)
pub async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new());

    store.add_workspace(Workspace::new(1, "w1", 100).with_outbound_macro(9)).await;
    store
        .add_workspace(Workspace::new(2, "w2", 200).with_byo_enabled(true))
        .await;
    store.set_workspace_param(w1(), "recording", "on").await;

    // Managed DIDs
    store
        .add_did(DidNumber::managed("+15550001", w1()).with_flow(r#"{"start":"greeting"}"#))
        .await;
    store.add_did(DidNumber::managed("+15550002", w1()).with_trunk(10)).await;
    // BYO DID
    store
        .add_did(DidNumber::byo("+15550003", w2()).with_accept_option("voicemail"))
        .await;

    store.add_whitelist_entry(WhitelistScope::Workspace, w1(), "10.0.0.5").await;
    store.add_whitelist_entry(WhitelistScope::Workspace, w1(), "172.16.0.0/16").await;
    store.add_whitelist_entry(WhitelistScope::ByoCarrier, w2(), "198.51.100.0/24").await;
    store.add_verified_caller(w1(), "+15551234").await;
    store.add_verified_caller(w2(), "+15551234").await;

    store
        .add_trunk(
            Trunk::new(10, w1(), "w1-pbx", TrunkKind::Byo)
                .with_source_ip("203.0.113.5")
                .with_termination("sip:pbx.w1.example", true),
        )
        .await;

    store
        .add_provider(PstnProvider::platform(1, "global", "192.0.2.1").with_priority(5))
        .await;
    store
        .add_provider(
            PstnProvider::platform(2, "uk", "192.0.2.2")
                .with_dial_prefixes(&["+44"])
                .with_priority(5),
        )
        .await;
    store
        .add_provider(PstnProvider::byo(50, w2(), "w2-us", "198.51.100.1").with_dial_prefixes(&["+1"]))
        .await;

    store.set_caller_id(w1(), "1001", "+15550001").await;
    store
        .add_flow(CallFlow {
            workspace_id: w1(),
            flow_id: 7,
            name: "Main menu".to_string(),
            flow_json: r#"{"start":"menu"}"#.to_string(),
        })
        .await;
    store
        .add_extension_flow(ExtensionFlow {
            workspace_id: w1(),
            extension: "1001".to_string(),
            flow_id: 7,
            flow_json: r#"{"start":"menu"}"#.to_string(),
        })
        .await;
    store
        .add_macro(MacroFunction {
            id: 1,
            workspace_id: w1(),
            title: "normalize".to_string(),
            code: "return input".to_string(),
        })
        .await;

    store
}

pub fn fleet() -> Arc<MediaFleet> {
    Arc::new(MediaFleet::new(vec![
        MediaServer::new(1, "ms-1", "10.1.0.1").with_load(40, 100),
        MediaServer::new(2, "ms-2", "10.1.0.2").with_load(10, 100).with_router("edge-b"),
        MediaServer::new(3, "rtc-1", "10.1.0.3").with_load(70, 100).webrtc(),
    ]))
}

pub fn engine_with(
    store: Arc<InMemoryStore>,
    settings: RoutingSettings,
    fleet: Arc<MediaFleet>,
) -> RoutingEngine {
    RoutingEngine::new(
        &settings,
        RoutingRepositories::from_store(store),
        Arc::new(DnsAddressResolver::new()),
        fleet,
    )
}

pub async fn engine() -> RoutingEngine {
    engine_with(seeded_store().await, settings(), fleet())
}
