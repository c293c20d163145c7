//! In-memory routing store
//!
//! Implements every repository trait over plain maps. Used by the tests and
//! by the `memory` feature for running without a database.

use crate::domain::authorization::{AuthorizationRepository, Registration, WhitelistScope};
use crate::domain::call_config::{
    CallConfigRepository, CallFlow, CodeFlow, ExtensionFlow, MacroFunction, PlatformSettings,
};
use crate::domain::did::{DidNumber, DidRepository, DidTable};
use crate::domain::media_server::{MediaServer, MediaServerRepository};
use crate::domain::pstn::{ProviderPool, ProviderRepository, PstnProvider};
use crate::domain::shared::{Result, WorkspaceId};
use crate::domain::sip_trunk::{Trunk, TrunkRepository};
use crate::domain::tenant::{Workspace, WorkspaceParams, WorkspaceRepository};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct StoreData {
    workspaces: BTreeMap<WorkspaceId, Workspace>,
    params: HashMap<WorkspaceId, WorkspaceParams>,
    dids: HashMap<(DidTable, String), DidNumber>,
    verified_callers: HashSet<(WorkspaceId, String)>,
    whitelists: HashMap<(WhitelistScope, WorkspaceId), Vec<String>>,
    registrations: HashMap<(WorkspaceId, String), Registration>,
    trunks: BTreeMap<i64, Trunk>,
    providers: Vec<PstnProvider>,
    media_servers: Vec<MediaServer>,
    caller_ids: HashMap<(WorkspaceId, String), String>,
    extension_flows: HashMap<(WorkspaceId, String), ExtensionFlow>,
    code_flows: HashMap<(WorkspaceId, String), CodeFlow>,
    flows: HashMap<(WorkspaceId, i64), CallFlow>,
    macros: Vec<MacroFunction>,
    settings: Option<PlatformSettings>,
}

/// In-memory implementation of all routing repositories
#[derive(Default)]
pub struct InMemoryStore {
    data: RwLock<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_workspace(&self, workspace: Workspace) {
        debug!("Adding workspace {} ({})", workspace.id, workspace.name);
        self.data.write().await.workspaces.insert(workspace.id, workspace);
    }

    pub async fn set_workspace_param(&self, workspace_id: WorkspaceId, key: &str, value: &str) {
        self.data
            .write()
            .await
            .params
            .entry(workspace_id)
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    pub async fn add_did(&self, did: DidNumber) {
        self.data
            .write()
            .await
            .dids
            .insert((did.table, did.number.clone()), did);
    }

    pub async fn add_verified_caller(&self, workspace_id: WorkspaceId, number: &str) {
        self.data
            .write()
            .await
            .verified_callers
            .insert((workspace_id, number.to_string()));
    }

    pub async fn add_whitelist_entry(&self, scope: WhitelistScope, workspace_id: WorkspaceId, entry: &str) {
        self.data
            .write()
            .await
            .whitelists
            .entry((scope, workspace_id))
            .or_default()
            .push(entry.to_string());
    }

    pub async fn add_trunk(&self, trunk: Trunk) {
        self.data.write().await.trunks.insert(trunk.id, trunk);
    }

    pub async fn add_provider(&self, provider: PstnProvider) {
        self.data.write().await.providers.push(provider);
    }

    pub async fn add_media_server(&self, server: MediaServer) {
        self.data.write().await.media_servers.push(server);
    }

    pub async fn set_caller_id(&self, workspace_id: WorkspaceId, extension: &str, caller_id: &str) {
        self.data
            .write()
            .await
            .caller_ids
            .insert((workspace_id, extension.to_string()), caller_id.to_string());
    }

    pub async fn add_extension_flow(&self, flow: ExtensionFlow) {
        self.data
            .write()
            .await
            .extension_flows
            .insert((flow.workspace_id, flow.extension.clone()), flow);
    }

    pub async fn add_code_flow(&self, flow: CodeFlow) {
        self.data
            .write()
            .await
            .code_flows
            .insert((flow.workspace_id, flow.code.clone()), flow);
    }

    pub async fn add_flow(&self, flow: CallFlow) {
        self.data
            .write()
            .await
            .flows
            .insert((flow.workspace_id, flow.flow_id), flow);
    }

    pub async fn add_macro(&self, function: MacroFunction) {
        self.data.write().await.macros.push(function);
    }

    pub async fn set_settings(&self, settings: PlatformSettings) {
        self.data.write().await.settings = Some(settings);
    }

    pub async fn registration_count(&self) -> usize {
        self.data.read().await.registrations.len()
    }
}

#[async_trait]
impl WorkspaceRepository for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Workspace>> {
        let data = self.data.read().await;
        Ok(data
            .workspaces
            .values()
            .find(|w| w.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn find_by_id(&self, id: WorkspaceId) -> Result<Option<Workspace>> {
        Ok(self.data.read().await.workspaces.get(&id).cloned())
    }

    async fn find_by_did(&self, did: &str) -> Result<Option<Workspace>> {
        let data = self.data.read().await;
        let owner = data
            .dids
            .get(&(DidTable::Managed, did.to_string()))
            .or_else(|| data.dids.get(&(DidTable::Byo, did.to_string())))
            .map(|d| d.workspace_id);
        Ok(owner.and_then(|id| data.workspaces.get(&id).cloned()))
    }

    async fn find_by_trunk_source_ip(&self, ip: &str) -> Result<Option<Workspace>> {
        let data = self.data.read().await;
        let owner = data
            .trunks
            .values()
            .find(|t| t.source_ips.iter().any(|s| s == ip))
            .map(|t| t.workspace_id);
        Ok(owner.and_then(|id| data.workspaces.get(&id).cloned()))
    }

    async fn workspace_params(&self, id: WorkspaceId) -> Result<WorkspaceParams> {
        Ok(self.data.read().await.params.get(&id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl DidRepository for InMemoryStore {
    async fn find_did(&self, table: DidTable, number: &str) -> Result<Option<DidNumber>> {
        Ok(self
            .data
            .read()
            .await
            .dids
            .get(&(table, number.to_string()))
            .cloned())
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryStore {
    async fn is_caller_verified(&self, workspace_id: WorkspaceId, number: &str) -> Result<bool> {
        Ok(self
            .data
            .read()
            .await
            .verified_callers
            .contains(&(workspace_id, number.to_string())))
    }

    async fn whitelist_entries(
        &self,
        scope: WhitelistScope,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<String>> {
        Ok(self
            .data
            .read()
            .await
            .whitelists
            .get(&(scope, workspace_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn find_registration(
        &self,
        workspace_id: WorkspaceId,
        user: &str,
    ) -> Result<Option<Registration>> {
        Ok(self
            .data
            .read()
            .await
            .registrations
            .get(&(workspace_id, user.to_string()))
            .cloned())
    }

    async fn upsert_registration(&self, registration: Registration) -> Result<()> {
        let key = (registration.workspace_id, registration.user.clone());
        self.data.write().await.registrations.insert(key, registration);
        Ok(())
    }
}

#[async_trait]
impl TrunkRepository for InMemoryStore {
    async fn list_trunks(&self) -> Result<Vec<Trunk>> {
        Ok(self.data.read().await.trunks.values().cloned().collect())
    }

    async fn find_trunk(&self, trunk_id: i64) -> Result<Option<Trunk>> {
        Ok(self.data.read().await.trunks.get(&trunk_id).cloned())
    }
}

#[async_trait]
impl ProviderRepository for InMemoryStore {
    async fn platform_providers(&self) -> Result<Vec<PstnProvider>> {
        Ok(self
            .data
            .read()
            .await
            .providers
            .iter()
            .filter(|p| p.pool == ProviderPool::Platform)
            .cloned()
            .collect())
    }

    async fn byo_providers(&self, workspace_id: WorkspaceId) -> Result<Vec<PstnProvider>> {
        Ok(self
            .data
            .read()
            .await
            .providers
            .iter()
            .filter(|p| p.pool == ProviderPool::Byo && p.workspace_id == Some(workspace_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MediaServerRepository for InMemoryStore {
    async fn list_media_servers(&self) -> Result<Vec<MediaServer>> {
        Ok(self.data.read().await.media_servers.clone())
    }
}

#[async_trait]
impl CallConfigRepository for InMemoryStore {
    async fn caller_id(&self, workspace_id: WorkspaceId, extension: &str) -> Result<Option<String>> {
        Ok(self
            .data
            .read()
            .await
            .caller_ids
            .get(&(workspace_id, extension.to_string()))
            .cloned())
    }

    async fn extension_flow(
        &self,
        workspace_id: WorkspaceId,
        extension: &str,
    ) -> Result<Option<ExtensionFlow>> {
        Ok(self
            .data
            .read()
            .await
            .extension_flows
            .get(&(workspace_id, extension.to_string()))
            .cloned())
    }

    async fn code_flow(&self, workspace_id: WorkspaceId, code: &str) -> Result<Option<CodeFlow>> {
        Ok(self
            .data
            .read()
            .await
            .code_flows
            .get(&(workspace_id, code.to_string()))
            .cloned())
    }

    async fn flow(&self, workspace_id: WorkspaceId, flow_id: i64) -> Result<Option<CallFlow>> {
        Ok(self.data.read().await.flows.get(&(workspace_id, flow_id)).cloned())
    }

    async fn workspace_macros(&self, workspace_id: WorkspaceId) -> Result<Vec<MacroFunction>> {
        Ok(self
            .data
            .read()
            .await
            .macros
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn settings(&self) -> Result<Option<PlatformSettings>> {
        Ok(self.data.read().await.settings.clone())
    }
}
