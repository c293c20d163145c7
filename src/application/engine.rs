//! Routing engine - the operations the signaling proxy calls
//!
//! Takes raw request inputs, parses the load-bearing ones, and hands them to
//! the domain resolvers. Every operation returns a typed result; the HTTP
//! shell only maps it onto status codes.

use crate::config::RoutingSettings;
use crate::domain::authorization::{parse_ttl, AuthorizationGate, AuthorizationRepository};
use crate::domain::call_config::{
    CallConfigRepository, CallConfigResolver, CallFlow, CallerIdInfo, CodeFlow, ExtensionFlow,
    MacroFunction, PlatformSettings,
};
use crate::domain::did::{DidInfo, DidRepository, DidResolver, DidVerdict};
use crate::domain::media_server::{MediaFleet, ServerAssignment, ServerAssignmentResolver};
use crate::domain::pstn::{ProviderRepository, PstnProviderSelector, PstnRoute};
use crate::domain::shared::{Rejection, Result, RoutingError, SourceAddr, WorkspaceId};
use crate::domain::sip_trunk::{AddressResolver, SipTrunkValidator, TrunkMatch, TrunkRepository, TrunkRoute};
use crate::domain::tenant::{TenantDirectory, WorkspaceProfile, WorkspaceRepository};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage handles, one per concern
#[derive(Clone)]
pub struct RoutingRepositories {
    pub workspaces: Arc<dyn WorkspaceRepository>,
    pub dids: Arc<dyn DidRepository>,
    pub authorization: Arc<dyn AuthorizationRepository>,
    pub trunks: Arc<dyn TrunkRepository>,
    pub providers: Arc<dyn ProviderRepository>,
    pub call_config: Arc<dyn CallConfigRepository>,
}

impl RoutingRepositories {
    /// Use one store for every concern
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: WorkspaceRepository
            + DidRepository
            + AuthorizationRepository
            + TrunkRepository
            + ProviderRepository
            + CallConfigRepository
            + 'static,
    {
        Self {
            workspaces: store.clone(),
            dids: store.clone(),
            authorization: store.clone(),
            trunks: store.clone(),
            providers: store.clone(),
            call_config: store,
        }
    }
}

/// Parse a boolean query flag; empty means false
pub fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim() {
        "" | "0" | "f" | "F" | "false" | "False" | "FALSE" => Ok(false),
        "1" | "t" | "T" | "true" | "True" | "TRUE" => Ok(true),
        other => Err(RoutingError::Config(format!("invalid boolean {:?}", other))),
    }
}

fn parse_flow_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse()
        .map_err(|_| RoutingError::Config(format!("invalid flow id {:?}", raw)))
}

fn record_rejection(err: &RoutingError) {
    let kind = match err {
        RoutingError::Unauthorized(Rejection::SourceNotWhitelisted) => "source_not_whitelisted",
        RoutingError::Unauthorized(Rejection::CallerNotValid) => "caller_not_valid",
        other => other.kind(),
    };
    counter!("routing_rejections_total", "kind" => kind).increment(1);
}

/// Call routing resolution engine
pub struct RoutingEngine {
    directory: Arc<TenantDirectory>,
    gate: Arc<AuthorizationGate>,
    dids: DidResolver,
    trunks: SipTrunkValidator,
    pstn: PstnProviderSelector,
    servers: ServerAssignmentResolver,
    call_config: CallConfigResolver,
}

impl RoutingEngine {
    pub fn new(
        settings: &RoutingSettings,
        repos: RoutingRepositories,
        resolver: Arc<dyn AddressResolver>,
        fleet: Arc<MediaFleet>,
    ) -> Self {
        info!(
            "Routing engine for {} (caller-id validation {})",
            settings.platform_domain,
            if settings.validate_caller_id { "on" } else { "off" }
        );
        let directory = Arc::new(TenantDirectory::new(
            repos.workspaces.clone(),
            settings.platform_domain.clone(),
        ));
        let gate = Arc::new(AuthorizationGate::new(
            repos.authorization.clone(),
            settings.validate_caller_id,
        ));

        Self {
            dids: DidResolver::new(repos.dids.clone(), gate.clone(), directory.clone()),
            trunks: SipTrunkValidator::new(repos.trunks.clone(), repos.dids.clone(), resolver),
            pstn: PstnProviderSelector::new(repos.providers.clone()),
            servers: ServerAssignmentResolver::new(fleet),
            call_config: CallConfigResolver::new(repos.call_config.clone()),
            directory,
            gate,
        }
    }

    pub fn directory(&self) -> &TenantDirectory {
        &self.directory
    }

    /// Whether `number` is a verified caller for workspace `workspace_id`
    pub async fn verify_caller(&self, workspace_id: &str, number: &str) -> Result<bool> {
        info!("VerifyCaller {} for workspace {}", number, workspace_id);
        let id: WorkspaceId = workspace_id.parse()?;
        let workspace = self.directory.resolve_by_id(id).await?;
        self.gate.verify_caller(workspace.id, number).await
    }

    /// Like `verify_caller`, but a failed check is `Unauthorized`
    pub async fn verify_caller_by_domain(&self, domain: &str, number: &str) -> Result<()> {
        info!("VerifyCallerByDomain {} for {}", number, domain);
        let workspace = self.directory.resolve_by_domain(domain).await?;
        if self.gate.verify_caller(workspace.id, number).await? {
            Ok(())
        } else {
            let err = RoutingError::Unauthorized(Rejection::CallerNotValid);
            record_rejection(&err);
            Err(err)
        }
    }

    pub async fn user_by_domain(&self, domain: &str) -> Result<WorkspaceProfile> {
        self.directory.profile_by_domain(domain).await
    }

    pub async fn user_by_did(&self, did: &str) -> Result<WorkspaceProfile> {
        self.directory.profile_by_did(did).await
    }

    pub async fn user_by_trunk_source_ip(&self, source_ip: &str) -> Result<WorkspaceProfile> {
        self.directory.profile_by_source_ip(source_ip).await
    }

    pub async fn workspace_macros(&self, workspace_id: &str) -> Result<Vec<MacroFunction>> {
        let id: WorkspaceId = workspace_id.parse()?;
        self.call_config.workspace_macros(id).await
    }

    pub async fn did_number_data(&self, number: &str) -> Result<DidInfo> {
        self.dids.did_info(number).await
    }

    /// Carrier for an outbound call placed from workspace `domain`
    pub async fn pstn_provider(&self, from: &str, to: &str, domain: &str) -> Result<PstnRoute> {
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.pstn.select(from, to, Some(&workspace)).await
    }

    pub async fn pstn_provider_for_trunk(&self, from: &str, to: &str) -> Result<PstnRoute> {
        self.pstn.select_for_trunk(from, to).await
    }

    /// Whether `ip` is on the whitelist of workspace `domain`
    pub async fn ip_whitelist_lookup(&self, ip: &str, domain: &str) -> Result<bool> {
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.gate
            .ip_whitelisted(&SourceAddr::new(ip), workspace.id)
            .await
    }

    pub async fn did_accept_option(&self, did: &str) -> Result<String> {
        self.dids.accept_option(did).await
    }

    pub async fn did_assigned_server(&self) -> Result<ServerAssignment> {
        self.servers.assign_for_did().await
    }

    /// Media server for a call placed by a user of workspace `domain`
    pub async fn user_assigned_server(
        &self,
        rtc_optimized: &str,
        domain: &str,
        router_ip: &str,
    ) -> Result<ServerAssignment> {
        let rtc_optimized = parse_flag(rtc_optimized)?;
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.servers
            .assign(rtc_optimized, Some(&workspace), router_ip)
            .await
    }

    pub async fn trunk_assigned_server(&self) -> Result<ServerAssignment> {
        self.servers.assign_for_trunk().await
    }

    pub async fn caller_id_to_use(&self, domain: &str, extension: &str) -> Result<CallerIdInfo> {
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.call_config.caller_id_to_use(workspace.id, extension).await
    }

    pub async fn extension_flow(&self, workspace_id: &str, extension: &str) -> Result<ExtensionFlow> {
        let id: WorkspaceId = workspace_id.parse()?;
        self.call_config.extension_flow(id, extension).await
    }

    pub async fn flow(&self, workspace_id: &str, flow_id: &str) -> Result<CallFlow> {
        let id: WorkspaceId = workspace_id.parse()?;
        let flow_id = parse_flow_id(flow_id)?;
        self.call_config.flow(id, flow_id).await
    }

    pub async fn code_flow(&self, workspace_id: &str, code: &str) -> Result<CodeFlow> {
        let id: WorkspaceId = workspace_id.parse()?;
        self.call_config.code_flow(id, code).await
    }

    /// Verdict for an inbound call to `did`
    pub async fn incoming_did_validation(
        &self,
        did: &str,
        calling_number: &str,
        source: &str,
    ) -> Result<DidVerdict> {
        match self
            .dids
            .resolve(did, calling_number, &SourceAddr::new(source))
            .await
        {
            Ok(verdict) => {
                counter!("routing_verdicts_total", "verdict" => verdict.as_str()).increment(1);
                Ok(verdict)
            }
            Err(err) => {
                record_rejection(&err);
                Err(err)
            }
        }
    }

    pub async fn incoming_trunk_validation(&self, from_domain: &str) -> Result<TrunkMatch> {
        self.trunks.validate_inbound(from_domain).await.inspect_err(record_rejection)
    }

    pub async fn lookup_trunk_by_did(&self, did: &str) -> Result<TrunkRoute> {
        self.trunks.trunk_for_did(did).await
    }

    /// SIP URI a trunk-routed DID call is sent to
    pub async fn process_sip_trunk_call(&self, did: &str) -> Result<String> {
        let route = self.trunks.trunk_for_did(did).await?;
        debug!("DID {} routes to trunk {} at {}", did, route.trunk_id, route.sip_uri);
        Ok(route.sip_uri)
    }

    /// Whether `source` is one of our own media servers
    pub fn incoming_media_server_validation(&self, source: &str) -> bool {
        self.servers.validate_media_server(&SourceAddr::new(source))
    }

    /// Record a SIP registration.
    ///
    /// An unusable `expires` is logged and ignored; nothing is stored and
    /// the call still succeeds.
    pub async fn store_registration(&self, domain: &str, user: &str, expires: &str) -> Result<()> {
        let Some(ttl) = parse_ttl(expires) else {
            warn!("Ignoring registration for {}@{}: bad expires {:?}", user, domain, expires);
            return Ok(());
        };
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.gate.store_registration(workspace.id, user, ttl).await
    }

    pub async fn registration_valid(&self, domain: &str, user: &str) -> Result<bool> {
        let workspace = self.directory.resolve_by_domain(domain).await?;
        self.gate.registration_valid(workspace.id, user).await
    }

    pub async fn settings(&self) -> Result<PlatformSettings> {
        self.call_config.settings().await
    }
}
