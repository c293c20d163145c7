//! PostgreSQL implementation of the routing repositories

use crate::domain::authorization::{AuthorizationRepository, Registration, WhitelistScope};
use crate::domain::call_config::{
    CallConfigRepository, CallFlow, CodeFlow, ExtensionFlow, MacroFunction, PlatformSettings,
};
use crate::domain::did::{DidNumber, DidRepository, DidTable};
use crate::domain::media_server::{MediaServer, MediaServerRepository, ServerStatus};
use crate::domain::pstn::{ProviderPool, ProviderRepository, PstnProvider};
use crate::domain::shared::{Result, WorkspaceId};
use crate::domain::sip_trunk::{Trunk, TrunkKind, TrunkRepository, TrunkTermination};
use crate::domain::tenant::{Workspace, WorkspaceParams, WorkspaceRepository};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use tracing::{debug, error};

pub struct PgRoutingStore {
    pool: PgPool,
}

impl PgRoutingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// An empty column is the catch-all prefix; blank list entries are dropped
fn split_prefixes(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return vec![String::new()];
    }
    split_list(raw)
}

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn scope_str(scope: WhitelistScope) -> &'static str {
    match scope {
        WhitelistScope::Workspace => "workspace",
        WhitelistScope::ByoCarrier => "byo_carrier",
    }
}

fn did_table_name(table: DidTable) -> &'static str {
    match table {
        DidTable::Managed => "did_numbers",
        DidTable::Byo => "byo_did_numbers",
    }
}

fn row_to_workspace(row: &PgRow) -> Workspace {
    Workspace {
        id: WorkspaceId::new(row.get("id")),
        name: row.get("name"),
        creator_id: row.get("creator_id"),
        byo_enabled: row.get("byo_enabled"),
        outbound_macro_id: row.get("outbound_macro_id"),
    }
}

fn row_to_did(row: &PgRow, table: DidTable) -> DidNumber {
    DidNumber {
        number: row.get("number"),
        workspace_id: WorkspaceId::new(row.get("workspace_id")),
        trunk_id: row.get("trunk_id"),
        flow_json: row.get("flow_json"),
        accept_option: row.get("accept_option"),
        table,
    }
}

fn row_to_trunk(row: &PgRow) -> Trunk {
    let kind = match row.get::<String, _>("kind").as_str() {
        "byo" => TrunkKind::Byo,
        _ => TrunkKind::Hosted,
    };
    Trunk {
        id: row.get("id"),
        workspace_id: WorkspaceId::new(row.get("workspace_id")),
        name: row.get("name"),
        kind,
        source_ips: split_list(&row.get::<String, _>("source_ips")),
        terminations: Vec::new(),
    }
}

fn row_to_provider(row: &PgRow) -> PstnProvider {
    let pool = match row.get::<String, _>("pool").as_str() {
        "byo" => ProviderPool::Byo,
        _ => ProviderPool::Platform,
    };
    PstnProvider {
        id: row.get("id"),
        name: row.get("name"),
        pool,
        workspace_id: row.get::<Option<i64>, _>("workspace_id").map(WorkspaceId::new),
        ip_address: row.get("ip_address"),
        tech_prefix: row.get("tech_prefix"),
        dial_prefixes: split_prefixes(&row.get::<String, _>("dial_prefixes")),
        caller_prefixes: split_list(&row.get::<String, _>("caller_prefixes")),
        priority: row.get("priority"),
        cost_per_minute: row.get("cost_per_minute"),
    }
}

fn row_to_media_server(row: &PgRow) -> MediaServer {
    let status = match row.get::<String, _>("status").as_str() {
        "online" => ServerStatus::Online,
        "draining" => ServerStatus::Draining,
        _ => ServerStatus::Offline,
    };
    MediaServer {
        id: row.get("id"),
        name: row.get("name"),
        private_ip_address: row.get("private_ip_address"),
        status,
        active_calls: non_negative(row.get("active_calls")),
        capacity: non_negative(row.get("capacity")),
        webrtc_optimized: row.get("webrtc_optimized"),
        router_affinity: split_list(&row.get::<String, _>("router_affinity")),
    }
}

const PROVIDER_COLUMNS: &str = "id, name, pool, workspace_id, ip_address, tech_prefix, \
     dial_prefixes, caller_prefixes, priority, cost_per_minute";

impl PgRoutingStore {
    async fn load_terminations(&self, trunk: &mut Trunk) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT sip_uri, online
            FROM sip_trunk_terminations
            WHERE trunk_id = $1
            ORDER BY position
            "#,
        )
        .bind(trunk.id)
        .fetch_all(&self.pool)
        .await?;

        trunk.terminations = rows
            .iter()
            .map(|row| TrunkTermination {
                sip_uri: row.get("sip_uri"),
                online: row.get("online"),
            })
            .collect();
        Ok(())
    }
}

#[async_trait]
impl WorkspaceRepository for PgRoutingStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, creator_id, byo_enabled, outbound_macro_id
            FROM workspaces
            WHERE lower(name) = lower($1)
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_workspace))
    }

    async fn find_by_id(&self, id: WorkspaceId) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, creator_id, byo_enabled, outbound_macro_id
            FROM workspaces
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_workspace))
    }

    async fn find_by_did(&self, did: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            r#"
            SELECT w.id, w.name, w.creator_id, w.byo_enabled, w.outbound_macro_id
            FROM workspaces w
            JOIN (
                SELECT workspace_id, 0 AS rank FROM did_numbers WHERE number = $1
                UNION ALL
                SELECT workspace_id, 1 AS rank FROM byo_did_numbers WHERE number = $1
            ) d ON d.workspace_id = w.id
            ORDER BY d.rank
            LIMIT 1
            "#,
        )
        .bind(did)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_workspace))
    }

    async fn find_by_trunk_source_ip(&self, ip: &str) -> Result<Option<Workspace>> {
        let row = sqlx::query(
            r#"
            SELECT w.id, w.name, w.creator_id, w.byo_enabled, w.outbound_macro_id
            FROM workspaces w
            JOIN sip_trunks t ON t.workspace_id = w.id
            WHERE $1 = ANY(string_to_array(replace(t.source_ips, ' ', ''), ','))
            ORDER BY t.id
            LIMIT 1
            "#,
        )
        .bind(ip)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_workspace))
    }

    async fn workspace_params(&self, id: WorkspaceId) -> Result<WorkspaceParams> {
        let rows = sqlx::query("SELECT key, value FROM workspace_params WHERE workspace_id = $1")
            .bind(id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect::<BTreeMap<String, String>>())
    }
}

#[async_trait]
impl DidRepository for PgRoutingStore {
    async fn find_did(&self, table: DidTable, number: &str) -> Result<Option<DidNumber>> {
        let query = format!(
            "SELECT number, workspace_id, trunk_id, flow_json, accept_option FROM {} WHERE number = $1",
            did_table_name(table)
        );
        let row = sqlx::query(&query)
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to look up DID {} in {:?} table: {}", number, table, e);
                e
            })?;
        Ok(row.map(|row| row_to_did(&row, table)))
    }
}

#[async_trait]
impl AuthorizationRepository for PgRoutingStore {
    async fn is_caller_verified(&self, workspace_id: WorkspaceId, number: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM verified_callers WHERE workspace_id = $1 AND number = $2
            ) AS verified
            "#,
        )
        .bind(workspace_id.as_i64())
        .bind(number)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("verified"))
    }

    async fn whitelist_entries(
        &self,
        scope: WhitelistScope,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT entry FROM ip_whitelist WHERE workspace_id = $1 AND scope = $2 ORDER BY id",
        )
        .bind(workspace_id.as_i64())
        .bind(scope_str(scope))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|row| row.get("entry")).collect())
    }

    async fn find_registration(
        &self,
        workspace_id: WorkspaceId,
        user: &str,
    ) -> Result<Option<Registration>> {
        let row = sqlx::query(
            r#"
            SELECT workspace_id, username, expires_at
            FROM sip_registrations
            WHERE workspace_id = $1 AND username = $2
            "#,
        )
        .bind(workspace_id.as_i64())
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| Registration {
            workspace_id: WorkspaceId::new(row.get("workspace_id")),
            user: row.get("username"),
            expires_at: row.get("expires_at"),
        }))
    }

    async fn upsert_registration(&self, registration: Registration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sip_registrations (workspace_id, username, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (workspace_id, username) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(registration.workspace_id.as_i64())
        .bind(&registration.user)
        .bind(registration.expires_at)
        .execute(&self.pool)
        .await?;
        debug!("Stored registration {}@{}", registration.user, registration.workspace_id);
        Ok(())
    }
}

#[async_trait]
impl TrunkRepository for PgRoutingStore {
    // Terminations are only loaded by `find_trunk`.
    async fn list_trunks(&self) -> Result<Vec<Trunk>> {
        let rows = sqlx::query("SELECT id, workspace_id, name, kind, source_ips FROM sip_trunks ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_trunk).collect())
    }

    async fn find_trunk(&self, trunk_id: i64) -> Result<Option<Trunk>> {
        let row = sqlx::query("SELECT id, workspace_id, name, kind, source_ips FROM sip_trunks WHERE id = $1")
            .bind(trunk_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let mut trunk = row_to_trunk(&row);
                self.load_terminations(&mut trunk).await?;
                Ok(Some(trunk))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ProviderRepository for PgRoutingStore {
    async fn platform_providers(&self) -> Result<Vec<PstnProvider>> {
        let query = format!("SELECT {} FROM pstn_providers WHERE pool = 'platform'", PROVIDER_COLUMNS);
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_provider).collect())
    }

    async fn byo_providers(&self, workspace_id: WorkspaceId) -> Result<Vec<PstnProvider>> {
        let query = format!(
            "SELECT {} FROM pstn_providers WHERE pool = 'byo' AND workspace_id = $1",
            PROVIDER_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(workspace_id.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_provider).collect())
    }
}

#[async_trait]
impl MediaServerRepository for PgRoutingStore {
    async fn list_media_servers(&self) -> Result<Vec<MediaServer>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, private_ip_address, status, active_calls, capacity,
                   webrtc_optimized, router_affinity
            FROM media_servers
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_media_server).collect())
    }
}

#[async_trait]
impl CallConfigRepository for PgRoutingStore {
    async fn caller_id(&self, workspace_id: WorkspaceId, extension: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT caller_id FROM extension_caller_ids WHERE workspace_id = $1 AND extension = $2",
        )
        .bind(workspace_id.as_i64())
        .bind(extension)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.get("caller_id")))
    }

    async fn extension_flow(
        &self,
        workspace_id: WorkspaceId,
        extension: &str,
    ) -> Result<Option<ExtensionFlow>> {
        let row = sqlx::query(
            r#"
            SELECT e.extension, e.flow_id, f.flow_json
            FROM extension_flows e
            JOIN call_flows f ON f.workspace_id = e.workspace_id AND f.flow_id = e.flow_id
            WHERE e.workspace_id = $1 AND e.extension = $2
            "#,
        )
        .bind(workspace_id.as_i64())
        .bind(extension)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| ExtensionFlow {
            workspace_id,
            extension: row.get("extension"),
            flow_id: row.get("flow_id"),
            flow_json: row.get("flow_json"),
        }))
    }

    async fn code_flow(&self, workspace_id: WorkspaceId, code: &str) -> Result<Option<CodeFlow>> {
        let row = sqlx::query(
            r#"
            SELECT c.code, c.flow_id, f.flow_json
            FROM code_flows c
            JOIN call_flows f ON f.workspace_id = c.workspace_id AND f.flow_id = c.flow_id
            WHERE c.workspace_id = $1 AND c.code = $2
            "#,
        )
        .bind(workspace_id.as_i64())
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| CodeFlow {
            workspace_id,
            code: row.get("code"),
            flow_id: row.get("flow_id"),
            flow_json: row.get("flow_json"),
        }))
    }

    async fn flow(&self, workspace_id: WorkspaceId, flow_id: i64) -> Result<Option<CallFlow>> {
        let row = sqlx::query(
            "SELECT flow_id, name, flow_json FROM call_flows WHERE workspace_id = $1 AND flow_id = $2",
        )
        .bind(workspace_id.as_i64())
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| CallFlow {
            workspace_id,
            flow_id: row.get("flow_id"),
            name: row.get("name"),
            flow_json: row.get("flow_json"),
        }))
    }

    async fn workspace_macros(&self, workspace_id: WorkspaceId) -> Result<Vec<MacroFunction>> {
        let rows = sqlx::query(
            "SELECT id, title, code FROM macro_functions WHERE workspace_id = $1 ORDER BY id",
        )
        .bind(workspace_id.as_i64())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| MacroFunction {
                id: row.get("id"),
                workspace_id,
                title: row.get("title"),
                code: row.get("code"),
            })
            .collect())
    }

    async fn settings(&self) -> Result<Option<PlatformSettings>> {
        let rows = sqlx::query("SELECT key, value FROM platform_settings")
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(PlatformSettings {
            values: rows.iter().map(|row| (row.get("key"), row.get("value"))).collect(),
        }))
    }
}
