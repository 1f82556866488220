//! In-memory routing data store.
//!
//! Serves the `data` section of the configuration. Suitable for development,
//! tests and small single-node deployments. Data is read-only apart from the
//! outbound call history.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::types::*;
use super::{CallHistory, RoutingDataStore, StoreError};

// =============================================================================
// Configuration data
// =============================================================================

/// Routing data as written in the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingData {
    #[serde(default)]
    pub workspaces: Vec<WorkspaceSettings>,
    #[serde(default)]
    pub providers: Vec<ProviderData>,
    #[serde(default)]
    pub byo_carriers: Vec<ByoCarrierData>,
    #[serde(default)]
    pub whitelists: WhitelistData,
    #[serde(default)]
    pub trunks: Vec<TrunkData>,
    #[serde(default)]
    pub dids: Vec<DidAssignment>,
    #[serde(default)]
    pub blocked_numbers: Vec<BlockedNumber>,
    #[serde(default)]
    pub flows: Vec<FlowData>,
    #[serde(default)]
    pub call_history: Vec<CallHistoryRow>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderDirection {
    Inbound,
    Outbound,
    #[default]
    Both,
}

impl ProviderDirection {
    pub fn carries_outbound(&self) -> bool {
        matches!(self, ProviderDirection::Outbound | ProviderDirection::Both)
    }
}

/// Platform PSTN provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderData {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub dial_prefix: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub direction: ProviderDirection,
    #[serde(default)]
    pub active_channels: u32,
    #[serde(default)]
    pub rates: Vec<RateData>,
    #[serde(default)]
    pub hosts: Vec<ProviderHost>,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateData {
    pub rate: f64,
    #[serde(default)]
    pub prefixes: Vec<String>,
}

/// Tenant-supplied carrier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByoCarrierData {
    pub workspace_id: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub routes: Vec<ByoRouteData>,
    #[serde(default)]
    pub whitelist: Vec<WhitelistEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ByoRouteData {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub prepend: String,
    #[serde(default, rename = "match")]
    pub pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistData {
    #[serde(default)]
    pub media_servers: Vec<WhitelistEntry>,
    /// Tenant whitelists by workspace id.
    #[serde(default)]
    pub workspaces: BTreeMap<String, Vec<WhitelistEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrunkData {
    pub id: String,
    #[serde(flatten)]
    pub endpoints: TrunkEndpoints,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockedNumber {
    pub workspace_id: String,
    pub number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowData {
    pub flow_id: String,
    pub selector: FlowSelector,
    /// Flow document, either inline or as a JSON string.
    pub document: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallHistoryRow {
    pub workspace_id: String,
    pub dest_code: String,
    pub calls: u64,
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory [`RoutingDataStore`] and [`CallHistory`].
pub struct MemoryStore {
    data: RoutingData,
    history: RwLock<HashMap<(String, String), u64>>,
    whitelist_lookups: AtomicU64,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new(data: RoutingData) -> Self {
        let history = data
            .call_history
            .iter()
            .map(|row| ((row.workspace_id.clone(), row.dest_code.clone()), row.calls))
            .collect();

        info!(
            workspaces = data.workspaces.len(),
            providers = data.providers.len(),
            byo_carriers = data.byo_carriers.len(),
            trunks = data.trunks.len(),
            flows = data.flows.len(),
            "loaded routing data"
        );

        Self {
            data,
            history: RwLock::new(history),
            whitelist_lookups: AtomicU64::new(0),
            offline: AtomicBool::new(false),
        }
    }

    pub fn data(&self) -> &RoutingData {
        &self.data
    }

    /// Number of whitelist queries served so far.
    pub fn whitelist_lookups(&self) -> u64 {
        self.whitelist_lookups.load(Ordering::Relaxed)
    }

    /// Make every call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Record a placed outbound call to a destination country.
    pub fn record_outbound_call(&self, workspace_id: &str, dest_code: &str) {
        let mut history = self.history.write().unwrap_or_else(|e| e.into_inner());
        *history
            .entry((workspace_id.to_string(), dest_code.to_string()))
            .or_insert(0) += 1;
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    fn outbound_providers(&self) -> impl Iterator<Item = &ProviderData> {
        self.data
            .providers
            .iter()
            .filter(|p| p.active && p.direction.carries_outbound())
    }

    fn trunk_by_id(&self, id: &str) -> Option<&TrunkData> {
        self.data.trunks.iter().find(|t| t.id == id)
    }
}

#[async_trait]
impl RoutingDataStore for MemoryStore {
    async fn flow_document(&self, selector: &FlowSelector) -> Result<Option<FlowRecord>, StoreError> {
        self.check_online()?;
        Ok(self
            .data
            .flows
            .iter()
            .find(|f| &f.selector == selector)
            .map(|f| FlowRecord {
                flow_id: f.flow_id.clone(),
                document: f.document.clone(),
            }))
    }

    async fn active_outbound_providers(&self) -> Result<Vec<ProviderRate>, StoreError> {
        self.check_online()?;
        let rows = self
            .outbound_providers()
            .flat_map(|p| {
                p.rates.iter().map(move |r| ProviderRate {
                    provider_id: p.id.clone(),
                    provider_name: p.name.clone(),
                    dial_prefix: p.dial_prefix.clone(),
                    rate: r.rate,
                    rate_prefixes: r.prefixes.clone(),
                    active_channels: p.active_channels,
                })
            })
            .collect();
        Ok(rows)
    }

    async fn provider_hosts(&self, provider_id: &str) -> Result<Vec<ProviderHost>, StoreError> {
        self.check_online()?;
        Ok(self
            .data
            .providers
            .iter()
            .find(|p| p.id == provider_id)
            .map(|p| p.hosts.clone())
            .unwrap_or_default())
    }

    async fn workspace(&self, workspace_id: &str) -> Result<Option<WorkspaceSettings>, StoreError> {
        self.check_online()?;
        Ok(self
            .data
            .workspaces
            .iter()
            .find(|w| w.id == workspace_id)
            .cloned())
    }

    async fn byo_routes(&self, workspace_id: &str) -> Result<Vec<ByoRoute>, StoreError> {
        self.check_online()?;
        let routes = self
            .data
            .byo_carriers
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .flat_map(|c| {
                c.routes.iter().map(move |r| ByoRoute {
                    carrier: c.name.clone(),
                    address: c.address.clone(),
                    prefix: r.prefix.clone(),
                    prepend: r.prepend.clone(),
                    pattern: r.pattern.clone(),
                })
            })
            .collect();
        Ok(routes)
    }

    async fn whitelist(&self, scope: &WhitelistScope) -> Result<Vec<WhitelistEntry>, StoreError> {
        self.check_online()?;
        self.whitelist_lookups.fetch_add(1, Ordering::Relaxed);

        let rows = match scope {
            WhitelistScope::Providers => self
                .data
                .providers
                .iter()
                .filter(|p| p.active)
                .flat_map(|p| p.whitelist.iter().cloned())
                .collect(),
            WhitelistScope::ByoCarriers { workspace_id } => self
                .data
                .byo_carriers
                .iter()
                .filter(|c| &c.workspace_id == workspace_id)
                .flat_map(|c| c.whitelist.iter().cloned())
                .collect(),
            WhitelistScope::Workspace { workspace_id } => self
                .data
                .whitelists
                .workspaces
                .get(workspace_id)
                .cloned()
                .unwrap_or_default(),
            WhitelistScope::MediaServers => self.data.whitelists.media_servers.clone(),
        };

        debug!(scope = scope.label(), rows = rows.len(), "whitelist lookup");
        Ok(rows)
    }

    async fn trunk_endpoints(&self, trunk: &TrunkRef) -> Result<Option<TrunkEndpoints>, StoreError> {
        self.check_online()?;
        let found = match trunk {
            TrunkRef::Trunk(id) => self.trunk_by_id(id),
            TrunkRef::Did(did) => self
                .data
                .dids
                .iter()
                .find(|d| &d.did == did)
                .and_then(|d| d.trunk_id.as_deref())
                .and_then(|id| self.trunk_by_id(id)),
        };
        Ok(found.map(|t| t.endpoints.clone()))
    }

    async fn did_assignment(&self, did: &str) -> Result<Option<DidAssignment>, StoreError> {
        self.check_online()?;
        Ok(self.data.dids.iter().find(|d| d.did == did).cloned())
    }

    async fn is_number_blocked(&self, workspace_id: &str, number: &str) -> Result<bool, StoreError> {
        self.check_online()?;
        Ok(self
            .data
            .blocked_numbers
            .iter()
            .any(|b| b.workspace_id == workspace_id && b.number == number))
    }
}

#[async_trait]
impl CallHistory for MemoryStore {
    async fn prior_outbound_calls(&self, workspace_id: &str, dest_code: &str) -> Result<u64, StoreError> {
        self.check_online()?;
        let history = self.history.read().unwrap_or_else(|e| e.into_inner());
        Ok(history
            .get(&(workspace_id.to_string(), dest_code.to_string()))
            .copied()
            .unwrap_or(0))
    }
}
