//! Routing data records served by a [`RoutingDataStore`](super::RoutingDataStore).

use serde::{Deserialize, Serialize};

/// Which flow document to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowSelector {
    /// Flow authored by a tenant for a destination country.
    Tenant { user_id: String, dest_code: String },
    /// Platform-wide flow for a destination country.
    Country { dest_code: String },
    /// Flow bound directly to a workspace.
    Workspace { workspace_id: String },
}

impl std::fmt::Display for FlowSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowSelector::Tenant { user_id, dest_code } => {
                write!(f, "tenant:{}/{}", user_id, dest_code)
            }
            FlowSelector::Country { dest_code } => write!(f, "country:{}", dest_code),
            FlowSelector::Workspace { workspace_id } => write!(f, "workspace:{}", workspace_id),
        }
    }
}

/// A stored flow document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRecord {
    pub flow_id: String,
    pub document: serde_json::Value,
}

/// One dial-prefix/rate row of an active outbound provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRate {
    pub provider_id: String,
    #[serde(default)]
    pub provider_name: String,
    /// Prefix prepended to the destination when dialing through this provider.
    #[serde(default)]
    pub dial_prefix: String,
    /// Rate per minute in dollars.
    pub rate: f64,
    /// Destination patterns this rate applies to.
    #[serde(default)]
    pub rate_prefixes: Vec<String>,
    #[serde(default)]
    pub active_channels: u32,
}

/// Signalling host of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderHost {
    pub address: String,
    /// Comma-separated destination patterns that prefer this host.
    #[serde(default)]
    pub priority_prefixes: String,
}

impl ProviderHost {
    /// Split the priority prefix list, dropping empty entries.
    pub fn priority_patterns(&self) -> impl Iterator<Item = &str> {
        self.priority_prefixes
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Tenant (workspace) routing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// User that owns the workspace, used for tenant flow lookup.
    #[serde(default)]
    pub creator_id: String,
    #[serde(default)]
    pub byo_enabled: bool,
    #[serde(default)]
    pub ip_whitelist_disabled: bool,
    /// Address notices are sent to.
    #[serde(default)]
    pub notify_email: Option<String>,
}

/// Bring-your-own carrier route row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByoRoute {
    pub carrier: String,
    /// Private address of the carrier, rows without one are unusable.
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub prepend: String,
    #[serde(default, rename = "match")]
    pub pattern: String,
}

/// Whitelist namespace a source address is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WhitelistScope {
    /// Platform PSTN provider addresses.
    Providers,
    /// BYO carrier addresses of a workspace.
    ByoCarriers { workspace_id: String },
    /// Tenant-level whitelist.
    Workspace { workspace_id: String },
    /// Platform media servers.
    MediaServers,
}

impl WhitelistScope {
    pub fn label(&self) -> &'static str {
        match self {
            WhitelistScope::Providers => "providers",
            WhitelistScope::ByoCarriers { .. } => "byo_carriers",
            WhitelistScope::Workspace { .. } => "workspace",
            WhitelistScope::MediaServers => "media_servers",
        }
    }
}

/// An `(ip, range)` whitelist row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub ip: String,
    #[serde(default)]
    pub range: String,
}

impl WhitelistEntry {
    pub fn new(ip: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            range: range.into(),
        }
    }
}

/// Trunk lookup key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TrunkRef {
    Trunk(String),
    Did(String),
}

impl std::fmt::Display for TrunkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrunkRef::Trunk(id) => write!(f, "trunk:{}", id),
            TrunkRef::Did(did) => write!(f, "did:{}", did),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkEndpoint {
    pub uri: String,
    /// Lower values are tried first.
    #[serde(default)]
    pub priority: u32,
}

/// Origination endpoints of a trunk plus its recovery URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrunkEndpoints {
    #[serde(default)]
    pub endpoints: Vec<TrunkEndpoint>,
    #[serde(default)]
    pub recovery_uri: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DidKind {
    /// Number purchased through the platform.
    Platform,
    /// Number ported in with a BYO carrier.
    Byo,
}

/// Ownership of an inbound number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DidAssignment {
    pub did: String,
    pub workspace_id: String,
    pub kind: DidKind,
    #[serde(default)]
    pub trunk_id: Option<String>,
}
