//! Incoming DID admission.

use serde::Serialize;

/// How an accepted inbound call reaches its workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", rename_all = "snake_case")]
pub enum InboundRoute {
    /// Platform number bound to a tenant SIP trunk.
    UserSipTrunk { workspace_id: String, trunk_id: String },
    /// Platform number delivered by a platform provider.
    NetworkManaged { workspace_id: String },
    /// Tenant number delivered by one of the tenant's own carriers.
    ByoCarrier { workspace_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DidRejection {
    UnknownDid,
    NotWhitelisted,
    Blocked,
}

impl DidRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            DidRejection::UnknownDid => "unknown_did",
            DidRejection::NotWhitelisted => "not_whitelisted",
            DidRejection::Blocked => "blocked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum DidDecision {
    Accepted(InboundRoute),
    Rejected(DidRejection),
}

impl DidDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, DidDecision::Accepted(_))
    }
}
