//! Whitelist evaluation and scope-aware source admission.

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::cidr::{parse_source, row_network};
use super::AddressParseError;
use crate::store::{RoutingDataStore, StoreError, WhitelistEntry, WhitelistScope};
use crate::telemetry::counters;

/// Result of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// A whitelist row contains the source.
    Admitted,
    /// Whitelisting is disabled for the tenant, rows were not consulted.
    Bypassed,
    /// No row contains the source.
    Rejected,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Admission::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Admission::Admitted => "admitted",
            Admission::Bypassed => "bypassed",
            Admission::Rejected => "rejected",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Address(#[from] AddressParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to do with a whitelist row that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedRows {
    /// Log the row and keep checking the rest.
    Skip,
    /// Fail the whole check.
    Fail,
}

impl MalformedRows {
    /// Carrier scopes skip malformed rows, tenant and media server scopes
    /// fail the check.
    pub fn for_scope(scope: &WhitelistScope) -> Self {
        match scope {
            WhitelistScope::Providers | WhitelistScope::ByoCarriers { .. } => MalformedRows::Skip,
            WhitelistScope::Workspace { .. } | WhitelistScope::MediaServers => MalformedRows::Fail,
        }
    }
}

/// Check a source against whitelist rows, stopping at the first containing
/// row.
pub fn evaluate(source: IpAddr, rows: &[WhitelistEntry], malformed: MalformedRows) -> Result<bool, AddressParseError> {
    for row in rows {
        let network = match row_network(&row.ip, &row.range) {
            Ok(network) => network,
            Err(e) if malformed == MalformedRows::Skip => {
                warn!(ip = %row.ip, range = %row.range, error = %e, "skipping malformed whitelist row");
                continue;
            }
            Err(e) => return Err(e),
        };
        if network.contains(&source) {
            trace!(source = %source, network = %network, "whitelist row matched");
            return Ok(true);
        }
    }
    Ok(false)
}

/// Admission control over the store's whitelists.
#[derive(Clone)]
pub struct AddressValidator {
    store: Arc<dyn RoutingDataStore>,
}

impl AddressValidator {
    pub fn new(store: Arc<dyn RoutingDataStore>) -> Self {
        Self { store }
    }

    /// Decide whether `source` may originate traffic in `scope`.
    ///
    /// The source is parsed before any store call so malformed input never
    /// costs a lookup. Tenants with whitelisting disabled are admitted
    /// without reading their rows.
    pub async fn validate(
        &self,
        scope: &WhitelistScope,
        source: &str,
    ) -> Result<Admission, ValidationError> {
        let ip = parse_source(source)?;

        if let WhitelistScope::Workspace { workspace_id } = scope {
            let disabled = self
                .store
                .workspace(workspace_id)
                .await?
                .map(|w| w.ip_whitelist_disabled)
                .unwrap_or(false);
            if disabled {
                debug!(workspace = %workspace_id, source = %ip, "ip whitelist disabled, admitting");
                counters::admission(scope.label(), Admission::Bypassed.as_str());
                return Ok(Admission::Bypassed);
            }
        }

        let rows = self.store.whitelist(scope).await?;
        let malformed = MalformedRows::for_scope(scope);
        let admission = if evaluate(ip, &rows, malformed).map_err(|e| {
            warn!(scope = scope.label(), source = %ip, error = %e, "whitelist row does not parse, rejecting check");
            e
        })? {
            Admission::Admitted
        } else {
            Admission::Rejected
        };

        debug!(
            scope = scope.label(),
            source = %ip,
            rows = rows.len(),
            result = admission.as_str(),
            "source address checked"
        );
        counters::admission(scope.label(), admission.as_str());
        Ok(admission)
    }
}
