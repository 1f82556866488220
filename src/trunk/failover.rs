//! Priority failover across trunk endpoints.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::health::LivenessProbe;
use super::uri::SipUri;
use crate::store::{RoutingDataStore, StoreError, TrunkEndpoints, TrunkRef};
use crate::telemetry::counters;

/// Where a resolved target came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSource {
    Endpoint { priority: u32, position: usize },
    Recovery,
}

/// A live SIP endpoint for a trunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrunkTarget {
    pub uri: String,
    pub source: TargetSource,
}

/// Picks the first live endpoint of a trunk, falling back to its recovery URI.
pub struct TrunkHealthRouter {
    store: Arc<dyn RoutingDataStore>,
    probe: Arc<dyn LivenessProbe>,
}

impl TrunkHealthRouter {
    pub fn new(store: Arc<dyn RoutingDataStore>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self { store, probe }
    }

    /// Live target for a trunk or DID.
    ///
    /// `Ok(None)` means nothing is reachable right now, or the reference is
    /// unknown. Only store failures are errors.
    pub async fn resolve(&self, trunk: &TrunkRef) -> Result<Option<TrunkTarget>, StoreError> {
        let Some(endpoints) = self.store.trunk_endpoints(trunk).await? else {
            debug!(trunk = %trunk, "no endpoints configured");
            counters::trunk_resolution("unknown");
            return Ok(None);
        };

        let target = self.select(&endpoints).await;
        match &target {
            Some(t) => info!(trunk = %trunk, uri = %t.uri, source = ?t.source, "trunk target resolved"),
            None => warn!(trunk = %trunk, "all trunk endpoints unreachable"),
        }
        Ok(target)
    }

    /// Probe endpoints by ascending priority (ties in listed order), then the
    /// recovery URI.
    pub async fn select(&self, endpoints: &TrunkEndpoints) -> Option<TrunkTarget> {
        let mut ordered: Vec<_> = endpoints.endpoints.iter().enumerate().collect();
        ordered.sort_by_key(|(_, e)| e.priority);

        for (attempt, (position, endpoint)) in ordered.into_iter().enumerate() {
            if self.is_live(&endpoint.uri).await {
                counters::trunk_resolution(if attempt == 0 { "primary" } else { "failover" });
                return Some(TrunkTarget {
                    uri: endpoint.uri.clone(),
                    source: TargetSource::Endpoint {
                        priority: endpoint.priority,
                        position,
                    },
                });
            }
        }

        if let Some(recovery) = &endpoints.recovery_uri {
            if self.is_live(recovery).await {
                counters::trunk_resolution("recovery");
                return Some(TrunkTarget {
                    uri: recovery.clone(),
                    source: TargetSource::Recovery,
                });
            }
        }

        counters::trunk_resolution("unreachable");
        None
    }

    async fn is_live(&self, uri: &str) -> bool {
        let parsed = match SipUri::parse(uri) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(uri = %uri, error = %e, "skipping malformed trunk endpoint");
                return false;
            }
        };
        let liveness = self.probe.probe(&parsed).await;
        debug!(uri = %uri, online = liveness.is_online(), "probed trunk endpoint");
        liveness.is_online()
    }
}
