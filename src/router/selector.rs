//! Route selection for outbound calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::matcher::CompiledPattern;
use super::pricing::{rank, Candidate};
use super::RouterError;
use crate::store::{ByoRoute, ProviderHost, ProviderRate, RoutingDataStore, StoreError, WorkspaceSettings};
use crate::telemetry::counters;

/// Where a route came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    Platform,
    Byo,
}

impl RoutePath {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutePath::Platform => "platform",
            RoutePath::Byo => "byo",
        }
    }
}

/// A selected upstream for a call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutableProvider {
    /// Provider id, or carrier name on the BYO path.
    pub provider_id: String,
    pub name: String,
    /// Signalling address to send the call to.
    pub address: String,
    /// Destination rewritten for this upstream.
    pub number: String,
    pub path: RoutePath,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_prefix: Option<String>,
    pub active_channels: u32,
}

impl RoutableProvider {
    fn platform(candidate: &Candidate, host: &ProviderHost, number: String) -> Self {
        Self {
            provider_id: candidate.provider_id.clone(),
            name: candidate.provider_name.clone(),
            address: host.address.clone(),
            number,
            path: RoutePath::Platform,
            rate: Some(candidate.rate),
            matched_prefix: Some(candidate.matched_prefix.clone()),
            active_channels: candidate.active_channels,
        }
    }
}

fn compile<F>(pattern: &str, build: F) -> Result<CompiledPattern, RouterError>
where
    F: FnOnce() -> Result<CompiledPattern, regex::Error>,
{
    build().map_err(|source| RouterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Every rate row prefix matching the destination, best first.
pub fn rank_candidates(rows: &[ProviderRate], destination: &str) -> Result<Vec<Candidate>, RouterError> {
    let mut candidates = Vec::new();
    for row in rows {
        for prefix in &row.rate_prefixes {
            let pattern = compile(prefix, || CompiledPattern::rate_prefix(prefix))?;
            if pattern.matches(destination) {
                let order = candidates.len();
                candidates.push(Candidate::from_row(row, prefix, order));
            }
        }
    }
    rank(&mut candidates);
    Ok(candidates)
}

/// Keep the best candidate of each provider, preserving rank order.
pub fn best_per_provider(ranked: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .filter(|c| seen.insert(c.provider_id.clone()))
        .collect()
}

/// Choose the host a call is sent to.
///
/// The first host is the default. Every host with a priority prefix matching
/// the destination overrides it, so the last matching host wins.
pub fn pick_host<'a>(hosts: &'a [ProviderHost], destination: &str) -> Result<Option<&'a ProviderHost>, RouterError> {
    let mut best = hosts.first();
    for host in hosts {
        for prefix in host.priority_patterns() {
            let pattern = compile(prefix, || CompiledPattern::priority(prefix))?;
            if pattern.matches(destination) {
                debug!(host = %host.address, prefix, "priority host matched");
                best = Some(host);
            }
        }
    }
    Ok(best)
}

/// First BYO route whose rule matches the destination.
///
/// Rows without a carrier address are skipped. Rows with a broken rule are
/// logged and skipped.
pub fn match_byo_route(routes: &[ByoRoute], destination: &str) -> Option<RoutableProvider> {
    for route in routes {
        let Some(address) = route.address.as_deref().filter(|a| !a.trim().is_empty()) else {
            debug!(carrier = %route.carrier, "skipping BYO route without private address");
            continue;
        };

        let pattern = match CompiledPattern::byo_rule(&route.prefix, &route.pattern) {
            Ok(p) => p,
            Err(e) => {
                warn!(
                    carrier = %route.carrier,
                    prefix = %route.prefix,
                    pattern = %route.pattern,
                    error = %e,
                    "skipping BYO route with invalid rule"
                );
                continue;
            }
        };

        if pattern.matches(destination) {
            return Some(RoutableProvider {
                provider_id: route.carrier.clone(),
                name: route.carrier.clone(),
                address: address.to_string(),
                number: format!("{}{}", route.prepend, destination),
                path: RoutePath::Byo,
                rate: None,
                matched_prefix: Some(route.prefix.clone()),
                active_channels: 0,
            });
        }
    }
    None
}

/// Provider rates and hosts loaded up front, for decisions that rank
/// several providers at once.
#[derive(Debug, Clone, Default)]
pub struct ProviderCatalog {
    rates: Vec<ProviderRate>,
    hosts: HashMap<String, Vec<ProviderHost>>,
}

impl ProviderCatalog {
    pub fn new(rates: Vec<ProviderRate>, hosts: HashMap<String, Vec<ProviderHost>>) -> Self {
        Self { rates, hosts }
    }

    pub async fn load(store: &dyn RoutingDataStore) -> Result<Self, StoreError> {
        let rates = store.active_outbound_providers().await?;
        let mut hosts = HashMap::new();
        for row in &rates {
            if !hosts.contains_key(&row.provider_id) {
                let list = store.provider_hosts(&row.provider_id).await?;
                hosts.insert(row.provider_id.clone(), list);
            }
        }
        debug!(rows = rates.len(), providers = hosts.len(), "provider catalog loaded");
        Ok(Self { rates, hosts })
    }

    pub fn rates(&self) -> &[ProviderRate] {
        &self.rates
    }

    pub fn hosts(&self, provider_id: &str) -> &[ProviderHost] {
        self.hosts.get(provider_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Best candidate of each provider matching the destination, best first.
    pub fn candidates(&self, destination: &str) -> Result<Vec<Candidate>, RouterError> {
        Ok(best_per_provider(rank_candidates(&self.rates, destination)?))
    }

    /// Resolve a candidate to a routable provider, `None` if it has no hosts.
    pub fn routable(
        &self,
        candidate: &Candidate,
        destination: &str,
        number: String,
    ) -> Result<Option<RoutableProvider>, RouterError> {
        Ok(pick_host(self.hosts(&candidate.provider_id), destination)?
            .map(|host| RoutableProvider::platform(candidate, host, number)))
    }
}

/// Least-cost route selector.
#[derive(Clone)]
pub struct RouteSelector {
    store: Arc<dyn RoutingDataStore>,
}

impl RouteSelector {
    pub fn new(store: Arc<dyn RoutingDataStore>) -> Self {
        Self { store }
    }

    /// Routes for a call, best first.
    ///
    /// A workspace with BYO carriers enabled is routed only over its own
    /// carriers and yields at most one route. Everyone else gets the
    /// platform's providers ranked by least cost.
    pub async fn select(
        &self,
        workspace: Option<&WorkspaceSettings>,
        from: &str,
        to: &str,
    ) -> Result<Vec<RoutableProvider>, RouterError> {
        match workspace.filter(|w| w.byo_enabled) {
            Some(ws) => self.select_byo(ws, from, to).await.map(|route| vec![route]),
            None => self.select_platform(from, to).await,
        }
    }

    /// First matching route over a workspace's own carriers.
    pub async fn select_byo(
        &self,
        workspace: &WorkspaceSettings,
        from: &str,
        to: &str,
    ) -> Result<RoutableProvider, RouterError> {
        let routes = self.store.byo_routes(&workspace.id).await?;
        match match_byo_route(&routes, to) {
            Some(route) => {
                info!(
                    workspace = %workspace.id,
                    carrier = %route.provider_id,
                    from,
                    to,
                    "BYO route selected"
                );
                counters::route_resolved(RoutePath::Byo.as_str());
                Ok(route)
            }
            None => {
                debug!(workspace = %workspace.id, to, routes = routes.len(), "no BYO route matched");
                counters::route_not_found();
                Err(RouterError::NoRouteFound {
                    destination: to.to_string(),
                })
            }
        }
    }

    /// Least-cost routes over the platform's active providers, one per
    /// provider, best first. Providers without hosts are skipped.
    pub async fn select_platform(&self, from: &str, to: &str) -> Result<Vec<RoutableProvider>, RouterError> {
        let rows = self.store.active_outbound_providers().await?;
        let candidates = best_per_provider(rank_candidates(&rows, to)?);

        let mut routes = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let hosts = self.store.provider_hosts(&candidate.provider_id).await?;
            match pick_host(&hosts, to)? {
                Some(host) => routes.push(RoutableProvider::platform(candidate, host, candidate.dial_number(to))),
                None => {
                    warn!(provider = %candidate.provider_id, "matching provider has no hosts, skipping");
                }
            }
        }

        match routes.first() {
            Some(best) => {
                info!(
                    provider = %best.provider_id,
                    prefix = best.matched_prefix.as_deref().unwrap_or(""),
                    rate = best.rate.unwrap_or_default(),
                    host = %best.address,
                    alternatives = routes.len() - 1,
                    from,
                    to,
                    "least cost route selected"
                );
                counters::route_resolved(RoutePath::Platform.as_str());
                Ok(routes)
            }
            None => {
                debug!(to, rows = rows.len(), "no provider matched destination");
                counters::route_not_found();
                Err(RouterError::NoRouteFound {
                    destination: to.to_string(),
                })
            }
        }
    }
}
