//! Routing facade used by the call-control front end.

mod inbound;

pub use inbound::{DidDecision, DidRejection, InboundRoute};

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::address::{Admission, AddressParseError, AddressValidator, ValidationError};
use crate::config::Config;
use crate::flow::{Flow, FlowError, FlowExecutor, FlowOutcome, TraversalContext};
use crate::notify::{FirstCallNotifier, LogMailer, NotificationPool, OutboundCall};
use crate::number::{self, NumberError};
use crate::router::{ProviderCatalog, RoutableProvider, RouteSelector, RouterError};
use crate::store::{
    DidKind, FlowRecord, FlowSelector, GuardedStore, MemoryStore, RoutingDataStore, StoreError, TrunkRef,
    WhitelistScope,
};
use crate::telemetry::counters;
use crate::trunk::{probe_from_config, LivenessProbe, TrunkHealthRouter, TrunkTarget};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("no routing flow for {0}")]
    NoFlow(String),

    #[error("unknown workspace '{0}'")]
    UnknownWorkspace(String),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Address(#[from] AddressParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Number(#[from] NumberError),
}

impl From<ValidationError> for RoutingError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::Address(e) => RoutingError::Address(e),
            ValidationError::Store(e) => RoutingError::Store(e),
        }
    }
}

/// Request data a flow starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryContext {
    pub from: String,
    pub to: String,
    pub origin_code: Option<String>,
    pub dest_code: Option<String>,
    pub source_ip: Option<String>,
    pub workspace_id: Option<String>,
}

impl EntryContext {
    /// Context for a call. Numbers in international form are reduced to
    /// their dialed digits and yield country codes; anything else is kept
    /// as given, without a code.
    pub fn for_call(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            origin_code: number::country_code(&from).ok(),
            dest_code: number::country_code(&to).ok(),
            from: number::dial_digits(&from).unwrap_or(from),
            to: number::dial_digits(&to).unwrap_or(to),
            ..Self::default()
        }
    }

    pub fn with_source_ip(mut self, source_ip: impl Into<String>) -> Self {
        self.source_ip = Some(source_ip.into());
        self
    }

    pub fn with_workspace(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    fn into_traversal(self, catalog: Arc<ProviderCatalog>) -> TraversalContext {
        let optional = [
            ("origin_code", self.origin_code),
            ("dest_code", self.dest_code),
            ("source_ip", self.source_ip),
            ("workspace_id", self.workspace_id),
        ];
        optional.into_iter().fold(
            TraversalContext::new(catalog).with_var("from", self.from).with_var("to", self.to),
            |ctx, (key, value)| match value {
                Some(v) => ctx.with_var(key, v),
                None => ctx,
            },
        )
    }
}

/// Ties the routing components to one store.
pub struct RoutingService {
    store: Arc<dyn RoutingDataStore>,
    selector: RouteSelector,
    validator: AddressValidator,
    trunks: TrunkHealthRouter,
    executor: FlowExecutor,
    notifications: Option<NotificationPool>,
}

impl RoutingService {
    pub fn new(store: Arc<dyn RoutingDataStore>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            selector: RouteSelector::new(store.clone()),
            validator: AddressValidator::new(store.clone()),
            trunks: TrunkHealthRouter::new(store.clone(), probe),
            executor: FlowExecutor::new(),
            notifications: None,
            store,
        }
    }

    pub fn with_notifications(mut self, pool: NotificationPool) -> Self {
        self.notifications = Some(pool);
        self
    }

    /// Build the service over the configured in-memory data, guarded by the
    /// circuit breaker. Spawns notification workers, so it needs a runtime.
    pub fn from_config(config: &Config) -> Self {
        let memory = Arc::new(MemoryStore::new(config.data.clone()));
        let store = Arc::new(GuardedStore::new(
            memory.clone(),
            config.store.circuit_breaker.clone(),
            Some(config.store.call_timeout),
        ));
        let notifier = FirstCallNotifier::new(memory, Arc::new(LogMailer));
        let pool = NotificationPool::start(&config.notifications, Arc::new(notifier));

        Self::new(store, probe_from_config(&config.health_probe)).with_notifications(pool)
    }

    pub fn store(&self) -> &Arc<dyn RoutingDataStore> {
        &self.store
    }

    /// Routes for a call, best first. A workspace with BYO carriers enabled
    /// is routed over its own carriers only.
    #[instrument(skip(self), fields(workspace = workspace_id.unwrap_or("-")))]
    pub async fn resolve_route(
        &self,
        workspace_id: Option<&str>,
        from: &str,
        to: &str,
    ) -> Result<Vec<RoutableProvider>, RoutingError> {
        let started = Instant::now();

        let workspace = match workspace_id {
            Some(id) => Some(
                self.store
                    .workspace(id)
                    .await?
                    .ok_or_else(|| RoutingError::UnknownWorkspace(id.to_string()))?,
            ),
            None => None,
        };

        let result = self.selector.select(workspace.as_ref(), from, to).await;
        counters::route_resolution(started.elapsed().as_secs_f64(), "lcr");
        Ok(result?)
    }

    /// Build and run a stored flow.
    #[instrument(skip(self, record, entry), fields(flow = %record.flow_id))]
    pub async fn execute_flow(&self, record: &FlowRecord, entry: EntryContext) -> Result<FlowOutcome, RoutingError> {
        let started = Instant::now();

        let mut flow = Flow::from_value(record.flow_id.as_str(), &record.document)?;
        let catalog = Arc::new(ProviderCatalog::load(self.store.as_ref()).await?);
        let outcome = self.executor.run(&mut flow, entry.into_traversal(catalog))?;

        counters::route_resolution(started.elapsed().as_secs_f64(), "flow");
        Ok(outcome)
    }

    /// Run the flow selected for a call: the user's flow for the destination
    /// country if there is one, otherwise the country's platform flow.
    #[instrument(skip(self, entry), fields(to = %entry.to))]
    pub async fn route_by_flow(&self, user_id: &str, mut entry: EntryContext) -> Result<FlowOutcome, RoutingError> {
        let dest_code = match entry.dest_code.clone() {
            Some(code) => code,
            None => number::country_code(&entry.to)?,
        };
        entry.dest_code = Some(dest_code.clone());

        let selectors = [
            FlowSelector::Tenant {
                user_id: user_id.to_string(),
                dest_code: dest_code.clone(),
            },
            FlowSelector::Country {
                dest_code: dest_code.clone(),
            },
        ];

        for selector in &selectors {
            if let Some(record) = self.store.flow_document(selector).await? {
                debug!(selector = %selector, flow = %record.flow_id, "flow selected");
                return self.execute_flow(&record, entry).await;
            }
        }

        warn!(user = %user_id, dest_code = %dest_code, "no flow for destination");
        Err(RoutingError::NoFlow(format!("user {} to +{}", user_id, dest_code)))
    }

    /// Run the flow bound to a workspace.
    pub async fn route_by_workspace_flow(
        &self,
        workspace_id: &str,
        entry: EntryContext,
    ) -> Result<FlowOutcome, RoutingError> {
        let selector = FlowSelector::Workspace {
            workspace_id: workspace_id.to_string(),
        };
        match self.store.flow_document(&selector).await? {
            Some(record) => self.execute_flow(&record, entry.with_workspace(workspace_id)).await,
            None => Err(RoutingError::NoFlow(selector.to_string())),
        }
    }

    #[instrument(skip(self))]
    pub async fn validate_source_address(
        &self,
        scope: &WhitelistScope,
        source: &str,
    ) -> Result<Admission, RoutingError> {
        Ok(self.validator.validate(scope, source).await?)
    }

    /// Live endpoint of a trunk or DID, `None` when nothing is reachable.
    #[instrument(skip(self))]
    pub async fn resolve_trunk_target(&self, trunk: &TrunkRef) -> Result<Option<TrunkTarget>, RoutingError> {
        Ok(self.trunks.resolve(trunk).await?)
    }

    /// Decide whether a call to `did` from `caller` arriving from `source_ip`
    /// is accepted, and how it reaches its workspace.
    #[instrument(skip(self))]
    pub async fn validate_incoming_did(
        &self,
        did: &str,
        caller: &str,
        source_ip: &str,
    ) -> Result<DidDecision, RoutingError> {
        let Some(assignment) = self.store.did_assignment(did).await? else {
            return Ok(Self::rejected(did, DidRejection::UnknownDid));
        };
        let workspace_id = assignment.workspace_id.clone();

        let (scope, accepted) = match (assignment.kind, assignment.trunk_id) {
            (DidKind::Platform, Some(trunk_id)) => {
                info!(did, workspace = %workspace_id, trunk = %trunk_id, "DID routes to user trunk");
                return Ok(DidDecision::Accepted(InboundRoute::UserSipTrunk { workspace_id, trunk_id }));
            }
            (DidKind::Platform, None) => (
                WhitelistScope::Providers,
                InboundRoute::NetworkManaged {
                    workspace_id: workspace_id.clone(),
                },
            ),
            (DidKind::Byo, _) => (
                WhitelistScope::ByoCarriers {
                    workspace_id: workspace_id.clone(),
                },
                InboundRoute::ByoCarrier {
                    workspace_id: workspace_id.clone(),
                },
            ),
        };

        if !self.validator.validate(&scope, source_ip).await?.is_admitted() {
            return Ok(Self::rejected(did, DidRejection::NotWhitelisted));
        }

        let caller = number::e164(caller)?;
        if self.store.is_number_blocked(&workspace_id, &caller).await? {
            return Ok(Self::rejected(did, DidRejection::Blocked));
        }

        info!(did, workspace = %workspace_id, route = ?accepted, "incoming DID accepted");
        Ok(DidDecision::Accepted(accepted))
    }

    fn rejected(did: &str, reason: DidRejection) -> DidDecision {
        info!(did, reason = reason.as_str(), "incoming DID rejected");
        DidDecision::Rejected(reason)
    }

    /// Queue the first-call check for a placed outbound call. Never blocks
    /// and never fails; returns whether the task was queued.
    pub fn notify_outbound_call(&self, call: OutboundCall) -> bool {
        match &self.notifications {
            Some(pool) => pool.dispatch(call),
            None => {
                debug!(workspace = %call.workspace_id, "notifications disabled");
                false
            }
        }
    }

    /// Drain queued notifications.
    pub async fn shutdown(self) {
        if let Some(pool) = self.notifications {
            pool.shutdown().await;
        }
    }
}
