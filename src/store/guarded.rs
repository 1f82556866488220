//! Circuit-breaker and timeout wrapper around a [`RoutingDataStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{
    ByoRoute, CircuitBreaker, CircuitBreakerConfig, DidAssignment, FlowRecord, FlowSelector,
    ProviderHost, ProviderRate, RoutingDataStore, StoreError, TrunkEndpoints, TrunkRef,
    WhitelistEntry, WhitelistScope, WorkspaceSettings,
};

/// Store wrapper that fails fast while the backend is unhealthy.
///
/// Each call is bounded by `call_timeout`. Failures and timeouts feed the
/// breaker; while it is open calls return [`StoreError::CircuitOpen`]
/// without reaching the backend. Calls are never retried here.
pub struct GuardedStore {
    inner: Arc<dyn RoutingDataStore>,
    breaker: CircuitBreaker,
    call_timeout: Option<Duration>,
}

impl GuardedStore {
    pub fn new(
        inner: Arc<dyn RoutingDataStore>,
        breaker: CircuitBreakerConfig,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::with_config(breaker),
            call_timeout,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    async fn guard<T, F>(&self, op: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        if !self.breaker.allow_request() {
            debug!(op, "store call rejected, circuit open");
            return Err(StoreError::CircuitOpen);
        }

        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout(limit)),
            },
            None => call.await,
        };

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(e) => {
                warn!(op, error = %e, "store call failed");
                self.breaker.record_failure();
            }
        }

        result
    }
}

#[async_trait]
impl RoutingDataStore for GuardedStore {
    async fn flow_document(&self, selector: &FlowSelector) -> Result<Option<FlowRecord>, StoreError> {
        self.guard("flow_document", self.inner.flow_document(selector)).await
    }

    async fn active_outbound_providers(&self) -> Result<Vec<ProviderRate>, StoreError> {
        self.guard("active_outbound_providers", self.inner.active_outbound_providers())
            .await
    }

    async fn provider_hosts(&self, provider_id: &str) -> Result<Vec<ProviderHost>, StoreError> {
        self.guard("provider_hosts", self.inner.provider_hosts(provider_id))
            .await
    }

    async fn workspace(&self, workspace_id: &str) -> Result<Option<WorkspaceSettings>, StoreError> {
        self.guard("workspace", self.inner.workspace(workspace_id)).await
    }

    async fn byo_routes(&self, workspace_id: &str) -> Result<Vec<ByoRoute>, StoreError> {
        self.guard("byo_routes", self.inner.byo_routes(workspace_id)).await
    }

    async fn whitelist(&self, scope: &WhitelistScope) -> Result<Vec<WhitelistEntry>, StoreError> {
        self.guard("whitelist", self.inner.whitelist(scope)).await
    }

    async fn trunk_endpoints(&self, trunk: &TrunkRef) -> Result<Option<TrunkEndpoints>, StoreError> {
        self.guard("trunk_endpoints", self.inner.trunk_endpoints(trunk)).await
    }

    async fn did_assignment(&self, did: &str) -> Result<Option<DidAssignment>, StoreError> {
        self.guard("did_assignment", self.inner.did_assignment(did)).await
    }

    async fn is_number_blocked(&self, workspace_id: &str, number: &str) -> Result<bool, StoreError> {
        self.guard("is_number_blocked", self.inner.is_number_blocked(workspace_id, number))
            .await
    }
}
