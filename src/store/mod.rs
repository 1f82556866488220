//! Routing data access.
//!
//! The routing core never talks to a database directly. Everything it needs
//! (flow documents, rate tables, whitelist rows, trunk endpoints) comes
//! through [`RoutingDataStore`], which every component receives as an explicit
//! constructor argument.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: in-memory, loaded from the `data` config section
//! - [`GuardedStore`]: wraps any store with a circuit breaker and call timeout

mod circuit_breaker;
mod guarded;
mod memory;
pub mod types;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use guarded::GuardedStore;
pub use memory::{
    BlockedNumber, ByoCarrierData, ByoRouteData, CallHistoryRow, FlowData, MemoryStore,
    ProviderData, ProviderDirection, RateData, RoutingData, TrunkData, WhitelistData,
};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Store failure as observed by the routing core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store circuit breaker is open")]
    CircuitOpen,

    #[error("store call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Data access for the routing core.
///
/// Implementations own retry and connection handling. Callers treat every
/// method as fallible and never retry.
#[async_trait]
pub trait RoutingDataStore: Send + Sync {
    /// Flow document for a selector, `None` if nothing is configured.
    async fn flow_document(&self, selector: &FlowSelector) -> Result<Option<FlowRecord>, StoreError>;

    /// Rate rows of all active outbound-capable providers.
    async fn active_outbound_providers(&self) -> Result<Vec<ProviderRate>, StoreError>;

    /// Hosts of a provider in configured order.
    async fn provider_hosts(&self, provider_id: &str) -> Result<Vec<ProviderHost>, StoreError>;

    async fn workspace(&self, workspace_id: &str) -> Result<Option<WorkspaceSettings>, StoreError>;

    /// BYO carrier routes of a workspace in document order.
    async fn byo_routes(&self, workspace_id: &str) -> Result<Vec<ByoRoute>, StoreError>;

    async fn whitelist(&self, scope: &WhitelistScope) -> Result<Vec<WhitelistEntry>, StoreError>;

    /// Endpoints of a trunk, or of the trunk a DID is attached to.
    async fn trunk_endpoints(&self, trunk: &TrunkRef) -> Result<Option<TrunkEndpoints>, StoreError>;

    async fn did_assignment(&self, did: &str) -> Result<Option<DidAssignment>, StoreError>;

    async fn is_number_blocked(&self, workspace_id: &str, number: &str) -> Result<bool, StoreError>;
}

/// Outbound call history, consulted by the first-call notification.
#[async_trait]
pub trait CallHistory: Send + Sync {
    /// Number of outbound calls a workspace has placed to a country.
    async fn prior_outbound_calls(&self, workspace_id: &str, dest_code: &str) -> Result<u64, StoreError>;
}

pub type SharedStore = Arc<dyn RoutingDataStore>;
