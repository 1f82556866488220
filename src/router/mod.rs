//! Outbound route selection.
//!
//! Two paths:
//! - BYO: a tenant's own carrier routes, first matching rule wins
//! - Platform: least-cost routing over active provider rate rows, the most
//!   specific prefix wins and the lowest rate breaks ties

mod matcher;
mod pricing;
mod selector;

pub use matcher::{CompiledPattern, PatternKind};
pub use pricing::{billable_minutes, call_cost, compare_candidates, rank, to_cents, Candidate};
pub use selector::{
    best_per_provider, match_byo_route, pick_host, rank_candidates, ProviderCatalog,
    RoutableProvider, RoutePath, RouteSelector,
};

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no route found for destination {destination}")]
    NoRouteFound { destination: String },

    #[error("invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
