//! Call routing core for a multi-tenant voice platform.
//!
//! Picks the provider, trunk or carrier that carries each call, admits or
//! rejects traffic by source address and fails over between trunk endpoints.
//! [`service::RoutingService`] is the entry point; the modules below can also
//! be used on their own.

pub mod address;
pub mod config;
pub mod flow;
pub mod notify;
pub mod number;
pub mod router;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod trunk;

pub use service::{EntryContext, RoutingError, RoutingService};
