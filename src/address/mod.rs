//! Source address admission.
//!
//! Every admission path (platform providers, BYO carriers, tenant
//! whitelists, media servers) reduces to the same check: is the source
//! host inside any `(ip, range)` row of the scope. Carrier scopes skip rows
//! that do not parse; tenant and media server scopes fail the check.

mod cidr;
mod whitelist;

pub use cidr::{cidr_contains, parse_network, parse_source, row_network};
pub use whitelist::{evaluate, Admission, AddressValidator, MalformedRows, ValidationError};

use thiserror::Error;

/// Unparseable address input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid source address: {0}")]
    InvalidSource(String),

    #[error("invalid network: {0}")]
    InvalidNetwork(String),
}
