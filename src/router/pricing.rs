//! Rate arithmetic and least-cost candidate ordering.
//!
//! Candidates are ordered by:
//! - longest matching rate prefix (most specific route)
//! - lowest rate among equally specific prefixes
//! - catalog order among full ties

use std::cmp::Ordering;

use serde::Serialize;

use crate::store::ProviderRate;

/// Whole minutes billed for a call, partial minutes are not billed.
pub fn billable_minutes(seconds: u64) -> u64 {
    seconds / 60
}

/// Dollar cost of a call at a per-minute rate.
pub fn call_cost(seconds: u64, rate_per_minute: f64) -> f64 {
    billable_minutes(seconds) as f64 * rate_per_minute
}

/// Convert dollars to integer cents, truncating toward zero.
///
/// `12.345` becomes `1234`.
pub fn to_cents(dollars: f64) -> i64 {
    (dollars * 100.0) as i64
}

/// A rate row whose prefix matched the destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    pub provider_id: String,
    pub provider_name: String,
    pub dial_prefix: String,
    pub rate: f64,
    pub matched_prefix: String,
    pub active_channels: u32,
    /// Position in the catalog scan, breaks full ties.
    pub order: usize,
}

impl Candidate {
    pub fn from_row(row: &ProviderRate, matched_prefix: &str, order: usize) -> Self {
        Self {
            provider_id: row.provider_id.clone(),
            provider_name: row.provider_name.clone(),
            dial_prefix: row.dial_prefix.clone(),
            rate: row.rate,
            matched_prefix: matched_prefix.to_string(),
            active_channels: row.active_channels,
            order,
        }
    }

    /// Number dialed through this candidate.
    pub fn dial_number(&self, destination: &str) -> String {
        format!("{}{}", self.dial_prefix, destination)
    }
}

/// Least-cost ordering, best candidate first.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.matched_prefix
        .len()
        .cmp(&a.matched_prefix.len())
        .then_with(|| a.rate.total_cmp(&b.rate))
        .then_with(|| a.order.cmp(&b.order))
}

/// Sort candidates best first.
pub fn rank(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_candidates);
}
