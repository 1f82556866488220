//! Trunk endpoint selection with liveness probing.

mod failover;
mod health;
mod uri;

pub use failover::{TargetSource, TrunkHealthRouter, TrunkTarget};
pub use health::{probe_from_config, AlwaysOnline, Liveness, LivenessProbe, SipOptionsProbe};
pub use uri::{Scheme, SipUri, Transport, UriError, DEFAULT_SIPS_PORT, DEFAULT_SIP_PORT};
