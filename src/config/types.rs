use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::store::{CircuitBreakerConfig, RoutingData};

/// Root configuration for siprouted
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging and tracing
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Admin endpoint configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Routing data store access
    #[serde(default)]
    pub store: StoreConfig,

    /// Trunk liveness probing
    #[serde(default)]
    pub health_probe: HealthProbeConfig,

    /// First-call notification pool
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Routing data served by the in-memory store
    #[serde(default)]
    pub data: RoutingData,
}

/// Telemetry settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable structured JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// OTLP endpoint for distributed tracing
    pub otlp_endpoint: Option<String>,

    /// Trace sample rate (0.0 - 1.0)
    #[serde(default = "default_sample_rate")]
    pub trace_sample_rate: f64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            otlp_endpoint: None,
            trace_sample_rate: default_sample_rate(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> f64 {
    1.0
}

/// Admin endpoint serving `/metrics` and `/healthz`
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_admin_address(),
        }
    }
}

fn default_admin_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9901))
}

/// Store access settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Upper bound on a single store call
    #[serde(default = "default_call_timeout", with = "duration_serde")]
    pub call_timeout: Duration,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            call_timeout: default_call_timeout(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Liveness probe implementation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// SIP OPTIONS over UDP
    #[default]
    SipOptions,
    /// Treat every endpoint as reachable
    AlwaysOnline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthProbeConfig {
    #[serde(default)]
    pub kind: ProbeKind,

    /// Per-probe response timeout
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for HealthProbeConfig {
    fn default() -> Self {
        Self {
            kind: ProbeKind::default(),
            timeout: default_probe_timeout(),
        }
    }
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

/// Notification worker pool
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pending tasks beyond this are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    256
}

/// Humantime serde support for `Duration` fields
pub mod duration_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
