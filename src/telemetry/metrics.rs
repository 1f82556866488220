use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use opentelemetry::metrics::MeterProvider;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// HTTP endpoint address
    pub address: SocketAddr,
}

/// Process state reported by the admin endpoint
#[derive(Debug)]
pub struct AdminState {
    start_time: Instant,
    healthy: AtomicBool,
    ready: AtomicBool,
}

impl AdminState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            healthy: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }
}

impl Default for AdminState {
    fn default() -> Self {
        Self::new()
    }
}

/// OTEL Metrics with Prometheus exporter
pub struct Metrics {
    registry: Registry,
    meter_provider: SdkMeterProvider,
    address: SocketAddr,
    admin_state: Arc<AdminState>,
}

impl Metrics {
    /// Create metrics with OTEL → Prometheus pipeline
    pub fn new(config: &MetricsConfig) -> Result<Arc<Self>> {
        let registry = Registry::new();

        let exporter = exporter().with_registry(registry.clone()).build()?;

        let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

        opentelemetry::global::set_meter_provider(meter_provider.clone());

        info!(
            address = %config.address,
            "OTEL metrics configured with Prometheus exporter"
        );

        Ok(Arc::new(Self {
            registry,
            meter_provider,
            address: config.address,
            admin_state: Arc::new(AdminState::new()),
        }))
    }

    pub fn admin_state(&self) -> Arc<AdminState> {
        self.admin_state.clone()
    }

    /// Get a meter for recording metrics
    pub fn meter(&self, name: &'static str) -> opentelemetry::metrics::Meter {
        self.meter_provider.meter(name)
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;

        Ok(String::from_utf8(buffer)?)
    }

    /// Serve `/metrics`, `/healthz`, `/livez` and `/readyz` until the task is dropped
    pub async fn serve(self: Arc<Self>) -> Result<()> {
        let metrics = self.clone();

        let app = Router::new()
            .route(
                "/metrics",
                get(move || {
                    let m = metrics.clone();
                    async move {
                        match m.render() {
                            Ok(body) => (StatusCode::OK, body),
                            Err(e) => {
                                warn!(error = %e, "failed to render metrics");
                                (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                            }
                        }
                    }
                }),
            )
            .route("/healthz", get(healthz_handler))
            .route("/livez", get(|| async { StatusCode::OK }))
            .route("/readyz", get(readyz_handler))
            .with_state(self.admin_state.clone());

        let listener = tokio::net::TcpListener::bind(self.address).await?;

        info!(address = %self.address, "admin server started");

        axum::serve(listener, app).await?;

        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

async fn healthz_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    let healthy = state.is_healthy();
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_secs(),
    };

    if healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

async fn readyz_handler(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

impl Drop for Metrics {
    fn drop(&mut self) {
        if let Err(e) = self.meter_provider.shutdown() {
            warn!(error = %e, "failed to shutdown meter provider");
        }
    }
}

/// Routing metrics with `siprouted_` prefix.
///
/// Every recorder is a no-op until [`init`] has registered the instruments,
/// so library users that never export metrics pay nothing.
pub mod counters {
    use opentelemetry::metrics::{Counter, Histogram};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    static ROUTES_RESOLVED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static ROUTES_NOT_FOUND_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static ROUTE_RESOLUTION_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();
    static FLOW_EXECUTIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static ADMISSIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static TRUNK_RESOLUTIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static TRUNK_PROBES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static STORE_BREAKER_TRANSITIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static NOTIFICATIONS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    /// Register all instruments on `meter`. Later calls are ignored.
    pub fn init(meter: &opentelemetry::metrics::Meter) {
        let _ = ROUTES_RESOLVED_TOTAL.set(
            meter
                .u64_counter("siprouted_routes_resolved_total")
                .with_description("Routes resolved by path (platform, byo)")
                .build(),
        );
        let _ = ROUTES_NOT_FOUND_TOTAL.set(
            meter
                .u64_counter("siprouted_routes_not_found_total")
                .with_description("Route requests with no usable provider")
                .build(),
        );
        let _ = ROUTE_RESOLUTION_DURATION.set(
            meter
                .f64_histogram("siprouted_route_resolution_duration_seconds")
                .with_description("Time spent resolving a route")
                .build(),
        );
        let _ = FLOW_EXECUTIONS_TOTAL.set(
            meter
                .u64_counter("siprouted_flow_executions_total")
                .with_description("Flow traversals by outcome")
                .build(),
        );
        let _ = ADMISSIONS_TOTAL.set(
            meter
                .u64_counter("siprouted_admissions_total")
                .with_description("Source address decisions by scope and result")
                .build(),
        );
        let _ = TRUNK_RESOLUTIONS_TOTAL.set(
            meter
                .u64_counter("siprouted_trunk_resolutions_total")
                .with_description("Trunk target resolutions by outcome")
                .build(),
        );
        let _ = TRUNK_PROBES_TOTAL.set(
            meter
                .u64_counter("siprouted_trunk_probes_total")
                .with_description("Liveness probes by result")
                .build(),
        );
        let _ = STORE_BREAKER_TRANSITIONS_TOTAL.set(
            meter
                .u64_counter("siprouted_store_breaker_transitions_total")
                .with_description("Store circuit breaker state changes")
                .build(),
        );
        let _ = NOTIFICATIONS_TOTAL.set(
            meter
                .u64_counter("siprouted_notifications_total")
                .with_description("First-call notification tasks by event")
                .build(),
        );
    }

    pub fn route_resolved(path: &str) {
        if let Some(c) = ROUTES_RESOLVED_TOTAL.get() {
            c.add(1, &[kv("path", path)]);
        }
    }

    pub fn route_not_found() {
        if let Some(c) = ROUTES_NOT_FOUND_TOTAL.get() {
            c.add(1, &[]);
        }
    }

    pub fn route_resolution(duration_secs: f64, method: &str) {
        if let Some(h) = ROUTE_RESOLUTION_DURATION.get() {
            h.record(duration_secs, &[kv("method", method)]);
        }
    }

    pub fn flow_executed(outcome: &str) {
        if let Some(c) = FLOW_EXECUTIONS_TOTAL.get() {
            c.add(1, &[kv("outcome", outcome)]);
        }
    }

    pub fn admission(scope: &str, result: &str) {
        if let Some(c) = ADMISSIONS_TOTAL.get() {
            c.add(1, &[kv("scope", scope), kv("result", result)]);
        }
    }

    /// `outcome` is one of `primary`, `failover`, `recovery`, `unreachable`, `unknown`.
    pub fn trunk_resolution(outcome: &str) {
        if let Some(c) = TRUNK_RESOLUTIONS_TOTAL.get() {
            c.add(1, &[kv("outcome", outcome)]);
        }
    }

    pub fn trunk_probe(online: bool) {
        if let Some(c) = TRUNK_PROBES_TOTAL.get() {
            c.add(1, &[kv("result", if online { "online" } else { "offline" })]);
        }
    }

    pub fn store_breaker_transition(state: &str) {
        if let Some(c) = STORE_BREAKER_TRANSITIONS_TOTAL.get() {
            c.add(1, &[kv("state", state)]);
        }
    }

    /// `event` is one of `dispatched`, `dropped`, `sent`, `skipped`, `failed`.
    pub fn notification(event: &str) {
        if let Some(c) = NOTIFICATIONS_TOTAL.get() {
            c.add(1, &[kv("event", event)]);
        }
    }

    #[inline]
    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}
