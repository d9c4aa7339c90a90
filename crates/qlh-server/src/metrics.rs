use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, register_histogram_with_registry,
    Counter, Gauge, Histogram, Registry,
};
use std::sync::Arc;

pub struct HandoffMetrics {
    pub active_sessions: Gauge,
    pub sessions_created: Counter,
    pub sessions_verified: Counter,
    pub sessions_completed: Counter,
    pub sessions_expired: Counter,
    pub sessions_purged: Counter,
    pub request_latency: Histogram,
    pub auth_failures: Counter,
    pub error_counts: Counter,
    pub registry: Arc<Registry>,
}

impl HandoffMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let active_sessions = register_gauge_with_registry!(
            "qlh_active_sessions",
            "Number of handshake sessions currently stored",
            registry
        )?;

        let sessions_created = register_counter_with_registry!(
            "qlh_sessions_created_total",
            "Total number of handshake sessions created",
            registry
        )?;

        let sessions_verified = register_counter_with_registry!(
            "qlh_sessions_verified_total",
            "Total number of handshake sessions verified by a claimant",
            registry
        )?;

        let sessions_completed = register_counter_with_registry!(
            "qlh_sessions_completed_total",
            "Total number of handshake sessions exchanged for a credential",
            registry
        )?;

        let sessions_expired = register_counter_with_registry!(
            "qlh_sessions_expired_total",
            "Total number of handshake sessions swept to expired",
            registry
        )?;

        let sessions_purged = register_counter_with_registry!(
            "qlh_sessions_purged_total",
            "Total number of terminal sessions deleted after retention",
            registry
        )?;

        let request_latency = register_histogram_with_registry!(
            "qlh_request_latency_seconds",
            "Request latency in seconds",
            registry
        )?;

        let auth_failures = register_counter_with_registry!(
            "qlh_auth_failures_total",
            "Total number of rejected generate calls",
            registry
        )?;

        let error_counts = register_counter_with_registry!(
            "qlh_errors_total",
            "Total number of errors",
            registry
        )?;

        Ok(Self {
            active_sessions,
            sessions_created,
            sessions_verified,
            sessions_completed,
            sessions_expired,
            sessions_purged,
            request_latency,
            auth_failures,
            error_counts,
            registry,
        })
    }

    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
