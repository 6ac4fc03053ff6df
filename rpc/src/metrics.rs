//! Prometheus metrics for the handoff service.
//!
//! [`RpcMetrics`] owns a dedicated [`Registry`] that the `/metrics` endpoint
//! encodes into the Prometheus text exposition format. Status counters are fed
//! from the manager's event stream so every transition is counted once, no
//! matter which path caused it.

use prometheus::{
    register_histogram_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge,
    Opts, Registry, TextEncoder,
};

use kyc_session::SessionEvent;
use kyc_types::SessionStatus;

pub struct RpcMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    pub sessions_created: IntCounter,
    pub sessions_started: IntCounter,
    pub sessions_completed: IntCounter,
    pub sessions_failed: IntCounter,
    pub sessions_expired: IntCounter,
    /// Requests refused because of the presenting device's class.
    pub guard_denials: IntCounter,
    pub scorer_failures: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Sessions currently held in the store, terminal ones included.
    pub live_sessions: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    /// Wall time of a verify request, scorer round trip included.
    pub verify_latency_ms: Histogram,
}

impl RpcMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let sessions_created = register_int_counter_with_registry!(
            Opts::new("kyc_sessions_created_total", "Sessions created"),
            registry
        )
        .expect("failed to register sessions_created counter");

        let sessions_started = register_int_counter_with_registry!(
            Opts::new(
                "kyc_sessions_started_total",
                "Sessions opened by a completing device"
            ),
            registry
        )
        .expect("failed to register sessions_started counter");

        let sessions_completed = register_int_counter_with_registry!(
            Opts::new(
                "kyc_sessions_completed_total",
                "Sessions that ended with an accepted verification"
            ),
            registry
        )
        .expect("failed to register sessions_completed counter");

        let sessions_failed = register_int_counter_with_registry!(
            Opts::new(
                "kyc_sessions_failed_total",
                "Sessions rejected by the scorer or aborted"
            ),
            registry
        )
        .expect("failed to register sessions_failed counter");

        let sessions_expired = register_int_counter_with_registry!(
            Opts::new(
                "kyc_sessions_expired_total",
                "Sessions whose TTL elapsed before a verdict"
            ),
            registry
        )
        .expect("failed to register sessions_expired counter");

        let guard_denials = register_int_counter_with_registry!(
            Opts::new(
                "kyc_guard_denials_total",
                "Requests refused because of the device class"
            ),
            registry
        )
        .expect("failed to register guard_denials counter");

        let scorer_failures = register_int_counter_with_registry!(
            Opts::new(
                "kyc_scorer_failures_total",
                "Verify requests the scorer could not answer"
            ),
            registry
        )
        .expect("failed to register scorer_failures counter");

        let live_sessions = register_int_gauge_with_registry!(
            Opts::new("kyc_live_sessions", "Sessions currently in the store"),
            registry
        )
        .expect("failed to register live_sessions gauge");

        let verify_latency_ms = register_histogram_with_registry!(
            HistogramOpts::new(
                "kyc_verify_latency_ms",
                "Verify request latency in milliseconds"
            )
            .buckets(prometheus::exponential_buckets(5.0, 2.0, 12).expect("valid latency buckets")),
            registry
        )
        .expect("failed to register verify_latency_ms histogram");

        Self {
            registry,
            sessions_created,
            sessions_started,
            sessions_completed,
            sessions_failed,
            sessions_expired,
            guard_denials,
            scorer_failures,
            live_sessions,
            verify_latency_ms,
        }
    }

    /// Count one lifecycle transition.
    pub fn observe_event(&self, event: &SessionEvent) {
        match event.status {
            SessionStatus::InProgress => self.sessions_started.inc(),
            SessionStatus::Completed => self.sessions_completed.inc(),
            SessionStatus::Failed => self.sessions_failed.inc(),
            SessionStatus::Expired => self.sessions_expired.inc(),
            SessionStatus::Pending => {}
        }
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

impl Default for RpcMetrics {
    fn default() -> Self {
        Self::new()
    }
}
