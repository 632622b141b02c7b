//! Prometheus metrics for the API service.
//!
//! Metrics live in a registry owned by [`ServiceMetrics`] rather than the
//! process-global one, so several instances can coexist in one process.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

/// Dispatch outcome labels
pub const OUTCOME_COMPLETED: &str = "completed";
pub const OUTCOME_NOT_CONFIGURED: &str = "not_configured";
pub const OUTCOME_FAILED: &str = "failed";
pub const OUTCOME_INTERNAL_ERROR: &str = "internal_error";

/// Service metrics for observability
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,
    pub http_request_duration: Histogram,

    // Dispatch metrics
    pub dispatch_outcomes_total: IntCounterVec,
    pub dispatch_duration_seconds: Histogram,

    // Configuration metrics
    pub active_configurations: IntGauge,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("form_relay".to_string()), None)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "status"],
        )?;
        let http_request_duration = Histogram::with_opts(
            HistogramOpts::new("http_request_duration_seconds", "HTTP request processing time")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 10.0]),
        )?;
        let dispatch_outcomes_total = IntCounterVec::new(
            Opts::new(
                "dispatch_outcomes_total",
                "Webhook and test dispatches by terminal outcome",
            ),
            &["outcome"],
        )?;
        let dispatch_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "dispatch_duration_seconds",
                "Time from lookup to CRM response per dispatch",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        let active_configurations = IntGauge::new(
            "active_configurations",
            "Configurations currently stored",
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(dispatch_outcomes_total.clone()))?;
        registry.register(Box::new(dispatch_duration_seconds.clone()))?;
        registry.register(Box::new(active_configurations.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            http_request_duration,
            dispatch_outcomes_total,
            dispatch_duration_seconds,
            active_configurations,
        }))
    }

    pub fn record_http_request(&self, method: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, &status.to_string()])
            .inc();
        self.http_request_duration.observe(duration.as_secs_f64());
    }

    pub fn record_dispatch(&self, outcome: &str, duration: Duration) {
        self.dispatch_outcomes_total
            .with_label_values(&[outcome])
            .inc();
        self.dispatch_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn set_active_configurations(&self, count: usize) {
        self.active_configurations.set(count as i64);
    }

    /// Text exposition of every registered metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
