//! Prometheus metrics.
//!
//! Recording goes through the `metrics` facade and is a no-op until a
//! [`MetricsService`] installs the Prometheus recorder.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use tracing::warn;

pub const SEARCH_TOTAL: &str = "milo_search_total";
pub const SEARCH_DURATION_SECONDS: &str = "milo_search_duration_seconds";
pub const SEARCH_FALLBACK_TOTAL: &str = "milo_search_fallback_total";
pub const UPSTREAM_ERRORS_TOTAL: &str = "milo_upstream_errors_total";
pub const STREAM_EVENTS_TOTAL: &str = "milo_stream_events_total";
pub const MALFORMED_RESPONSES_TOTAL: &str = "milo_malformed_responses_total";

/// A finished search and the path that answered it.
pub fn record_search(path: &'static str, elapsed: Duration) {
    counter!(SEARCH_TOTAL, "path" => path).increment(1);
    histogram!(SEARCH_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

/// Fallback entered because the vector path was `"empty"` or hit an `"error"`.
pub fn record_fallback(reason: &'static str) {
    counter!(SEARCH_FALLBACK_TOTAL, "reason" => reason).increment(1);
}

pub fn record_upstream_error(service: &'static str) {
    counter!(UPSTREAM_ERRORS_TOTAL, "service" => service).increment(1);
}

pub fn record_stream_event(kind: &'static str) {
    counter!(STREAM_EVENTS_TOTAL, "type" => kind).increment(1);
}

pub fn record_malformed_response(step: &'static str) {
    counter!(MALFORMED_RESPONSES_TOTAL, "step" => step).increment(1);
}

/// Owns the Prometheus recorder handle used by `GET /metrics`.
#[derive(Clone)]
pub struct MetricsService {
    handle: PrometheusHandle,
}

impl MetricsService {
    /// Install the global recorder.
    ///
    /// Only one global recorder may exist per process; if one is already
    /// installed (tests, embedding) a detached recorder is used instead and
    /// its output will stay empty.
    pub fn new() -> Self {
        let handle = match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Prometheus recorder already installed, using a detached one");
                PrometheusBuilder::new().build_recorder().handle()
            }
        };
        Self { handle }
    }

    /// Prometheus text exposition of all recorded metrics.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}
