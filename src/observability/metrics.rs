//! Request duration metrics.
//!
//! # Metrics
//! - `http-calls` (histogram): wall-clock duration of every completed request
//!   in milliseconds, labelled by `route`, `status` and `method`. The `route`
//!   label is omitted when no route matched.
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade, so it never blocks and
//!   never fails; with no recorder installed samples are dropped
//! - Exposition is Prometheus text, served by the exporter's own listener

use std::net::SocketAddr;

use metrics::Label;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Name of the request duration histogram.
pub const HTTP_CALLS: &str = "http-calls";

/// One observation of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSample {
    pub duration_ms: u64,
    pub route: Option<String>,
    pub status: u16,
    pub method: String,
}

impl MetricSample {
    pub fn labels(&self) -> Vec<Label> {
        let mut labels = Vec::with_capacity(3);
        if let Some(route) = &self.route {
            labels.push(Label::new("route", route.clone()));
        }
        labels.push(Label::new("status", self.status.to_string()));
        labels.push(Label::new("method", self.method.clone()));
        labels
    }
}

/// Sink for completed-request samples.
pub trait DurationRecorder: Send + Sync + 'static {
    fn record_duration(&self, sample: &MetricSample);
}

/// Records into the process-wide `http-calls` histogram.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistogramRecorder;

impl DurationRecorder for HistogramRecorder {
    fn record_duration(&self, sample: &MetricSample) {
        metrics::histogram!(HTTP_CALLS, sample.labels()).record(sample.duration_ms as f64);
    }
}

/// Install the Prometheus recorder and its scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}
