//! Wrapping observer that records one duration sample per request.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};

use crate::observability::metrics::{DurationRecorder, MetricSample};

/// Time the inner service and record route, method and final status.
///
/// `route` is the matched route template, absent when nothing matched.
pub async fn record_http_calls(
    State(recorder): State<Arc<dyn DurationRecorder>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string());

    let response = next.run(request).await;

    let sample = MetricSample {
        duration_ms: start.elapsed().as_millis() as u64,
        route,
        status: response.status().as_u16(),
        method,
    };
    tracing::debug!(
        route = sample.route.as_deref().unwrap_or("-"),
        status = sample.status,
        duration_ms = sample.duration_ms,
        "Request completed"
    );
    recorder.record_duration(&sample);

    response
}
