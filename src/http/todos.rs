//! `GET /todos` handler.

use axum::{
    extract::{RawQuery, State},
    http::HeaderMap,
};

use crate::http::request::inbound_trace;
use crate::http::server::AppState;
use crate::pipeline::{FaultFlags, PipelineOutcome};

/// Query flags are read leniently so that no input produces anything but
/// the pipeline's 200 or 500.
pub async fn list_todos(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> PipelineOutcome {
    let flags = FaultFlags::from_query(query.as_deref());
    let (remote, baggage) = inbound_trace(&headers);
    state.pipeline.handle(remote.as_ref(), &baggage, flags).await
}
