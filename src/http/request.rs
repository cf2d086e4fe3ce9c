//! Inbound trace header extraction.
//!
//! # Design Decisions
//! - A malformed `traceparent` starts a new trace instead of rejecting
//! - Multiple `baggage` headers are merged in order

use axum::http::HeaderMap;

use crate::observability::context::{Baggage, TraceParent, BAGGAGE_HEADER, TRACEPARENT_HEADER};

/// Remote parent and baggage carried by an inbound request.
pub fn inbound_trace(headers: &HeaderMap) -> (Option<TraceParent>, Baggage) {
    let parent = headers
        .get(TRACEPARENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(TraceParent::parse);

    let joined = headers
        .get_all(BAGGAGE_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join(",");

    (parent, Baggage::from_header(&joined))
}
