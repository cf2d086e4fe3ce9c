//! Error kinds for the todo service.
//!
//! Collaborator errors are wrapped into [`AggregationError`], which together
//! with the synthetic injected failure forms [`PipelineError`]. Every variant
//! of `PipelineError` ends the request with a bare 500; the variants only
//! differ in what telemetry is emitted before the response is written.

use thiserror::Error;

use crate::observability::context::{SpanId, TraceFlags, TraceId};

/// Errors raised by a key-value store client.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection or socket failure.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server sent something that is not a valid reply.
    #[error("store protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error reply.
    #[error("store replied with error: {0}")]
    Server(String),
}

/// Errors raised by the auth collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Network failure or undecodable body.
    #[error("auth request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The auth service answered with a non-success status.
    #[error("auth service returned status {0}")]
    Status(u16),
}

/// Failures of the aggregation stage. None of them is retried.
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("auth collaborator unavailable: {0}")]
    AuthUnavailable(#[from] AuthError),

    #[error("store collaborator unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A stored value did not deserialize into a todo item.
    #[error("malformed stored item at {key}: {source}")]
    MalformedStoredItem {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

impl AggregationError {
    /// Short label used in logs to tell the failure kinds apart.
    pub fn kind(&self) -> &'static str {
        match self {
            AggregationError::AuthUnavailable(_) | AggregationError::StoreUnavailable(_) => {
                "collaborator_unavailable"
            }
            AggregationError::MalformedStoredItem { .. } => "malformed_stored_item",
        }
    }
}

/// Identity of the span that was active when a failure was injected.
#[derive(Debug, Clone)]
pub struct FailureDiagnostic {
    pub message: &'static str,
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub trace_flags: TraceFlags,
    pub span: tracing::Span,
}

/// Terminal errors of the request pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("aggregation failed: {0}")]
    AggregationFailed(#[from] AggregationError),

    #[error("injected failure: {}", .0.message)]
    InjectedFailure(FailureDiagnostic),
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
