//! Response writing for the todos endpoint.
//!
//! Every pipeline outcome is turned into a response here and nowhere else.
//! Failures of any kind become a 500 with an empty body; what differs is the
//! telemetry emitted first. Every response carries `x-trace-id`.

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{FailureDiagnostic, PipelineError};
use crate::pipeline::PipelineOutcome;

pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Record the synthetic error on its span, then log it with the span
/// identity.
fn report_injected(diag: &FailureDiagnostic) {
    tracing::error!(
        parent: &diag.span,
        exception.kind = "InjectedFailure",
        exception.message = diag.message,
        "exception"
    );
    tracing::error!(
        parent: &diag.span,
        trace_id = %diag.trace_id,
        span_id = %diag.span_id,
        trace_flags = %diag.trace_flags,
        "{}",
        diag.message
    );
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match &self {
            PipelineError::InjectedFailure(diag) => report_injected(diag),
            PipelineError::AggregationFailed(e) => {
                tracing::error!(kind = e.kind(), error = %e, "Aggregation failed");
            }
        }
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

impl IntoResponse for PipelineOutcome {
    fn into_response(self) -> Response {
        let mut response = match self.result {
            Ok(body) => (StatusCode::OK, Json(body)).into_response(),
            Err(e) => e.into_response(),
        };
        if let Ok(value) = HeaderValue::from_str(&self.trace_id.to_string()) {
            response.headers_mut().insert(TRACE_ID_HEADER, value);
        }
        response
    }
}
