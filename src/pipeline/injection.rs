//! Fault and delay injection.
//!
//! ```text
//! Idle ──slow──▶ Delayed ──fail──▶ Failed
//!   │               │
//!   └───────────────┴──────────────▶ Completed
//! ```
//!
//! The delay is a timer await, so other requests keep running. A failure is
//! returned as [`PipelineError::InjectedFailure`] carrying the identity of
//! the span active when it was raised; reporting happens where the response
//! is written.

use std::time::Duration;

use crate::error::{FailureDiagnostic, PipelineError};
use crate::observability::context::{self, PropagationContext};
use crate::pipeline::types::FaultFlags;

/// Message of the synthetic error.
pub const INJECTED_FAILURE_MESSAGE: &str = "Really bad error!";

/// Applies request-driven delay and failure.
#[derive(Debug, Clone)]
pub struct FaultInjector {
    slow_delay: Duration,
}

impl FaultInjector {
    pub fn new(slow_delay: Duration) -> Self {
        Self { slow_delay }
    }

    pub fn slow_delay(&self) -> Duration {
        self.slow_delay
    }

    /// Delay if `slow` is set, then fail if `fail` is set.
    pub async fn apply(&self, flags: FaultFlags) -> Result<(), PipelineError> {
        if flags.slow {
            tracing::debug!(delay_ms = self.slow_delay.as_millis() as u64, "Injecting delay");
            tokio::time::sleep(self.slow_delay).await;
        }

        if flags.fail {
            return Err(PipelineError::InjectedFailure(self.raise()));
        }

        Ok(())
    }

    fn raise(&self) -> FailureDiagnostic {
        let ctx = context::current().unwrap_or_else(|| {
            tracing::debug!("Failure injected outside a request context");
            PropagationContext::create(std::iter::empty::<(String, context::BaggageEntry)>())
        });

        FailureDiagnostic {
            message: INJECTED_FAILURE_MESSAGE,
            trace_id: ctx.trace_id(),
            span_id: ctx.span_id(),
            trace_flags: ctx.trace_flags(),
            span: ctx.span().clone(),
        }
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
