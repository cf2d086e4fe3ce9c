//! Instrumented request pipeline for `GET /todos`.
//!
//! # Data Flow
//! ```text
//! handler
//!     → PropagationContext (user.plan baggage, continues inbound trace)
//!     → aggregate.rs (auth, then store keys, then each key in order)
//!     → injection.rs (optional delay, then optional failure)
//!     → PipelineOutcome (written by http::response)
//! ```

pub mod aggregate;
pub mod injection;
pub mod types;

use crate::error::{PipelineError, PipelineResult};
use crate::observability::context::{
    with_context, Baggage, BaggageEntry, PropagationContext, TraceId, TraceParent,
};

pub use aggregate::Aggregator;
pub use injection::{FaultInjector, INJECTED_FAILURE_MESSAGE};
pub use types::{AggregatedResponse, FaultFlags, TodoItem};

/// Baggage key set on every request context.
pub const PLAN_BAGGAGE_KEY: &str = "user.plan";
pub const PLAN_BAGGAGE_VALUE: &str = "enterprise";

/// Result of one pipeline run plus the trace it ran under.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub trace_id: TraceId,
    pub result: PipelineResult<AggregatedResponse>,
}

/// Aggregation followed by fault injection, under a fresh request context.
#[derive(Clone)]
pub struct TodoPipeline {
    aggregator: Aggregator,
    injector: FaultInjector,
}

impl TodoPipeline {
    pub fn new(aggregator: Aggregator, injector: FaultInjector) -> Self {
        Self {
            aggregator,
            injector,
        }
    }

    /// Run one request. `remote` and `inherited` come from inbound headers.
    pub async fn handle(
        &self,
        remote: Option<&TraceParent>,
        inherited: &Baggage,
        flags: FaultFlags,
    ) -> PipelineOutcome {
        let ctx = PropagationContext::create_with_parent(
            remote,
            inherited,
            [(PLAN_BAGGAGE_KEY, BaggageEntry::new(PLAN_BAGGAGE_VALUE))],
        );
        let trace_id = ctx.trace_id();

        let result = with_context(ctx, async {
            tracing::debug!(slow = flags.slow, fail = flags.fail, "Handling todos request");
            let response = self.aggregator.aggregate().await?;
            self.injector.apply(flags).await?;
            Ok::<_, PipelineError>(response)
        })
        .await;

        PipelineOutcome { trace_id, result }
    }
}
