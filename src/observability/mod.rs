//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! GET /todos
//!     → context.rs (trace identity + baggage, task-local per request)
//!     → pipeline stages log and open child spans under that context
//!     → http observer → metrics.rs (`http-calls` histogram)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Collaborators (traceparent / baggage headers)
//! ```

pub mod context;
pub mod logging;
pub mod metrics;

pub use self::context::{current, in_child, with_context, Baggage, BaggageEntry, PropagationContext};
pub use self::metrics::{DurationRecorder, HistogramRecorder, MetricSample};
