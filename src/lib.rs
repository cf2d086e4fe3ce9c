//! Instrumented todo aggregation service.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use config::ServiceConfig;
pub use http::{build_router, AppState, HttpServer};
pub use lifecycle::Shutdown;
pub use pipeline::TodoPipeline;
