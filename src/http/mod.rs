//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, TraceLayer)
//!     → observer.rs (times the request, records `http-calls`)
//!     → todos.rs (GET /todos)
//!     → request.rs (inbound traceparent / baggage)
//!     → pipeline
//!     → response.rs (200 JSON or bare 500, x-trace-id)
//! ```

pub mod observer;
pub mod request;
pub mod response;
pub mod server;
pub mod todos;

pub use response::TRACE_ID_HEADER;
pub use server::{build_router, AppState, HttpServer};
