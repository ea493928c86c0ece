//! HTTP gateway subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → middleware.rs (request ID, build RequestContext)
//!     → SecurityValidationPipeline (block / allow)
//!     → server.rs handler (placeholder upstream)
//!     → response
//! ```

pub mod middleware;
pub mod server;

pub use middleware::X_REQUEST_ID;
pub use server::{build_request_pipeline, GatewayServer, GatewayState};
