//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields: request_id, endpoint, validator)
//!     → metrics.rs (counters for decisions, caches, handshakes)
//!
//! Consumers:
//!     → stdout via tracing-subscriber (EnvFilter)
//!     → Prometheus scrape of the metrics listener
//! ```

pub mod metrics;
