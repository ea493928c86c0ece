//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! TOML file → loader.rs (parse) → validation.rs (semantic checks)
//!           → TrustConfig consumed by the trust and request pipelines
//! watcher.rs → re-runs the load on file change, emits updates
//! ```
//!
//! # Design Decisions
//! - Every trust section has an explicit fail-open/fail-closed flag
//! - Missing sections resolve to documented defaults, never to bypass
//! - Validation collects all errors, not just the first

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::TrustConfig;
