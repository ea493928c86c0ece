//! Request validators.
//!
//! Each validator is an independent check over a [`RequestContext`].
//! New validators are added by registering an instance with the
//! pipeline, not by modifying the pipeline itself.

pub mod authentication;
pub mod authorization;
pub mod input_inspection;
pub mod rate_limit;

pub use authentication::AuthenticationValidator;
pub use authorization::AuthorizationValidator;
pub use input_inspection::InputInspectionValidator;
pub use rate_limit::RateLimitValidator;

use crate::pipeline::context::RequestContext;
use crate::pipeline::violation::SecurityViolation;

/// Internal failure of a validator, distinct from a finding.
///
/// The pipeline converts this into a critical `system-error` violation
/// and stops processing.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValidatorError(pub String);

/// A single pluggable security check.
///
/// Validators run in ascending priority order, ties broken by
/// registration order. Returning `Ok(Some(violation))` reports a
/// finding; a violation with `Critical` severity halts the pipeline.
pub trait RequestValidator: Send + Sync {
    /// Stable name used in decisions, logs and metrics.
    fn name(&self) -> &'static str;

    /// Execution priority, ascending.
    fn priority(&self) -> u32;

    /// Check the request. `Ok(None)` means the request passed.
    fn validate(&self, ctx: &RequestContext) -> Result<Option<SecurityViolation>, ValidatorError>;
}
