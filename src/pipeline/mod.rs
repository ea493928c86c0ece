//! Request security pipeline.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → middleware builds RequestContext
//!     → SecurityValidationPipeline runs validators in priority order
//!         AuthenticationValidator (10, critical on failure)
//!         AuthorizationValidator  (20, critical on failure)
//!         RateLimitValidator      (30, non-critical)
//!         InputInspectionValidator(40, non-critical)
//!     → PipelineDecision (block/allow + violations + metrics)
//! ```
//!
//! # Design Decisions
//! - Deterministic ordering: ascending priority, ties by registration
//! - Critical violations short-circuit; non-critical ones are recorded
//!   and later validators still run
//! - A validator's internal error blocks the whole pipeline as a
//!   system-error, never crashes the host

pub mod context;
pub mod validators;
pub mod violation;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::observability::metrics;
use crate::pipeline::context::RequestContext;
use crate::pipeline::validators::RequestValidator;
use crate::pipeline::violation::{PipelineDecision, SecurityViolation, Severity, ViolationKind};

/// Running counters for one validator.
#[derive(Debug, Default)]
struct ValidatorStats {
    count: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    total_micros: AtomicU64,
}

/// Read-only metrics snapshot for one validator.
#[derive(Debug, Clone)]
pub struct ValidatorMetrics {
    pub name: String,
    pub count: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_duration: Duration,
}

/// Ordered pipeline of request validators.
pub struct SecurityValidationPipeline {
    validators: Vec<Arc<dyn RequestValidator>>,
    block_severity: Severity,
    stats: DashMap<String, ValidatorStats>,
}

impl SecurityValidationPipeline {
    /// Create an empty pipeline. Non-critical violations at or above
    /// `block_severity` still block the request without halting
    /// remaining validators.
    pub fn new(block_severity: Severity) -> Self {
        Self {
            validators: Vec::new(),
            block_severity,
            stats: DashMap::new(),
        }
    }

    /// Register a validator. Ascending priority; stable sort keeps
    /// registration order for equal priorities.
    pub fn register(&mut self, validator: Arc<dyn RequestValidator>) {
        self.validators.push(validator);
        self.validators.sort_by_key(|v| v.priority());
    }

    /// Names of registered validators, in execution order.
    pub fn validator_names(&self) -> Vec<&'static str> {
        self.validators.iter().map(|v| v.name()).collect()
    }

    /// Run every validator against the request and aggregate a decision.
    pub fn execute(&self, ctx: &RequestContext) -> PipelineDecision {
        let started = Instant::now();
        let mut decision = PipelineDecision::default();

        for validator in &self.validators {
            let name = validator.name();
            let check_started = Instant::now();
            let result = validator.validate(ctx);
            let check_elapsed = check_started.elapsed();

            let stats = self.stats.entry(name.to_string()).or_default();
            stats.count.fetch_add(1, Ordering::Relaxed);
            stats
                .total_micros
                .fetch_add(check_elapsed.as_micros() as u64, Ordering::Relaxed);

            match result {
                Ok(None) => {
                    stats.successes.fetch_add(1, Ordering::Relaxed);
                    decision.passed.push(name.to_string());
                    metrics::record_validator_outcome(name, "pass");
                }
                Ok(Some(violation)) => {
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    decision.failed.push(name.to_string());
                    metrics::record_validator_outcome(name, "violation");

                    let critical = violation.severity == Severity::Critical;
                    if violation.severity >= self.block_severity || critical {
                        decision.blocked = true;
                    }
                    if critical && decision.block_reason.is_none() {
                        decision.block_reason = Some(violation.description.clone());
                    }

                    tracing::warn!(
                        validator = name,
                        kind = violation.kind.as_str(),
                        severity = ?violation.severity,
                        client = %ctx.remote_addr,
                        "{}",
                        violation.description
                    );
                    decision.violations.push(violation);

                    if critical {
                        break;
                    }
                }
                Err(e) => {
                    // Internal failure of a validator is a failure of the
                    // pipeline itself: block and stop.
                    stats.failures.fetch_add(1, Ordering::Relaxed);
                    decision.failed.push(name.to_string());
                    metrics::record_validator_outcome(name, "error");

                    tracing::error!(
                        validator = name,
                        client = %ctx.remote_addr,
                        path = %ctx.path,
                        error = %e,
                        "Validator failed internally"
                    );

                    let description = format!("Internal validation failure in {name}");
                    decision.blocked = true;
                    if decision.block_reason.is_none() {
                        decision.block_reason = Some(description.clone());
                    }
                    decision.violations.push(
                        SecurityViolation::new(
                            ViolationKind::SystemError,
                            Severity::High,
                            name,
                            description,
                        )
                        .with_detail("error", e.to_string()),
                    );
                    break;
                }
            }
        }

        decision.elapsed = started.elapsed();
        if decision.blocked {
            metrics::record_request_blocked();
        }
        decision
    }

    /// Read-only per-validator metrics snapshot.
    pub fn metrics_snapshot(&self) -> Vec<ValidatorMetrics> {
        let mut snapshot: Vec<ValidatorMetrics> = self
            .stats
            .iter()
            .map(|entry| {
                let count = entry.count.load(Ordering::Relaxed);
                let successes = entry.successes.load(Ordering::Relaxed);
                let failures = entry.failures.load(Ordering::Relaxed);
                let total_micros = entry.total_micros.load(Ordering::Relaxed);
                ValidatorMetrics {
                    name: entry.key().clone(),
                    count,
                    successes,
                    failures,
                    success_rate: if count == 0 {
                        0.0
                    } else {
                        successes as f64 / count as f64
                    },
                    average_duration: if count == 0 {
                        Duration::ZERO
                    } else {
                        Duration::from_micros(total_micros / count)
                    },
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.name.cmp(&b.name));
        snapshot
    }
}
