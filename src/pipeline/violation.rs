//! Security violation and pipeline decision types.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Category of a security violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    Authentication,
    Authorization,
    RateLimit,
    InputValidation,
    Certificate,
    SystemError,
}

impl ViolationKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Authentication => "authentication",
            ViolationKind::Authorization => "authorization",
            ViolationKind::RateLimit => "rate-limit",
            ViolationKind::InputValidation => "input-validation",
            ViolationKind::Certificate => "certificate",
            ViolationKind::SystemError => "system-error",
        }
    }
}

/// Severity of a violation. Ordering is ascending: `Low < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// A single security violation reported by a validator or trust check.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityViolation {
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    /// Name of the validator or check that raised this violation.
    pub source: String,
    /// Structured context for diagnostics.
    pub details: HashMap<String, String>,
    pub timestamp: SystemTime,
}

impl SecurityViolation {
    pub fn new(
        kind: ViolationKind,
        severity: Severity,
        source: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            description: description.into(),
            source: source.into(),
            details: HashMap::new(),
            timestamp: SystemTime::now(),
        }
    }

    /// Attach a structured detail.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Aggregate decision for one pipeline execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineDecision {
    /// Validators that passed, in execution order.
    pub passed: Vec<String>,
    /// Validators that reported a violation or failed internally.
    pub failed: Vec<String>,
    /// All violations collected during the run.
    pub violations: Vec<SecurityViolation>,
    /// Whether the request must be refused.
    pub blocked: bool,
    /// Description of the first critical violation, when blocking.
    pub block_reason: Option<String>,
    /// Total validation time, recorded even on early exit.
    pub elapsed: Duration,
}

impl PipelineDecision {
    /// True when no validator raised any violation.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn severity_parses_lowercase() {
        let s: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(s, Severity::Critical);
    }

    #[test]
    fn violation_details() {
        let v = SecurityViolation::new(
            ViolationKind::RateLimit,
            Severity::Medium,
            "RateLimitValidator",
            "too many requests",
        )
        .with_detail("client", "10.0.0.1");
        assert_eq!(v.details.get("client").unwrap(), "10.0.0.1");
        assert_eq!(v.kind.as_str(), "rate-limit");
    }
}
