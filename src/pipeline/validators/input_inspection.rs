//! Suspicious-input inspection over query, header and form values.

use crate::pipeline::context::RequestContext;
use crate::pipeline::validators::{RequestValidator, ValidatorError};
use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};

/// Substrings flagged as injection or traversal markers. Matching is
/// case-insensitive.
const SUSPICIOUS_PATTERNS: [&str; 12] = [
    "<script",
    "javascript:",
    "onerror=",
    "onload=",
    " union select",
    "union select",
    "drop table",
    "' or '1'='1",
    "../",
    "..\\",
    "$(",
    "; rm ",
];

/// Fails (non-critically) when any query parameter, header value or
/// form field contains a suspicious substring.
pub struct InputInspectionValidator;

impl InputInspectionValidator {
    pub fn new() -> Self {
        Self
    }

    fn find_suspicious(value: &str) -> Option<&'static str> {
        let lowered = value.to_ascii_lowercase();
        SUSPICIOUS_PATTERNS.iter().find(|p| lowered.contains(**p)).copied()
    }
}

impl Default for InputInspectionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestValidator for InputInspectionValidator {
    fn name(&self) -> &'static str {
        "InputInspectionValidator"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn validate(&self, ctx: &RequestContext) -> Result<Option<SecurityViolation>, ValidatorError> {
        let sources = [
            ("query", &ctx.query),
            ("header", &ctx.headers),
            ("form", &ctx.form),
        ];

        for (source, map) in sources {
            for (name, value) in map {
                if let Some(pattern) = Self::find_suspicious(value) {
                    return Ok(Some(
                        SecurityViolation::new(
                            ViolationKind::InputValidation,
                            Severity::High,
                            self.name(),
                            "Suspicious content in request input",
                        )
                        .with_detail("source", source)
                        .with_detail("field", name)
                        .with_detail("pattern", pattern),
                    ));
                }
            }
        }

        Ok(None)
    }
}
