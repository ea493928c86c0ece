//! Credential presence and scheme validation.

use crate::pipeline::context::RequestContext;
use crate::pipeline::validators::{RequestValidator, ValidatorError};
use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};

/// Credential header inspected on every request.
const CREDENTIAL_HEADER: &str = "authorization";

/// Recognized credential scheme prefixes.
const RECOGNIZED_SCHEMES: [&str; 2] = ["Bearer ", "ApiKey "];

/// Fails critically when the credential header is missing, empty, or
/// carries an unrecognized scheme.
pub struct AuthenticationValidator;

impl AuthenticationValidator {
    pub fn new() -> Self {
        Self
    }

    fn violation(&self, description: &str) -> SecurityViolation {
        SecurityViolation::new(
            ViolationKind::Authentication,
            Severity::Critical,
            self.name(),
            description,
        )
    }
}

impl Default for AuthenticationValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestValidator for AuthenticationValidator {
    fn name(&self) -> &'static str {
        "AuthenticationValidator"
    }

    fn priority(&self) -> u32 {
        10
    }

    fn validate(&self, ctx: &RequestContext) -> Result<Option<SecurityViolation>, ValidatorError> {
        let credential = match ctx.header(CREDENTIAL_HEADER) {
            Some(value) => value,
            None => return Ok(Some(self.violation("Missing credential header"))),
        };

        if credential.trim().is_empty() {
            return Ok(Some(self.violation("Empty credential header")));
        }

        if !RECOGNIZED_SCHEMES.iter().any(|s| credential.starts_with(s)) {
            return Ok(Some(
                self.violation("Unrecognized credential scheme")
                    .with_detail("header", CREDENTIAL_HEADER),
            ));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext::new("10.0.0.1".parse().unwrap(), "GET", "/v1/chat")
    }

    #[test]
    fn missing_header_is_critical() {
        let validator = AuthenticationValidator::new();
        let violation = validator.validate(&ctx()).unwrap().unwrap();
        assert_eq!(violation.kind, ViolationKind::Authentication);
        assert_eq!(violation.severity, Severity::Critical);
    }

    #[test]
    fn empty_header_fails() {
        let validator = AuthenticationValidator::new();
        let ctx = ctx().with_header("Authorization", "   ");
        assert!(validator.validate(&ctx).unwrap().is_some());
    }

    #[test]
    fn unknown_scheme_fails() {
        let validator = AuthenticationValidator::new();
        let ctx = ctx().with_header("Authorization", "Basic dXNlcjpwYXNz");
        assert!(validator.validate(&ctx).unwrap().is_some());
    }

    #[test]
    fn recognized_schemes_pass() {
        let validator = AuthenticationValidator::new();
        for value in ["Bearer token-123", "ApiKey key-456"] {
            let ctx = ctx().with_header("Authorization", value);
            assert!(validator.validate(&ctx).unwrap().is_none(), "{value}");
        }
    }
}
