//! Role-based authorization for administrative paths.

use crate::pipeline::context::RequestContext;
use crate::pipeline::validators::{RequestValidator, ValidatorError};
use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};

/// Fails critically for unauthenticated callers, and for callers
/// without the administrative role on admin-prefixed paths.
pub struct AuthorizationValidator {
    admin_path_prefix: String,
    admin_role: String,
}

impl AuthorizationValidator {
    pub fn new(admin_path_prefix: impl Into<String>, admin_role: impl Into<String>) -> Self {
        Self {
            admin_path_prefix: admin_path_prefix.into(),
            admin_role: admin_role.into(),
        }
    }

    fn violation(&self, description: &str) -> SecurityViolation {
        SecurityViolation::new(
            ViolationKind::Authorization,
            Severity::Critical,
            self.name(),
            description,
        )
    }
}

impl RequestValidator for AuthorizationValidator {
    fn name(&self) -> &'static str {
        "AuthorizationValidator"
    }

    fn priority(&self) -> u32 {
        20
    }

    fn validate(&self, ctx: &RequestContext) -> Result<Option<SecurityViolation>, ValidatorError> {
        let identity = match &ctx.identity {
            Some(identity) => identity,
            None => return Ok(Some(self.violation("Caller is not authenticated"))),
        };

        if ctx.path.starts_with(&self.admin_path_prefix) && !identity.has_role(&self.admin_role) {
            return Ok(Some(
                self.violation("Administrative role required")
                    .with_detail("path", &ctx.path)
                    .with_detail("subject", &identity.subject),
            ));
        }

        Ok(None)
    }
}
