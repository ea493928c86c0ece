//! Configuration validation.
//!
//! Semantic validation over a parsed [`TrustConfig`]. Serde handles the
//! syntactic layer; this pass checks value ranges and referential
//! requirements and returns every error found, not just the first.

use crate::config::schema::TrustConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: &str) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &TrustConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(err("listener.bind_address", "not a valid socket address"));
    }

    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.is_empty() {
            errors.push(err("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.is_empty() {
            errors.push(err("listener.tls.key_path", "must not be empty"));
        }
    }

    if config.pinning.enabled && config.pinning.storage_dir.is_empty() {
        errors.push(err("pinning.storage_dir", "required when pinning is enabled"));
    }

    if config.revocation.use_ocsp {
        if config.revocation.cache_max_age_hours == 0 {
            errors.push(err("revocation.cache_max_age_hours", "must be at least 1"));
        }
        if config.revocation.timeout_secs == 0 {
            errors.push(err("revocation.timeout_secs", "must be at least 1"));
        }
        if let Some(url) = &config.revocation.responder_url_override {
            if url::Url::parse(url).is_err() {
                errors.push(err("revocation.responder_url_override", "not a valid URL"));
            }
        }
    }

    if config.transparency.verify {
        if config.transparency.timeout_secs == 0 {
            errors.push(err("transparency.timeout_secs", "must be at least 1"));
        }
        if let Some(url) = &config.transparency.log_api_url {
            if url::Url::parse(url).is_err() {
                errors.push(err("transparency.log_api_url", "not a valid URL"));
            }
        }
        if config.transparency.require_embedded_sct && config.transparency.min_sct_count == 0 {
            errors.push(err(
                "transparency.min_sct_count",
                "must be at least 1 when an embedded SCT is required",
            ));
        }
    }

    if config.connection_limit.sweep_interval_secs == 0 {
        errors.push(err("connection_limit.sweep_interval_secs", "must be at least 1"));
    }

    if config.request_validation.enabled {
        if config.request_validation.admin_path_prefix.is_empty() {
            errors.push(err("request_validation.admin_path_prefix", "must not be empty"));
        }
        if config.request_validation.admin_role.is_empty() {
            errors.push(err("request_validation.admin_role", "must not be empty"));
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<std::net::SocketAddr>().is_err()
    {
        errors.push(err("observability.metrics_address", "not a valid socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
