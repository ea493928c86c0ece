//! Configuration schema definitions.
//!
//! This module defines the complete configuration tree for the gateway.
//! Every trust section carries an explicit fail-open/fail-closed knob;
//! a missing section resolves to the documented default, never to a
//! silent bypass.

use serde::{Deserialize, Serialize};

use crate::pipeline::violation::Severity;

/// Root configuration for the validation gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TrustConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Certificate pinning policy.
    pub pinning: PinningConfig,

    /// OCSP revocation checking policy.
    pub revocation: RevocationConfig,

    /// Certificate-transparency verification policy.
    pub transparency: TransparencyConfig,

    /// Per-endpoint TLS connection limiting.
    pub connection_limit: ConnectionLimitConfig,

    /// Request validation pipeline policy.
    pub request_validation: RequestValidationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8443".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Require and validate client certificates (mTLS).
    #[serde(default)]
    pub require_client_cert: bool,
}

/// Certificate pinning configuration.
///
/// Pinning is opt-in and always fail-closed when enabled: a presented
/// certificate that matches no pin aborts the handshake regardless of
/// how the other trust checks are configured.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PinningConfig {
    /// Enable certificate pinning.
    pub enabled: bool,

    /// PEM files whose certificates are pinned permanently at startup.
    pub anchor_paths: Vec<String>,

    /// Directory for the persisted pin store (created if absent).
    pub storage_dir: String,

    /// Pin the first certificate seen from an unpinned endpoint.
    pub auto_pin_first: bool,
}

impl Default for PinningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            anchor_paths: Vec::new(),
            storage_dir: "trust-pins".to_string(),
            auto_pin_first: false,
        }
    }
}

/// OCSP revocation checking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Enable OCSP revocation checking.
    pub use_ocsp: bool,

    /// Prefer a stapled response over a direct responder query.
    pub prefer_stapling: bool,

    /// Maximum age of a cached revocation verdict, in hours.
    pub cache_max_age_hours: u64,

    /// Fail-open flag: treat an unreachable responder as "not revoked".
    pub allow_when_unavailable: bool,

    /// Responder query timeout in seconds.
    pub timeout_secs: u64,

    /// Responder URL used when the certificate carries no OCSP URL in
    /// its Authority-Information-Access extension (internal responders).
    pub responder_url_override: Option<String>,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            use_ocsp: true,
            prefer_stapling: true,
            cache_max_age_hours: 24,
            allow_when_unavailable: true,
            timeout_secs: 10,
            responder_url_override: None,
        }
    }
}

/// Certificate-transparency verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TransparencyConfig {
    /// Enable CT verification.
    pub verify: bool,

    /// Require an embedded SCT extension on the certificate.
    pub require_embedded_sct: bool,

    /// Minimum number of SCTs expected.
    pub min_sct_count: u32,

    /// CT log query endpoint. Unset means the query is skipped and the
    /// `allow_when_unavailable` policy decides.
    pub log_api_url: Option<String>,

    /// Fail-open flag for an unreachable or unconfigured log.
    pub allow_when_unavailable: bool,

    /// Optional expiry for cached CT verdicts, in hours. Unset caches
    /// for the process lifetime.
    pub cache_max_age_hours: Option<u64>,

    /// Log query timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TransparencyConfig {
    fn default() -> Self {
        Self {
            verify: true,
            require_embedded_sct: false,
            min_sct_count: 1,
            log_api_url: None,
            allow_when_unavailable: false,
            cache_max_age_hours: None,
            timeout_secs: 10,
        }
    }
}

/// Per-endpoint connection limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionLimitConfig {
    /// Maximum concurrent connections per remote endpoint. Zero or
    /// negative disables enforcement.
    pub max_connections_per_endpoint: i64,

    /// Sweep interval for stale endpoint entries, in seconds.
    pub sweep_interval_secs: u64,

    /// Idle age after which a zero-count endpoint entry is removed,
    /// in seconds.
    pub stale_after_secs: u64,
}

impl Default for ConnectionLimitConfig {
    fn default() -> Self {
        Self {
            max_connections_per_endpoint: 0,
            sweep_interval_secs: 300,
            stale_after_secs: 1800,
        }
    }
}

/// Request validation pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestValidationConfig {
    /// Enable the request validation pipeline.
    pub enabled: bool,

    /// Path prefix requiring the administrative role.
    pub admin_path_prefix: String,

    /// Role granting access to administrative paths.
    pub admin_role: String,

    /// Minimum interval between requests from one client, in
    /// milliseconds.
    pub min_request_interval_ms: u64,

    /// Lowest violation severity that blocks a request. Critical
    /// violations always block.
    pub block_severity: Severity,
}

impl Default for RequestValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_path_prefix: "/admin".to_string(),
            admin_role: "admin".to_string(),
            min_request_interval_ms: 1000,
            block_severity: Severity::Medium,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
