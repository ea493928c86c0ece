//! Certificate trust pipeline.
//!
//! # Data Flow
//! ```text
//! TLS handshake callback (server or client side):
//!     → identity.rs (parse DER once, compute thumbprint/SPKI hash)
//!     → pins.rs (pinning: opt-in, always fail-closed)
//!     → revocation.rs (OCSP: staple preferred, direct fallback, cache)
//!     → transparency.rs (CT log, cache)
//!     → conn_limit.rs (per-endpoint concurrency gate)
//!     → accept / reject
//! ```
//!
//! # Design Decisions
//! - Every sub-check collapses its failures into a policy verdict; no
//!   error ever crosses the handshake boundary as a panic or Err
//! - Pinning is stricter than the rest: enabled means fail-closed
//! - Caches are best-effort, last-writer-wins per key

pub mod conn_limit;
pub mod identity;
pub mod ocsp;
pub mod pins;
pub mod revocation;
pub mod transparency;

use std::sync::Arc;

use crate::config::schema::TrustConfig;
use crate::observability::metrics;
use crate::pipeline::violation::{SecurityViolation, Severity, ViolationKind};
use crate::trust::conn_limit::ConnectionRateLimiter;
use crate::trust::identity::CertificateIdentity;
use crate::trust::pins::CertificatePinStore;
use crate::trust::revocation::RevocationChecker;
use crate::trust::transparency::TransparencyVerifier;

/// Error type for the trust subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("malformed OCSP message: {0}")]
    MalformedOcsp(String),

    #[error("OCSP responder error: {0}")]
    OcspResponder(String),

    #[error("CT log error: {0}")]
    CtLog(String),

    #[error("pin store error: {0}")]
    PinStore(String),
}

/// Side of the TLS negotiation being validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeSide {
    /// We are the client validating a server certificate.
    Server,
    /// We are the server validating a client certificate.
    Client,
}

impl HandshakeSide {
    fn label(&self) -> &'static str {
        match self {
            HandshakeSide::Server => "server",
            HandshakeSide::Client => "client",
        }
    }
}

/// Outcome of validating one presented certificate.
#[derive(Debug)]
pub struct TrustDecision {
    pub accepted: bool,
    /// The violation that caused a rejection.
    pub violation: Option<SecurityViolation>,
}

impl TrustDecision {
    fn accept() -> Self {
        Self {
            accepted: true,
            violation: None,
        }
    }

    fn reject(violation: SecurityViolation) -> Self {
        Self {
            accepted: false,
            violation: Some(violation),
        }
    }

    /// Description of the rejection, for handshake error reporting.
    pub fn reason(&self) -> Option<&str> {
        self.violation.as_ref().map(|v| v.description.as_str())
    }
}

/// Orchestrates pinning, revocation, transparency and connection
/// limiting during TLS handshake validation.
pub struct CertificateTrustPipeline {
    config: TrustConfig,
    pins: Arc<CertificatePinStore>,
    revocation: RevocationChecker,
    transparency: TransparencyVerifier,
    conn_limiter: Arc<ConnectionRateLimiter>,
}

impl CertificateTrustPipeline {
    /// Build the pipeline from configuration, loading pinned anchors
    /// and persisted pins when pinning is enabled.
    pub fn new(config: TrustConfig) -> Result<Self, TrustError> {
        let pins = Arc::new(CertificatePinStore::new(&config.pinning));
        if config.pinning.enabled {
            pins.load()?;
        }

        Ok(Self {
            pins,
            revocation: RevocationChecker::new(config.revocation.clone()),
            transparency: TransparencyVerifier::new(config.transparency.clone()),
            conn_limiter: Arc::new(ConnectionRateLimiter::new(&config.connection_limit)),
            config,
        })
    }

    pub fn pin_store(&self) -> &Arc<CertificatePinStore> {
        &self.pins
    }

    pub fn connection_limiter(&self) -> &Arc<ConnectionRateLimiter> {
        &self.conn_limiter
    }

    /// Configured per-endpoint connection limit.
    pub fn endpoint_connection_limit(&self) -> i64 {
        self.config.connection_limit.max_connections_per_endpoint
    }

    pub fn revocation_checker(&self) -> &RevocationChecker {
        &self.revocation
    }

    pub fn transparency_verifier(&self) -> &TransparencyVerifier {
        &self.transparency
    }

    /// Validate a certificate presented during a handshake.
    ///
    /// `chain` holds the intermediates as presented (issuer first);
    /// `stapled` is the stapled OCSP response on the server-validation
    /// path. The call suspends until every check resolves; it never
    /// accepts early while a check is still outstanding.
    pub async fn validate_peer(
        &self,
        side: HandshakeSide,
        endpoint: &str,
        cert_der: &[u8],
        chain: &[Vec<u8>],
        stapled: Option<&[u8]>,
    ) -> TrustDecision {
        let decision = self
            .validate_peer_inner(side, endpoint, cert_der, chain, stapled)
            .await;
        metrics::record_handshake(side.label(), decision.accepted);
        if let Some(reason) = decision.reason() {
            tracing::warn!(
                side = side.label(),
                endpoint,
                reason,
                "Handshake rejected"
            );
        }
        decision
    }

    async fn validate_peer_inner(
        &self,
        side: HandshakeSide,
        endpoint: &str,
        cert_der: &[u8],
        chain: &[Vec<u8>],
        stapled: Option<&[u8]>,
    ) -> TrustDecision {
        let identity = match CertificateIdentity::from_der(cert_der) {
            Ok(identity) => identity,
            Err(e) => {
                return TrustDecision::reject(certificate_violation(
                    "Presented certificate could not be parsed",
                    endpoint,
                    &e.to_string(),
                ));
            }
        };

        if self.pins.is_enabled() && !self.pins.validate(&identity) {
            if self.config.pinning.auto_pin_first && self.pins.count() == 0 {
                // Trust-on-first-use bootstrap: the very first endpoint
                // certificate becomes the pin set.
                if let Err(e) = self.pins.add_pin(&identity, true) {
                    tracing::error!(error = %e, "Failed to auto-pin first certificate");
                }
            } else {
                return TrustDecision::reject(
                    certificate_violation(
                        "Certificate does not match any pinned identity",
                        endpoint,
                        &identity.thumbprint,
                    )
                    .with_detail("subject", &identity.subject),
                );
            }
        }

        // Issuer key hash for the OCSP CertID comes from the first
        // chain certificate when one is presented.
        let issuer_spki = chain
            .first()
            .and_then(|der| CertificateIdentity::from_der(der).ok())
            .map(|issuer| issuer.spki_raw)
            .unwrap_or_else(|| identity.spki_raw.clone());

        let stapled = match side {
            HandshakeSide::Server => stapled,
            // Client certificates carry no staple.
            HandshakeSide::Client => None,
        };
        if !self.revocation.check(&identity, &issuer_spki, stapled).await {
            return TrustDecision::reject(
                certificate_violation(
                    "Certificate failed revocation check",
                    endpoint,
                    &identity.thumbprint,
                )
                .with_detail("subject", &identity.subject),
            );
        }

        if !self.transparency.verify(&identity).await {
            return TrustDecision::reject(
                certificate_violation(
                    "Certificate failed transparency verification",
                    endpoint,
                    &identity.thumbprint,
                )
                .with_detail("subject", &identity.subject),
            );
        }

        let limit = self.config.connection_limit.max_connections_per_endpoint;
        if !self.conn_limiter.check(endpoint, limit) {
            return TrustDecision::reject(
                certificate_violation(
                    "Connection limit exceeded for endpoint",
                    endpoint,
                    &identity.thumbprint,
                )
                .with_detail("limit", limit.to_string()),
            );
        }

        TrustDecision::accept()
    }
}

fn certificate_violation(description: &str, endpoint: &str, detail: &str) -> SecurityViolation {
    SecurityViolation::new(
        ViolationKind::Certificate,
        Severity::Critical,
        "CertificateTrustPipeline",
        description,
    )
    .with_detail("endpoint", endpoint)
    .with_detail("detail", detail)
}
