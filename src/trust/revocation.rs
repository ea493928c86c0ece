//! OCSP revocation checking with a per-certificate verdict cache.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use crate::config::schema::RevocationConfig;
use crate::observability::metrics;
use crate::trust::identity::CertificateIdentity;
use crate::trust::ocsp::{self, CertStatus};

/// Cached revocation verdict. An entry older than the configured max
/// age is treated as absent and replaced on the next lookup; there is
/// no proactive sweep.
#[derive(Debug, Clone, Copy)]
struct RevocationCacheEntry {
    valid: bool,
    recorded_at: SystemTime,
}

/// Validates non-revocation of certificates via OCSP.
///
/// Resolution order: cache → stapled response (when preferred and
/// present) → direct responder query → availability policy. No failure
/// in here ever propagates to the handshake; everything collapses into
/// a boolean verdict.
pub struct RevocationChecker {
    config: RevocationConfig,
    cache: DashMap<String, RevocationCacheEntry>,
    client: reqwest::Client,
}

impl RevocationChecker {
    pub fn new(config: RevocationConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    fn max_age(&self) -> Duration {
        Duration::from_secs(self.config.cache_max_age_hours * 3600)
    }

    /// Check that the certificate is not revoked. `issuer_spki` is the
    /// issuing certificate's SubjectPublicKeyInfo when the chain
    /// provides one. Returns true when the certificate may be trusted.
    pub async fn check(
        &self,
        identity: &CertificateIdentity,
        issuer_spki: &[u8],
        stapled: Option<&[u8]>,
    ) -> bool {
        if !self.config.use_ocsp {
            return true;
        }

        if let Some(entry) = self.cache.get(&identity.thumbprint) {
            let age = SystemTime::now()
                .duration_since(entry.recorded_at)
                .unwrap_or_default();
            if age < self.max_age() {
                metrics::record_revocation_cache(true);
                return entry.valid;
            }
        }
        metrics::record_revocation_cache(false);

        let valid = self.resolve_uncached(identity, issuer_spki, stapled).await;
        self.cache.insert(
            identity.thumbprint.clone(),
            RevocationCacheEntry {
                valid,
                recorded_at: SystemTime::now(),
            },
        );
        valid
    }

    /// Drop any cached verdict for a certificate.
    pub fn invalidate(&self, thumbprint: &str) {
        self.cache.remove(thumbprint);
    }

    async fn resolve_uncached(
        &self,
        identity: &CertificateIdentity,
        issuer_spki: &[u8],
        stapled: Option<&[u8]>,
    ) -> bool {
        if self.config.prefer_stapling {
            if let Some(stapled) = stapled {
                match ocsp::parse_response(stapled, &identity.serial) {
                    Ok(CertStatus::Good) => return true,
                    Ok(CertStatus::Revoked) => {
                        tracing::warn!(
                            subject = %identity.subject,
                            "Stapled OCSP response reports certificate revoked"
                        );
                        return false;
                    }
                    Ok(CertStatus::Unknown) | Err(_) => {
                        // Downgrade, not a failure: fall back to a
                        // direct responder query.
                        tracing::debug!(
                            subject = %identity.subject,
                            "Stapled OCSP response unusable, querying responder directly"
                        );
                    }
                }
            }
        }

        let url = identity
            .ocsp_url
            .clone()
            .or_else(|| self.config.responder_url_override.clone());
        let url = match url {
            Some(url) => url,
            None => {
                tracing::debug!(
                    subject = %identity.subject,
                    allow = self.config.allow_when_unavailable,
                    "No OCSP responder URL, resolving to availability policy"
                );
                return self.config.allow_when_unavailable;
            }
        };

        match self.query_responder(&url, identity, issuer_spki).await {
            Ok(CertStatus::Good) => true,
            Ok(status) => {
                // Only "good" counts as non-revoked.
                tracing::warn!(
                    subject = %identity.subject,
                    status = ?status,
                    "OCSP responder did not report good status"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    subject = %identity.subject,
                    responder = %url,
                    error = %e,
                    allow = self.config.allow_when_unavailable,
                    "OCSP query failed, resolving to availability policy"
                );
                self.config.allow_when_unavailable
            }
        }
    }

    async fn query_responder(
        &self,
        url: &str,
        identity: &CertificateIdentity,
        issuer_spki: &[u8],
    ) -> Result<CertStatus, crate::trust::TrustError> {
        let request = ocsp::build_request(identity, issuer_spki);
        let timeout = Duration::from_secs(self.config.timeout_secs);

        let send = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/ocsp-request")
            .body(request)
            .timeout(timeout)
            .send();

        // The outer timeout also covers connection establishment, so a
        // hung responder resolves like an unreachable one.
        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| crate::trust::TrustError::OcspResponder("query timed out".into()))?
            .map_err(|e| crate::trust::TrustError::OcspResponder(e.to_string()))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| crate::trust::TrustError::OcspResponder(e.to_string()))?;

        ocsp::parse_response(&body, &identity.serial)
    }

    #[cfg(test)]
    fn backdate(&self, thumbprint: &str, age: Duration) {
        if let Some(mut entry) = self.cache.get_mut(thumbprint) {
            entry.recorded_at = SystemTime::now() - age;
        }
    }
}
