//! Certificate-transparency verification with a per-certificate cache.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;

use crate::config::schema::TransparencyConfig;
use crate::observability::metrics;
use crate::trust::identity::CertificateIdentity;

/// Cached CT verdict. Expiry is optional: without a configured max age
/// a verdict holds for the process lifetime.
#[derive(Debug, Clone, Copy)]
struct TransparencyCacheEntry {
    verified: bool,
    recorded_at: SystemTime,
}

/// Verifies certificate presence in append-only transparency logs.
pub struct TransparencyVerifier {
    config: TransparencyConfig,
    cache: DashMap<String, TransparencyCacheEntry>,
    client: reqwest::Client,
}

impl TransparencyVerifier {
    pub fn new(config: TransparencyConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    fn max_age(&self) -> Option<Duration> {
        self.config
            .cache_max_age_hours
            .map(|hours| Duration::from_secs(hours * 3600))
    }

    /// Verify the certificate against the configured CT log. Any error
    /// resolves to the availability policy, never propagates.
    pub async fn verify(&self, identity: &CertificateIdentity) -> bool {
        if !self.config.verify {
            return true;
        }

        if self.config.require_embedded_sct
            && identity.sct_count < self.config.min_sct_count
        {
            tracing::warn!(
                subject = %identity.subject,
                found = identity.sct_count,
                required = self.config.min_sct_count,
                "Certificate is missing required embedded SCTs"
            );
            return false;
        }

        if let Some(entry) = self.cache.get(&identity.thumbprint) {
            let fresh = match self.max_age() {
                None => true,
                Some(max_age) => {
                    SystemTime::now()
                        .duration_since(entry.recorded_at)
                        .unwrap_or_default()
                        < max_age
                }
            };
            if fresh {
                metrics::record_transparency_cache(true);
                return entry.verified;
            }
        }
        metrics::record_transparency_cache(false);

        let verified = match &self.config.log_api_url {
            None => {
                tracing::debug!(
                    subject = %identity.subject,
                    allow = self.config.allow_when_unavailable,
                    "No CT log endpoint configured, resolving to availability policy"
                );
                self.config.allow_when_unavailable
            }
            Some(url) => match self.query_log(url, identity).await {
                Ok(verified) => verified,
                Err(e) => {
                    tracing::warn!(
                        subject = %identity.subject,
                        log = %url,
                        error = %e,
                        allow = self.config.allow_when_unavailable,
                        "CT log query failed, resolving to availability policy"
                    );
                    self.config.allow_when_unavailable
                }
            },
        };

        self.cache.insert(
            identity.thumbprint.clone(),
            TransparencyCacheEntry {
                verified,
                recorded_at: SystemTime::now(),
            },
        );
        verified
    }

    /// Structural check for the embedded SCT extension; pure and
    /// uncached.
    pub fn has_embedded_sct(&self, identity: &CertificateIdentity) -> bool {
        identity.has_embedded_sct()
    }

    async fn query_log(
        &self,
        url: &str,
        identity: &CertificateIdentity,
    ) -> Result<bool, crate::trust::TrustError> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let send = self
            .client
            .get(url)
            .query(&[("hash", identity.thumbprint.as_str())])
            .timeout(timeout)
            .send();

        let response = tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| crate::trust::TrustError::CtLog("query timed out".into()))?
            .map_err(|e| crate::trust::TrustError::CtLog(e.to_string()))?;

        // A reachable log that answers success vouches for inclusion.
        Ok(response.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn identity(sct_count: u32) -> CertificateIdentity {
        CertificateIdentity {
            thumbprint: "thumb-ct".into(),
            public_key_hash: "spki-ct".into(),
            subject: "CN=leaf".into(),
            issuer: "CN=test-ca".into(),
            serial: vec![0x42],
            issuer_name_raw: vec![0x30, 0x00],
            spki_raw: vec![1, 2, 3, 4],
            ocsp_url: None,
            sct_count,
        }
    }

    fn config() -> TransparencyConfig {
        TransparencyConfig {
            verify: true,
            require_embedded_sct: false,
            min_sct_count: 1,
            log_api_url: None,
            allow_when_unavailable: false,
            cache_max_age_hours: None,
            timeout_secs: 2,
        }
    }

    async fn spawn_log(status: u16) -> (String, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let app = axum::Router::new().route(
            "/ct/v1/lookup",
            axum::routing::get(move || {
                let calls = calls_clone.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    axum::http::StatusCode::from_u16(status).unwrap()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/ct/v1/lookup", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (url, calls)
    }

    #[tokio::test]
    async fn disabled_verifier_always_trusts() {
        let mut config = config();
        config.verify = false;
        let verifier = TransparencyVerifier::new(config);
        assert!(verifier.verify(&identity(0)).await);
    }

    #[tokio::test]
    async fn unconfigured_log_resolves_to_policy() {
        let closed = TransparencyVerifier::new(config());
        assert!(!closed.verify(&identity(0)).await);

        let mut open_config = config();
        open_config.allow_when_unavailable = true;
        let open = TransparencyVerifier::new(open_config);
        assert!(open.verify(&identity(0)).await);
    }

    #[tokio::test]
    async fn log_answer_is_cached() {
        let (url, calls) = spawn_log(200).await;
        let mut config = config();
        config.log_api_url = Some(url);
        let verifier = TransparencyVerifier::new(config);

        assert!(verifier.verify(&identity(0)).await);
        assert!(verifier.verify(&identity(0)).await);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_required_sct_fails_closed() {
        let mut config = config();
        config.require_embedded_sct = true;
        config.min_sct_count = 2;
        config.allow_when_unavailable = true;
        let verifier = TransparencyVerifier::new(config);

        assert!(!verifier.verify(&identity(1)).await);
        assert!(verifier.verify(&identity(2)).await);
    }

    #[tokio::test]
    async fn log_rejection_is_not_inclusion() {
        let (url, _calls) = spawn_log(404).await;
        let mut config = config();
        config.log_api_url = Some(url);
        let verifier = TransparencyVerifier::new(config);

        assert!(!verifier.verify(&identity(0)).await);
    }

    #[test]
    fn embedded_sct_check_is_structural() {
        let verifier = TransparencyVerifier::new(config());
        assert!(verifier.has_embedded_sct(&identity(1)));
        assert!(!verifier.has_embedded_sct(&identity(0)));
    }
}
