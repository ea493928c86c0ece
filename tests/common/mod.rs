//! Shared helpers for integration tests.

#![allow(dead_code)]

use rcgen::{CertificateParams, DnType, KeyPair};

use trustgate::config::schema::{
    ConnectionLimitConfig, PinningConfig, RevocationConfig, TransparencyConfig, TrustConfig,
};

/// Mint a throwaway self-signed certificate and return its DER bytes.
pub fn self_signed_cert(common_name: &str) -> Vec<u8> {
    let mut params = CertificateParams::new(vec![format!("{common_name}.test")]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().der().to_vec()
}

/// Same certificate in PEM form, for anchor files.
pub fn self_signed_cert_pem(common_name: &str) -> String {
    let mut params = CertificateParams::new(vec![format!("{common_name}.test")]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    let key = KeyPair::generate().unwrap();
    params.self_signed(&key).unwrap().pem()
}

/// A trust configuration with every network-touching check disabled.
/// Tests enable exactly the piece under scrutiny.
pub fn quiet_trust_config() -> TrustConfig {
    TrustConfig {
        pinning: PinningConfig {
            enabled: false,
            anchor_paths: Vec::new(),
            storage_dir: "trust-pins".into(),
            auto_pin_first: false,
        },
        revocation: RevocationConfig {
            use_ocsp: false,
            prefer_stapling: true,
            cache_max_age_hours: 24,
            allow_when_unavailable: true,
            timeout_secs: 2,
            responder_url_override: None,
        },
        transparency: TransparencyConfig {
            verify: false,
            require_embedded_sct: false,
            min_sct_count: 1,
            log_api_url: None,
            allow_when_unavailable: false,
            cache_max_age_hours: None,
            timeout_secs: 2,
        },
        connection_limit: ConnectionLimitConfig {
            max_connections_per_endpoint: 0,
            sweep_interval_secs: 300,
            stale_after_secs: 1800,
        },
        ..TrustConfig::default()
    }
}
