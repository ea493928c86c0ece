//! End-to-end scenarios for the certificate trust pipeline with real
//! throwaway certificates.

mod common;

use std::sync::Arc;

use trustgate::trust::identity::CertificateIdentity;
use trustgate::trust::ocsp::{self, CertStatus};
use trustgate::trust::{CertificateTrustPipeline, HandshakeSide};

use common::{quiet_trust_config, self_signed_cert, self_signed_cert_pem};

async fn validate(
    pipeline: &CertificateTrustPipeline,
    endpoint: &str,
    der: &[u8],
) -> trustgate::trust::TrustDecision {
    pipeline
        .validate_peer(HandshakeSide::Server, endpoint, der, &[], None)
        .await
}

#[tokio::test]
async fn garbage_bytes_are_rejected_outright() {
    let pipeline = CertificateTrustPipeline::new(quiet_trust_config()).unwrap();
    let decision = validate(&pipeline, "api.test:443", b"not a certificate").await;
    assert!(!decision.accepted);
    assert!(decision.reason().unwrap().contains("could not be parsed"));
}

#[tokio::test]
async fn quiet_config_accepts_any_real_certificate() {
    let pipeline = CertificateTrustPipeline::new(quiet_trust_config()).unwrap();
    let der = self_signed_cert("api");
    assert!(validate(&pipeline, "api.test:443", &der).await.accepted);
}

#[tokio::test]
async fn first_use_pins_and_later_imposters_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet_trust_config();
    config.pinning.enabled = true;
    config.pinning.auto_pin_first = true;
    config.pinning.storage_dir = dir.path().display().to_string();

    let pipeline = CertificateTrustPipeline::new(config).unwrap();
    let genuine = self_signed_cert("api");
    let imposter = self_signed_cert("api");

    // Trust-on-first-use: the first certificate becomes the pin set.
    assert!(validate(&pipeline, "api.test:443", &genuine).await.accepted);
    assert_eq!(pipeline.pin_store().count(), 1);

    // Same certificate again: still trusted, still one pin.
    assert!(validate(&pipeline, "api.test:443", &genuine).await.accepted);
    assert_eq!(pipeline.pin_store().count(), 1);

    // A different key for the same name is an imposter.
    let decision = validate(&pipeline, "api.test:443", &imposter).await;
    assert!(!decision.accepted);
    assert!(decision.reason().unwrap().contains("pinned"));
}

#[tokio::test]
async fn permanent_pins_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = quiet_trust_config();
    config.pinning.enabled = true;
    config.pinning.auto_pin_first = false;
    config.pinning.storage_dir = dir.path().display().to_string();

    let der = self_signed_cert("api");
    let identity = CertificateIdentity::from_der(&der).unwrap();

    let first = CertificateTrustPipeline::new(config.clone()).unwrap();
    assert!(!validate(&first, "api.test:443", &der).await.accepted);
    first.pin_store().add_pin(&identity, true).unwrap();
    assert!(validate(&first, "api.test:443", &der).await.accepted);

    // A fresh pipeline over the same storage directory sees the pin.
    let second = CertificateTrustPipeline::new(config).unwrap();
    assert!(validate(&second, "api.test:443", &der).await.accepted);
    let pins = second.pin_store().pins();
    assert_eq!(pins.len(), 1);
    assert_eq!(pins[0].thumbprint, identity.thumbprint);
    assert!(pins[0].permanent);
}

#[tokio::test]
async fn anchor_files_are_always_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let anchor_path = dir.path().join("anchor.pem");
    let pem = self_signed_cert_pem("anchor");
    std::fs::write(&anchor_path, &pem).unwrap();

    let mut config = quiet_trust_config();
    config.pinning.enabled = true;
    config.pinning.auto_pin_first = false;
    config.pinning.storage_dir = dir.path().join("pins").display().to_string();
    config.pinning.anchor_paths = vec![anchor_path.display().to_string()];

    let pipeline = CertificateTrustPipeline::new(config).unwrap();

    let anchor_der = rustls_pemfile::certs(&mut pem.as_bytes())
        .next()
        .unwrap()
        .unwrap();
    assert!(validate(&pipeline, "api.test:443", anchor_der.as_ref()).await.accepted);

    // Anything outside the anchor set is rejected.
    let other = self_signed_cert("other");
    assert!(!validate(&pipeline, "api.test:443", &other).await.accepted);
}

#[tokio::test(flavor = "multi_thread")]
async fn revocation_unavailability_follows_policy() {
    let der = self_signed_cert("api");

    // No responder anywhere, fail-closed: rejected.
    let mut closed = quiet_trust_config();
    closed.revocation.use_ocsp = true;
    closed.revocation.allow_when_unavailable = false;
    let pipeline = CertificateTrustPipeline::new(closed).unwrap();
    let decision = validate(&pipeline, "api.test:443", &der).await;
    assert!(!decision.accepted);
    assert!(decision.reason().unwrap().contains("revocation"));

    // Same situation, fail-open: accepted.
    let mut open = quiet_trust_config();
    open.revocation.use_ocsp = true;
    open.revocation.allow_when_unavailable = true;
    let pipeline = CertificateTrustPipeline::new(open).unwrap();
    assert!(validate(&pipeline, "api.test:443", &der).await.accepted);
}

#[tokio::test]
async fn revoked_answer_from_responder_rejects_the_handshake() {
    let der = self_signed_cert("api");
    let identity = CertificateIdentity::from_der(&der).unwrap();

    let serial = identity.serial.clone();
    let app = axum::Router::new().route(
        "/",
        axum::routing::post(move || {
            let body = ocsp::encode_response(CertStatus::Revoked, &serial);
            async move { body }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = quiet_trust_config();
    config.revocation.use_ocsp = true;
    config.revocation.allow_when_unavailable = true;
    config.revocation.responder_url_override = Some(url);

    let pipeline = CertificateTrustPipeline::new(config).unwrap();
    let decision = validate(&pipeline, "api.test:443", &der).await;
    assert!(!decision.accepted);
}

#[tokio::test]
async fn stapled_good_response_short_circuits_revocation() {
    let der = self_signed_cert("api");
    let identity = CertificateIdentity::from_der(&der).unwrap();
    let staple = ocsp::encode_response(CertStatus::Good, &identity.serial);

    // Fail-closed with no responder: only the staple can save this.
    let mut config = quiet_trust_config();
    config.revocation.use_ocsp = true;
    config.revocation.allow_when_unavailable = false;

    let pipeline = CertificateTrustPipeline::new(config).unwrap();
    let decision = pipeline
        .validate_peer(HandshakeSide::Server, "api.test:443", &der, &[], Some(&staple))
        .await;
    assert!(decision.accepted);
}

#[tokio::test]
async fn missing_required_sct_rejects_the_certificate() {
    let mut config = quiet_trust_config();
    config.transparency.verify = true;
    config.transparency.require_embedded_sct = true;
    config.transparency.allow_when_unavailable = true;

    let pipeline = CertificateTrustPipeline::new(config).unwrap();
    let der = self_signed_cert("api");

    // rcgen certificates carry no SCT extension.
    let decision = validate(&pipeline, "api.test:443", &der).await;
    assert!(!decision.accepted);
    assert!(decision.reason().unwrap().contains("transparency"));
}

#[tokio::test]
async fn endpoint_connection_limit_gates_new_handshakes() {
    let mut config = quiet_trust_config();
    config.connection_limit.max_connections_per_endpoint = 1;

    let pipeline = Arc::new(CertificateTrustPipeline::new(config).unwrap());
    let der = self_signed_cert("api");

    let _guard = pipeline.connection_limiter().track("api.test:443");
    let decision = validate(&pipeline, "api.test:443", &der).await;
    assert!(!decision.accepted);
    assert!(decision.reason().unwrap().contains("limit"));

    // Another endpoint is unaffected.
    assert!(validate(&pipeline, "other.test:443", &der).await.accepted);
}
