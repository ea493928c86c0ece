//! rustls verifier adapters for the certificate trust pipeline.
//!
//! rustls invokes certificate verification synchronously inside the
//! handshake, while the trust pipeline awaits its network checks. The
//! adapters bridge the two by blocking the handshake task on the
//! pipeline future; the handshake therefore suspends until every check
//! resolves, exactly as the trust model requires.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, Error as TlsError, SignatureScheme};
use tokio::runtime::Handle;

use crate::trust::{CertificateTrustPipeline, HandshakeSide};

/// Endpoint label for inbound client certificates, where no remote
/// name is available at verification time.
const INBOUND_ENDPOINT: &str = "inbound-client";

fn block_on<F: Future>(handle: &Handle, future: F) -> F::Output {
    // Requires the multi-threaded runtime; the handshake task yields
    // its worker while the checks run.
    tokio::task::block_in_place(|| handle.block_on(future))
}

fn endpoint_name(server_name: &ServerName<'_>) -> String {
    match server_name {
        ServerName::DnsName(name) => name.as_ref().to_string(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => "unknown".to_string(),
    }
}

fn owned_chain(intermediates: &[CertificateDer<'_>]) -> Vec<Vec<u8>> {
    intermediates.iter().map(|c| c.as_ref().to_vec()).collect()
}

fn rejection(reason: Option<&str>) -> TlsError {
    TlsError::General(reason.unwrap_or("certificate rejected by trust pipeline").to_string())
}

/// Validates server certificates on outbound connections.
pub struct PinnedServerCertVerifier {
    pipeline: Arc<CertificateTrustPipeline>,
    runtime: Handle,
    crypto: Arc<CryptoProvider>,
}

impl PinnedServerCertVerifier {
    pub fn new(pipeline: Arc<CertificateTrustPipeline>, runtime: Handle) -> Self {
        Self {
            pipeline,
            runtime,
            crypto: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }
}

impl fmt::Debug for PinnedServerCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinnedServerCertVerifier")
    }
}

impl ServerCertVerifier for PinnedServerCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let endpoint = endpoint_name(server_name);
        let chain = owned_chain(intermediates);
        let stapled = (!ocsp_response.is_empty()).then_some(ocsp_response);

        let decision = block_on(
            &self.runtime,
            self.pipeline.validate_peer(
                HandshakeSide::Server,
                &endpoint,
                end_entity.as_ref(),
                &chain,
                stapled,
            ),
        );

        if decision.accepted {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rejection(decision.reason()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(message, cert, dss, &self.crypto.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.crypto.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.crypto.signature_verification_algorithms.supported_schemes()
    }
}

/// Validates client certificates on inbound mTLS connections.
pub struct GatewayClientCertVerifier {
    pipeline: Arc<CertificateTrustPipeline>,
    runtime: Handle,
    crypto: Arc<CryptoProvider>,
    root_hints: Vec<DistinguishedName>,
}

impl GatewayClientCertVerifier {
    pub fn new(pipeline: Arc<CertificateTrustPipeline>, runtime: Handle) -> Self {
        Self {
            pipeline,
            runtime,
            crypto: Arc::new(rustls::crypto::ring::default_provider()),
            root_hints: Vec::new(),
        }
    }
}

impl fmt::Debug for GatewayClientCertVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GatewayClientCertVerifier")
    }
}

impl ClientCertVerifier for GatewayClientCertVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &self.root_hints
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, TlsError> {
        let chain = owned_chain(intermediates);

        let decision = block_on(
            &self.runtime,
            self.pipeline.validate_peer(
                HandshakeSide::Client,
                INBOUND_ENDPOINT,
                end_entity.as_ref(),
                &chain,
                None,
            ),
        );

        if decision.accepted {
            Ok(ClientCertVerified::assertion())
        } else {
            Err(rejection(decision.reason()))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls12_signature(message, cert, dss, &self.crypto.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        verify_tls13_signature(message, cert, dss, &self.crypto.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.crypto.signature_verification_algorithms.supported_schemes()
    }
}
