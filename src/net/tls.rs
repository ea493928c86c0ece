//! TLS configuration assembly for the listener and outbound clients.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::runtime::Handle;

use crate::config::schema::TlsConfig;
use crate::net::verifier::{GatewayClientCertVerifier, PinnedServerCertVerifier};
use crate::trust::CertificateTrustPipeline;

#[derive(Debug, thiserror::Error)]
pub enum TlsSetupError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(String),

    #[error("no private key found in {0}")]
    NoPrivateKey(String),

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|source| TlsSetupError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificate(path.display().to_string()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsSetupError> {
    let file = File::open(path).map_err(|source| TlsSetupError::Io {
        path: path.display().to_string(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|source| TlsSetupError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsSetupError::NoPrivateKey(path.display().to_string()))
}

fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Build the listener TLS configuration. When client certificates are
/// required, every inbound handshake runs through the trust pipeline.
pub fn build_server_config(
    tls: &TlsConfig,
    pipeline: Arc<CertificateTrustPipeline>,
    runtime: Handle,
) -> Result<rustls::ServerConfig, TlsSetupError> {
    let certs = read_certs(Path::new(&tls.cert_path))?;
    let key = read_private_key(Path::new(&tls.key_path))?;

    let builder = rustls::ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?;

    let config = if tls.require_client_cert {
        builder
            .with_client_cert_verifier(Arc::new(GatewayClientCertVerifier::new(pipeline, runtime)))
            .with_single_cert(certs, key)?
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)?
    };

    Ok(config)
}

/// Listener configuration in the form axum-server consumes.
pub fn build_listener_config(
    tls: &TlsConfig,
    pipeline: Arc<CertificateTrustPipeline>,
    runtime: Handle,
) -> Result<RustlsConfig, TlsSetupError> {
    let config = build_server_config(tls, pipeline, runtime)?;
    Ok(RustlsConfig::from_config(Arc::new(config)))
}

/// Build an outbound TLS configuration that replaces webpki path
/// validation with the trust pipeline.
pub fn build_client_config(
    pipeline: Arc<CertificateTrustPipeline>,
    runtime: Handle,
) -> Result<rustls::ClientConfig, TlsSetupError> {
    let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedServerCertVerifier::new(
            pipeline, runtime,
        )))
        .with_no_client_auth();
    Ok(config)
}
