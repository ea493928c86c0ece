//! Certificate identity extraction.
//!
//! Parses a DER certificate once and captures the owned fields every
//! trust check keys on: SHA-256 thumbprint, SPKI hash, subject/issuer
//! names, OCSP responder URL and embedded SCT count.

use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::trust::TrustError;

/// OCSP access method inside Authority-Information-Access.
const OID_AD_OCSP: &str = "1.3.6.1.5.5.7.48.1";

/// Embedded signed-certificate-timestamp list extension.
const OID_SCT_LIST: &str = "1.3.6.1.4.1.11129.2.4.2";

/// Owned summary of one presented certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateIdentity {
    /// Hex SHA-256 over the full DER encoding. Primary lookup key.
    pub thumbprint: String,
    /// Hex SHA-256 over the SubjectPublicKeyInfo. Secondary pin match.
    pub public_key_hash: String,
    pub subject: String,
    pub issuer: String,
    pub serial: Vec<u8>,
    /// Raw DER of the issuer name, for OCSP CertID hashing.
    pub issuer_name_raw: Vec<u8>,
    /// Raw DER of the SubjectPublicKeyInfo.
    pub spki_raw: Vec<u8>,
    /// OCSP responder URL from Authority-Information-Access, if any.
    pub ocsp_url: Option<String>,
    /// Number of embedded SCTs (0 when the extension is absent).
    pub sct_count: u32,
}

impl CertificateIdentity {
    /// Parse a DER certificate into its identity summary.
    pub fn from_der(der: &[u8]) -> Result<Self, TrustError> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| TrustError::MalformedCertificate(e.to_string()))?;

        let thumbprint = hex::encode(Sha256::digest(der));
        let spki_raw = cert.public_key().raw.to_vec();
        let public_key_hash = hex::encode(Sha256::digest(&spki_raw));

        Ok(Self {
            thumbprint,
            public_key_hash,
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            serial: cert.raw_serial().to_vec(),
            issuer_name_raw: cert.issuer().as_raw().to_vec(),
            spki_raw,
            ocsp_url: extract_ocsp_url(&cert),
            sct_count: count_embedded_scts(&cert),
        })
    }

    /// Structural check: the certificate carries an embedded SCT list.
    pub fn has_embedded_sct(&self) -> bool {
        self.sct_count > 0
    }
}

fn extract_ocsp_url(cert: &X509Certificate<'_>) -> Option<String> {
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() == OID_AD_OCSP {
                    if let GeneralName::URI(uri) = &desc.access_location {
                        return Some((*uri).to_string());
                    }
                }
            }
        }
    }
    None
}

/// Count entries of the TLS-serialized SignedCertificateTimestampList.
///
/// The extension value is a DER OCTET STRING wrapping a 2-byte
/// length-prefixed list of 2-byte length-prefixed SCT structures.
fn count_embedded_scts(cert: &X509Certificate<'_>) -> u32 {
    let ext = match cert
        .extensions()
        .iter()
        .find(|e| e.oid.to_id_string() == OID_SCT_LIST)
    {
        Some(ext) => ext,
        None => return 0,
    };

    // Strip the inner OCTET STRING header (tag 0x04, short or long form).
    let value = ext.value;
    if value.len() < 2 || value[0] != 0x04 {
        return 0;
    }
    let (header_len, content_len) = if value[1] & 0x80 == 0 {
        (2usize, value[1] as usize)
    } else {
        let n = (value[1] & 0x7f) as usize;
        if n == 0 || n > 4 || value.len() < 2 + n {
            return 0;
        }
        let mut len = 0usize;
        for b in &value[2..2 + n] {
            len = (len << 8) | *b as usize;
        }
        (2 + n, len)
    };
    let list = match value.get(header_len..header_len + content_len) {
        Some(list) => list,
        None => return 0,
    };

    if list.len() < 2 {
        return 0;
    }
    let total = u16::from_be_bytes([list[0], list[1]]) as usize;
    let mut rest = match list.get(2..2 + total) {
        Some(rest) => rest,
        None => return 0,
    };

    let mut count = 0u32;
    while rest.len() >= 2 {
        let entry_len = u16::from_be_bytes([rest[0], rest[1]]) as usize;
        match rest.get(2 + entry_len..) {
            Some(next) => {
                count += 1;
                rest = next;
            }
            None => return 0,
        }
    }
    count
}
