//! Minimal OCSP wire codec.
//!
//! This is deliberately not a general RFC 6960 implementation: it emits
//! a SHA-256 CertID request and reads the certificate status out of a
//! responder's answer, which is all the revocation checker consumes.
//! Responses it cannot parse are treated as responder unavailability by
//! the caller, never as a verdict.

use sha2::{Digest, Sha256};

use crate::trust::identity::CertificateIdentity;
use crate::trust::TrustError;

/// SHA-256 algorithm identifier: SEQUENCE { 2.16.840.1.101.3.4.2.1, NULL }.
const SHA256_ALG_ID: [u8; 15] = [
    0x30, 0x0d, 0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01, 0x05, 0x00,
];

/// OID 1.3.6.1.5.5.7.48.1.1 (id-pkix-ocsp-basic), pre-encoded.
const OID_OCSP_BASIC: [u8; 11] = [
    0x06, 0x09, 0x2b, 0x06, 0x01, 0x05, 0x05, 0x07, 0x30, 0x01, 0x01,
];

/// Certificate status carried in a single OCSP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked,
    Unknown,
}

// --- DER encoding ---------------------------------------------------------

fn encode_len(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else {
        let bytes = len.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(7);
        let mut out = vec![0x80 | (8 - first) as u8];
        out.extend_from_slice(&bytes[first..]);
        out
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_len(content.len()));
    out.extend_from_slice(content);
    out
}

fn sequence(content: &[u8]) -> Vec<u8> {
    tlv(0x30, content)
}

fn octet_string(content: &[u8]) -> Vec<u8> {
    tlv(0x04, content)
}

fn integer(content: &[u8]) -> Vec<u8> {
    // Serial bytes are kept as parsed; prepend a zero when the sign bit
    // would flip.
    if content.first().is_some_and(|b| *b & 0x80 != 0) {
        let mut padded = vec![0u8];
        padded.extend_from_slice(content);
        tlv(0x02, &padded)
    } else {
        tlv(0x02, content)
    }
}

/// Encode the CertID for `identity`, hashing the issuer SPKI with
/// SHA-256. `issuer_spki` comes from the issuing certificate when the
/// chain provides one, else from the certificate itself.
fn cert_id(identity: &CertificateIdentity, issuer_spki: &[u8]) -> Vec<u8> {
    let mut content = Vec::new();
    content.extend_from_slice(&SHA256_ALG_ID);
    content.extend(octet_string(&Sha256::digest(&identity.issuer_name_raw)));
    content.extend(octet_string(&Sha256::digest(issuer_spki)));
    content.extend(integer(&identity.serial));
    sequence(&content)
}

/// Build a DER OCSPRequest for one certificate.
pub fn build_request(identity: &CertificateIdentity, issuer_spki: &[u8]) -> Vec<u8> {
    let request = sequence(&cert_id(identity, issuer_spki));
    let request_list = sequence(&request);
    let tbs_request = sequence(&request_list);
    sequence(&tbs_request)
}

/// Encode a minimal successful OCSPResponse carrying one status.
///
/// Used by responder stubs in tests; the shape mirrors what
/// [`parse_response`] reads back.
pub fn encode_response(status: CertStatus, serial: &[u8]) -> Vec<u8> {
    let cert_status = match status {
        CertStatus::Good => tlv(0x80, &[]),
        CertStatus::Revoked => {
            // revocationTime GeneralizedTime inside [1].
            tlv(0xa1, &tlv(0x18, b"20250101000000Z"))
        }
        CertStatus::Unknown => tlv(0x82, &[]),
    };

    // CertID with empty hashes: the parser matches on serial only.
    let mut cert_id = Vec::new();
    cert_id.extend_from_slice(&SHA256_ALG_ID);
    cert_id.extend(octet_string(&[0u8; 32]));
    cert_id.extend(octet_string(&[0u8; 32]));
    cert_id.extend(integer(serial));

    let mut single = Vec::new();
    single.extend(sequence(&cert_id));
    single.extend(cert_status);
    single.extend(tlv(0x18, b"20250101000000Z")); // thisUpdate

    let responses = sequence(&sequence(&single));

    let mut tbs = Vec::new();
    tbs.extend(tlv(0xa1, &sequence(&[]))); // responderID byName, empty
    tbs.extend(tlv(0x18, b"20250101000000Z")); // producedAt
    tbs.extend(responses);

    let mut basic = Vec::new();
    basic.extend(sequence(&tbs));
    basic.extend_from_slice(&SHA256_ALG_ID); // signatureAlgorithm
    basic.extend(tlv(0x03, &[0x00])); // empty BIT STRING signature

    let mut response_bytes = Vec::new();
    response_bytes.extend_from_slice(&OID_OCSP_BASIC);
    response_bytes.extend(octet_string(&sequence(&basic)));

    let mut outer = Vec::new();
    outer.extend(tlv(0x0a, &[0x00])); // responseStatus: successful
    outer.extend(tlv(0xa0, &sequence(&response_bytes)));
    sequence(&outer)
}

// --- DER reading ----------------------------------------------------------

struct DerReader<'a> {
    data: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    /// Read one TLV, returning (tag, content) and advancing.
    fn read(&mut self) -> Result<(u8, &'a [u8]), TrustError> {
        let malformed = || TrustError::MalformedOcsp("truncated DER".into());
        if self.data.len() < 2 {
            return Err(malformed());
        }
        let tag = self.data[0];
        let (header_len, content_len) = if self.data[1] & 0x80 == 0 {
            (2usize, self.data[1] as usize)
        } else {
            let n = (self.data[1] & 0x7f) as usize;
            if n == 0 || n > 4 || self.data.len() < 2 + n {
                return Err(malformed());
            }
            let mut len = 0usize;
            for b in &self.data[2..2 + n] {
                len = (len << 8) | *b as usize;
            }
            (2 + n, len)
        };
        let end = header_len
            .checked_add(content_len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(malformed)?;
        let content = &self.data[header_len..end];
        self.data = &self.data[end..];
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8, what: &str) -> Result<&'a [u8], TrustError> {
        let (tag, content) = self.read()?;
        if tag != expected {
            return Err(TrustError::MalformedOcsp(format!(
                "expected {what} (tag {expected:#04x}), found tag {tag:#04x}"
            )));
        }
        Ok(content)
    }
}

/// Parse an OCSPResponse and return the status recorded for `serial`.
///
/// A non-successful responseStatus or an unparseable structure is an
/// error; the caller maps it onto the availability policy.
pub fn parse_response(der: &[u8], serial: &[u8]) -> Result<CertStatus, TrustError> {
    let mut outer = DerReader::new(DerReader::new(der).expect(0x30, "OCSPResponse")?);

    let status = outer.expect(0x0a, "responseStatus")?;
    if status != [0x00] {
        return Err(TrustError::OcspResponder(format!(
            "responder returned status {:?}",
            status.first()
        )));
    }

    let response_bytes = DerReader::new(outer.expect(0xa0, "responseBytes")?)
        .expect(0x30, "responseBytes sequence")?;
    let mut response_bytes = DerReader::new(response_bytes);
    response_bytes.expect(0x06, "responseType")?;
    let basic_der = response_bytes.expect(0x04, "response octets")?;

    let mut basic = DerReader::new(DerReader::new(basic_der).expect(0x30, "BasicOCSPResponse")?);
    let mut tbs = DerReader::new(basic.expect(0x30, "tbsResponseData")?);

    // Skip optional version, responderID and producedAt; the responses
    // list is the first plain SEQUENCE inside tbsResponseData.
    loop {
        match tbs.peek_tag() {
            Some(0x30) => break,
            Some(_) => {
                tbs.read()?;
            }
            None => return Err(TrustError::MalformedOcsp("missing responses list".into())),
        }
    }
    let mut responses = DerReader::new(tbs.expect(0x30, "responses")?);

    while !responses.is_empty() {
        let mut single = DerReader::new(responses.expect(0x30, "SingleResponse")?);
        let mut cert_id = DerReader::new(single.expect(0x30, "CertID")?);
        cert_id.expect(0x30, "hashAlgorithm")?;
        cert_id.expect(0x04, "issuerNameHash")?;
        cert_id.expect(0x04, "issuerKeyHash")?;
        let found_serial = cert_id.expect(0x02, "serialNumber")?;

        let (status_tag, _) = single.read()?;
        let status = match status_tag {
            0x80 => CertStatus::Good,
            0xa1 => CertStatus::Revoked,
            0x82 => CertStatus::Unknown,
            other => {
                return Err(TrustError::MalformedOcsp(format!(
                    "unexpected certStatus tag {other:#04x}"
                )))
            }
        };

        // Serial comparison ignores the sign-padding byte.
        let trimmed: &[u8] = found_serial.strip_prefix(&[0u8][..]).unwrap_or(found_serial);
        let wanted: &[u8] = serial.strip_prefix(&[0u8][..]).unwrap_or(serial);
        if trimmed == wanted {
            return Ok(status);
        }
    }

    Err(TrustError::MalformedOcsp(
        "no response entry for certificate serial".into(),
    ))
}
