//! Self-signed certificates and fingerprint pinning.
//!
//! Constrained deployments rarely run a PKI. The usual setup is a
//! self-signed ECDSA certificate per device and the peer's SHA-256
//! fingerprint exchanged out of band.

use rcgen::{
    Certificate as RcgenCertificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    SignatureAlgorithm, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384,
};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::crypto::CertVerifier;
use crate::curve::{SECP256R1, SECP384R1};
use crate::Error;

/// Certificate and private key pair
#[derive(Clone)]
pub struct DtlsCertificate {
    /// Certificate in DER format
    pub certificate: Vec<u8>,
    /// PKCS#8 private key in DER format
    pub private_key: Vec<u8>,
}

/// Generate a self-signed ECDSA P-256 certificate.
pub fn generate_self_signed_certificate() -> Result<DtlsCertificate, Error> {
    generate_self_signed_certificate_on(SECP256R1)
}

/// Generate a self-signed ECDSA certificate on the named curve `curve_id`.
pub fn generate_self_signed_certificate_on(curve_id: u16) -> Result<DtlsCertificate, Error> {
    let alg: &'static SignatureAlgorithm = match curve_id {
        SECP256R1 => &PKCS_ECDSA_P256_SHA256,
        SECP384R1 => &PKCS_ECDSA_P384_SHA384,
        _ => {
            return Err(Error::UnsupportedCurve(format!(
                "No certificate support for curve {}",
                curve_id
            )))
        }
    };

    let key_pair = KeyPair::generate(alg).map_err(generation_failed)?;

    let mut params = CertificateParams::new(vec!["cdtls".to_string()]);
    params.alg = alg;

    let mut distinguished_name = DistinguishedName::new();
    distinguished_name.push(DnType::CommonName, "cdtls peer".to_string());
    params.distinguished_name = distinguished_name;

    params.is_ca = IsCa::NoCa;
    params.key_pair = Some(key_pair);

    let not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
    params.not_before = not_before;
    params.not_after = not_before + time::Duration::days(365);

    let cert = RcgenCertificate::from_params(params).map_err(generation_failed)?;
    let certificate = cert.serialize_der().map_err(generation_failed)?;
    let private_key = cert.serialize_private_key_der();

    Ok(DtlsCertificate {
        certificate,
        private_key,
    })
}

fn generation_failed(e: rcgen::RcgenError) -> Error {
    Error::CertificateError(format!("Certificate generation failed: {}", e))
}

/// SHA-256 over the DER certificate.
pub fn calculate_fingerprint(cert_der: &[u8]) -> Vec<u8> {
    Sha256::digest(cert_der).to_vec()
}

/// Format a fingerprint as a colon-separated hex string
/// Example: "AF:12:F6:..."
pub fn format_fingerprint(fingerprint: &[u8]) -> String {
    fingerprint
        .iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<String>>()
        .join(":")
}

impl DtlsCertificate {
    /// SHA-256 fingerprint of the certificate, 32 bytes.
    pub fn fingerprint(&self) -> Vec<u8> {
        calculate_fingerprint(&self.certificate)
    }

    /// Fingerprint as uppercase hex pairs separated by colons.
    pub fn fingerprint_str(&self) -> String {
        format_fingerprint(&self.fingerprint())
    }
}

impl fmt::Debug for DtlsCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DtlsCertificate")
            .field("certificate", &self.certificate.len())
            .field("private_key", &self.private_key.len())
            .finish()
    }
}

/// [`CertVerifier`] accepting leaf certificates with a known fingerprint.
#[derive(Debug, Clone, Default)]
pub struct FingerprintVerifier {
    trusted: Vec<Vec<u8>>,
}

impl FingerprintVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fingerprint(mut self, fingerprint: Vec<u8>) -> Self {
        self.trusted.push(fingerprint);
        self
    }
}

impl CertVerifier for FingerprintVerifier {
    fn verify_certificate(&self, chain: &[Vec<u8>]) -> Result<(), String> {
        let Some(leaf) = chain.first() else {
            return Err("Empty certificate chain".into());
        };

        let fingerprint = calculate_fingerprint(leaf);
        if self.trusted.iter().any(|t| *t == fingerprint) {
            Ok(())
        } else {
            Err(format!(
                "Fingerprint mismatch: {}",
                format_fingerprint(&fingerprint)
            ))
        }
    }
}
