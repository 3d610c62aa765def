//! Peer certificate handling.

use der::{Decode, Encode};
use spki::ObjectIdentifier;
use x509_cert::Certificate as X509Certificate;

use super::signing::VerifyingKey;
use crate::Error;

/// id-ecPublicKey, RFC 5480.
const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Application hook deciding whether a peer's certificate chain is trusted.
///
/// Without a verifier any well-formed ECDSA certificate is accepted, and the
/// application is expected to check the peer certificate it is handed (for
/// instance against a pinned fingerprint).
pub trait CertVerifier: Send + Sync {
    /// `chain` is DER, leaf first.
    fn verify_certificate(&self, chain: &[Vec<u8>]) -> Result<(), String>;
}

/// Extract the ECDSA public key from a DER certificate.
pub fn verifying_key_from_certificate(cert_der: &[u8]) -> Result<VerifyingKey, Error> {
    let cert = X509Certificate::from_der(cert_der)
        .map_err(|e| Error::CertificateError(format!("Invalid certificate: {}", e)))?;

    let spki = &cert.tbs_certificate.subject_public_key_info;
    if spki.algorithm.oid != ID_EC_PUBLIC_KEY {
        return Err(Error::CertificateError(format!(
            "Unsupported public key algorithm {}",
            spki.algorithm.oid
        )));
    }

    let spki_der = spki
        .to_der()
        .map_err(|e| Error::CertificateError(format!("Invalid public key info: {}", e)))?;

    VerifyingKey::from_spki_der(&spki_der)
}

/// Run the configured verifier, if any, then extract the leaf key.
pub(crate) fn verify_chain(
    chain: &[Vec<u8>],
    verifier: Option<&dyn CertVerifier>,
) -> Result<VerifyingKey, Error> {
    let Some(leaf) = chain.first() else {
        return Err(Error::CertificateError("Empty certificate chain".into()));
    };

    if let Some(verifier) = verifier {
        verifier
            .verify_certificate(chain)
            .map_err(Error::CertificateError)?;
    }

    verifying_key_from_certificate(leaf)
}
