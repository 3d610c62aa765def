//! ECDSA signatures for ServerKeyExchange and CertificateVerify.
//!
//! The hash follows the key: P-256 signs with SHA-256, P-384 with SHA-384.
//! Signatures are DER encoded on the wire.

use p256::ecdsa::{
    Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey,
};
use p384::ecdsa::{
    Signature as P384Signature, SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey,
};
use pkcs8::DecodePrivateKey;
use spki::DecodePublicKey;
use signature::{Signer, Verifier};

use crate::message::{HashAlgorithm, SignatureAlgorithm, SignatureAndHashAlgorithm};
use crate::Error;

/// Our certificate's private key.
pub enum SigningKey {
    P256(P256SigningKey),
    P384(P384SigningKey),
}

impl SigningKey {
    /// Load a PKCS#8 private key, DER or PEM.
    pub fn from_pkcs8_der(private_key: &[u8]) -> Result<Self, Error> {
        if let Ok(key) = P256SigningKey::from_pkcs8_der(private_key) {
            return Ok(SigningKey::P256(key));
        }
        if let Ok(key) = P384SigningKey::from_pkcs8_der(private_key) {
            return Ok(SigningKey::P384(key));
        }

        if let Ok(pem) = std::str::from_utf8(private_key) {
            if let Ok(key) = P256SigningKey::from_pkcs8_pem(pem) {
                return Ok(SigningKey::P256(key));
            }
            if let Ok(key) = P384SigningKey::from_pkcs8_pem(pem) {
                return Ok(SigningKey::P384(key));
            }
        }

        Err(Error::CertificateError(
            "Failed to parse ECDSA private key or unsupported curve".into(),
        ))
    }

    pub fn algorithm(&self) -> SignatureAndHashAlgorithm {
        match self {
            SigningKey::P256(_) => ecdsa_with(HashAlgorithm::SHA256),
            SigningKey::P384(_) => ecdsa_with(HashAlgorithm::SHA384),
        }
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        let der = match self {
            SigningKey::P256(key) => {
                let sig: P256Signature = key
                    .try_sign(data)
                    .map_err(|e| Error::CryptoError(format!("P-256 signing failed: {}", e)))?;
                sig.to_der().as_bytes().to_vec()
            }
            SigningKey::P384(key) => {
                let sig: P384Signature = key
                    .try_sign(data)
                    .map_err(|e| Error::CryptoError(format!("P-384 signing failed: {}", e)))?;
                sig.to_der().as_bytes().to_vec()
            }
        };
        Ok(der)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        match self {
            SigningKey::P256(key) => VerifyingKey::P256(*key.verifying_key()),
            SigningKey::P384(key) => VerifyingKey::P384(*key.verifying_key()),
        }
    }
}

/// A peer's certified public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyingKey {
    P256(P256VerifyingKey),
    P384(P384VerifyingKey),
}

impl VerifyingKey {
    /// Load a DER encoded SubjectPublicKeyInfo.
    pub fn from_spki_der(spki: &[u8]) -> Result<Self, Error> {
        if let Ok(key) = P256VerifyingKey::from_public_key_der(spki) {
            return Ok(VerifyingKey::P256(key));
        }
        if let Ok(key) = P384VerifyingKey::from_public_key_der(spki) {
            return Ok(VerifyingKey::P384(key));
        }
        Err(Error::CertificateError(
            "Certificate key is not ECDSA P-256 or P-384".into(),
        ))
    }

    pub fn algorithm(&self) -> SignatureAndHashAlgorithm {
        match self {
            VerifyingKey::P256(_) => ecdsa_with(HashAlgorithm::SHA256),
            VerifyingKey::P384(_) => ecdsa_with(HashAlgorithm::SHA384),
        }
    }

    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<(), Error> {
        let ok = match self {
            VerifyingKey::P256(key) => P256Signature::from_der(signature)
                .map(|sig| key.verify(data, &sig).is_ok())
                .unwrap_or(false),
            VerifyingKey::P384(key) => P384Signature::from_der(signature)
                .map(|sig| key.verify(data, &sig).is_ok())
                .unwrap_or(false),
        };

        if !ok {
            return Err(Error::SignatureVerificationFailed);
        }
        Ok(())
    }
}

fn ecdsa_with(hash: HashAlgorithm) -> SignatureAndHashAlgorithm {
    SignatureAndHashAlgorithm::new(hash, SignatureAlgorithm::ECDSA)
}
