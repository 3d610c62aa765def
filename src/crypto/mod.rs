//! Cryptographic primitives used by the DTLS engine.
//!
//! * [`key_exchange`]: ephemeral ECDH on P-256 and P-384.
//! * [`signing`]: ECDSA signing and verification.
//! * [`prf`]: the TLS 1.2 PRF and the secrets derived from it.
//! * [`cipher`]: AES-GCM record protection.
//! * certificate handling and the [`CertVerifier`] hook.

mod certificate;
pub mod cipher;
pub mod key_exchange;
pub mod prf;
pub mod signing;

pub use certificate::{verifying_key_from_certificate, CertVerifier};
pub(crate) use certificate::verify_chain;
pub use cipher::{KeyBlock, RecordCipher};
pub use key_exchange::{decode_public_key, EcPublicKey, EphemeralKeyPair};
pub use signing::{SigningKey, VerifyingKey};
