//! AES-GCM record protection, RFC 5288 / RFC 6347.
//!
//! The 12 byte nonce is the 4 byte implicit IV from the key block followed by
//! the 8 byte explicit nonce. The explicit nonce is the record's epoch and
//! sequence number and travels in front of the ciphertext.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use zeroize::Zeroizing;

use super::prf;
use crate::message::{CipherSuite, ContentType, ProtocolVersion, Sequence};
use crate::Error;

/// Explicit nonce carried in each record.
pub const EXPLICIT_NONCE_LEN: usize = 8;
/// GCM tag length.
pub const TAG_LEN: usize = 16;
/// Bytes added to a plaintext by [`RecordCipher::seal`].
pub const AEAD_OVERHEAD: usize = EXPLICIT_NONCE_LEN + TAG_LEN;

enum AesGcm {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl AesGcm {
    fn new(key: &[u8]) -> Result<Self, Error> {
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key)
                .map(AesGcm::Aes128)
                .map_err(|_| Error::CryptoError("Failed to create AES-128-GCM cipher".into())),
            32 => Aes256Gcm::new_from_slice(key)
                .map(AesGcm::Aes256)
                .map_err(|_| Error::CryptoError("Failed to create AES-256-GCM cipher".into())),
            n => Err(Error::CryptoError(format!(
                "Invalid key size for AES-GCM: {}",
                n
            ))),
        }
    }
}

/// One direction of record protection.
pub struct RecordCipher {
    aead: AesGcm,
    fixed_iv: [u8; 4],
}

impl RecordCipher {
    pub fn new(key: &[u8], fixed_iv: &[u8]) -> Result<Self, Error> {
        let fixed_iv = fixed_iv
            .try_into()
            .map_err(|_| Error::CryptoError(format!("Invalid IV length {}", fixed_iv.len())))?;
        Ok(RecordCipher {
            aead: AesGcm::new(key)?,
            fixed_iv,
        })
    }

    fn nonce(&self, explicit: &[u8; EXPLICIT_NONCE_LEN]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..4].copy_from_slice(&self.fixed_iv);
        nonce[4..].copy_from_slice(explicit);
        nonce
    }

    /// Encrypt `plaintext` into `explicit_nonce || ciphertext || tag`.
    pub fn seal(
        &self,
        sequence: Sequence,
        content_type: ContentType,
        version: ProtocolVersion,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let explicit = sequence.to_bytes();
        let nonce = self.nonce(&explicit);
        let aad = aad(sequence, content_type, version, plaintext.len());
        let payload = Payload {
            msg: plaintext,
            aad: &aad,
        };

        let ciphertext = match &self.aead {
            AesGcm::Aes128(c) => c.encrypt(Nonce::from_slice(&nonce), payload),
            AesGcm::Aes256(c) => c.encrypt(Nonce::from_slice(&nonce), payload),
        }
        .map_err(|_| Error::CryptoError("Encryption failed".into()))?;

        let mut out = Vec::with_capacity(EXPLICIT_NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&explicit);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt a record fragment produced by [`seal`](Self::seal).
    pub fn open(
        &self,
        sequence: Sequence,
        content_type: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
    ) -> Result<Vec<u8>, Error> {
        if fragment.len() < AEAD_OVERHEAD {
            return Err(Error::DecryptionFailed);
        }

        let (explicit, ciphertext) = fragment.split_at(EXPLICIT_NONCE_LEN);
        let mut explicit_nonce = [0u8; EXPLICIT_NONCE_LEN];
        explicit_nonce.copy_from_slice(explicit);
        let nonce = self.nonce(&explicit_nonce);

        let plaintext_len = ciphertext.len() - TAG_LEN;
        let aad = aad(sequence, content_type, version, plaintext_len);
        let payload = Payload {
            msg: ciphertext,
            aad: &aad,
        };

        match &self.aead {
            AesGcm::Aes128(c) => c.decrypt(Nonce::from_slice(&nonce), payload),
            AesGcm::Aes256(c) => c.decrypt(Nonce::from_slice(&nonce), payload),
        }
        .map_err(|_| Error::DecryptionFailed)
    }
}

/// `epoch || seq || type || version || length`
fn aad(
    sequence: Sequence,
    content_type: ContentType,
    version: ProtocolVersion,
    plaintext_len: usize,
) -> [u8; 13] {
    let mut aad = [0u8; 13];
    aad[..8].copy_from_slice(&sequence.to_bytes());
    aad[8] = content_type.as_u8();
    aad[9..11].copy_from_slice(&version.as_u16().to_be_bytes());
    aad[11..].copy_from_slice(&(plaintext_len as u16).to_be_bytes());
    aad
}

/// Keys derived from the master secret for both directions.
pub struct KeyBlock {
    client_write_key: Zeroizing<Vec<u8>>,
    server_write_key: Zeroizing<Vec<u8>>,
    client_write_iv: Zeroizing<Vec<u8>>,
    server_write_iv: Zeroizing<Vec<u8>>,
}

impl KeyBlock {
    pub fn derive(
        suite: CipherSuite,
        master_secret: &[u8],
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<Self, Error> {
        let key_len = suite.key_len();
        let iv_len = suite.fixed_iv_len();

        let block = prf::key_expansion(
            master_secret,
            client_random,
            server_random,
            2 * key_len + 2 * iv_len,
            suite.hash_algorithm(),
        )?;

        let (client_write_key, rest) = block.split_at(key_len);
        let (server_write_key, rest) = rest.split_at(key_len);
        let (client_write_iv, server_write_iv) = rest.split_at(iv_len);

        Ok(KeyBlock {
            client_write_key: Zeroizing::new(client_write_key.to_vec()),
            server_write_key: Zeroizing::new(server_write_key.to_vec()),
            client_write_iv: Zeroizing::new(client_write_iv.to_vec()),
            server_write_iv: Zeroizing::new(server_write_iv.to_vec()),
        })
    }

    /// Ciphers as `(write, read)` for the given side.
    pub fn into_ciphers(self, is_client: bool) -> Result<(RecordCipher, RecordCipher), Error> {
        let client = RecordCipher::new(&self.client_write_key, &self.client_write_iv)?;
        let server = RecordCipher::new(&self.server_write_key, &self.server_write_iv)?;
        if is_client {
            Ok((client, server))
        } else {
            Ok((server, client))
        }
    }
}
