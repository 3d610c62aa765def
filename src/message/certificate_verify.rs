use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::SignatureAndHashAlgorithm;

/// Client's proof of possession of its certificate key, signed over the
/// handshake transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    pub algorithm: SignatureAndHashAlgorithm,
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn new(algorithm: SignatureAndHashAlgorithm, signature: Vec<u8>) -> Self {
        CertificateVerify {
            algorithm,
            signature,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let algorithm = SignatureAndHashAlgorithm::parse(r)?;
        let signature = r.read_prefixed(16)?;
        Ok(CertificateVerify {
            algorithm,
            signature,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.algorithm.serialize(w);
        w.write_prefixed(16, &self.signature);
    }

    pub fn length(&self) -> usize {
        2 + 2 + self.signature.len()
    }
}
