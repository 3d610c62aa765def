use tinyvec::ArrayVec;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::SignatureAndHashAlgorithm;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(non_camel_case_types)]
pub enum ClientCertificateType {
    #[default]
    ECDSA_SIGN,
    Unknown(u8),
}

impl ClientCertificateType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            64 => ClientCertificateType::ECDSA_SIGN,
            _ => ClientCertificateType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ClientCertificateType::ECDSA_SIGN => 64,
            ClientCertificateType::Unknown(value) => *value,
        }
    }
}

/// Server's request for a client certificate.
///
/// Certificate authorities are kept as opaque DER distinguished names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub certificate_types: ArrayVec<[ClientCertificateType; 8]>,
    pub supported_signature_algorithms: ArrayVec<[SignatureAndHashAlgorithm; 32]>,
    pub certificate_authorities: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub fn new(supported_signature_algorithms: &[SignatureAndHashAlgorithm]) -> Self {
        let mut certificate_types = ArrayVec::new();
        certificate_types.push(ClientCertificateType::ECDSA_SIGN);

        let mut algs = ArrayVec::new();
        for alg in supported_signature_algorithms.iter().take(32) {
            algs.push(*alg);
        }

        CertificateRequest {
            certificate_types,
            supported_signature_algorithms: algs,
            certificate_authorities: Vec::new(),
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let types = r.read_prefixed(8)?;
        let mut certificate_types = ArrayVec::new();
        for t in types {
            if certificate_types
                .try_push(ClientCertificateType::from_u8(t))
                .is_some()
            {
                return Err(Error::ParseError("Too many certificate types".into()));
            }
        }

        let algs = r.read_prefixed(16)?;
        if algs.len() % 2 != 0 {
            return Err(Error::ParseError("Odd signature algorithm list".into()));
        }
        let mut supported_signature_algorithms = ArrayVec::new();
        let mut ar = BitReader::new(&algs);
        while !ar.is_empty() {
            let alg = SignatureAndHashAlgorithm::parse(&mut ar)?;
            // Ignore the ones that don't fit. We only act on the first few.
            let _ = supported_signature_algorithms.try_push(alg);
        }

        let cas = r.read_prefixed(16)?;
        let mut certificate_authorities = Vec::new();
        let mut cr = BitReader::new(&cas);
        while !cr.is_empty() {
            certificate_authorities.push(cr.read_prefixed(16)?);
        }

        Ok(CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u8(self.certificate_types.len() as u8);
        for t in &self.certificate_types {
            w.write_u8(t.as_u8());
        }

        w.write_u16((self.supported_signature_algorithms.len() * 2) as u16);
        for alg in &self.supported_signature_algorithms {
            alg.serialize(w);
        }

        let cas_len: usize = self
            .certificate_authorities
            .iter()
            .map(|ca| 2 + ca.len())
            .sum();
        w.write_u16(cas_len as u16);
        for ca in &self.certificate_authorities {
            w.write_prefixed(16, ca);
        }
    }

    pub fn length(&self) -> usize {
        1 + self.certificate_types.len()
            + 2
            + self.supported_signature_algorithms.len() * 2
            + 2
            + self
                .certificate_authorities
                .iter()
                .map(|ca| 2 + ca.len())
                .sum::<usize>()
    }

    pub fn supports(&self, alg: SignatureAndHashAlgorithm) -> bool {
        self.supported_signature_algorithms.contains(&alg)
    }
}
