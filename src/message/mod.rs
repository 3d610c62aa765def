//! Wire types of the handshake and record protocols.
//!
//! Every structure reads itself from a [`BitReader`] and writes itself to a
//! [`BitWriter`], so the field layout is spelled out once per type.

mod alert;
mod certificate;
mod certificate_request;
mod certificate_verify;
mod client_hello;
mod client_key_exchange;
mod extension;
mod finished;
mod handshake;
mod hello_verify;
mod id;
mod random;
mod record;
mod server_hello;
mod server_key_exchange;

pub use alert::{Alert, AlertDescription, AlertLevel};
pub use certificate::Certificate;
pub use certificate_request::{CertificateRequest, ClientCertificateType};
pub use certificate_verify::CertificateVerify;
pub use client_hello::ClientHello;
pub use client_key_exchange::ClientKeyExchange;
pub use extension::{Extension, ExtensionType};
pub use finished::Finished;
pub use handshake::{Body, Fragment, Handshake, Header, MessageType, HEADER_LEN};
pub use hello_verify::HelloVerifyRequest;
pub use id::{Cookie, SessionId};
pub use random::Random;
pub use record::{ContentType, DTLSRecord, Sequence, RECORD_HEADER_LEN};
pub use server_hello::ServerHello;
pub use server_key_exchange::{CurveType, EcdhServerKeyExchange, TrustState};

use crate::codec::{BitReader, BitWriter};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    DTLS1_0,
    #[default]
    DTLS1_2,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xFEFF => ProtocolVersion::DTLS1_0,
            0xFEFD => ProtocolVersion::DTLS1_2,
            _ => ProtocolVersion::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ProtocolVersion::DTLS1_0 => 0xFEFF,
            ProtocolVersion::DTLS1_2 => 0xFEFD,
            ProtocolVersion::Unknown(value) => *value,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(Self::from_u16(r.read_u16()?))
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u16(self.as_u16());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(non_camel_case_types)]
/// TLS 1.2 cipher suites for DTLS.
pub enum CipherSuite {
    /// ECDHE with ECDSA authentication, AES-128-GCM, SHA-256
    ECDHE_ECDSA_AES128_GCM_SHA256, // 0xC02B
    /// ECDHE with ECDSA authentication, AES-256-GCM, SHA-384
    ECDHE_ECDSA_AES256_GCM_SHA384, // 0xC02C

    /// Unknown or unsupported cipher suite by its IANA value
    Unknown(u16),
    #[default]
    Null,
}

impl CipherSuite {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0xC02B => CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            0xC02C => CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
            0x0000 => CipherSuite::Null,
            _ => CipherSuite::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256 => 0xC02B,
            CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384 => 0xC02C,
            CipherSuite::Unknown(value) => *value,
            CipherSuite::Null => 0x0000,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(Self::from_u16(r.read_u16()?))
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u16(self.as_u16());
    }

    /// All supported cipher suites in default preference order.
    pub const fn all() -> &'static [CipherSuite; 2] {
        &[
            CipherSuite::ECDHE_ECDSA_AES128_GCM_SHA256,
            CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384,
        ]
    }

    pub fn is_supported(&self) -> bool {
        Self::all().contains(self)
    }

    /// Hash used by the PRF and the Finished transcript.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        match self {
            CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384 => HashAlgorithm::SHA384,
            _ => HashAlgorithm::SHA256,
        }
    }

    /// AES key length in bytes.
    pub fn key_len(&self) -> usize {
        match self {
            CipherSuite::ECDHE_ECDSA_AES256_GCM_SHA384 => 32,
            _ => 16,
        }
    }

    /// Implicit part of the GCM nonce.
    pub fn fixed_iv_len(&self) -> usize {
        4
    }

    /// Length in bytes of verify_data for Finished MACs.
    pub fn verify_data_length(&self) -> usize {
        12
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    #[default]
    Null,
    Deflate,
    Unknown(u8),
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => CompressionMethod::Null,
            0x01 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CompressionMethod::Null => 0x00,
            CompressionMethod::Deflate => 0x01,
            CompressionMethod::Unknown(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    None,
    SHA256,
    SHA384,
    Unknown(u8),
}

impl HashAlgorithm {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => HashAlgorithm::None,
            4 => HashAlgorithm::SHA256,
            5 => HashAlgorithm::SHA384,
            _ => HashAlgorithm::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            HashAlgorithm::None => 0,
            HashAlgorithm::SHA256 => 4,
            HashAlgorithm::SHA384 => 5,
            HashAlgorithm::Unknown(value) => *value,
        }
    }

    pub fn output_len(&self) -> usize {
        match self {
            HashAlgorithm::SHA384 => 48,
            _ => 32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Anonymous,
    ECDSA,
    Unknown(u8),
}

impl SignatureAlgorithm {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SignatureAlgorithm::Anonymous,
            3 => SignatureAlgorithm::ECDSA,
            _ => SignatureAlgorithm::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            SignatureAlgorithm::Anonymous => 0,
            SignatureAlgorithm::ECDSA => 3,
            SignatureAlgorithm::Unknown(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignatureAndHashAlgorithm {
    pub hash: HashAlgorithm,
    pub signature: SignatureAlgorithm,
}

impl SignatureAndHashAlgorithm {
    pub fn new(hash: HashAlgorithm, signature: SignatureAlgorithm) -> Self {
        SignatureAndHashAlgorithm { hash, signature }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let hash = HashAlgorithm::from_u8(r.read_u8()?);
        let signature = SignatureAlgorithm::from_u8(r.read_u8()?);
        Ok(SignatureAndHashAlgorithm { hash, signature })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u8(self.hash.as_u8());
        w.write_u8(self.signature.as_u8());
    }
}

/// Pass a reader over exactly `body` to `f`, requiring `f` to consume it all.
pub(crate) fn parse_exact<T>(
    body: &[u8],
    f: impl FnOnce(&mut BitReader<'_>) -> Result<T, Error>,
) -> Result<T, Error> {
    let mut r = BitReader::new(body);
    let value = f(&mut r)?;
    if !r.is_empty() {
        return Err(Error::ParseError(format!(
            "{} trailing bytes",
            r.remaining_bytes()
        )));
    }
    Ok(value)
}
