use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::{CipherSuite, CompressionMethod, Extension, ProtocolVersion, Random, SessionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn new(random: Random, session_id: SessionId, cipher_suite: CipherSuite) -> Self {
        ServerHello {
            server_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cipher_suite,
            compression_method: CompressionMethod::Null,
            extensions: vec![Extension::ec_point_formats()],
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let server_version = ProtocolVersion::parse(r)?;
        let random = Random::parse(r)?;
        let session_id = SessionId::parse(r)?;
        let cipher_suite = CipherSuite::parse(r)?;
        let compression_method = CompressionMethod::from_u8(r.read_u8()?);
        let extensions = Extension::parse_list(r)?;

        Ok(ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.server_version.serialize(w);
        self.random.serialize(w);
        self.session_id.serialize(w);
        self.cipher_suite.serialize(w);
        w.write_u8(self.compression_method.as_u8());
        Extension::serialize_list(&self.extensions, w);
    }

    pub fn length(&self) -> usize {
        2 + 32 + 1 + self.session_id.len() + 2 + 1 + Extension::list_length(&self.extensions)
    }
}
