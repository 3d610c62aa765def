use tinyvec::ArrayVec;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::{
    CipherSuite, CompressionMethod, Cookie, Extension, ExtensionType, ProtocolVersion, Random,
    SessionId,
};

pub type CipherSuiteVec = ArrayVec<[CipherSuite; 32]>;
pub type CompressionMethodVec = ArrayVec<[CompressionMethod; 8]>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cookie: Cookie,
    pub cipher_suites: CipherSuiteVec,
    pub compression_methods: CompressionMethodVec,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn new(
        random: Random,
        session_id: SessionId,
        cookie: Cookie,
        cipher_suites: &[CipherSuite],
        named_curves: &[u16],
    ) -> Self {
        let mut suites = CipherSuiteVec::default();
        for s in cipher_suites.iter().take(suites.capacity()) {
            suites.push(*s);
        }

        let mut compression_methods = CompressionMethodVec::default();
        compression_methods.push(CompressionMethod::Null);

        ClientHello {
            client_version: ProtocolVersion::DTLS1_2,
            random,
            session_id,
            cookie,
            cipher_suites: suites,
            compression_methods,
            extensions: vec![
                Extension::supported_groups(named_curves),
                Extension::ec_point_formats(),
            ],
        }
    }

    /// The same hello carrying the cookie from a HelloVerifyRequest.
    pub fn with_cookie(mut self, cookie: Cookie) -> Self {
        self.cookie = cookie;
        self
    }

    /// Curves offered in `supported_groups`. Empty when the extension is absent.
    pub fn supported_groups(&self) -> Result<Vec<u16>, Error> {
        match Extension::find(&self.extensions, ExtensionType::SupportedGroups) {
            Some(e) => e.parse_supported_groups(),
            None => Ok(Vec::new()),
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let client_version = ProtocolVersion::parse(r)?;
        let random = Random::parse(r)?;
        let session_id = SessionId::parse(r)?;
        let cookie = Cookie::parse(r)?;

        let suites_len = r.read_u16()? as usize;
        if suites_len % 2 != 0 {
            return Err(Error::ParseError("Odd cipher_suites length".into()));
        }
        let mut cipher_suites = CipherSuiteVec::default();
        for _ in 0..suites_len / 2 {
            let suite = CipherSuite::parse(r)?;
            if cipher_suites.try_push(suite).is_some() {
                trace!("Ignoring cipher suite beyond capacity: {:?}", suite);
            }
        }

        let methods_len = r.read_u8()? as usize;
        let mut compression_methods = CompressionMethodVec::default();
        for _ in 0..methods_len {
            let method = CompressionMethod::from_u8(r.read_u8()?);
            let _ = compression_methods.try_push(method);
        }

        let extensions = Extension::parse_list(r)?;

        Ok(ClientHello {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.client_version.serialize(w);
        self.random.serialize(w);
        self.session_id.serialize(w);
        self.cookie.serialize(w);
        w.write_u16((self.cipher_suites.len() * 2) as u16);
        for suite in &self.cipher_suites {
            suite.serialize(w);
        }
        w.write_u8(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            w.write_u8(method.as_u8());
        }
        Extension::serialize_list(&self.extensions, w);
    }

    pub fn length(&self) -> usize {
        2 + 32
            + 1
            + self.session_id.len()
            + 1
            + self.cookie.len()
            + 2
            + self.cipher_suites.len() * 2
            + 1
            + self.compression_methods.len()
            + Extension::list_length(&self.extensions)
    }
}
