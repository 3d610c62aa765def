use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::{Cookie, ProtocolVersion};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloVerifyRequest {
    pub server_version: ProtocolVersion,
    pub cookie: Cookie,
}

impl HelloVerifyRequest {
    pub fn new(cookie: Cookie) -> Self {
        HelloVerifyRequest {
            // RFC 6347 4.2.1, the HelloVerifyRequest is sent as DTLS 1.0
            server_version: ProtocolVersion::DTLS1_0,
            cookie,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let server_version = ProtocolVersion::parse(r)?;
        let cookie = Cookie::parse(r)?;
        Ok(HelloVerifyRequest {
            server_version,
            cookie,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.server_version.serialize(w);
        self.cookie.serialize(w);
    }

    pub fn length(&self) -> usize {
        2 + 1 + self.cookie.len()
    }
}
