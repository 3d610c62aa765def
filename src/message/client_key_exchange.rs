use crate::codec::{BitReader, BitWriter};
use crate::Error;

/// ClientKeyExchange for ECDHE: the client's ephemeral public point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    pub public_point: Vec<u8>,
}

impl ClientKeyExchange {
    pub fn new(public_point: Vec<u8>) -> Self {
        ClientKeyExchange { public_point }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let public_point = r.read_prefixed(8)?;
        Ok(ClientKeyExchange { public_point })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_prefixed(8, &self.public_point);
    }

    pub fn length(&self) -> usize {
        1 + self.public_point.len()
    }
}
