use crate::codec::{BitReader, BitWriter};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    pub verify_data: Vec<u8>,
}

impl Finished {
    pub fn new(verify_data: impl Into<Vec<u8>>) -> Self {
        Finished {
            verify_data: verify_data.into(),
        }
    }

    /// The verify_data is the whole message body. Its expected length is
    /// checked against the cipher suite by the handshake.
    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        Ok(Finished {
            verify_data: r.read_bytes_remaining(),
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_bytes(&self.verify_data);
    }

    pub fn length(&self) -> usize {
        self.verify_data.len()
    }
}
