use std::time::{SystemTime, UNIX_EPOCH};

use rand::RngCore;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

/// Hello random: 4 bytes of unix time followed by 28 random bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Random {
    pub gmt_unix_time: u32,
    pub random_bytes: [u8; 28],
}

impl Random {
    pub fn new() -> Self {
        let gmt_unix_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut random_bytes = [0u8; 28];
        rand::thread_rng().fill_bytes(&mut random_bytes);

        Random {
            gmt_unix_time,
            random_bytes,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let gmt_unix_time = r.read(32)? as u32;
        let random_bytes = r.read_array::<28>()?;
        Ok(Random {
            gmt_unix_time,
            random_bytes,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write(self.gmt_unix_time as u64, 32);
        w.write_bytes(&self.random_bytes);
    }

    /// The 32 bytes as they appear on the wire.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0; 32];
        out[..4].copy_from_slice(&self.gmt_unix_time.to_be_bytes());
        out[4..].copy_from_slice(&self.random_bytes);
        out
    }
}
