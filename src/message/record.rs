use std::fmt;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::ProtocolVersion;

/// Size of the DTLS 1.2 record header.
pub const RECORD_HEADER_LEN: usize = 13;

/// Records longer than this are rejected (2^14 plus AEAD expansion).
const MAX_RECORD_LEN: usize = 16384 + 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }
}

/// Record identity: the epoch and the 48-bit sequence number within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord)]
pub struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64,
}

impl Sequence {
    pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 48) - 1;

    pub fn new(epoch: u16) -> Self {
        Sequence {
            epoch,
            sequence_number: 0,
        }
    }

    /// The 8 bytes `epoch || seq48` used as GCM explicit nonce and in the AAD.
    pub fn to_bytes(&self) -> [u8; 8] {
        let v = ((self.epoch as u64) << 48) | self.sequence_number;
        v.to_be_bytes()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[epoch: {}, sequence_number: {}]", self.epoch, self.sequence_number)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct DTLSRecord {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    pub sequence: Sequence,
    pub fragment: Vec<u8>,
}

impl DTLSRecord {
    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let content_type = ContentType::from_u8(r.read_u8()?);
        let version = ProtocolVersion::parse(r)?;
        let epoch = r.read_u16()?;
        let sequence_number = r.read_u48()?;
        let length = r.read_u16()? as usize;

        if length > MAX_RECORD_LEN {
            return Err(Error::ParseError(format!("Record too long: {}", length)));
        }

        let fragment = r.read_bytes(length)?;

        Ok(DTLSRecord {
            content_type,
            version,
            sequence: Sequence {
                epoch,
                sequence_number,
            },
            fragment,
        })
    }

    /// Split a datagram into records.
    ///
    /// A datagram holds one or more records back to back. Parsing stops at
    /// the first malformed record; the records before it are still returned.
    pub fn parse_datagram(datagram: &[u8]) -> (Vec<DTLSRecord>, Option<Error>) {
        let mut r = BitReader::new(datagram);
        let mut records = Vec::new();

        while !r.is_empty() {
            match DTLSRecord::parse(&mut r) {
                Ok(record) => records.push(record),
                Err(e) => return (records, Some(e)),
            }
        }

        (records, None)
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u8(self.content_type.as_u8());
        self.version.serialize(w);
        w.write_u16(self.sequence.epoch);
        w.write_u48(self.sequence.sequence_number);
        w.write_prefixed(16, &self.fragment);
    }

    pub fn length(&self) -> usize {
        RECORD_HEADER_LEN + self.fragment.len()
    }
}

impl fmt::Debug for DTLSRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DTLSRecord")
            .field("content_type", &self.content_type)
            .field("sequence", &self.sequence)
            .field("length", &self.fragment.len())
            .finish()
    }
}
