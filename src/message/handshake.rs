use std::fmt;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

use super::{
    parse_exact, Certificate, CertificateRequest, CertificateVerify, ClientHello,
    ClientKeyExchange, EcdhServerKeyExchange, Finished, HelloVerifyRequest, ServerHello,
};

/// Size of the handshake header on every (fragment of a) handshake message.
pub const HEADER_LEN: usize = 12;

const MAX_MESSAGE_LEN: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    Unknown(u8),
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone,
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            _ => MessageType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::Unknown(value) => *value,
        }
    }

    /// The epoch a message of this type is sent in.
    pub fn epoch(&self) -> u16 {
        match self {
            MessageType::Finished => 1,
            _ => 0,
        }
    }

    /// Whether this type closes a flight.
    ///
    /// A stale copy of a flight's last message means the peer lost our
    /// answer, so it prompts a resend of our last flight.
    pub fn ends_flight(&self) -> bool {
        matches!(
            self,
            MessageType::ClientHello
                | MessageType::HelloVerifyRequest
                | MessageType::ServerHelloDone
                | MessageType::Finished
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let msg_type = MessageType::from_u8(r.read_u8()?);
        let length = r.read_u24()?;
        let message_seq = r.read_u16()?;
        let fragment_offset = r.read_u24()?;
        let fragment_length = r.read_u24()?;

        if fragment_offset as u64 + fragment_length as u64 > length as u64 {
            return Err(Error::ParseError(format!(
                "Fragment {}+{} exceeds message length {}",
                fragment_offset, fragment_length, length
            )));
        }

        if length > MAX_MESSAGE_LEN {
            return Err(Error::ParseError(format!(
                "Handshake message too long: {}",
                length
            )));
        }

        Ok(Header {
            msg_type,
            length,
            message_seq,
            fragment_offset,
            fragment_length,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u8(self.msg_type.as_u8());
        w.write_u24(self.length);
        w.write_u16(self.message_seq);
        w.write_u24(self.fragment_offset);
        w.write_u24(self.fragment_length);
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset != 0 || self.fragment_length != self.length
    }
}

/// The payload of a handshake message, one variant per message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    ClientHello(ClientHello),
    HelloVerifyRequest(HelloVerifyRequest),
    ServerHello(ServerHello),
    Certificate(Certificate),
    ServerKeyExchange(EcdhServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    ClientKeyExchange(ClientKeyExchange),
    CertificateVerify(CertificateVerify),
    Finished(Finished),
}

impl Body {
    pub fn message_type(&self) -> MessageType {
        match self {
            Body::ClientHello(_) => MessageType::ClientHello,
            Body::HelloVerifyRequest(_) => MessageType::HelloVerifyRequest,
            Body::ServerHello(_) => MessageType::ServerHello,
            Body::Certificate(_) => MessageType::Certificate,
            Body::ServerKeyExchange(_) => MessageType::ServerKeyExchange,
            Body::CertificateRequest(_) => MessageType::CertificateRequest,
            Body::ServerHelloDone => MessageType::ServerHelloDone,
            Body::ClientKeyExchange(_) => MessageType::ClientKeyExchange,
            Body::CertificateVerify(_) => MessageType::CertificateVerify,
            Body::Finished(_) => MessageType::Finished,
        }
    }

    /// Decode the body of a complete message of type `msg_type`.
    pub fn parse(msg_type: MessageType, body: &[u8]) -> Result<Self, Error> {
        let b = match msg_type {
            MessageType::ClientHello => Body::ClientHello(parse_exact(body, ClientHello::parse)?),
            MessageType::HelloVerifyRequest => {
                Body::HelloVerifyRequest(parse_exact(body, HelloVerifyRequest::parse)?)
            }
            MessageType::ServerHello => Body::ServerHello(parse_exact(body, ServerHello::parse)?),
            MessageType::Certificate => Body::Certificate(parse_exact(body, Certificate::parse)?),
            MessageType::ServerKeyExchange => {
                Body::ServerKeyExchange(parse_exact(body, EcdhServerKeyExchange::parse)?)
            }
            MessageType::CertificateRequest => {
                Body::CertificateRequest(parse_exact(body, CertificateRequest::parse)?)
            }
            MessageType::ServerHelloDone => {
                if !body.is_empty() {
                    return Err(Error::ParseError("ServerHelloDone with body".into()));
                }
                Body::ServerHelloDone
            }
            MessageType::ClientKeyExchange => {
                Body::ClientKeyExchange(parse_exact(body, ClientKeyExchange::parse)?)
            }
            MessageType::CertificateVerify => {
                Body::CertificateVerify(parse_exact(body, CertificateVerify::parse)?)
            }
            MessageType::Finished => Body::Finished(parse_exact(body, Finished::parse)?),
            MessageType::HelloRequest | MessageType::Unknown(_) => {
                return Err(Error::UnexpectedMessageForState(format!(
                    "Unsupported handshake message {:?}",
                    msg_type
                )));
            }
        };
        Ok(b)
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        match self {
            Body::ClientHello(m) => m.serialize(w),
            Body::HelloVerifyRequest(m) => m.serialize(w),
            Body::ServerHello(m) => m.serialize(w),
            Body::Certificate(m) => m.serialize(w),
            Body::ServerKeyExchange(m) => m.serialize(w),
            Body::CertificateRequest(m) => m.serialize(w),
            Body::ServerHelloDone => {}
            Body::ClientKeyExchange(m) => m.serialize(w),
            Body::CertificateVerify(m) => m.serialize(w),
            Body::Finished(m) => m.serialize(w),
        }
    }

    /// Encoded length in bytes.
    pub fn length(&self) -> usize {
        match self {
            Body::ClientHello(m) => m.length(),
            Body::HelloVerifyRequest(m) => m.length(),
            Body::ServerHello(m) => m.length(),
            Body::Certificate(m) => m.length(),
            Body::ServerKeyExchange(m) => m.length(),
            Body::CertificateRequest(m) => m.length(),
            Body::ServerHelloDone => 0,
            Body::ClientKeyExchange(m) => m.length(),
            Body::CertificateVerify(m) => m.length(),
            Body::Finished(m) => m.length(),
        }
    }
}

/// A complete, unfragmented handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub header: Header,
    pub body: Body,
}

impl Handshake {
    pub fn new(message_seq: u16, body: Body) -> Self {
        let length = body.length() as u32;
        Handshake {
            header: Header {
                msg_type: body.message_type(),
                length,
                message_seq,
                fragment_offset: 0,
                fragment_length: length,
            },
            body,
        }
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let header = Header::parse(r)?;
        if header.is_fragment() {
            return Err(Error::ParseError("Expected a complete message".into()));
        }
        let bytes = r.read_bytes(header.length as usize)?;
        let body = Body::parse(header.msg_type, &bytes)?;
        Ok(Handshake { header, body })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.header.serialize(w);
        self.body.serialize(w);
    }

    /// Split into fragments whose data is at most `max_fragment_len` bytes.
    pub fn fragment(&self, max_fragment_len: usize) -> Vec<Fragment> {
        let mut w = BitWriter::new();
        self.body.serialize(&mut w);
        let body = w.finish();
        Fragment::split(
            self.header.msg_type,
            self.header.message_seq,
            &body,
            max_fragment_len,
        )
    }
}

/// One fragment of a handshake message as carried in a record.
#[derive(Clone, PartialEq, Eq)]
pub struct Fragment {
    pub header: Header,
    pub data: Vec<u8>,
}

impl Fragment {
    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let header = Header::parse(r)?;
        let data = r.read_bytes(header.fragment_length as usize)?;
        Ok(Fragment { header, data })
    }

    /// All fragments in a handshake record.
    pub fn parse_all(payload: &[u8]) -> Result<Vec<Fragment>, Error> {
        let mut r = BitReader::new(payload);
        let mut fragments = Vec::new();
        while !r.is_empty() {
            fragments.push(Fragment::parse(&mut r)?);
        }
        Ok(fragments)
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.header.serialize(w);
        w.write_bytes(&self.data);
    }

    /// Cut `body` into fragments tiling `[0, body.len())`.
    ///
    /// An empty body still yields one (empty) fragment.
    pub fn split(
        msg_type: MessageType,
        message_seq: u16,
        body: &[u8],
        max_fragment_len: usize,
    ) -> Vec<Fragment> {
        let max = max_fragment_len.max(1);
        let length = body.len() as u32;

        let make = |offset: usize, data: &[u8]| Fragment {
            header: Header {
                msg_type,
                length,
                message_seq,
                fragment_offset: offset as u32,
                fragment_length: data.len() as u32,
            },
            data: data.to_vec(),
        };

        if body.is_empty() {
            return vec![make(0, &[])];
        }

        body.chunks(max)
            .enumerate()
            .map(|(i, chunk)| make(i * max, chunk))
            .collect()
    }
}

impl fmt::Debug for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fragment")
            .field("header", &self.header)
            .field("data", &self.data.len())
            .finish()
    }
}
