use crate::codec::{BitReader, BitWriter};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionType {
    SupportedGroups,
    EcPointFormats,
    SignatureAlgorithms,
    Unknown(u16),
}

impl ExtensionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            10 => ExtensionType::SupportedGroups,
            11 => ExtensionType::EcPointFormats,
            13 => ExtensionType::SignatureAlgorithms,
            _ => ExtensionType::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            ExtensionType::SupportedGroups => 10,
            ExtensionType::EcPointFormats => 11,
            ExtensionType::SignatureAlgorithms => 13,
            ExtensionType::Unknown(value) => *value,
        }
    }
}

/// A hello extension. The data is kept opaque until asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub data: Vec<u8>,
}

const POINT_FORMAT_UNCOMPRESSED: u8 = 0;

impl Extension {
    /// `supported_groups` listing the given curve ids.
    pub fn supported_groups(curves: &[u16]) -> Self {
        let mut w = BitWriter::new();
        w.write_u16((curves.len() * 2) as u16);
        for id in curves {
            w.write_u16(*id);
        }
        Extension {
            extension_type: ExtensionType::SupportedGroups,
            data: w.finish().into_vec(),
        }
    }

    /// `ec_point_formats` with only the uncompressed format.
    pub fn ec_point_formats() -> Self {
        Extension {
            extension_type: ExtensionType::EcPointFormats,
            data: vec![1, POINT_FORMAT_UNCOMPRESSED],
        }
    }

    /// Curve ids of a `supported_groups` extension.
    pub fn parse_supported_groups(&self) -> Result<Vec<u16>, Error> {
        let mut r = BitReader::new(&self.data);
        let list = r.read_prefixed(16)?;
        if list.len() % 2 != 0 {
            return Err(Error::ParseError("Odd supported_groups length".into()));
        }
        Ok(list
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect())
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let extension_type = ExtensionType::from_u16(r.read_u16()?);
        let data = r.read_prefixed(16)?;
        Ok(Extension {
            extension_type,
            data,
        })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write_u16(self.extension_type.as_u16());
        w.write_prefixed(16, &self.data);
    }

    /// Optional extension block at the end of a hello message.
    pub fn parse_list(r: &mut BitReader<'_>) -> Result<Vec<Extension>, Error> {
        if r.is_empty() {
            return Ok(Vec::new());
        }
        let block = r.read_prefixed(16)?;
        let mut r = BitReader::new(&block);
        let mut extensions = Vec::new();
        while !r.is_empty() {
            extensions.push(Extension::parse(&mut r)?);
        }
        Ok(extensions)
    }

    pub fn serialize_list(extensions: &[Extension], w: &mut BitWriter) {
        if extensions.is_empty() {
            return;
        }
        w.write_u16(Self::list_length(extensions) as u16 - 2);
        for e in extensions {
            e.serialize(w);
        }
    }

    /// Encoded length of the extension block, including its length prefix.
    pub fn list_length(extensions: &[Extension]) -> usize {
        if extensions.is_empty() {
            return 0;
        }
        2 + extensions.iter().map(|e| 4 + e.data.len()).sum::<usize>()
    }

    pub fn find(extensions: &[Extension], t: ExtensionType) -> Option<&Extension> {
        extensions.iter().find(|e| e.extension_type == t)
    }
}
