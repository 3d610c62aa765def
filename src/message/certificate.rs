use crate::codec::{BitReader, BitWriter};
use crate::Error;

const LIST_LENGTH_BITS: usize = 24;
const CERT_LENGTH_BITS: usize = 24;

/// Certificate chain, leaf first. Each entry is a DER encoded X.509 certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    pub certificate_list: Vec<Vec<u8>>,
}

impl Certificate {
    pub fn new(certificate_list: Vec<Vec<u8>>) -> Self {
        Certificate { certificate_list }
    }

    pub fn leaf(&self) -> Option<&[u8]> {
        self.certificate_list.first().map(|c| c.as_slice())
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let list = r.read_prefixed(LIST_LENGTH_BITS)?;
        let mut r = BitReader::new(&list);

        let mut certificate_list = Vec::new();
        while !r.is_empty() {
            certificate_list.push(r.read_prefixed(CERT_LENGTH_BITS)?);
        }

        Ok(Certificate { certificate_list })
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        w.write((self.length() - 3) as u64, LIST_LENGTH_BITS);
        for cert in &self.certificate_list {
            w.write_prefixed(CERT_LENGTH_BITS, cert);
        }
    }

    pub fn length(&self) -> usize {
        3 + self
            .certificate_list
            .iter()
            .map(|c| 3 + c.len())
            .sum::<usize>()
    }
}
