use std::fmt;

use crate::codec::{BitReader, BitWriter};
use crate::crypto::key_exchange::{decode_public_key, EcPublicKey, EphemeralKeyPair};
use crate::crypto::signing::{SigningKey, VerifyingKey};
use crate::Error;

use super::Random;

const CURVE_TYPE_BITS: usize = 8;
const NAMED_CURVE_BITS: usize = 16;
const POINT_LENGTH_BITS: usize = 8;
const SIGNATURE_LENGTH_BITS: usize = 16;

const MAX_POINT_LEN: usize = (1 << POINT_LENGTH_BITS) - 1;
const MAX_SIGNATURE_LEN: usize = (1 << SIGNATURE_LENGTH_BITS) - 1;

/// ECCurveType of RFC 4492 §5.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    ExplicitPrime,
    ExplicitChar2,
    NamedCurve,
    Unknown(u8),
}

impl CurveType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => CurveType::ExplicitPrime,
            2 => CurveType::ExplicitChar2,
            3 => CurveType::NamedCurve,
            _ => CurveType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CurveType::ExplicitPrime => 1,
            CurveType::ExplicitChar2 => 2,
            CurveType::NamedCurve => 3,
            CurveType::Unknown(value) => *value,
        }
    }
}

/// Outcome of a successful [`EcdhServerKeyExchange::verify_signature`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    /// The parameters are signed by the server's certified key.
    Authenticated,
    /// The message carried no signature. Nothing binds the key to the server.
    Anonymous,
}

/// ServerKeyExchange for ECDHE over a named curve.
///
/// ```text
/// curve_type(8) = 3 | curve_id(16) | point_len(8) | point | [sig_len(16) | sig]
/// ```
///
/// The signature block is present iff bytes remain after the point.
#[derive(Clone)]
pub struct EcdhServerKeyExchange {
    curve_id: u16,
    point: Vec<u8>,
    signature: Option<Vec<u8>>,
    public_key: Option<EcPublicKey>,
}

impl EcdhServerKeyExchange {
    /// Server side: publish `key_pair` and sign it with `signing_key`.
    pub fn new_signed(
        key_pair: &EphemeralKeyPair,
        signing_key: &SigningKey,
        client_random: &Random,
        server_random: &Random,
    ) -> Result<Self, Error> {
        let mut ske = Self::from_parts(key_pair.curve_id(), key_pair.public_point().to_vec(), None)?;
        let payload = ske.signed_payload(client_random, server_random);
        ske.signature = Some(signing_key.sign(&payload)?);
        Ok(ske)
    }

    pub fn from_parts(
        curve_id: u16,
        point: Vec<u8>,
        signature: Option<Vec<u8>>,
    ) -> Result<Self, Error> {
        if point.len() > MAX_POINT_LEN {
            return Err(Error::ParseError(format!("Point too long: {}", point.len())));
        }
        if let Some(sig) = &signature {
            if sig.len() > MAX_SIGNATURE_LEN {
                return Err(Error::ParseError(format!("Signature too long: {}", sig.len())));
            }
        }
        Ok(EcdhServerKeyExchange {
            curve_id,
            point,
            signature,
            public_key: None,
        })
    }

    pub fn curve_id(&self) -> u16 {
        self.curve_id
    }

    pub fn point(&self) -> &[u8] {
        &self.point
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    /// The bytes covered by the signature.
    ///
    /// `client_random || server_random || 3 || curve_id || point_len || point`
    pub fn signed_payload(&self, client_random: &Random, server_random: &Random) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bytes(&client_random.to_bytes());
        w.write_bytes(&server_random.to_bytes());
        self.serialize_params(&mut w);
        w.finish().into_vec()
    }

    /// Check the signature against the server's certified key.
    ///
    /// A message without signature yields [`TrustState::Anonymous`]; whether
    /// that is acceptable is up to the caller.
    pub fn verify_signature(
        &self,
        server_key: &VerifyingKey,
        client_random: &Random,
        server_random: &Random,
    ) -> Result<TrustState, Error> {
        let Some(signature) = &self.signature else {
            return Ok(TrustState::Anonymous);
        };

        let payload = self.signed_payload(client_random, server_random);
        server_key
            .verify(&payload, signature)
            .map_err(|_| Error::SignatureVerificationFailed)?;

        Ok(TrustState::Authenticated)
    }

    /// The server's ephemeral public key, decoded on first access.
    pub fn public_key(&mut self) -> Result<&EcPublicKey, Error> {
        let key = match self.public_key.take() {
            Some(key) => key,
            None => decode_public_key(self.curve_id, &self.point)?,
        };
        Ok(self.public_key.insert(key))
    }

    pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
        let curve_type = CurveType::from_u8(r.read(CURVE_TYPE_BITS)? as u8);

        match curve_type {
            CurveType::NamedCurve => {}
            CurveType::ExplicitPrime | CurveType::ExplicitChar2 => {
                return Err(Error::UnsupportedCurve(format!(
                    "{:?} in ServerKeyExchange",
                    curve_type
                )));
            }
            CurveType::Unknown(v) => {
                return Err(Error::UnsupportedCurve(format!("Unknown curve type {}", v)));
            }
        }

        let curve_id = r.read(NAMED_CURVE_BITS)? as u16;
        let point = r.read_prefixed(POINT_LENGTH_BITS)?;

        let signature = if r.is_empty() {
            None
        } else {
            Some(r.read_prefixed(SIGNATURE_LENGTH_BITS)?)
        };

        Ok(EcdhServerKeyExchange {
            curve_id,
            point,
            signature,
            public_key: None,
        })
    }

    fn serialize_params(&self, w: &mut BitWriter) {
        w.write(CurveType::NamedCurve.as_u8() as u64, CURVE_TYPE_BITS);
        w.write(self.curve_id as u64, NAMED_CURVE_BITS);
        w.write_prefixed(POINT_LENGTH_BITS, &self.point);
    }

    pub fn serialize(&self, w: &mut BitWriter) {
        self.serialize_params(w);
        if let Some(signature) = &self.signature {
            w.write_prefixed(SIGNATURE_LENGTH_BITS, signature);
        }
    }

    pub fn length(&self) -> usize {
        let params = 1 + 2 + 1 + self.point.len();
        match &self.signature {
            Some(sig) => params + 2 + sig.len(),
            None => params,
        }
    }
}

impl PartialEq for EcdhServerKeyExchange {
    fn eq(&self, other: &Self) -> bool {
        self.curve_id == other.curve_id
            && self.point == other.point
            && self.signature == other.signature
    }
}

impl Eq for EcdhServerKeyExchange {}

impl fmt::Debug for EcdhServerKeyExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdhServerKeyExchange")
            .field("curve_id", &self.curve_id)
            .field("point", &self.point.len())
            .field("signature", &self.signature.as_ref().map(|s| s.len()))
            .finish()
    }
}
