//! Ephemeral ECDH over the named curves we can compute on.
//!
//! The curve registry knows more curves than we have arithmetic for. Only
//! those accepted by [`is_supported`] can be negotiated.

use elliptic_curve::sec1::ToEncodedPoint;
use p256::{ecdh::EphemeralSecret as P256EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::curve::{self, EcPoint, NamedCurve, SECP256R1, SECP384R1};
use crate::Error;

/// Whether ECDHE over `curve_id` can be performed.
pub fn is_supported(curve_id: u16) -> bool {
    matches!(curve_id, SECP256R1 | SECP384R1)
}

/// A peer's ephemeral public key, validated to lie on its curve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPublicKey {
    curve: &'static NamedCurve,
    point: EcPoint,
    encoded: Vec<u8>,
}

impl EcPublicKey {
    pub fn curve(&self) -> &'static NamedCurve {
        self.curve
    }

    pub fn point(&self) -> &EcPoint {
        &self.point
    }

    /// Uncompressed SEC1 encoding.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }
}

/// Decode an uncompressed point for `curve_id` from the registry.
pub fn decode_public_key(curve_id: u16, encoded: &[u8]) -> Result<EcPublicKey, Error> {
    let curve = curve::lookup_by_id(curve_id)
        .ok_or_else(|| Error::UnsupportedCurve(format!("Unknown named curve {}", curve_id)))?;

    let point = curve.decode_point(encoded)?;

    Ok(EcPublicKey {
        curve,
        point,
        encoded: encoded.to_vec(),
    })
}

/// Our side of an ephemeral ECDH exchange.
pub enum EphemeralKeyPair {
    P256 {
        secret: P256EphemeralSecret,
        public: Vec<u8>,
    },
    P384 {
        secret: P384EphemeralSecret,
        public: Vec<u8>,
    },
}

impl EphemeralKeyPair {
    pub fn generate(curve_id: u16) -> Result<Self, Error> {
        let kx = match curve_id {
            SECP256R1 => {
                let secret = P256EphemeralSecret::random(&mut OsRng);
                let public = P256PublicKey::from(&secret)
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                EphemeralKeyPair::P256 { secret, public }
            }
            SECP384R1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                let public = P384PublicKey::from(&secret)
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                EphemeralKeyPair::P384 { secret, public }
            }
            _ => {
                return Err(Error::UnsupportedCurve(format!(
                    "No key exchange for curve {}",
                    curve_id
                )))
            }
        };
        Ok(kx)
    }

    pub fn curve_id(&self) -> u16 {
        match self {
            EphemeralKeyPair::P256 { .. } => SECP256R1,
            EphemeralKeyPair::P384 { .. } => SECP384R1,
        }
    }

    /// Our public point, uncompressed.
    pub fn public_point(&self) -> &[u8] {
        match self {
            EphemeralKeyPair::P256 { public, .. } => public,
            EphemeralKeyPair::P384 { public, .. } => public,
        }
    }

    /// The premaster secret: the x coordinate of the shared point, left
    /// padded to the field length.
    pub fn compute_shared_secret(&self, peer: &EcPublicKey) -> Result<Zeroizing<Vec<u8>>, Error> {
        if peer.curve().id() != self.curve_id() {
            return Err(Error::UnsupportedCurve(format!(
                "Peer key on {} does not match {}",
                peer.curve().name(),
                self.curve_id()
            )));
        }

        let secret = match self {
            EphemeralKeyPair::P256 { secret, .. } => {
                let pk = P256PublicKey::from_sec1_bytes(peer.encoded())
                    .map_err(|_| Error::InvalidPoint(peer.curve().name()))?;
                secret.diffie_hellman(&pk).raw_secret_bytes().to_vec()
            }
            EphemeralKeyPair::P384 { secret, .. } => {
                let pk = P384PublicKey::from_sec1_bytes(peer.encoded())
                    .map_err(|_| Error::InvalidPoint(peer.curve().name()))?;
                secret.diffie_hellman(&pk).raw_secret_bytes().to_vec()
            }
        };

        Ok(Zeroizing::new(secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_sides_agree() {
        for curve_id in [SECP256R1, SECP384R1] {
            let a = EphemeralKeyPair::generate(curve_id).unwrap();
            let b = EphemeralKeyPair::generate(curve_id).unwrap();

            let a_pub = decode_public_key(curve_id, a.public_point()).unwrap();
            let b_pub = decode_public_key(curve_id, b.public_point()).unwrap();

            let s1 = a.compute_shared_secret(&b_pub).unwrap();
            let s2 = b.compute_shared_secret(&a_pub).unwrap();
            assert_eq!(*s1, *s2);

            let field_len = a_pub.curve().field_len().unwrap();
            assert_eq!(s1.len(), field_len);
            assert_eq!(a.public_point().len(), 1 + 2 * field_len);
        }
    }

    #[test]
    fn mismatched_curves() {
        let a = EphemeralKeyPair::generate(SECP256R1).unwrap();
        let b = EphemeralKeyPair::generate(SECP384R1).unwrap();
        let b_pub = decode_public_key(SECP384R1, b.public_point()).unwrap();
        assert!(matches!(
            a.compute_shared_secret(&b_pub),
            Err(Error::UnsupportedCurve(_))
        ));
    }

    #[test]
    fn no_arithmetic_for_registry_only_curves() {
        assert!(is_supported(SECP256R1));
        assert!(!is_supported(22));
        assert!(matches!(
            EphemeralKeyPair::generate(22),
            Err(Error::UnsupportedCurve(_))
        ));
    }
}
