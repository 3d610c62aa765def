//! Named-curve registry.
//!
//! Curve identifiers follow the IANA "Supported Elliptic Curves" registry
//! (RFC 4492 §5.1.1). The table is built once and never mutated, so a
//! `&'static NamedCurve` can be shared freely between connections.
//!
//! Domain parameters are carried for the SEC prime curves from secp224k1
//! upwards. The binary curves and the small prime curves are known by name
//! only and can not be used for a key exchange.

use std::fmt;

use num_bigint::BigUint;
use once_cell::sync::Lazy;
use sec1::point::Tag;

use crate::Error;

/// Identifier of secp256r1 (NIST P-256).
pub const SECP256R1: u16 = 23;
/// Identifier of secp384r1 (NIST P-384).
pub const SECP384R1: u16 = 24;

/// Domain parameters of a short Weierstrass curve over a prime field.
pub struct CurveParams {
    /// Field prime.
    pub p: BigUint,
    pub a: BigUint,
    pub b: BigUint,
    /// Base point x.
    pub gx: BigUint,
    /// Base point y.
    pub gy: BigUint,
    /// Order of the base point.
    pub n: BigUint,
    pub cofactor: u32,
    field_len: usize,
}

/// An entry of the curve registry.
pub struct NamedCurve {
    id: u16,
    name: &'static str,
    params: Option<CurveParams>,
}

/// Affine point validated against a [`NamedCurve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcPoint {
    pub x: BigUint,
    pub y: BigUint,
}

impl NamedCurve {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Domain parameters, if the registry carries them for this curve.
    pub fn params(&self) -> Option<&CurveParams> {
        self.params.as_ref()
    }

    /// Length in bytes of one field element.
    pub fn field_len(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.field_len)
    }

    /// Decode an uncompressed SEC1 point and check that it lies on this curve.
    pub fn decode_point(&self, encoded: &[u8]) -> Result<EcPoint, Error> {
        let params = self.params.as_ref().ok_or_else(|| {
            Error::UnsupportedCurve(format!("{} has no domain parameters", self.name))
        })?;

        let Some(first) = encoded.first() else {
            return Err(Error::InvalidPoint(self.name));
        };

        match Tag::from_u8(*first) {
            Ok(Tag::Uncompressed) => {}
            _ => return Err(Error::InvalidPoint(self.name)),
        }

        let n = params.field_len;
        if encoded.len() != 1 + 2 * n {
            return Err(Error::InvalidPoint(self.name));
        }

        let point = EcPoint {
            x: BigUint::from_bytes_be(&encoded[1..1 + n]),
            y: BigUint::from_bytes_be(&encoded[1 + n..]),
        };

        if !params.contains(&point) {
            return Err(Error::InvalidPoint(self.name));
        }

        Ok(point)
    }

    /// Encode a point in uncompressed SEC1 form.
    pub fn encode_point(&self, point: &EcPoint) -> Result<Vec<u8>, Error> {
        let n = self.field_len().ok_or_else(|| {
            Error::UnsupportedCurve(format!("{} has no domain parameters", self.name))
        })?;

        let mut out = Vec::with_capacity(1 + 2 * n);
        out.push(u8::from(Tag::Uncompressed));
        out.extend_from_slice(&left_pad(&point.x.to_bytes_be(), n));
        out.extend_from_slice(&left_pad(&point.y.to_bytes_be(), n));
        Ok(out)
    }
}

impl CurveParams {
    fn new(p: &str, a: &str, b: &str, gx: &str, gy: &str, n: &str) -> Self {
        let p = hex(p);
        let field_len = ((p.bits() + 7) / 8) as usize;
        CurveParams {
            p,
            a: hex(a),
            b: hex(b),
            gx: hex(gx),
            gy: hex(gy),
            n: hex(n),
            cofactor: 1,
            field_len,
        }
    }

    /// y² = x³ + ax + b (mod p), with both coordinates reduced.
    pub fn contains(&self, point: &EcPoint) -> bool {
        if point.x >= self.p || point.y >= self.p {
            return false;
        }

        let lhs = (&point.y * &point.y) % &self.p;
        let rhs = (&point.x * &point.x * &point.x + &self.a * &point.x + &self.b) % &self.p;

        lhs == rhs
    }

    pub fn generator(&self) -> EcPoint {
        EcPoint {
            x: self.gx.clone(),
            y: self.gy.clone(),
        }
    }
}

fn hex(s: &str) -> BigUint {
    BigUint::parse_bytes(s.as_bytes(), 16).expect("valid hex curve parameter")
}

fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0; len.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

impl fmt::Debug for NamedCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedCurve")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("params", &self.params.is_some())
            .finish()
    }
}

impl PartialEq for NamedCurve {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NamedCurve {}

const NAMES: [&str; 25] = [
    "sect163k1", "sect163r1", "sect163r2", "sect193r1", "sect193r2", "sect233k1", "sect233r1",
    "sect239k1", "sect283k1", "sect283r1", "sect409k1", "sect409r1", "sect571k1", "sect571r1",
    "secp160k1", "secp160r1", "secp160r2", "secp192k1", "secp192r1", "secp224k1", "secp224r1",
    "secp256k1", "secp256r1", "secp384r1", "secp521r1",
];

static REGISTRY: Lazy<Vec<NamedCurve>> = Lazy::new(|| {
    NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let id = i as u16 + 1;
            NamedCurve {
                id,
                name,
                params: params_for(id),
            }
        })
        .collect()
});

fn params_for(id: u16) -> Option<CurveParams> {
    let params = match id {
        20 => CurveParams::new(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFE56D",
            "00000000000000000000000000000000000000000000000000000000",
            "00000000000000000000000000000000000000000000000000000005",
            "A1455B334DF099DF30FC28A169A467E9E47075A90F7E650EB6B7A45C",
            "7E089FED7FBA344282CAFBD6F7E319F7C0B0BD59E2CA4BDB556D61A5",
            "010000000000000000000000000001DCE8D2EC6184CAF0A971769FB1F7",
        ),
        21 => CurveParams::new(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF000000000000000000000001",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFFFFFFFFFFFFFFFFFFFE",
            "B4050A850C04B3ABF54132565044B0B7D7BFD8BA270B39432355FFB4",
            "B70E0CBD6BB4BF7F321390B94A03C1D356C21122343280D6115C1D21",
            "BD376388B5F723FB4C22DFE6CD4375A05A07476444D5819985007E34",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFF16A2E0B8F03E13DD29455C5C2A3D",
        ),
        22 => CurveParams::new(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F",
            "0000000000000000000000000000000000000000000000000000000000000000",
            "0000000000000000000000000000000000000000000000000000000000000007",
            "79BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798",
            "483ADA7726A3C4655DA4FBFC0E1108A8FD17B448A68554199C47D08FFB10D4B8",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141",
        ),
        23 => CurveParams::new(
            "FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFF",
            "FFFFFFFF00000001000000000000000000000000FFFFFFFFFFFFFFFFFFFFFFFC",
            "5AC635D8AA3A93E7B3EBBD55769886BC651D06B0CC53B0F63BCE3C3E27D2604B",
            "6B17D1F2E12C4247F8BCE6E563A440F277037D812DEB33A0F4A13945D898C296",
            "4FE342E2FE1A7F9B8EE7EB4A7C0F9E162BCE33576B315ECECBB6406837BF51F5",
            "FFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551",
        ),
        24 => CurveParams::new(
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFFFF0000000000000000FFFFFFFF",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFFFF0000000000000000FFFFFFFC",
            "B3312FA7E23EE7E4988E056BE3F82D19181D9C6EFE8141120314088F5013875AC656398D8A2ED19D2A85C8EDD3EC2AEF",
            "AA87CA22BE8B05378EB1C71EF320AD746E1D3B628BA79B9859F741E082542A385502F25DBF55296C3A545E3872760AB7",
            "3617DE4A96262C6F5D9E98BF9292DC29F8F41DBD289A147CE9DA3113B5F0B8C00A60B1CE1D7E819D7A431D7C90EA0E5F",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC7634D81F4372DDF581A0DB248B0A77AECEC196ACCC52973",
        ),
        25 => CurveParams::new(
            "01FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
            "01FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFC",
            "0051953EB9618E1C9A1F929A21A0B68540EEA2DA725B99B315F3B8B489918EF109E156193951EC7E937B1652C0BD3BB1BF073573DF883D2C34F1EF451FD46B503F00",
            "00C6858E06B70404E9CD9E3ECB662395B4429C648139053FB521F828AF606B4D3DBAA14B5E77EFE75928FE1DC127A2FFA8DE3348B3C1856A429BF97E7E31C2E5BD66",
            "011839296A789A3BC0045C8A5FB42C7D1BD998F54449579B446817AFBD17273E662C97EE72995EF42640C550B9013FAD0761353C7086A272C24088BE94769FD16650",
            "01FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFA51868783BF2F966B7FCC0148F709A5D03BB5C9B8899C47AEBB6FB71E91386409",
        ),
        _ => return None,
    };
    Some(params)
}

/// Look up a curve by its wire identifier. Id 0 is reserved and never found.
pub fn lookup_by_id(id: u16) -> Option<&'static NamedCurve> {
    REGISTRY.iter().find(|c| c.id == id)
}

/// Look up a curve by its SEC name, e.g. `"secp256r1"`.
pub fn lookup_by_name(name: &str) -> Option<&'static NamedCurve> {
    REGISTRY.iter().find(|c| c.name == name)
}

/// All registered curves in id order.
pub fn all() -> &'static [NamedCurve] {
    &REGISTRY
}
