use std::fmt;
use std::ops::Deref;

use rand::RngCore;

use crate::codec::{BitReader, BitWriter};
use crate::Error;

macro_rules! var_array {
    ($name:ident, $max:expr) => {
        /// Length-prefixed opaque value of at most
        #[doc = stringify!($max)]
        /// bytes.
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            len: u8,
            data: [u8; $max],
        }

        impl $name {
            pub const MAX_LEN: usize = $max;

            pub fn empty() -> Self {
                $name {
                    len: 0,
                    data: [0; $max],
                }
            }

            pub fn try_new(bytes: &[u8]) -> Result<Self, Error> {
                if bytes.len() > $max {
                    return Err(Error::ParseError(format!(
                        "{} too long: {}",
                        stringify!($name),
                        bytes.len()
                    )));
                }
                let mut data = [0; $max];
                data[..bytes.len()].copy_from_slice(bytes);
                Ok($name {
                    len: bytes.len() as u8,
                    data,
                })
            }

            pub fn random() -> Self {
                let mut data = [0; $max];
                rand::thread_rng().fill_bytes(&mut data);
                $name {
                    len: $max as u8,
                    data,
                }
            }

            pub fn parse(r: &mut BitReader<'_>) -> Result<Self, Error> {
                let bytes = r.read_prefixed(8)?;
                Self::try_new(&bytes)
            }

            pub fn serialize(&self, w: &mut BitWriter) {
                w.write_prefixed(8, self);
            }
        }

        impl Deref for $name {
            type Target = [u8];

            fn deref(&self) -> &Self::Target {
                &self.data[..self.len as usize]
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(", stringify!($name))?;
                for b in self.iter().take(4) {
                    write!(f, "{:02x}", b)?;
                }
                if self.len() > 4 {
                    write!(f, "..")?;
                }
                write!(f, ")")
            }
        }
    };
}

var_array!(SessionId, 32);
var_array!(Cookie, 255);
