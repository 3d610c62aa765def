//! Seedable source of non-cryptographic randomness.
//!
//! Retransmission jitter draws from here. With [`Config::rng_seed`] set, the
//! jitter sequence becomes deterministic, which the tests rely on.
//!
//! [`Config::rng_seed`]: crate::Config::rng_seed

use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub struct SeededRng {
    inner: Option<StdRng>,
}

impl SeededRng {
    /// `Some(seed)` gives a deterministic sequence, `None` uses the thread rng.
    pub fn new(seed: Option<u64>) -> Self {
        SeededRng {
            inner: seed.map(StdRng::seed_from_u64),
        }
    }

    pub fn gen<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        match self.inner.as_mut() {
            Some(rng) => rng.gen(),
            None => rand::random(),
        }
    }
}

impl std::fmt::Debug for SeededRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeededRng")
            .field("seeded", &self.inner.is_some())
            .finish()
    }
}
