use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use crate::error::Result;

/// Root source of randomness for a network. Hands out one 32-bit seed
/// per call; every consumer (neuron weight init, dropout mask sampling)
/// seeds its own private generator from it, so the whole network is
/// reproducible from a single root seed.
#[derive(Debug, Clone)]
pub struct SeedGenerator {
    rng: Pcg32,
}

impl SeedGenerator {
    /// `None` seeds from OS entropy, `Some(seed)` gives a fixed,
    /// reproducible stream.
    pub fn new(seed: Option<u32>) -> Self {
        let rng = match seed {
            Some(seed) => Pcg32::seed_from_u64(u64::from(seed)),
            None => Pcg32::from_entropy(),
        };
        Self { rng }
    }

    /// Advances the stream and returns the next seed.
    pub fn seed(&mut self) -> u32 {
        self.rng.gen()
    }

    /// Exact generator state as a single whitespace-free token, suitable
    /// for the text persistence format.
    pub fn state_token(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.rng)?)
    }

    pub fn from_state_token(token: &str) -> Result<Self> {
        Ok(Self {
            rng: serde_json::from_str(token)?,
        })
    }
}
