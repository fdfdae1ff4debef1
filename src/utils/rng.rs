// Seeded RNG streams and unique media ids.
//
// - RngStream: a reproducible PRNG stream (ChaCha8)
// - IdGenerator: short lowercase alphanumeric ids, never repeated by one generator

use std::collections::HashSet;

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Type alias for the default RNG stream used across the crate.
pub type RngStream = ChaCha8Rng;

/// Create a new RNG stream from a root seed.
pub fn rng_from_seed(seed: u64) -> RngStream {
    RngStream::seed_from_u64(seed)
}

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of ids produced by [`IdGenerator`].
pub const ID_LEN: usize = 8;

/// Produces ids such as `k3x9a0qz` for media output names.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    rng: RngStream,
    issued: HashSet<String>,
}

impl IdGenerator {
    /// Generator seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self { rng: RngStream::from_entropy(), issued: HashSet::new() }
    }

    /// Reproducible generator.
    pub fn from_seed(seed: u64) -> Self {
        Self { rng: rng_from_seed(seed), issued: HashSet::new() }
    }

    /// Next id not yet returned by this generator.
    pub fn generate_id(&mut self) -> String {
        let dist = Uniform::from(0..ID_ALPHABET.len());
        loop {
            let id: String = (0..ID_LEN)
                .map(|_| ID_ALPHABET[dist.sample(&mut self.rng)] as char)
                .collect();
            if self.issued.insert(id.clone()) {
                return id;
            }
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self { Self::from_entropy() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    #[test]
    fn rng_stream_is_reproducible() {
        let mut r1 = rng_from_seed(7);
        let mut r2 = rng_from_seed(7);
        for _ in 0..10 {
            assert_eq!(r1.next_u64(), r2.next_u64());
        }
    }

    #[test]
    fn ids_are_short_alphanumeric_and_unique() {
        let mut ids = IdGenerator::from_seed(3);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = ids.generate_id();
            assert_eq!(id.len(), ID_LEN);
            assert!(id.bytes().all(|b| ID_ALPHABET.contains(&b)));
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn seeded_ids_are_deterministic() {
        let a: Vec<_> = { let mut g = IdGenerator::from_seed(11); (0..5).map(|_| g.generate_id()).collect() };
        let b: Vec<_> = { let mut g = IdGenerator::from_seed(11); (0..5).map(|_| g.generate_id()).collect() };
        assert_eq!(a, b);
    }
}
