// Path: crates/test_utils/src/randomness/mod.rs
//! Deterministic randomness for reproducible tests.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A seeded RNG used to derive reproducible keypairs, committees, and
/// [`SimTransport`](crate::sim_transport::SimTransport) latency/loss rolls.
/// Two [`TestRng`]s built from the same seed produce identical sequences.
pub struct TestRng {
    rng: StdRng,
}

impl TestRng {
    /// Builds an RNG seeded from a single `u64`, left-padded into the
    /// 32-byte seed `StdRng` requires.
    pub fn new(seed: u64) -> Self {
        let mut seed_array = [0u8; 32];
        seed_array[..8].copy_from_slice(&seed.to_le_bytes());
        Self { rng: StdRng::from_seed(seed_array) }
    }

    /// Fills `dest` with random bytes.
    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    /// Draws a random `u32`.
    pub fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Draws a random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Draws a random `f64` in `[0, 1)`, used for loss/partition rolls.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}

impl Default for TestRng {
    fn default() -> Self {
        Self::new(12345)
    }
}
