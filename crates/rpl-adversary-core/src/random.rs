//! Random number source for timer jitter
//!
//! The platform randomness is a collaborator; this trait is the narrow slice of
//! it the scheduler needs. `SeededRandom` makes whole runs reproducible.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Abstraction for random number generation
pub trait RandomSource: Send {
    /// Generate random u64 in `[start, end)`; returns `start` for an empty range
    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64;
}

/// System randomness using entropy-seeded RNG
pub struct SystemRandom {
    rng: StdRng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64 {
        if start >= end {
            return start;
        }
        self.rng.gen_range(start..end)
    }
}

/// Deterministic randomness using seeded RNG
pub struct SeededRandom {
    rng: StdRng,
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64 {
        if start >= end {
            return start;
        }
        self.rng.gen_range(start..end)
    }
}
