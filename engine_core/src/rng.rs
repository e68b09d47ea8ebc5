//! Deterministic random number generation for `rng` state-delta ops.
//!
//! Same seed, same sequence of draws: a replayed session reproduces every
//! categorical draw exactly. Uses ChaCha8 for speed while keeping
//! high-quality randomness.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seedable RNG owned by a game session.
#[derive(Clone, Debug)]
pub struct GameRng {
    inner: ChaCha8Rng,
    seed: u64,
}

impl GameRng {
    /// Create a new RNG with the given seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            inner: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// The seed this RNG was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw an index under a categorical distribution.
    ///
    /// Weights do not need to sum to 1.0. Returns `None` if the weights are
    /// empty or all zero.
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return None;
        }

        let mut threshold = self.inner.gen::<f64>() * total;
        for (index, &weight) in weights.iter().enumerate() {
            threshold -= weight;
            if threshold <= 0.0 {
                return Some(index);
            }
        }
        // Floating point edge case - land on the last element.
        Some(weights.len() - 1)
    }
}
