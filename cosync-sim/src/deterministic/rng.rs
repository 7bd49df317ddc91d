//! Seeded random numbers for reproducible scenarios.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 so the same seed yields the same schedules and load
/// profiles on every platform.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Generates random number in range [0, 1).
    pub fn random_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Generates random number in range [min, max), or `min` if empty.
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.rng.next_u64() % (max - min))
    }

    /// Generates a value in [min, max) with two decimals, as power readings arrive.
    pub fn random_power(&mut self, min: f64, max: f64) -> f64 {
        let value = min + self.random_f64() * (max - min);
        (value * 100.0).round() / 100.0
    }

    /// Generates random boolean with given probability.
    pub fn random_bool(&mut self, probability: f64) -> bool {
        self.random_f64() < probability
    }

    /// Selects random element from slice.
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        if slice.is_empty() {
            return None;
        }
        let index = self.random_range(0, slice.len() as u64) as usize;
        slice.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_rng_reproducibility() {
        let mut rng1 = DeterministicRng::from_seed(12345);
        let mut rng2 = DeterministicRng::from_seed(12345);

        let values1: Vec<u64> = (0..10).map(|_| rng1.random_range(0, 100)).collect();
        let values2: Vec<u64> = (0..10).map(|_| rng2.random_range(0, 100)).collect();

        assert_eq!(values1, values2);
        assert_eq!(rng1.seed(), 12345);
    }

    #[test]
    fn test_empty_range_returns_min() {
        let mut rng = DeterministicRng::from_seed(1);
        assert_eq!(rng.random_range(7, 7), 7);
        assert!(rng.choose::<u8>(&[]).is_none());
    }

    #[test]
    fn test_power_values_stay_in_range() {
        let mut rng = DeterministicRng::from_seed(99);
        for _ in 0..100 {
            let value = rng.random_power(-2.0, 5.0);
            assert!((-2.0..=5.0).contains(&value));
        }
    }
}
