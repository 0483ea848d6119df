//! Deterministic column generators for the benchmark driver.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Seeded generator filling columns in place.
pub struct DataGenerator {
    rng: StdRng,
}

impl DataGenerator {
    /// Generator with a fixed seed, for reproducible runs.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator seeded from the OS.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Fill `out` with `min..max` cycled and shuffled: uniform values with an
    /// exactly flat histogram.
    pub fn basic_uniform_i64(&mut self, out: &mut [i64], min: i64, max: i64) {
        let span = max - min;
        for (i, value) in out.iter_mut().enumerate() {
            *value = (i as i64 % span) + min;
        }
        out.shuffle(&mut self.rng);
    }

    /// `basic_uniform` for 4-byte keys.
    pub fn basic_uniform_u32(&mut self, out: &mut [u32], min: u32, max: u32) {
        let span = max - min;
        for (i, value) in out.iter_mut().enumerate() {
            *value = (i as u32 % span) + min;
        }
        out.shuffle(&mut self.rng);
    }

    /// Fill `out` with independently drawn values from `min..max`.
    pub fn uniform_u32(&mut self, out: &mut [u32], min: u32, max: u32) {
        for value in out.iter_mut() {
            *value = self.rng.gen_range(min..max);
        }
    }

    /// `out[i] = i`.
    pub fn id_u32(&mut self, out: &mut [u32]) {
        for (i, value) in out.iter_mut().enumerate() {
            *value = i as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_uniform_histogram_is_flat() {
        let mut gen = DataGenerator::new(7);
        let mut data = vec![0i64; 40];
        gen.basic_uniform_i64(&mut data, 1, 5);
        for v in 1..5 {
            assert_eq!(data.iter().filter(|&&x| x == v).count(), 10);
        }
    }

    #[test]
    fn test_same_seed_same_column() {
        let mut a = vec![0u32; 64];
        let mut b = vec![0u32; 64];
        DataGenerator::new(3).basic_uniform_u32(&mut a, 0, 16);
        DataGenerator::new(3).basic_uniform_u32(&mut b, 0, 16);
        assert_eq!(a, b);
    }

    #[test]
    fn test_id_fills_indices() {
        let mut data = vec![0u32; 8];
        DataGenerator::new(0).id_u32(&mut data);
        assert_eq!(data, [0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_uniform_respects_bounds() {
        let mut gen = DataGenerator::new(11);
        let mut data = vec![0u32; 256];
        gen.uniform_u32(&mut data, 10, 20);
        assert!(data.iter().all(|&v| (10..20).contains(&v)));
    }
}
