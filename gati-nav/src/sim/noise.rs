//! Seeded Gaussian noise for simulated sensor samples

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

/// Noise generator with configurable seed for reproducibility
#[derive(Clone)]
pub struct NoiseGenerator {
    rng: SmallRng,
}

impl NoiseGenerator {
    /// Create a new noise generator
    ///
    /// If seed is 0, uses random entropy for non-deterministic behavior.
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Gaussian noise with given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f64) -> f64 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f64 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// `value` plus noise, rounded and clamped to the 10-bit ADC range
    pub fn adc_sample(&mut self, value: i32, stddev: f64) -> i32 {
        let noisy = value as f64 + self.gaussian(stddev);
        (noisy.round() as i32).clamp(0, 1023)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_seed() {
        let mut noise1 = NoiseGenerator::new(42);
        let mut noise2 = NoiseGenerator::new(42);

        for _ in 0..100 {
            assert_eq!(noise1.adc_sample(500, 12.0), noise2.adc_sample(500, 12.0));
        }
    }

    #[test]
    fn test_zero_stddev() {
        let mut noise = NoiseGenerator::new(42);
        assert_eq!(noise.gaussian(0.0), 0.0);
        assert_eq!(noise.adc_sample(870, 0.0), 870);
    }

    #[test]
    fn test_adc_range() {
        let mut noise = NoiseGenerator::new(7);
        for _ in 0..1000 {
            let s = noise.adc_sample(1020, 50.0);
            assert!((0..=1023).contains(&s));
            let s = noise.adc_sample(3, 50.0);
            assert!((0..=1023).contains(&s));
        }
    }
}
