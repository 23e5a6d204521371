//! Seedable Gaussian noise for telemetry perturbation.
//!
//! Each actor owns its own source so that fleets can be replayed from a seed
//! without actors contending for a shared generator.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

#[derive(Debug, Clone)]
pub struct NoiseSource {
    rng: ChaCha8Rng,
}

impl NoiseSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }

    /// Zero-mean Gaussian sample. A zero, negative or non-finite deviation
    /// yields no noise.
    pub fn gaussian(&mut self, std_dev: f64) -> f64 {
        if std_dev == 0.0 {
            return 0.0;
        }
        match Normal::new(0.0, std_dev) {
            Ok(normal) if std_dev.is_finite() => normal.sample(&mut self.rng),
            _ => 0.0,
        }
    }

    pub fn perturb(&mut self, value: f64, std_dev: f64) -> f64 {
        value + self.gaussian(std_dev)
    }
}
