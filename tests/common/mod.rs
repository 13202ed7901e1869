//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// `n` samples of a unit sine at `freq` Hz sampled at `rate` Hz
pub fn sine(freq: f64, rate: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| (2.0 * PI * freq * i as f64 / rate).sin())
        .collect()
}

/// Seeded Gaussian noise source (Box-Muller)
pub struct NoiseSource {
    rng: StdRng,
}

impl NoiseSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One N(0, sigma²) sample
    pub fn gaussian(&mut self, sigma: f64) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::EPSILON..1.0);
        let u2: f64 = self.rng.gen();
        sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    /// Add N(0, sigma²) noise to every sample
    pub fn corrupt(&mut self, samples: &[f64], sigma: f64) -> Vec<f64> {
        samples.iter().map(|x| x + self.gaussian(sigma)).collect()
    }

    pub fn uniform(&mut self) -> f64 {
        self.rng.gen()
    }
}
