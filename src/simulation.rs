//! Seeded synthetic cohorts for tests and harmonization validation.

use rand::distributions::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;

/// Uniformly sampled integer ages in `[min_age, max_age)`.
pub fn population(min_age: i64, max_age: i64, n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(min_age..max_age) as f64).collect()
}

/// Linear decline of a regional measure with age, plus Gaussian noise.
pub fn ageing(
    population: &[f64],
    slope: f64,
    intercept: f64,
    noise_level: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    if noise_level == 0.0 {
        return population.iter().map(|&a| a * slope + intercept).collect();
    }
    let noise = Normal::new(0.0, noise_level).expect("positive noise level");
    population
        .iter()
        .map(|&a| a * slope + intercept + noise.sample(&mut rng))
        .collect()
}

/// A noisy brain-age reading: chronological age plus scaled Gaussian noise.
pub fn brainage(population: &[f64], seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).expect("unit normal");
    population
        .iter()
        .map(|&a| a + noise.sample(&mut rng) * 5.0)
        .collect()
}

/// Plain Gaussian sample, handy for distribution-estimation tests.
pub fn gaussian_sample(mu: f64, std: f64, n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let dist = Normal::new(mu, std).expect("positive std");
    (0..n).map(|_| dist.sample(&mut rng)).collect()
}
