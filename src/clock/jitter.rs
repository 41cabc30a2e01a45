//! Gaussian measurement noise for master readings.

use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded source of rounded Gaussian noise (Box–Muller transform).
#[derive(Debug, Clone)]
pub struct Jitter {
    sd: f64,
    rng: StdRng,
    spare: Option<f64>,
}

impl Jitter {
    pub fn new(sd: f64, seed: u64) -> Self {
        Jitter {
            sd,
            rng: StdRng::seed_from_u64(seed),
            spare: None,
        }
    }

    /// Draw one noise sample in whole ticks, rounded half to even.
    ///
    /// With a zero standard deviation no random numbers are consumed.
    pub fn sample(&mut self) -> i64 {
        if self.sd == 0.0 {
            return 0;
        }
        (self.standard_normal() * self.sd).round_ties_even() as i64
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.spare.take() {
            return z;
        }
        // u1 in (0, 1] keeps ln() finite
        let u1 = 1.0 - self.rng.gen::<f64>();
        let u2 = self.rng.gen::<f64>();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * PI * u2;
        self.spare = Some(radius * angle.sin());
        radius * angle.cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sd_is_silent() {
        let mut jitter = Jitter::new(0.0, 7);
        assert!((0..1000).all(|_| jitter.sample() == 0));
    }

    #[test]
    fn same_seed_same_noise() {
        let mut a = Jitter::new(6.0, 42);
        let mut b = Jitter::new(6.0, 42);
        let xs: Vec<i64> = (0..100).map(|_| a.sample()).collect();
        let ys: Vec<i64> = (0..100).map(|_| b.sample()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn noise_has_roughly_requested_spread() {
        let mut jitter = Jitter::new(6.0, 1);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| jitter.sample() as f64).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;

        assert!(mean.abs() < 0.3, "mean {mean}");
        assert!((var.sqrt() - 6.0).abs() < 0.5, "sd {}", var.sqrt());
    }
}
