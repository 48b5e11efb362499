//! Seeded Gaussian noise sources for sensor synthesis.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::geom::{Real, Vector3r};

/// A deterministic stream of standard-normal draws.
///
/// Every sensor owns one, seeded from the master seed, so that two runs from
/// the same seed produce identical noise and one sensor's draw count cannot
/// perturb another's stream.
pub struct GaussianGenerator {
    rng: ChaCha8Rng,
    normal: Normal<f64>,
}

impl GaussianGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            // Unit normal; callers scale by their own sigma.
            normal: Normal::new(0.0, 1.0).expect("unit normal is always valid"),
        }
    }

    /// One standard-normal scalar draw.
    pub fn next(&mut self) -> Real {
        self.normal.sample(&mut self.rng) as Real
    }

    /// One standard-normal vector draw (three independent components).
    pub fn next_vector3(&mut self) -> Vector3r {
        Vector3r::new(self.next(), self.next(), self.next())
    }

    /// Re-seeds the stream, restoring the post-construction state.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = ChaCha8Rng::seed_from_u64(seed);
    }
}

/// Derives a subsystem seed from the master seed, spreading bits with an odd
/// multiplier so subsystem streams stay independent.
pub fn derive_seed(master: u64, stream: u64) -> u64 {
    master
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add(stream.wrapping_mul(0x517c_c1b7_2722_0a95))
}
