//! Simplex noise field shared by turbulence, breathing and the fog flow

use noise::{NoiseFn, Simplex};

/// Coordinates beyond this magnitude sample as flat noise
pub const MAX_COORDINATE: f32 = 1.0e6;

#[derive(Clone, Copy)]
pub struct NoiseField {
    simplex: Simplex,
}

impl NoiseField {
    pub fn new(seed: u64) -> Self {
        // Fold the 64-bit simulation seed into the 32 bits the permutation table takes
        let folded = (seed ^ (seed >> 32)) as u32;
        Self {
            simplex: Simplex::new(folded),
        }
    }

    /// Sample in [-1, 1]. Non-finite or out-of-range coordinates read as 0.
    #[inline]
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        let in_range = |v: f32| v.is_finite() && v.abs() <= MAX_COORDINATE;
        if !(in_range(x) && in_range(y) && in_range(z)) {
            return 0.0;
        }
        let n = self.simplex.get([x as f64, y as f64, z as f64]) as f32;
        if n.is_finite() {
            n.clamp(-1.0, 1.0)
        } else {
            0.0
        }
    }
}

impl std::fmt::Debug for NoiseField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseField").finish_non_exhaustive()
    }
}
