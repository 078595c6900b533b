//! Shape Function Library
//! Twenty closed-form loci the core particles morph between.
//!
//! Every function maps a particle index to a point in world space. Shapes that
//! scatter particles over a surface or volume draw from the supplied RNG, so the
//! same index can land on a different point between calls unless the caller
//! hands in a reseeded stream.

use std::f32::consts::PI;

use glam::Vec3;
use rand::Rng;

/// Core geometries, in selector order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CoreShape {
    Tornado,
    Cube,
    NeuralSphere,
    Heart,
    DnaHelix,
    Ring,
    Pyramid,
    InfinityLoop,
    StarCluster,
    DigitalRain,
    Atom,
    GridPlains,
    Saturn,
    DataSpike,
    CrossFire,
    FluidWave,
    CrystalShard,
    WarpTunnel,
    ChaosField,
    Singularity,
}

impl Default for CoreShape {
    fn default() -> Self {
        Self::Tornado
    }
}

impl CoreShape {
    pub const COUNT: usize = 20;

    pub const ALL: [CoreShape; Self::COUNT] = [
        Self::Tornado,
        Self::Cube,
        Self::NeuralSphere,
        Self::Heart,
        Self::DnaHelix,
        Self::Ring,
        Self::Pyramid,
        Self::InfinityLoop,
        Self::StarCluster,
        Self::DigitalRain,
        Self::Atom,
        Self::GridPlains,
        Self::Saturn,
        Self::DataSpike,
        Self::CrossFire,
        Self::FluidWave,
        Self::CrystalShard,
        Self::WarpTunnel,
        Self::ChaosField,
        Self::Singularity,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Clamp an arbitrary selector into the valid range
    pub fn clamped(index: usize) -> Self {
        Self::ALL[index.min(Self::COUNT - 1)]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Tornado => "HYPER TORNADO",
            Self::Cube => "QUANTUM CUBE",
            Self::NeuralSphere => "NEURAL SPHERE",
            Self::Heart => "CYBER HEART",
            Self::DnaHelix => "DNA HELIX",
            Self::Ring => "VOID RING",
            Self::Pyramid => "PYRAMID GATE",
            Self::InfinityLoop => "INFINITY LOOP",
            Self::StarCluster => "STAR CLUSTER",
            Self::DigitalRain => "DIGITAL RAIN",
            Self::Atom => "ATOM CORE",
            Self::GridPlains => "GRID PLAINS",
            Self::Saturn => "SATURN RINGS",
            Self::DataSpike => "DATA SPIKE",
            Self::CrossFire => "CROSS FIRE",
            Self::FluidWave => "FLUID WAVE",
            Self::CrystalShard => "CRYSTAL SHARD",
            Self::WarpTunnel => "WARP TUNNEL",
            Self::ChaosField => "CHAOS FIELD",
            Self::Singularity => "SINGULARITY",
        }
    }

    /// True for shapes whose target depends only on the particle index
    pub fn is_deterministic(self) -> bool {
        matches!(self, Self::Cube)
    }
}

impl std::fmt::Display for CoreShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Torus major radius of the ring shape
pub const RING_RADIUS: f32 = 350.0;
/// Torus tube radius of the ring shape
pub const RING_TUBE: f32 = 80.0;
/// Half-height of the tornado funnel
pub const TORNADO_HALF_HEIGHT: f32 = 600.0;

const SPHERE_RADIUS: f32 = 250.0;

/// Uniform in [-0.5, 0.5)
#[inline]
fn centered<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen::<f32>() - 0.5
}

#[inline]
fn spherical(radius: f32, theta: f32, phi: f32) -> Vec3 {
    Vec3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.sin() * theta.sin(),
        radius * phi.cos(),
    )
}

/// Target point of core particle `index` on `shape`.
///
/// `core_count` is the size of the core partition; a zero count is treated as one
/// and indices past the end are clamped so normalized terms stay in [0, 1].
/// Non-finite components are replaced with zero.
pub fn compute_shape_target<R: Rng + ?Sized>(
    shape: CoreShape,
    index: usize,
    core_count: usize,
    rng: &mut R,
) -> Vec3 {
    let count = core_count.max(1);
    let idx = index.min(count - 1);
    let i = idx as f32 / count as f32;

    let u: f32 = rng.gen();
    let v: f32 = rng.gen();
    let theta = 2.0 * PI * u;
    let phi = (2.0 * v - 1.0).clamp(-1.0, 1.0).acos();
    let r = SPHERE_RADIUS;

    let target = match shape {
        CoreShape::Tornado => {
            // Narrow at the bottom, opening toward the top
            let h = (v - 0.5) * TORNADO_HALF_HEIGHT * 2.0;
            let normalized_h = (h + TORNADO_HALF_HEIGHT) / (TORNADO_HALF_HEIGHT * 2.0);
            let rad = 20.0 + normalized_h.powf(1.5) * 600.0;
            let spiral = normalized_h * 20.0 * PI + u * PI * 2.0;
            Vec3::new(rad * spiral.cos(), h, rad * spiral.sin())
        }
        CoreShape::Cube => {
            let dim = (count as f32).cbrt();
            let fi = idx as f32;
            let ix = fi % dim;
            let iy = (fi / dim).floor() % dim;
            let iz = (fi / (dim * dim)).floor();
            let spacing = 500.0 / dim;
            Vec3::new(
                (ix - dim / 2.0) * spacing,
                (iy - dim / 2.0) * spacing,
                (iz - dim / 2.0) * spacing,
            )
        }
        CoreShape::NeuralSphere => {
            let nr = r * (1.0 + rng.gen::<f32>() * 0.5);
            spherical(nr, theta, phi)
        }
        CoreShape::Heart => {
            let ht = u * 2.0 * PI;
            let hp = v * PI;
            let s3 = hp.sin().powi(3);
            let y = 13.0 * hp.cos()
                - 5.0 * (2.0 * hp).cos()
                - 2.0 * (3.0 * hp).cos()
                - (4.0 * hp).cos();
            Vec3::new(16.0 * s3 * ht.sin() * 15.0, -15.0 * y, 16.0 * s3 * ht.cos() * 15.0)
        }
        CoreShape::DnaHelix => {
            let h = (i - 0.5) * 800.0;
            let rot = i * 20.0 * PI;
            let strand = if idx % 2 == 0 { 0.0 } else { PI };
            let width = 100.0;
            Vec3::new(
                width * (rot + strand).cos() + centered(rng) * 20.0,
                h,
                width * (rot + strand).sin() + centered(rng) * 20.0,
            )
        }
        CoreShape::Ring => {
            let t1 = u * PI * 2.0;
            let t2 = v * PI * 2.0;
            let reach = RING_RADIUS + RING_TUBE * t2.cos();
            Vec3::new(reach * t1.cos(), RING_TUBE * t2.sin(), reach * t1.sin())
        }
        CoreShape::Pyramid => {
            let level = 1.0 - v.sqrt();
            let h = (v - 0.5) * 600.0;
            let size = level * 500.0;
            let edge = |rng: &mut R| if rng.gen::<f32>() > 0.5 { 0.5 } else { -0.5 };
            let (x, z) = if rng.gen::<f32>() > 0.5 {
                (centered(rng) * size, edge(rng) * size)
            } else {
                (edge(rng) * size, centered(rng) * size)
            };
            Vec3::new(x, -h, z)
        }
        CoreShape::InfinityLoop => {
            let t = i * PI * 4.0;
            let scale = 180.0;
            Vec3::new(
                scale * t.cos() + centered(rng) * 50.0,
                scale * (2.0 * t).sin() / 2.0 + centered(rng) * 50.0,
                scale * t.sin() + centered(rng) * 50.0,
            )
        }
        CoreShape::StarCluster => {
            // Dense center, diffuse edges
            let sr = rng.gen::<f32>() * 500.0 * rng.gen::<f32>().powi(3);
            spherical(sr, theta, phi)
        }
        CoreShape::DigitalRain => {
            let col = rng.gen_range(0..20) as f32;
            let row = rng.gen_range(0..20) as f32;
            Vec3::new((col - 10.0) * 50.0, centered(rng) * 1000.0, (row - 10.0) * 50.0)
        }
        CoreShape::Atom => {
            if i < 0.2 {
                Vec3::new(centered(rng) * 150.0, centered(rng) * 150.0, centered(rng) * 150.0)
            } else {
                let ang = u * PI * 2.0;
                let rad = 350.0;
                let (a, b) = (rad * ang.cos(), rad * ang.sin());
                let thickness = centered(rng) * 20.0;
                match idx % 3 {
                    0 => Vec3::new(a, b, thickness),
                    1 => Vec3::new(a, thickness, b),
                    _ => Vec3::new(thickness, a, b),
                }
            }
        }
        CoreShape::GridPlains => {
            let size = 1000.0;
            let x = centered(rng) * size;
            let z = centered(rng) * size;
            Vec3::new(x, (x / 80.0).sin() * (z / 80.0).cos() * 80.0, z)
        }
        CoreShape::Saturn => {
            if i < 0.25 {
                spherical(r * 0.7, theta, phi)
            } else {
                let ring_r = 400.0 + rng.gen::<f32>() * 200.0;
                Vec3::new(ring_r * theta.cos(), centered(rng) * 15.0, ring_r * theta.sin())
            }
        }
        CoreShape::DataSpike => {
            let taper: f32 = rng.gen();
            Vec3::new(
                centered(rng) * 60.0 * taper,
                centered(rng) * 1200.0,
                centered(rng) * 60.0 * taper,
            )
        }
        CoreShape::CrossFire => {
            let span = centered(rng) * 1000.0;
            match idx % 3 {
                0 => Vec3::new(span, 0.0, 0.0),
                1 => Vec3::new(0.0, span, 0.0),
                _ => Vec3::new(0.0, 0.0, span),
            }
        }
        CoreShape::FluidWave => {
            let x = (u - 0.5) * 1000.0;
            let z = (v - 0.5) * 1000.0;
            Vec3::new(x, (x * 0.015).sin() * 150.0 + (z * 0.015).cos() * 150.0, z)
        }
        CoreShape::CrystalShard => {
            let mut x = centered(rng) * 250.0;
            let mut z = centered(rng) * 250.0;
            let y = centered(rng) * 700.0;
            // Facets narrow to a point at both ends
            if y.abs() > 250.0 {
                x *= 0.1;
                z *= 0.1;
            }
            Vec3::new(x, y, z)
        }
        CoreShape::WarpTunnel => {
            let tr = 150.0 + v * 500.0;
            Vec3::new(tr * theta.cos(), tr * theta.sin(), (u - 0.5) * 2500.0)
        }
        CoreShape::ChaosField => {
            Vec3::new(centered(rng) * 800.0, centered(rng) * 800.0, centered(rng) * 800.0)
        }
        CoreShape::Singularity => {
            let sr = 20.0 + u.powi(5) * 600.0;
            Vec3::new(sr * theta.cos(), centered(rng) * (600.0 - sr) * 0.5, sr * theta.sin())
        }
    };

    finite_or_zero(target)
}

/// Dispatch on a raw selector. Unknown ids land on the origin.
pub fn compute_shape_target_by_id<R: Rng + ?Sized>(
    shape_id: usize,
    index: usize,
    core_count: usize,
    rng: &mut R,
) -> Vec3 {
    match CoreShape::from_index(shape_id) {
        Some(shape) => compute_shape_target(shape, index, core_count, rng),
        None => {
            if cfg!(debug_assertions) {
                log::error!("shape id {} outside 0..{}", shape_id, CoreShape::COUNT);
            }
            Vec3::ZERO
        }
    }
}

#[inline]
fn finite_or_zero(v: Vec3) -> Vec3 {
    Vec3::new(
        if v.x.is_finite() { v.x } else { 0.0 },
        if v.y.is_finite() { v.y } else { 0.0 },
        if v.z.is_finite() { v.z } else { 0.0 },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CORE_COUNT;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn every_shape_is_finite_for_every_index() {
        let mut rng = SmallRng::seed_from_u64(7);
        for shape in CoreShape::ALL {
            for index in 0..CORE_COUNT {
                let p = compute_shape_target(shape, index, CORE_COUNT, &mut rng);
                assert!(p.is_finite(), "{} produced {:?} at {}", shape, p, index);
            }
        }
    }

    #[test]
    fn degenerate_core_counts_stay_finite() {
        let mut rng = SmallRng::seed_from_u64(11);
        for shape in CoreShape::ALL {
            for &(index, count) in &[(0, 0), (5, 0), (10, 3), (usize::MAX, 1)] {
                let p = compute_shape_target(shape, index, count, &mut rng);
                assert!(p.is_finite(), "{} with count {}", shape, count);
            }
        }
    }

    #[test]
    fn cube_is_bit_identical_across_calls() {
        assert!(CoreShape::Cube.is_deterministic());
        assert!(!CoreShape::Ring.is_deterministic());
        let mut a = SmallRng::seed_from_u64(1);
        let mut b = SmallRng::seed_from_u64(999);
        for index in [0, 1, 29, 841, 12_345, CORE_COUNT - 1] {
            let first = compute_shape_target(CoreShape::Cube, index, CORE_COUNT, &mut a);
            let second = compute_shape_target(CoreShape::Cube, index, CORE_COUNT, &mut b);
            assert_eq!(first.to_array().map(f32::to_bits), second.to_array().map(f32::to_bits));
        }
    }

    #[test]
    fn same_seed_reproduces_random_shapes() {
        for shape in CoreShape::ALL {
            let mut a = SmallRng::seed_from_u64(42);
            let mut b = SmallRng::seed_from_u64(42);
            let first = compute_shape_target(shape, 100, CORE_COUNT, &mut a);
            let second = compute_shape_target(shape, 100, CORE_COUNT, &mut b);
            assert_eq!(first, second, "{}", shape);
        }
    }

    #[test]
    fn ring_lies_on_torus() {
        let mut rng = SmallRng::seed_from_u64(3);
        for index in 0..2000 {
            let p = compute_shape_target(CoreShape::Ring, index, CORE_COUNT, &mut rng);
            let radial = (p.x * p.x + p.z * p.z).sqrt();
            let tube = ((radial - RING_RADIUS).powi(2) + p.y * p.y).sqrt();
            assert!((tube - RING_TUBE).abs() < 1e-2, "tube distance {}", tube);
        }
    }

    #[test]
    fn tornado_stays_in_funnel_height() {
        let mut rng = SmallRng::seed_from_u64(5);
        for index in 0..2000 {
            let p = compute_shape_target(CoreShape::Tornado, index, CORE_COUNT, &mut rng);
            assert!(p.y >= -TORNADO_HALF_HEIGHT && p.y <= TORNADO_HALF_HEIGHT);
            let radial = (p.x * p.x + p.z * p.z).sqrt();
            assert!(radial >= 19.9 && radial <= 620.1);
        }
    }

    #[test]
    fn cross_fire_uses_one_axis_per_particle() {
        let mut rng = SmallRng::seed_from_u64(9);
        for index in 0..300 {
            let p = compute_shape_target(CoreShape::CrossFire, index, CORE_COUNT, &mut rng);
            let zeros = p.to_array().iter().filter(|c| **c == 0.0).count();
            assert!(zeros >= 2);
        }
    }

    #[test]
    fn unknown_id_falls_back_to_origin() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert_eq!(compute_shape_target_by_id(20, 0, CORE_COUNT, &mut rng), Vec3::ZERO);
        assert_eq!(compute_shape_target_by_id(usize::MAX, 3, CORE_COUNT, &mut rng), Vec3::ZERO);
        assert_ne!(compute_shape_target_by_id(5, 3, CORE_COUNT, &mut rng), Vec3::ZERO);
    }

    #[test]
    fn selector_round_trip_and_clamp() {
        for (i, shape) in CoreShape::ALL.iter().enumerate() {
            assert_eq!(shape.index(), i);
            assert_eq!(CoreShape::from_index(i), Some(*shape));
        }
        assert_eq!(CoreShape::clamped(57), CoreShape::Singularity);
        assert!(CoreShape::from_index(20).is_none());
    }
}
