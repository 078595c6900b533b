//! Flow Function Library
//! Twenty iterative maps that move atmosphere particles frame to frame.
//!
//! Unlike shapes these never produce a fixed target: the position returned for
//! one frame is the input for the next, which is what gives the background its
//! drifting, spiralling trajectories.

use glam::Vec3;
use rand::Rng;

use crate::field::NoiseField;

/// Atmosphere effects, in selector order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AtmosphereEffect {
    WarpSpeed,
    MeteorShower,
    SnowDrift,
    RisingEmbers,
    LateralRush,
    VortexSpin,
    Implosion,
    Explosion,
    StaticNoise,
    DigitalGlitch,
    MatrixRain,
    PulseWaves,
    OrbitalDebris,
    Shockwave,
    FogBank,
    SpiralOut,
    LiquidFlow,
    ZeroGravity,
    GridLock,
    VoidSilence,
}

impl Default for AtmosphereEffect {
    fn default() -> Self {
        Self::WarpSpeed
    }
}

impl AtmosphereEffect {
    pub const COUNT: usize = 20;

    pub const ALL: [AtmosphereEffect; Self::COUNT] = [
        Self::WarpSpeed,
        Self::MeteorShower,
        Self::SnowDrift,
        Self::RisingEmbers,
        Self::LateralRush,
        Self::VortexSpin,
        Self::Implosion,
        Self::Explosion,
        Self::StaticNoise,
        Self::DigitalGlitch,
        Self::MatrixRain,
        Self::PulseWaves,
        Self::OrbitalDebris,
        Self::Shockwave,
        Self::FogBank,
        Self::SpiralOut,
        Self::LiquidFlow,
        Self::ZeroGravity,
        Self::GridLock,
        Self::VoidSilence,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn clamped(index: usize) -> Self {
        Self::ALL[index.min(Self::COUNT - 1)]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::WarpSpeed => "WARP SPEED",
            Self::MeteorShower => "METEOR SHOWER",
            Self::SnowDrift => "SNOW DRIFT",
            Self::RisingEmbers => "RISING EMBERS",
            Self::LateralRush => "LATERAL RUSH",
            Self::VortexSpin => "VORTEX SPIN",
            Self::Implosion => "IMPLOSION",
            Self::Explosion => "EXPLOSION",
            Self::StaticNoise => "STATIC NOISE",
            Self::DigitalGlitch => "DIGITAL GLITCH",
            Self::MatrixRain => "MATRIX RAIN",
            Self::PulseWaves => "PULSE WAVES",
            Self::OrbitalDebris => "ORBITAL DEBRIS",
            Self::Shockwave => "SHOCKWAVE",
            Self::FogBank => "FOG BANK",
            Self::SpiralOut => "SPIRAL OUT",
            Self::LiquidFlow => "LIQUID FLOW",
            Self::ZeroGravity => "ZERO GRAVITY",
            Self::GridLock => "GRID LOCK",
            Self::VoidSilence => "VOID SILENCE",
        }
    }
}

impl std::fmt::Display for AtmosphereEffect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Far-axis wrap limit for the streaming effects (warp, lateral rush)
pub const FAR_WRAP: f32 = 2000.0;
/// Vertical wrap limit for the falling/rising effects
pub const VERTICAL_WRAP: f32 = 1000.0;
/// Spiral-out respawn radius
pub const SPIRAL_LIMIT: f32 = 2500.0;
/// Any axis beyond this is treated as an escaped particle and respawned
pub const CONTAINMENT_LIMIT: f32 = 4000.0;

/// Per-frame inputs shared by every atmosphere particle
#[derive(Clone, Copy, Debug)]
pub struct FlowParams {
    /// Motion energy: 2 at rest, up to 42 on a full bass hit
    pub speed: f32,
    pub bass_impulse: f32,
    pub time: f32,
    /// Half-extent of the cube escaped particles respawn in
    pub respawn_extent: f32,
}

impl FlowParams {
    pub fn new(bass_impulse: f32, time: f32, respawn_extent: f32) -> Self {
        let bass_impulse = if bass_impulse.is_finite() {
            bass_impulse.max(0.0)
        } else {
            0.0
        };
        Self {
            speed: 2.0 + bass_impulse * 40.0,
            bass_impulse,
            time,
            respawn_extent,
        }
    }
}

#[inline]
fn centered<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen::<f32>() - 0.5
}

#[inline]
pub(crate) fn rotate_y(p: Vec3, angle: f32) -> Vec3 {
    let (s, c) = angle.sin_cos();
    Vec3::new(p.x * c - p.z * s, p.y, p.x * s + p.z * c)
}

/// Advance one atmosphere particle by a frame under `effect`.
pub fn advance_atmosphere<R: Rng + ?Sized>(
    position: Vec3,
    effect: AtmosphereEffect,
    params: &FlowParams,
    particle_index: usize,
    noise: &NoiseField,
    rng: &mut R,
) -> Vec3 {
    let Vec3 { mut x, mut y, mut z } = position;
    let speed = params.speed;
    let bass = params.bass_impulse;
    let time = params.time;

    match effect {
        AtmosphereEffect::WarpSpeed => {
            z += speed * 15.0;
            if z > FAR_WRAP {
                z = -FAR_WRAP;
            }
        }
        AtmosphereEffect::MeteorShower => {
            x -= speed * 5.0;
            y -= speed * 5.0;
            if y < -VERTICAL_WRAP {
                y = VERTICAL_WRAP;
                x = centered(rng) * 2000.0;
            }
        }
        AtmosphereEffect::SnowDrift => {
            y -= 1.0 + bass * 5.0;
            if y < -VERTICAL_WRAP {
                y = VERTICAL_WRAP;
            }
            x += (time + y * 0.01).sin() * 2.0;
        }
        AtmosphereEffect::RisingEmbers => {
            y += speed * 4.0;
            if y > VERTICAL_WRAP {
                y = -VERTICAL_WRAP;
            }
            x += centered(rng) * 5.0;
        }
        AtmosphereEffect::LateralRush => {
            x += speed * 15.0;
            if x > FAR_WRAP {
                x = -FAR_WRAP;
            }
        }
        AtmosphereEffect::VortexSpin => {
            let r = (x * x + z * z).sqrt();
            let ang = z.atan2(x) + 0.01 * speed;
            x = r * ang.cos();
            z = r * ang.sin();
        }
        AtmosphereEffect::Implosion => {
            x *= 0.96;
            y *= 0.96;
            z *= 0.96;
            if x.abs() < 50.0 && y.abs() < 50.0 {
                x = centered(rng) * 3000.0;
                y = centered(rng) * 3000.0;
                z = centered(rng) * 3000.0;
            }
        }
        AtmosphereEffect::Explosion => {
            x *= 1.04;
            y *= 1.04;
            z *= 1.04;
            if x.abs().max(y.abs()).max(z.abs()) > FAR_WRAP {
                x = centered(rng) * 100.0;
                y = centered(rng) * 100.0;
                z = centered(rng) * 100.0;
            }
        }
        AtmosphereEffect::StaticNoise => {
            x += centered(rng) * 100.0 * bass;
            y += centered(rng) * 100.0 * bass;
        }
        AtmosphereEffect::DigitalGlitch => {
            if rng.gen::<f32>() > 0.98 {
                x += centered(rng) * 1000.0;
            }
        }
        AtmosphereEffect::MatrixRain => {
            y -= speed * 15.0;
            if y < -VERTICAL_WRAP {
                y = VERTICAL_WRAP;
            }
            x = (x / 60.0).floor() * 60.0;
            z = (z / 60.0).floor() * 60.0;
        }
        AtmosphereEffect::PulseWaves => {
            let r = (x * x + z * z).sqrt();
            y += (r * 0.01 - time * 5.0).sin() * 10.0 * bass;
        }
        AtmosphereEffect::OrbitalDebris => {
            let p = rotate_y(Vec3::new(x, y, z), 0.005 * speed);
            x = p.x;
            z = p.z;
        }
        AtmosphereEffect::Shockwave => {
            let r = (x * x + z * z).sqrt();
            let ring = time.rem_euclid(5.0) * 400.0;
            if r < ring {
                x *= 1.05;
                z *= 1.05;
            } else {
                x *= 0.99;
                z *= 0.99;
            }
        }
        AtmosphereEffect::FogBank => {
            let n = noise.sample(x * 0.002, y * 0.002, time * 0.2);
            x += n * 5.0;
            y += n * 5.0;
        }
        AtmosphereEffect::SpiralOut => {
            let r = (x * x + z * z).sqrt() + speed;
            let ang = z.atan2(x) + 0.01;
            x = r * ang.cos();
            z = r * ang.sin();
            if r > SPIRAL_LIMIT {
                x = centered(rng) * 100.0;
                z = centered(rng) * 100.0;
            }
        }
        AtmosphereEffect::LiquidFlow => {
            x += (y * 0.01 + time).sin() * 10.0;
            y += (x * 0.01 + time).cos() * 10.0;
        }
        AtmosphereEffect::ZeroGravity => {
            let phase = time + particle_index as f32;
            x += phase.sin();
            y += phase.cos();
            z += (time * 0.5).sin();
        }
        AtmosphereEffect::GridLock => {
            let snap = |c: f32| ((c / 150.0).round() * 150.0 - c) * 0.2;
            x += snap(x);
            y += snap(y);
            z += snap(z);
        }
        AtmosphereEffect::VoidSilence => {
            let d = (x * x + y * y + z * z).sqrt();
            if d < 600.0 {
                x *= 1.1;
                y *= 1.1;
                z *= 1.1;
            }
        }
    }

    contain(Vec3::new(x, y, z), params.respawn_extent, rng)
}

/// Dispatch on a raw selector. Unknown ids leave the particle where it is.
pub fn advance_atmosphere_by_id<R: Rng + ?Sized>(
    position: Vec3,
    effect_id: usize,
    params: &FlowParams,
    particle_index: usize,
    noise: &NoiseField,
    rng: &mut R,
) -> Vec3 {
    match AtmosphereEffect::from_index(effect_id) {
        Some(effect) => advance_atmosphere(position, effect, params, particle_index, noise, rng),
        None => {
            if cfg!(debug_assertions) {
                log::error!("effect id {} outside 0..{}", effect_id, AtmosphereEffect::COUNT);
            }
            position
        }
    }
}

/// Respawn particles that went non-finite or drifted out of the view volume
#[inline]
fn contain<R: Rng + ?Sized>(p: Vec3, extent: f32, rng: &mut R) -> Vec3 {
    if p.is_finite() && p.abs().max_element() <= CONTAINMENT_LIMIT {
        return p;
    }
    let extent = extent.clamp(1.0, CONTAINMENT_LIMIT);
    Vec3::new(
        centered(rng) * 2.0 * extent,
        centered(rng) * 2.0 * extent,
        centered(rng) * 2.0 * extent,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn run(effect: AtmosphereEffect, start: Vec3, bass: f32, steps: usize) -> Vec<Vec3> {
        let noise = NoiseField::new(17);
        let mut rng = SmallRng::seed_from_u64(effect.index() as u64);
        let mut p = start;
        let mut out = Vec::with_capacity(steps);
        for step in 0..steps {
            let params = FlowParams::new(bass, 0.01 * step as f32, 1000.0);
            p = advance_atmosphere(p, effect, &params, 12_345, &noise, &mut rng);
            out.push(p);
        }
        out
    }

    #[test]
    fn every_effect_stays_contained_for_ten_thousand_steps() {
        let starts = [
            Vec3::new(120.0, -340.0, 560.0),
            Vec3::new(-999.0, 999.0, -999.0),
            Vec3::new(1.0, 2.0, 3.0),
        ];
        for effect in AtmosphereEffect::ALL {
            for &bass in &[0.0, 0.35, 1.0] {
                for &start in &starts {
                    for p in run(effect, start, bass, 10_000) {
                        assert!(p.is_finite(), "{} went non-finite", effect);
                        assert!(
                            p.abs().max_element() <= CONTAINMENT_LIMIT,
                            "{} escaped to {:?}",
                            effect,
                            p
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn warp_speed_wraps_within_far_bound() {
        for &bass in &[0.0, 1.0] {
            for p in run(AtmosphereEffect::WarpSpeed, Vec3::new(10.0, 20.0, -1500.0), bass, 10_000) {
                assert!(p.z >= -FAR_WRAP && p.z <= FAR_WRAP, "z = {}", p.z);
                assert_eq!(p.x, 10.0);
            }
        }
    }

    #[test]
    fn lateral_rush_wraps_within_far_bound() {
        for p in run(AtmosphereEffect::LateralRush, Vec3::new(0.0, 0.0, 0.0), 1.0, 10_000) {
            assert!(p.x >= -FAR_WRAP && p.x <= FAR_WRAP);
        }
    }

    #[test]
    fn vertical_effects_wrap_within_vertical_bound() {
        for effect in [
            AtmosphereEffect::MeteorShower,
            AtmosphereEffect::SnowDrift,
            AtmosphereEffect::RisingEmbers,
            AtmosphereEffect::MatrixRain,
        ] {
            for p in run(effect, Vec3::new(0.0, 0.0, 0.0), 0.5, 10_000) {
                assert!(p.y.abs() <= VERTICAL_WRAP, "{} y = {}", effect, p.y);
            }
        }
    }

    #[test]
    fn spiral_out_respawns_past_limit() {
        for p in run(AtmosphereEffect::SpiralOut, Vec3::new(300.0, 5.0, 0.0), 1.0, 10_000) {
            let r = (p.x * p.x + p.z * p.z).sqrt();
            assert!(r <= SPIRAL_LIMIT + 1.0, "r = {}", r);
        }
    }

    #[test]
    fn rotations_preserve_radius() {
        let start = Vec3::new(300.0, 50.0, -400.0);
        for effect in [AtmosphereEffect::VortexSpin, AtmosphereEffect::OrbitalDebris] {
            for p in run(effect, start, 0.2, 500) {
                let r = (p.x * p.x + p.z * p.z).sqrt();
                assert!((r - 500.0).abs() < 0.5, "{} r = {}", effect, r);
                assert_eq!(p.y, 50.0);
            }
        }
    }

    #[test]
    fn implosion_contracts_then_respawns() {
        let noise = NoiseField::new(0);
        let mut rng = SmallRng::seed_from_u64(1);
        let params = FlowParams::new(0.0, 0.0, 1000.0);

        let p = advance_atmosphere(Vec3::splat(1000.0), AtmosphereEffect::Implosion, &params, 0, &noise, &mut rng);
        assert!((p - Vec3::splat(960.0)).abs().max_element() < 1e-3);

        let near = advance_atmosphere(Vec3::new(40.0, 40.0, 40.0), AtmosphereEffect::Implosion, &params, 0, &noise, &mut rng);
        assert!(near.abs().max_element() <= 1500.0);
        assert_ne!(near, Vec3::splat(38.4));
    }

    #[test]
    fn grid_lock_converges_to_lattice() {
        let last = *run(AtmosphereEffect::GridLock, Vec3::new(170.0, -80.0, 290.0), 0.0, 200)
            .last()
            .unwrap();
        assert!((last - Vec3::new(150.0, -150.0, 300.0)).abs().max_element() < 1e-2);
    }

    #[test]
    fn silence_keeps_energy_driven_effects_still() {
        let start = Vec3::new(100.0, 100.0, 100.0);
        for effect in [AtmosphereEffect::StaticNoise, AtmosphereEffect::PulseWaves] {
            for p in run(effect, start, 0.0, 100) {
                assert_eq!(p, start, "{}", effect);
            }
        }
    }

    #[test]
    fn motion_energy_scales_speed() {
        let quiet = FlowParams::new(0.0, 0.0, 1000.0);
        let loud = FlowParams::new(1.0, 0.0, 1000.0);
        assert_eq!(quiet.speed, 2.0);
        assert_eq!(loud.speed, 42.0);
        assert_eq!(FlowParams::new(f32::NAN, 0.0, 1000.0).speed, 2.0);
    }

    #[test]
    fn unknown_id_is_a_no_op() {
        let noise = NoiseField::new(0);
        let mut rng = SmallRng::seed_from_u64(1);
        let params = FlowParams::new(0.5, 1.0, 1000.0);
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(advance_atmosphere_by_id(p, 99, &params, 0, &noise, &mut rng), p);
    }
}
