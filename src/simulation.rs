//! Simulation Loop for Particle VJ
//! Per-frame update of the core geometry and the atmosphere flow field

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::audio::{AudioFeatures, FrequencySource, Mood};
use crate::color::{
    atmosphere_color, compute_target_color, core_color, parse_hex_color, BaseColor, ColorOverrides,
};
use crate::config::{AppConfig, AudioConfig, SimulationConfig};
use crate::field::NoiseField;
use crate::flows::{advance_atmosphere, rotate_y, AtmosphereEffect, FlowParams};
use crate::shapes::{compute_shape_target, CoreShape, TORNADO_HALF_HEIGHT};

/// Base per-frame advance of the time accumulator
pub const TIME_STEP: f32 = 0.01;
/// Extra time per frame at full bass
pub const TIME_BASS_BOOST: f32 = 0.05;
/// Fraction of the distance to the target covered per frame at rest
pub const MOVE_LERP: f32 = 0.15;
/// Extra approach rate at full bass
pub const MOVE_LERP_BASS: f32 = 0.1;
/// Non-tornado targets grow by this fraction at full bass
pub const BASS_PULSE: f32 = 0.6;
/// Tornado x/z spread by this fraction at full bass
pub const TORNADO_EXPANSION: f32 = 1.5;
/// Tornado x/z jitter amplitude at full bass
pub const TORNADO_JITTER: f32 = 20.0;
const TURBULENCE_SCALE: f32 = 0.005;

const STREAM_SCATTER: u64 = 0x01;
const STREAM_ANCHOR: u64 = 0x02;
const STREAM_FRAME: u64 = 0x03;

/// SplitMix64 finalizer over the stream coordinates
#[inline]
fn stream_seed(seed: u64, stream: u64, index: u64, tick: u64) -> u64 {
    let mut z = seed
        ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ index.wrapping_mul(0xBF58_476D_1CE4_E5B9)
        ^ tick.wrapping_mul(0x94D0_49BB_1331_11EB);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

// ============================================================================
// Buffers
// ============================================================================

/// Position and color for every particle, allocated once and rewritten in place
pub struct ParticleBuffers {
    positions: Vec<Vec3>,
    colors: Vec<Vec3>,
    core_count: usize,
}

impl ParticleBuffers {
    /// Scatter `particle_count` particles uniformly in the cube `[-extent, extent]^3`
    pub fn scattered(config: &SimulationConfig) -> Self {
        let mut rng = SmallRng::seed_from_u64(stream_seed(config.seed, STREAM_SCATTER, 0, 0));
        let extent = config.scatter_extent;
        let positions = (0..config.particle_count)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(-extent..extent),
                    rng.gen_range(-extent..extent),
                    rng.gen_range(-extent..extent),
                )
            })
            .collect();

        Self {
            positions,
            colors: vec![Vec3::ONE; config.particle_count],
            core_count: config.core_count.min(config.particle_count),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn core_count(&self) -> usize {
        self.core_count
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn core_positions(&self) -> &[Vec3] {
        &self.positions[..self.core_count]
    }

    pub fn atmosphere_positions(&self) -> &[Vec3] {
        &self.positions[self.core_count..]
    }

    /// Tightly packed `f32` xyz triples, ready for a vertex buffer upload
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Tightly packed `f32` rgb triples
    pub fn color_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.colors)
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Pointer position in normalized device coordinates, written by the input handler
/// and read once per tick. Each axis is an independent atomic; a torn pair is harmless.
#[derive(Debug, Default)]
pub struct PointerState {
    x: AtomicU32,
    y: AtomicU32,
}

impl PointerState {
    pub fn set(&self, x: f32, y: f32) {
        let sanitize = |v: f32| if v.is_finite() { v.clamp(-1.0, 1.0) } else { 0.0 };
        self.x.store(sanitize(x).to_bits(), Ordering::Relaxed);
        self.y.store(sanitize(y).to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> (f32, f32) {
        (
            f32::from_bits(self.x.load(Ordering::Relaxed)),
            f32::from_bits(self.y.load(Ordering::Relaxed)),
        )
    }
}

/// Control inputs read at the start of every tick
#[derive(Clone, Debug)]
pub struct ControlInputs {
    pub shape: usize,
    pub effect: usize,
    /// Cosmetic, handed through to the renderer
    pub particle_size: f32,
    pub manual_color: Option<Vec3>,
    pub sentiment_color: Option<Vec3>,
    /// An image is displayed instead of a core shape
    pub image_mode: bool,
    /// When false the spectrum is ignored and energy stays at zero
    pub is_playing: bool,
}

impl Default for ControlInputs {
    fn default() -> Self {
        Self {
            shape: 0,
            effect: 0,
            particle_size: 3.0,
            manual_color: None,
            sentiment_color: None,
            image_mode: false,
            is_playing: true,
        }
    }
}

impl ControlInputs {
    pub fn with_selection(shape: usize, effect: usize) -> Self {
        Self {
            shape,
            effect,
            ..Self::default()
        }
    }

    /// Initial inputs from the `controls` and `viewer` config sections
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let manual_color = match config.controls.manual_color {
            Some(ref hex) => Some(parse_hex_color(hex)?),
            None => None,
        };
        Ok(Self {
            shape: config.controls.shape,
            effect: config.controls.effect,
            particle_size: config.viewer.particle_size,
            manual_color,
            ..Self::default()
        })
    }

    pub fn shape(&self) -> CoreShape {
        CoreShape::clamped(self.shape)
    }

    pub fn effect(&self) -> AtmosphereEffect {
        AtmosphereEffect::clamped(self.effect)
    }

    fn color_overrides(&self) -> ColorOverrides {
        ColorOverrides {
            manual: self.manual_color,
            sentiment: self.sentiment_color,
            image_mode: self.image_mode,
        }
    }
}

// ============================================================================
// Outputs
// ============================================================================

/// Callbacks for consumers outside the loop (UI, agent)
pub trait SimulationObserver {
    /// Called every tick, not only on transitions
    fn on_mood_changed(&mut self, _mood: Mood) {}
    /// Called once per elapsed one-second window
    fn on_fps_sample(&mut self, _fps: u32) {}
}

impl SimulationObserver for () {}

/// Frames counted over rolling one-second windows
#[derive(Debug, Default)]
pub struct FpsCounter {
    frames: u32,
    window_start: Option<Instant>,
}

impl FpsCounter {
    const WINDOW: Duration = Duration::from_secs(1);

    /// Count one frame; returns the frame count when a window closes
    pub fn record(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        let start = *self.window_start.get_or_insert(now);
        if now.saturating_duration_since(start) >= Self::WINDOW {
            let fps = self.frames;
            self.frames = 0;
            self.window_start = Some(now);
            Some(fps)
        } else {
            None
        }
    }
}

/// Summary of one completed tick
#[derive(Clone, Copy, Debug)]
pub struct TickReport {
    pub tick: u64,
    pub time: f32,
    pub features: AudioFeatures,
    pub breathing: f32,
    pub shape: CoreShape,
    pub effect: AtmosphereEffect,
    pub base_color: Vec3,
    pub particle_size: f32,
}

// ============================================================================
// State
// ============================================================================

/// Everything the loop carries from one frame to the next besides the buffers
#[derive(Clone, Debug)]
pub struct SimulationState {
    pub shape: CoreShape,
    pub effect: AtmosphereEffect,
    pub time: f32,
    pub base_color: BaseColor,
    pub mood: Mood,
    pub pointer: (f32, f32),
    pub tick: u64,
    pub fps: u32,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            shape: CoreShape::default(),
            effect: AtmosphereEffect::default(),
            time: 0.0,
            base_color: BaseColor::default(),
            mood: Mood::Neutral,
            pointer: (0.0, 0.0),
            tick: 0,
            fps: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Uninitialized,
    Running,
    Stopped,
}

/// Uniform ambient pulsation applied to every core target
#[inline]
pub fn breathing(time: f32, noise: &NoiseField) -> f32 {
    1.0 + (time * 0.8).sin() * 0.03 + noise.sample(time * 0.2, 0.0, 0.0) * 0.02
}

/// Fraction of the remaining distance covered this frame
#[inline]
pub fn approach_rate(bass_impulse: f32) -> f32 {
    MOVE_LERP + bass_impulse * MOVE_LERP_BASS
}

/// One exponential approach step from `position` toward `target`
#[inline]
pub fn approach(position: Vec3, target: Vec3, bass_impulse: f32) -> Vec3 {
    position + (target - position) * approach_rate(bass_impulse)
}

/// Spin around Y by `0.5 * time`, then pulse outward with the bass
#[inline]
pub fn orbit_and_pulse(target: Vec3, time: f32, bass_impulse: f32) -> Vec3 {
    rotate_y(target, time * 0.5) * (1.0 + bass_impulse * BASS_PULSE)
}

/// Simplex offset added to every axis, `10 + 50 * bass` at most
#[inline]
pub fn turbulence(target: Vec3, time: f32, bass_impulse: f32, noise: &NoiseField) -> Vec3 {
    let p = target * TURBULENCE_SCALE;
    let n = noise.sample(p.x, p.y, p.z + time);
    Vec3::splat(n * (10.0 + bass_impulse * 50.0))
}

/// Height-dependent twist, pointer bend and bass expansion of a tornado target.
/// `jitter` holds two uniform draws in [0, 1); 0.5 means no offset.
pub fn tornado_transform(
    target: Vec3,
    time: f32,
    pointer: (f32, f32),
    bass_impulse: f32,
    jitter: (f32, f32),
) -> Vec3 {
    let h_factor = (target.y + TORNADO_HALF_HEIGHT) / (TORNADO_HALF_HEIGHT * 2.0);
    let mut p = rotate_y(target, time * 5.0 + h_factor * 10.0);

    // Bend the funnel toward the pointer, more at the top
    p.x += pointer.0 * h_factor * 800.0;
    p.z += pointer.1 * h_factor * 800.0;

    let expansion = 1.0 + bass_impulse * TORNADO_EXPANSION;
    p.x *= expansion;
    p.z *= expansion;

    p.x += (jitter.0 - 0.5) * TORNADO_JITTER * bass_impulse;
    p.z += (jitter.1 - 0.5) * TORNADO_JITTER * bass_impulse;
    p
}

/// Per-frame values shared by every core particle
#[derive(Clone, Copy)]
struct CoreFrame {
    shape: CoreShape,
    core_count: usize,
    time: f32,
    bass: f32,
    breath: f32,
    pointer: (f32, f32),
    base: Vec3,
    seed: u64,
    anchor_tick: u64,
    tick: u64,
}

impl CoreFrame {
    /// Shape target plus the secondary transforms, before the approach step
    fn target(&self, index: usize, noise: &NoiseField) -> Vec3 {
        let idx = index as u64;
        let mut anchor = SmallRng::seed_from_u64(stream_seed(
            self.seed ^ self.shape.index() as u64,
            STREAM_ANCHOR,
            idx,
            self.anchor_tick,
        ));
        let mut target = compute_shape_target(self.shape, index, self.core_count, &mut anchor);

        if self.shape == CoreShape::Tornado {
            let mut rng = SmallRng::seed_from_u64(stream_seed(self.seed, STREAM_FRAME, idx, self.tick));
            let jitter = (rng.gen::<f32>(), rng.gen::<f32>());
            target = tornado_transform(target, self.time, self.pointer, self.bass, jitter);
        } else {
            target = orbit_and_pulse(target, self.time, self.bass);
            target += turbulence(target, self.time, self.bass, noise);
        }

        target * self.breath
    }
}

// ============================================================================
// Simulation
// ============================================================================

pub struct Simulation {
    config: SimulationConfig,
    bass_bin: usize,
    treble_bin: usize,
    state: SimulationState,
    buffers: ParticleBuffers,
    noise: NoiseField,
    pointer: Arc<PointerState>,
    fps: FpsCounter,
    phase: LoopPhase,
    reported_silence: bool,
}

impl Simulation {
    pub fn new(config: &SimulationConfig, audio: &AudioConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let buffers = ParticleBuffers::scattered(config);
        log::info!(
            "Simulation ready: {} particles ({} core, {} atmosphere), seed {:#x}",
            buffers.len(),
            buffers.core_count(),
            config.atmosphere_count(),
            config.seed
        );

        Ok(Self {
            config: config.clone(),
            bass_bin: audio.bass_bin,
            treble_bin: audio.treble_bin,
            state: SimulationState::default(),
            buffers,
            noise: NoiseField::new(config.seed),
            pointer: Arc::new(PointerState::default()),
            fps: FpsCounter::default(),
            phase: LoopPhase::Uninitialized,
            reported_silence: false,
        })
    }

    pub fn start(&mut self) {
        if self.phase == LoopPhase::Uninitialized {
            self.phase = LoopPhase::Running;
        }
    }

    /// Stop for good; later ticks are ignored
    pub fn stop(&mut self) {
        if self.phase != LoopPhase::Stopped {
            log::info!("Simulation stopped after {} ticks", self.state.tick);
        }
        self.phase = LoopPhase::Stopped;
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == LoopPhase::Running
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    pub fn buffers(&self) -> &ParticleBuffers {
        &self.buffers
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Shared handle for the input handler to write pointer coordinates into
    pub fn pointer(&self) -> Arc<PointerState> {
        Arc::clone(&self.pointer)
    }

    pub fn tick(
        &mut self,
        inputs: &ControlInputs,
        source: &mut dyn FrequencySource,
        observer: &mut dyn SimulationObserver,
    ) -> Option<TickReport> {
        self.tick_at(Instant::now(), inputs, source, observer)
    }

    /// Run one frame. Returns `None` without touching any state unless running.
    pub fn tick_at(
        &mut self,
        now: Instant,
        inputs: &ControlInputs,
        source: &mut dyn FrequencySource,
        observer: &mut dyn SimulationObserver,
    ) -> Option<TickReport> {
        if self.phase != LoopPhase::Running {
            return None;
        }

        if let Some(fps) = self.fps.record(now) {
            self.state.fps = fps;
            observer.on_fps_sample(fps);
        }

        let features = if inputs.is_playing {
            AudioFeatures::extract(source.frequency_magnitudes(), self.bass_bin, self.treble_bin)
        } else {
            AudioFeatures::silent()
        };
        if !features.has_audio && inputs.is_playing && !self.reported_silence {
            log::debug!("No frequency data available; running on zero energy");
            self.reported_silence = true;
        } else if features.has_audio {
            self.reported_silence = false;
        }

        if features.mood != self.state.mood {
            log::debug!("Mood {} -> {}", self.state.mood, features.mood);
        }
        self.state.mood = features.mood;
        observer.on_mood_changed(features.mood);

        let shape = inputs.shape();
        let effect = inputs.effect();
        if shape != self.state.shape || effect != self.state.effect {
            log::debug!("Selection: {} / {}", shape, effect);
        }
        self.state.shape = shape;
        self.state.effect = effect;

        let target_color = compute_target_color(shape, &inputs.color_overrides());
        let base = self.state.base_color.step(target_color);

        let bass = features.bass_impulse;
        self.state.time += TIME_STEP + bass * TIME_BASS_BOOST;
        let time = self.state.time;
        let breath = breathing(time, &self.noise);
        self.state.pointer = self.pointer.get();

        let tick = self.state.tick;
        let noise = &self.noise;
        let core_count = self.buffers.core_count;
        let ParticleBuffers {
            positions, colors, ..
        } = &mut self.buffers;

        let flow_start = if inputs.image_mode {
            0
        } else {
            let frame = CoreFrame {
                shape,
                core_count,
                time,
                bass,
                breath,
                pointer: self.state.pointer,
                base,
                seed: self.config.seed,
                anchor_tick: if self.config.stable_targets { 0 } else { tick + 1 },
                tick,
            };
            let lit = core_color(frame.base, bass);

            positions[..core_count]
                .par_iter_mut()
                .zip(colors[..core_count].par_iter_mut())
                .enumerate()
                .for_each(|(i, (pos, color))| {
                    let target = frame.target(i, noise);
                    let next = approach(*pos, target, bass);
                    // A particle that went non-finite snaps onto its target
                    *pos = if next.is_finite() { next } else { target };
                    *color = lit;
                });
            core_count
        };

        let params = FlowParams::new(bass, time, self.config.scatter_extent);
        let dim = atmosphere_color(base, bass);
        let seed = self.config.seed;

        positions[flow_start..]
            .par_iter_mut()
            .zip(colors[flow_start..].par_iter_mut())
            .enumerate()
            .for_each(|(offset, (pos, color))| {
                let index = flow_start + offset;
                let mut rng = SmallRng::seed_from_u64(stream_seed(seed, STREAM_FRAME, index as u64, tick));
                *pos = advance_atmosphere(*pos, effect, &params, index, noise, &mut rng);
                *color = dim;
            });

        self.state.tick += 1;

        Some(TickReport {
            tick: self.state.tick,
            time,
            features,
            breathing: breath,
            shape,
            effect,
            base_color: base,
            particle_size: inputs.particle_size.clamp(0.1, 50.0),
        })
    }
}
