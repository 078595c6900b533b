//! Color Policy
//! Palette lookup, override precedence, exponential smoothing and beat brightness

use glam::Vec3;

use crate::shapes::CoreShape;

/// Base color before any shape has been chosen, also used while an image is displayed
pub const DEFAULT_BASE_COLOR: Vec3 = Vec3::new(0.05, 0.5, 1.0);

/// Fraction of the remaining distance covered per frame
pub const COLOR_LERP_RATE: f32 = 0.1;

/// Default color for each core shape, indexed by `CoreShape::index()`
pub const SHAPE_PALETTE: [[f32; 3]; CoreShape::COUNT] = [
    [0.0, 1.0, 1.0], // tornado: cyan
    [0.0, 0.4, 1.0], // cube: blue
    [1.0, 0.0, 0.6], // neural sphere: hot pink
    [1.0, 0.0, 0.0], // heart: red
    [0.2, 1.0, 0.3], // dna: green
    [0.6, 0.0, 1.0], // ring: purple
    [1.0, 0.8, 0.0], // pyramid: gold
    [1.0, 1.0, 1.0], // infinity: white
    [0.8, 0.9, 1.0], // star cluster: silver
    [0.0, 1.0, 0.2], // digital rain: matrix green
    [0.0, 0.2, 1.0], // atom: deep blue
    [1.0, 0.4, 0.0], // grid plains: orange
    [0.8, 0.6, 0.4], // saturn: beige
    [0.9, 0.0, 0.3], // data spike: crimson
    [0.6, 0.4, 0.9], // cross fire: lavender
    [0.0, 0.9, 0.9], // fluid wave: teal
    [0.8, 1.0, 1.0], // crystal: ice
    [0.5, 0.0, 0.8], // warp tunnel: violet
    [1.0, 0.0, 1.0], // chaos: magenta
    [0.1, 0.1, 0.1], // singularity: dark
];

pub fn palette_color(shape: CoreShape) -> Vec3 {
    Vec3::from_array(SHAPE_PALETTE[shape.index()])
}

/// Externally supplied colors that take precedence over the palette
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ColorOverrides {
    /// Picked by the user
    pub manual: Option<Vec3>,
    /// Derived from lyric sentiment by an external collaborator
    pub sentiment: Option<Vec3>,
    /// An image is being displayed instead of a core shape
    pub image_mode: bool,
}

/// Resolve the color the smoothed base should head toward this frame
pub fn compute_target_color(shape: CoreShape, overrides: &ColorOverrides) -> Vec3 {
    if let Some(manual) = overrides.manual {
        return sanitize(manual);
    }
    if let Some(sentiment) = overrides.sentiment {
        return sanitize(sentiment);
    }
    if overrides.image_mode {
        return DEFAULT_BASE_COLOR;
    }
    palette_color(shape)
}

fn sanitize(color: Vec3) -> Vec3 {
    if color.is_finite() {
        color.clamp(Vec3::ZERO, Vec3::ONE)
    } else {
        DEFAULT_BASE_COLOR
    }
}

/// Smoothed base color shared by every particle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BaseColor {
    pub current: Vec3,
}

impl Default for BaseColor {
    fn default() -> Self {
        Self {
            current: DEFAULT_BASE_COLOR,
        }
    }
}

impl BaseColor {
    /// One smoothing step: `current += (target - current) * rate`
    pub fn step(&mut self, target: Vec3) -> Vec3 {
        self.current += (target - self.current) * COLOR_LERP_RATE;
        self.current
    }
}

/// Core particles flash up to 3x on a full bass hit
#[inline]
pub fn core_color(base: Vec3, bass_impulse: f32) -> Vec3 {
    let brightness = 1.0 + bass_impulse * 2.0;
    (base * brightness).min(Vec3::ONE)
}

/// Atmosphere particles sit at 30% of the base and flash to 80%
#[inline]
pub fn atmosphere_color(base: Vec3, bass_impulse: f32) -> Vec3 {
    let dim = 0.3 + bass_impulse * 0.5;
    (base * dim).min(Vec3::ONE)
}

/// Parse `#rrggbb` (leading `#` optional) into 0.0-1.0 channels
pub fn parse_hex_color(hex: &str) -> anyhow::Result<Vec3> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 {
        anyhow::bail!("expected a #rrggbb color, got {:?}", hex);
    }
    let rgb = u32::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("invalid hex color {:?}: {}", hex, e))?;
    Ok(Vec3::new(
        ((rgb >> 16) & 0xff) as f32 / 255.0,
        ((rgb >> 8) & 0xff) as f32 / 255.0,
        (rgb & 0xff) as f32 / 255.0,
    ))
}

/// Inverse of [`parse_hex_color`], used by the viewer color picker
pub fn to_hex_color(color: Vec3) -> String {
    let c = (color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
    format!("#{:02x}{:02x}{:02x}", c.x as u8, c.y as u8, c.z as u8)
}
