//! Audio Feature Extraction for Particle VJ
//! Frequency source boundary, bass/treble impulses and mood classification

use serde::{Deserialize, Serialize};

use crate::config::AudioConfig;

/// Anything that can hand the simulation a byte magnitude spectrum once per frame.
///
/// Reads must be non-blocking snapshots. An empty slice means no audio is
/// available and is treated as silence.
pub trait FrequencySource {
    fn frequency_magnitudes(&mut self) -> &[u8];

    /// Move the playhead forward; live and fixed sources ignore it
    fn advance(&mut self, _seconds: f32) {}

    /// True once a finite source has nothing left to play
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Source used before any audio is loaded
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentSource;

impl FrequencySource for SilentSource {
    fn frequency_magnitudes(&mut self) -> &[u8] {
        &[]
    }
}

/// Fixed spectrum, handy for tests and demos
#[derive(Clone, Debug, Default)]
pub struct StaticSource {
    pub bins: Vec<u8>,
}

impl StaticSource {
    pub fn new(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    /// Spectrum with the given bass and treble values at the default probe bins
    pub fn with_levels(bass: u8, treble: u8) -> Self {
        let defaults = AudioConfig::default();
        let mut source = Self::new(defaults.fft_size / 2);
        source.set_bin(defaults.bass_bin, bass);
        source.set_bin(defaults.treble_bin, treble);
        source
    }

    pub fn set_bin(&mut self, bin: usize, value: u8) {
        if bin >= self.bins.len() {
            self.bins.resize(bin + 1, 0);
        }
        self.bins[bin] = value;
    }
}

impl FrequencySource for StaticSource {
    fn frequency_magnitudes(&mut self) -> &[u8] {
        &self.bins
    }
}

/// Energy label derived from the bass bin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Neutral,
    High,
    Chaos,
}

impl Default for Mood {
    fn default() -> Self {
        Self::Neutral
    }
}

impl Mood {
    pub fn label(self) -> &'static str {
        match self {
            Self::Neutral => "NEUTRAL",
            Self::High => "HIGH",
            Self::Chaos => "CHAOS",
        }
    }
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub const BASS_THRESHOLD: f32 = 140.0;
pub const TREBLE_THRESHOLD: f32 = 100.0;
const HIGH_MOOD_BASS: f32 = 170.0;
const CHAOS_MOOD_BASS: f32 = 210.0;

/// `((bass - 140) / 115)^2` above the threshold, zero at or below it
#[inline]
pub fn bass_impulse(bass: f32) -> f32 {
    if bass > BASS_THRESHOLD {
        ((bass - BASS_THRESHOLD) / (255.0 - BASS_THRESHOLD)).powi(2)
    } else {
        0.0
    }
}

/// `(treble - 100) / 155` above the threshold, zero at or below it
#[inline]
pub fn treble_impulse(treble: f32) -> f32 {
    if treble > TREBLE_THRESHOLD {
        (treble - TREBLE_THRESHOLD) / (255.0 - TREBLE_THRESHOLD)
    } else {
        0.0
    }
}

pub fn classify_mood(bass: f32) -> Mood {
    if bass > CHAOS_MOOD_BASS {
        Mood::Chaos
    } else if bass > HIGH_MOOD_BASS {
        Mood::High
    } else {
        Mood::Neutral
    }
}

/// Everything the simulation reads from one spectrum snapshot
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AudioFeatures {
    pub bass: f32,
    pub treble: f32,
    pub bass_impulse: f32,
    /// Computed and reported; nothing in the motion model consumes it yet
    pub treble_impulse: f32,
    pub mood: Mood,
    /// False when the source returned an empty spectrum
    pub has_audio: bool,
}

impl AudioFeatures {
    pub fn silent() -> Self {
        Self::default()
    }

    /// Extract features from a spectrum; bins past the end read as zero
    pub fn extract(magnitudes: &[u8], bass_bin: usize, treble_bin: usize) -> Self {
        if magnitudes.is_empty() {
            return Self::silent();
        }
        let bass = magnitudes.get(bass_bin).copied().unwrap_or(0) as f32;
        let treble = magnitudes.get(treble_bin).copied().unwrap_or(0) as f32;
        Self {
            bass,
            treble,
            bass_impulse: bass_impulse(bass),
            treble_impulse: treble_impulse(treble),
            mood: classify_mood(bass),
            has_audio: true,
        }
    }
}
