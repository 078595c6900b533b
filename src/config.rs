//! Configuration System for Particle VJ
//! Simulation sizing, audio analysis, viewer and initial control settings

use serde::{Deserialize, Serialize};

use crate::color::parse_hex_color;

/// Total particles in the cloud
pub const PARTICLE_COUNT: usize = 100_000;
/// Leading slots that form the core geometry
pub const CORE_COUNT: usize = 25_000;

// ============================================================================
// Simulation Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SimulationConfig {
    pub particle_count: usize,
    pub core_count: usize,
    /// Seed for every random stream in the simulation
    pub seed: u64,
    /// Keep each core particle on the same sampled point of a shape between frames.
    /// When false the shape is re-sampled every tick.
    pub stable_targets: bool,
    /// Half-extent of the cube particles are scattered in at startup
    pub scatter_extent: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particle_count: PARTICLE_COUNT,
            core_count: CORE_COUNT,
            seed: 0x5EED_CAFE,
            stable_targets: true,
            scatter_extent: 1000.0,
        }
    }
}

impl SimulationConfig {
    /// Small-scale config used by tests and quick headless runs
    pub fn small(core_count: usize, atmosphere_count: usize) -> Self {
        Self {
            particle_count: core_count + atmosphere_count,
            core_count,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.particle_count == 0 {
            anyhow::bail!("particle_count must be greater than zero");
        }
        if self.core_count > self.particle_count {
            anyhow::bail!(
                "core_count ({}) exceeds particle_count ({})",
                self.core_count,
                self.particle_count
            );
        }
        if !self.scatter_extent.is_finite() || self.scatter_extent <= 0.0 {
            anyhow::bail!("scatter_extent must be a positive finite number");
        }
        Ok(())
    }

    pub fn atmosphere_count(&self) -> usize {
        self.particle_count.saturating_sub(self.core_count)
    }
}

// ============================================================================
// Audio Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AudioConfig {
    /// Frequency bin used as the bass proxy
    pub bass_bin: usize,
    /// Frequency bin used as the treble proxy
    pub treble_bin: usize,
    pub fft_size: usize,
    /// Time smoothing between analyser snapshots (0.0-1.0)
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            bass_bin: 3,
            treble_bin: 100,
            fft_size: 2048,
            smoothing: 0.85,
            min_decibels: -100.0,
            max_decibels: -30.0,
            volume: 1.0,
        }
    }
}

impl AudioConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            anyhow::bail!("fft_size must be a power of two >= 32, got {}", self.fft_size);
        }
        if self.max_decibels <= self.min_decibels {
            anyhow::bail!("max_decibels must be greater than min_decibels");
        }
        Ok(())
    }
}

// ============================================================================
// Viewer Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct ViewerConfig {
    pub particle_size: f32,
    pub auto_rotate: bool,
    pub auto_rotate_speed: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
    pub camera_position: [f32; 3],
    pub window_size: [f32; 2],
    pub background: [u8; 3],
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            particle_size: 3.0,
            auto_rotate: false,
            auto_rotate_speed: 1.0,
            fov: 75.0,
            camera_position: [0.0, 300.0, 900.0],
            window_size: [1400.0, 800.0],
            background: [0, 0, 0],
        }
    }
}

// ============================================================================
// Control Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct ControlConfig {
    pub shape: usize,
    pub effect: usize,
    /// Manual base color as `#rrggbb`
    pub manual_color: Option<String>,
}

impl ControlConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(ref hex) = self.manual_color {
            parse_hex_color(hex)?;
        }
        Ok(())
    }
}

// ============================================================================
// Main App Configuration
// ============================================================================

#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub controls: ControlConfig,
}

impl AppConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.simulation.validate()?;
        self.audio.validate()?;
        self.controls.validate()?;
        Ok(())
    }

    pub fn save(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &str) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.atmosphere_count(), 75_000);
    }

    #[test]
    fn core_count_larger_than_particles_is_rejected() {
        let mut config = AppConfig::default();
        config.simulation.core_count = config.simulation.particle_count + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_manual_color_is_rejected() {
        let mut config = AppConfig::default();
        config.controls.manual_color = Some("#12345".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let json = r##"{ "controls": { "shape": 5, "effect": 0, "manual_color": "#ff0080" } }"##;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.controls.shape, 5);
        assert_eq!(config.simulation.core_count, CORE_COUNT);
        assert_eq!(config.audio.bass_bin, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load_through_a_file() {
        let path = std::env::temp_dir().join(format!("particle_vj_cfg_{}.json", std::process::id()));
        let path = path.to_string_lossy().to_string();

        let mut config = AppConfig::default();
        config.simulation.seed = 42;
        config.controls.effect = 13;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.simulation.seed, 42);
        assert_eq!(loaded.controls.effect, 13);
        let _ = std::fs::remove_file(&path);
    }
}
