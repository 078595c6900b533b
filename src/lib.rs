//! Particle VJ
//! Audio-reactive particle engine: 20 core geometries, 20 atmosphere flow fields

pub mod audio;
pub mod color;
pub mod config;
pub mod field;
pub mod flows;
pub mod runner;
pub mod shapes;
pub mod simulation;
pub mod track;
pub mod viewer;

pub use audio::{AudioFeatures, FrequencySource, Mood, SilentSource, StaticSource};
pub use config::AppConfig;
pub use flows::AtmosphereEffect;
pub use shapes::CoreShape;
pub use simulation::{
    ControlInputs, ParticleBuffers, PointerState, Simulation, SimulationObserver, TickReport,
};
