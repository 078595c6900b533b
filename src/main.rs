//! Particle VJ - Main Application
//! Viewer window by default, headless tick loop with `--headless`

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use particle_vj::audio::{FrequencySource, SilentSource};
use particle_vj::color::to_hex_color;
use particle_vj::config::AppConfig;
use particle_vj::runner::{dump_positions, run_headless, HeadlessOptions, StopHandle};
use particle_vj::simulation::{ControlInputs, Simulation};
use particle_vj::track::TrackSource;
use particle_vj::viewer;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON settings file
    #[arg(long)]
    config: Option<String>,

    /// Audio file to analyse and play
    #[arg(long)]
    audio: Option<String>,

    /// Run the simulation without a window
    #[arg(long, default_value_t = false)]
    headless: bool,

    /// Ticks to run headless; runs until the audio ends when omitted
    #[arg(long)]
    ticks: Option<u64>,

    /// Headless tick rate
    #[arg(long, default_value_t = 60.0)]
    fps: f32,

    /// Core geometry index (0-19)
    #[arg(long)]
    shape: Option<usize>,

    /// Atmosphere effect index (0-19)
    #[arg(long)]
    effect: Option<usize>,

    /// Write the final position buffer as little-endian f32 triples
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Override the simulation seed
    #[arg(long)]
    seed: Option<u64>,

    /// Headless: run as fast as possible instead of holding `--fps`
    #[arg(long, default_value_t = false)]
    unpaced: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => AppConfig::load(path).with_context(|| format!("loading {}", path))?,
        None => AppConfig::default(),
    };
    if let Some(shape) = args.shape {
        config.controls.shape = shape;
    }
    if let Some(effect) = args.effect {
        config.controls.effect = effect;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    config.validate()?;

    let inputs = ControlInputs::from_config(&config)?;
    let mut sim = Simulation::new(&config.simulation, &config.audio)?;

    if !args.headless {
        return viewer::run(config, sim, inputs, args.audio);
    }

    if args.ticks.is_none() && args.audio.is_none() {
        anyhow::bail!("--headless needs --ticks or --audio to know when to stop");
    }

    let mut source: Box<dyn FrequencySource> = match args.audio {
        Some(ref path) => Box::new(TrackSource::load(path, &config.audio)?),
        None => Box::new(SilentSource),
    };

    let stop = StopHandle::default();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request_stop())?;

    let options = HeadlessOptions {
        ticks: args.ticks,
        fps: args.fps,
        paced: !args.unpaced,
    };
    let summary = run_headless(&mut sim, &inputs, source.as_mut(), &options, &stop);

    if let Some(report) = summary.last_report {
        log::info!(
            "Finished {} ticks: t={:.2}, bass impulse {:.3}, mood {}, base {}",
            summary.ticks,
            report.time,
            report.features.bass_impulse,
            report.features.mood,
            to_hex_color(report.base_color)
        );
    }

    if let Some(ref path) = args.dump {
        dump_positions(&sim, path)?;
    }

    Ok(())
}
