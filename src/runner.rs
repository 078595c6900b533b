//! Headless Runner
//! Drives the simulation without a window, for batch runs and buffer dumps

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::{FrequencySource, Mood};
use crate::simulation::{ControlInputs, Simulation, SimulationObserver, TickReport};

#[derive(Clone, Debug)]
pub struct HeadlessOptions {
    /// Number of ticks to run; `None` runs until the source is exhausted or stop is requested
    pub ticks: Option<u64>,
    pub fps: f32,
    /// Sleep between ticks to hold the target rate. Unpaced runs use a synthetic clock.
    pub paced: bool,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            ticks: Some(600),
            fps: 60.0,
            paced: false,
        }
    }
}

impl HeadlessOptions {
    fn frame_duration(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            60.0
        };
        Duration::from_secs_f32(1.0 / fps)
    }
}

/// Shared flag that asks a running loop to finish after the current tick
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub last_report: Option<TickReport>,
    pub mood_changes: u32,
    pub last_fps: Option<u32>,
}

/// Observer that logs mood transitions and FPS samples
#[derive(Debug, Default)]
pub struct LogObserver {
    last_mood: Option<Mood>,
    pub mood_changes: u32,
    pub last_fps: Option<u32>,
}

impl SimulationObserver for LogObserver {
    fn on_mood_changed(&mut self, mood: Mood) {
        if self.last_mood != Some(mood) {
            if self.last_mood.is_some() {
                self.mood_changes += 1;
            }
            log::info!("Mood: {}", mood);
            self.last_mood = Some(mood);
        }
    }

    fn on_fps_sample(&mut self, fps: u32) {
        log::info!("FPS: {}", fps);
        self.last_fps = Some(fps);
    }
}

/// Run the loop until the tick budget is spent, the source runs dry or a stop is requested.
/// The simulation is stopped on return.
pub fn run_headless(
    sim: &mut Simulation,
    inputs: &ControlInputs,
    source: &mut dyn FrequencySource,
    options: &HeadlessOptions,
    stop: &StopHandle,
) -> RunSummary {
    let frame = options.frame_duration();
    let mut observer = LogObserver::default();
    let mut summary = RunSummary::default();
    let start = Instant::now();

    sim.start();
    log::info!(
        "Headless run: {} / {} at {:.0} fps{}",
        inputs.shape(),
        inputs.effect(),
        1.0 / frame.as_secs_f32(),
        match options.ticks {
            Some(n) => format!(", {} ticks", n),
            None => String::new(),
        }
    );

    loop {
        if options.ticks.is_some_and(|n| summary.ticks >= n) || stop.is_stop_requested() {
            break;
        }
        if source.is_exhausted() {
            log::info!("Audio source finished");
            break;
        }

        let frame_start = Instant::now();
        let now = if options.paced {
            frame_start
        } else {
            start + frame * summary.ticks as u32
        };

        match sim.tick_at(now, inputs, source, &mut observer) {
            Some(report) => summary.last_report = Some(report),
            None => break,
        }
        summary.ticks += 1;
        source.advance(frame.as_secs_f32());

        if options.paced {
            if let Some(rest) = frame.checked_sub(frame_start.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    sim.stop();
    summary.mood_changes = observer.mood_changes;
    summary.last_fps = observer.last_fps;
    summary
}

/// Write the position buffer as raw little-endian `f32` xyz triples
pub fn dump_positions(sim: &Simulation, path: &Path) -> anyhow::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for p in sim.buffers().positions() {
        for v in p.to_array() {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    writer.flush()?;
    log::info!(
        "Dumped {} positions to {}",
        sim.buffers().len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::StaticSource;
    use crate::config::{AudioConfig, SimulationConfig};

    fn sim(core: usize, atmosphere: usize) -> Simulation {
        Simulation::new(&SimulationConfig::small(core, atmosphere), &AudioConfig::default()).unwrap()
    }

    #[test]
    fn runs_the_requested_number_of_ticks() {
        let mut sim = sim(20, 20);
        let options = HeadlessOptions {
            ticks: Some(130),
            fps: 60.0,
            paced: false,
        };
        let summary = run_headless(
            &mut sim,
            &ControlInputs::default(),
            &mut StaticSource::with_levels(220, 0),
            &options,
            &StopHandle::default(),
        );
        assert_eq!(summary.ticks, 130);
        assert_eq!(summary.last_report.map(|r| r.tick), Some(130));
        assert_eq!(summary.mood_changes, 0);
        // Synthetic clock: two full seconds elapsed
        assert!(summary.last_fps.is_some());
        assert!(!sim.is_running());
    }

    #[test]
    fn stop_request_ends_before_the_first_tick() {
        let mut sim = sim(5, 5);
        let stop = StopHandle::default();
        stop.request_stop();
        let summary = run_headless(
            &mut sim,
            &ControlInputs::default(),
            &mut StaticSource::default(),
            &HeadlessOptions::default(),
            &stop,
        );
        assert_eq!(summary.ticks, 0);
        assert!(summary.last_report.is_none());
    }

    #[test]
    fn dump_writes_twelve_bytes_per_particle() {
        let mut sim = sim(3, 4);
        run_headless(
            &mut sim,
            &ControlInputs::default(),
            &mut StaticSource::default(),
            &HeadlessOptions {
                ticks: Some(2),
                ..HeadlessOptions::default()
            },
            &StopHandle::default(),
        );
        let path = std::env::temp_dir().join(format!("particle_vj_dump_{}.bin", std::process::id()));
        dump_positions(&sim, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(bytes.len(), 7 * 12);
        assert_eq!(bytes.as_slice(), sim.buffers().position_bytes());
    }
}
