//! Audio Track Source
//! File decoding, a byte spectrum analyser and playback for the viewer

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rodio::{Decoder, OutputStream, Sink};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::FrequencySource;
use crate::config::AudioConfig;

/// Decoded mono PCM
#[derive(Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration: f32,
}

/// Decode a whole file to mono samples
pub fn decode_file(path: &str) -> anyhow::Result<DecodedAudio> {
    let path = Path::new(path);
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension() {
        hint.with_extension(&ext.to_string_lossy());
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow::anyhow!("No audio track found"))?;

    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2).max(1);
    let track_id = track.id;

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(_) => break,
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
                sample_buf.copy_interleaved_ref(decoded);

                // Mix to mono
                for chunk in sample_buf.samples().chunks(channels) {
                    samples.push(chunk.iter().sum::<f32>() / channels as f32);
                }
            }
            // Corrupt packets are skipped
            Err(_) => continue,
        }
    }

    if samples.is_empty() {
        anyhow::bail!("{} decoded to zero samples", path.display());
    }

    let duration = samples.len() as f32 / sample_rate as f32;
    log::info!(
        "Decoded {} ({:.1}s @ {} Hz, {} ch)",
        path.display(),
        duration,
        sample_rate,
        channels
    );

    Ok(DecodedAudio {
        samples,
        sample_rate,
        duration,
    })
}

/// Byte magnitude spectrum in the style of a browser analyser node:
/// Blackman window, time smoothing between snapshots, dB mapped onto 0-255.
pub struct SpectrumAnalyser {
    fft: Arc<dyn Fft<f32>>,
    fft_size: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyser {
    pub fn new(config: &AudioConfig) -> Self {
        let fft_size = config.fft_size.max(32);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let n = fft_size as f32;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f32 / n;
                0.42 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
                    + 0.08 * (4.0 * std::f32::consts::PI * x).cos()
            })
            .collect();

        Self {
            fft,
            fft_size,
            window,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
            bytes: vec![0; fft_size / 2],
            smoothing: config.smoothing.clamp(0.0, 1.0),
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Analyse the `fft_size` samples ending at `end`; missing history is zero-padded
    pub fn analyse(&mut self, samples: &[f32], end: usize) -> &[u8] {
        let end = end.min(samples.len());
        let start = end.saturating_sub(self.fft_size);
        let pad = self.fft_size - (end - start);

        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = if i < pad { 0.0 } else { samples[start + i - pad] };
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let scale = 1.0 / self.fft_size as f32;
        let range = self.max_decibels - self.min_decibels;
        for k in 0..self.bin_count() {
            let magnitude = self.scratch[k].norm() * scale;
            let value = self.smoothing * self.smoothed[k] + (1.0 - self.smoothing) * magnitude;
            self.smoothed[k] = if value.is_finite() { value } else { 0.0 };

            let db = 20.0 * self.smoothed[k].max(1e-12).log10();
            let scaled = 255.0 / range * (db - self.min_decibels);
            self.bytes[k] = scaled.floor().clamp(0.0, 255.0) as u8;
        }
        &self.bytes
    }

    pub fn reset(&mut self) {
        self.smoothed.iter_mut().for_each(|v| *v = 0.0);
        self.bytes.iter_mut().for_each(|v| *v = 0);
    }
}

/// A decoded track exposed as a frequency source at a movable playhead
pub struct TrackSource {
    audio: Arc<DecodedAudio>,
    analyser: SpectrumAnalyser,
    position: f32,
}

impl TrackSource {
    pub fn new(audio: Arc<DecodedAudio>, config: &AudioConfig) -> Self {
        Self {
            audio,
            analyser: SpectrumAnalyser::new(config),
            position: 0.0,
        }
    }

    pub fn load(path: &str, config: &AudioConfig) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(decode_file(path)?), config))
    }

    /// Move the playhead; a backward jump drops the analyser's smoothing history
    pub fn set_position(&mut self, seconds: f32) {
        let target = seconds.clamp(0.0, self.audio.duration);
        if target < self.position {
            self.analyser.reset();
        }
        self.position = target;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn duration(&self) -> f32 {
        self.audio.duration
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.audio.duration
    }
}

impl FrequencySource for TrackSource {
    fn frequency_magnitudes(&mut self) -> &[u8] {
        if self.is_finished() {
            return &[];
        }
        let end = (self.position * self.audio.sample_rate as f32) as usize;
        self.analyser.analyse(&self.audio.samples, end)
    }

    fn advance(&mut self, seconds: f32) {
        self.set_position(self.position + seconds.max(0.0));
    }

    fn is_exhausted(&self) -> bool {
        self.is_finished()
    }
}

/// Wall-clock position of a playing sink. The clock is passed in so the
/// bookkeeping is independent of the output device.
#[derive(Clone, Copy, Debug, Default)]
pub struct Playhead {
    started_at: Option<Instant>,
    accumulated: Duration,
}

impl Playhead {
    /// Start or resume counting from `now`; no-op while already running
    pub fn resume(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(start) = self.started_at.take() {
            self.accumulated += now.saturating_duration_since(start);
        }
    }

    /// Back to zero and stopped
    pub fn rewind(&mut self) {
        self.started_at = None;
        self.accumulated = Duration::ZERO;
    }

    /// Back to zero and running from `now`
    pub fn restart(&mut self, now: Instant) {
        self.rewind();
        self.resume(now);
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Seconds played up to `now`
    pub fn position(&self, now: Instant) -> f32 {
        let running = self
            .started_at
            .map(|s| now.saturating_duration_since(s))
            .unwrap_or_default();
        (self.accumulated + running).as_secs_f32()
    }
}

/// Playback through the default output device, with a wall-clock playhead
pub struct AudioPlayer {
    _stream: OutputStream,
    sink: Sink,
    path: Option<String>,
    playhead: Playhead,
}

impl AudioPlayer {
    pub fn new() -> anyhow::Result<Self> {
        let (stream, handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&handle)?;
        Ok(Self {
            _stream: stream,
            sink,
            path: None,
            playhead: Playhead::default(),
        })
    }

    pub fn load(&mut self, path: &str) -> anyhow::Result<()> {
        self.path = Some(path.to_string());
        self.reload()?;
        self.playhead.rewind();
        Ok(())
    }

    fn reload(&self) -> anyhow::Result<()> {
        if let Some(ref path) = self.path {
            let source = Decoder::new(BufReader::new(File::open(path)?))?;
            self.sink.stop();
            self.sink.append(source);
            self.sink.pause();
        }
        Ok(())
    }

    pub fn play(&mut self) {
        let now = Instant::now();
        if self.sink.empty() {
            // Finished or stopped: replay from the top
            if let Err(e) = self.reload() {
                log::error!("Failed to reload audio: {}", e);
                return;
            }
            self.playhead.restart(now);
        } else {
            self.playhead.resume(now);
        }
        self.sink.play();
    }

    pub fn pause(&mut self) {
        self.sink.pause();
        self.playhead.pause(Instant::now());
    }

    pub fn stop(&mut self) {
        self.sink.stop();
        self.playhead.rewind();
    }

    pub fn set_volume(&self, volume: f32) {
        self.sink.set_volume(volume.clamp(0.0, 1.0));
    }

    pub fn is_playing(&self) -> bool {
        self.playhead.is_running() && !self.sink.empty()
    }

    pub fn is_loaded(&self) -> bool {
        self.path.is_some()
    }

    /// Seconds of audio played so far
    pub fn position(&self) -> f32 {
        self.playhead.position(Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> DecodedAudio {
        let len = (sample_rate as f32 * seconds) as usize;
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect();
        DecodedAudio {
            samples,
            sample_rate,
            duration: seconds,
        }
    }

    #[test]
    fn low_tone_lights_the_bass_bin() {
        let config = AudioConfig::default();
        // Bin 3 at 44.1 kHz / 2048 sits near 64.6 Hz
        let audio = Arc::new(sine(64.6, 44_100, 1.0));
        let mut source = TrackSource::new(audio, &config);
        source.set_position(0.5);
        let mut bins = Vec::new();
        for _ in 0..30 {
            bins = source.frequency_magnitudes().to_vec();
        }
        assert_eq!(bins.len(), 1024);
        assert!(bins[3] > 200, "bass bin {}", bins[3]);
        assert!(bins[3] > bins[100]);
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let config = AudioConfig::default();
        let audio = Arc::new(DecodedAudio {
            samples: vec![0.0; 44_100],
            sample_rate: 44_100,
            duration: 1.0,
        });
        let mut source = TrackSource::new(audio, &config);
        source.set_position(0.5);
        assert!(source.frequency_magnitudes().iter().all(|&b| b == 0));
    }

    #[test]
    fn finished_track_reports_no_audio() {
        let config = AudioConfig::default();
        let mut source = TrackSource::new(Arc::new(sine(440.0, 8000, 0.25)), &config);
        source.advance(10.0);
        assert!(source.is_finished());
        assert!(source.frequency_magnitudes().is_empty());
    }

    #[test]
    fn playhead_counts_only_while_running() {
        let t0 = Instant::now();
        let secs = |s: u64| t0 + Duration::from_secs(s);
        let mut playhead = Playhead::default();
        assert_eq!(playhead.position(secs(5)), 0.0);

        playhead.resume(t0);
        playhead.resume(secs(1));
        assert_eq!(playhead.position(secs(3)), 3.0);

        playhead.pause(secs(3));
        assert!(!playhead.is_running());
        assert_eq!(playhead.position(secs(10)), 3.0);

        playhead.resume(secs(10));
        assert_eq!(playhead.position(secs(12)), 5.0);
    }

    #[test]
    fn replay_after_the_end_starts_from_zero() {
        let t0 = Instant::now();
        let mut playhead = Playhead::default();
        playhead.resume(t0);
        // Track ran out on its own; the playhead was never paused
        let replay_at = t0 + Duration::from_secs(240);
        playhead.restart(replay_at);
        assert_eq!(playhead.position(replay_at), 0.0);
        assert_eq!(playhead.position(replay_at + Duration::from_millis(500)), 0.5);
    }

    #[test]
    fn seeking_back_clears_the_smoothing_history() {
        let config = AudioConfig::default();
        let audio = Arc::new(DecodedAudio {
            samples: (0..44_100)
                .map(|i| if i < 22_050 { (i as f32 * 0.0092).sin() } else { 0.0 })
                .collect(),
            sample_rate: 44_100,
            duration: 1.0,
        });
        let mut source = TrackSource::new(audio, &config);
        source.set_position(0.25);
        assert!(source.frequency_magnitudes().iter().any(|&b| b > 0));

        // Jump into the silent half, then back to the start
        source.set_position(0.9);
        source.set_position(0.0);
        assert_eq!(source.position(), 0.0);
        assert!(source.frequency_magnitudes().iter().all(|&b| b == 0));
    }

    #[test]
    fn playhead_at_start_zero_pads() {
        let config = AudioConfig::default();
        let mut analyser = SpectrumAnalyser::new(&config);
        let bytes = analyser.analyse(&[0.5; 10], 10);
        assert_eq!(bytes.len(), 1024);
    }
}
