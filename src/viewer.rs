//! Particle VJ Viewer
//! egui window: perspective camera, particle quads, controls and audio transport

use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use glam::{Mat4, Vec3};

use crate::audio::{FrequencySource, Mood, SilentSource};
use crate::color::to_hex_color;
use crate::config::AppConfig;
use crate::flows::AtmosphereEffect;
use crate::shapes::CoreShape;
use crate::simulation::{ControlInputs, PointerState, Simulation, SimulationObserver};
use crate::track::{AudioPlayer, TrackSource};

// ============================================================================
// Camera
// ============================================================================

pub const ZOOM_STEP: f32 = 20.0;
const MIN_DISTANCE: f32 = 50.0;
const MAX_DISTANCE: f32 = 5000.0;
const NEAR: f32 = 1.0;
const FAR: f32 = 10_000.0;

/// Orbit camera around the origin
#[derive(Clone, Debug)]
pub struct OrbitCamera {
    pub yaw: f32,
    pub pitch: f32,
    pub distance: f32,
    /// Vertical field of view in degrees
    pub fov: f32,
}

impl OrbitCamera {
    pub fn from_position(position: Vec3, fov: f32) -> Self {
        let distance = position.length().clamp(MIN_DISTANCE, MAX_DISTANCE);
        let dir = position.normalize_or_zero();
        Self {
            yaw: dir.x.atan2(dir.z),
            pitch: dir.y.clamp(-1.0, 1.0).asin(),
            distance,
            fov: fov.clamp(10.0, 150.0),
        }
    }

    pub fn position(&self) -> Vec3 {
        let (sy, cy) = self.yaw.sin_cos();
        let (sp, cp) = self.pitch.sin_cos();
        Vec3::new(cp * sy, sp, cp * cy) * self.distance
    }

    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let proj = Mat4::perspective_rh(self.fov.to_radians(), aspect.max(1e-3), NEAR, FAR);
        let view = Mat4::look_at_rh(self.position(), Vec3::ZERO, Vec3::Y);
        proj * view
    }

    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance - steps * ZOOM_STEP).clamp(MIN_DISTANCE, MAX_DISTANCE);
    }

    pub fn orbit(&mut self, dx: f32, dy: f32) {
        self.yaw -= dx * 0.005;
        self.pitch = (self.pitch + dy * 0.005).clamp(-1.5, 1.5);
    }

    /// One full turn per minute at speed 1
    pub fn auto_rotate(&mut self, speed: f32, dt: f32) {
        self.yaw += std::f32::consts::TAU / 60.0 * speed * dt;
    }
}

/// Project a world point into `rect`. Returns the screen position and the
/// clip-space w, or `None` when the point is behind the camera or off screen.
pub fn project(view_proj: &Mat4, point: Vec3, rect: egui::Rect) -> Option<(egui::Pos2, f32)> {
    let clip = *view_proj * point.extend(1.0);
    if clip.w <= NEAR {
        return None;
    }
    let ndc = clip.truncate() / clip.w;
    if ndc.x.abs() > 1.0 || ndc.y.abs() > 1.0 || ndc.z.abs() > 1.0 {
        return None;
    }
    let center = rect.center();
    let pos = egui::pos2(
        center.x + ndc.x * rect.width() * 0.5,
        center.y - ndc.y * rect.height() * 0.5,
    );
    Some((pos, clip.w))
}

// ============================================================================
// App
// ============================================================================

/// Latest values pushed by the simulation callbacks
#[derive(Default)]
struct ViewerStatus {
    mood: Mood,
    fps: u32,
}

impl SimulationObserver for ViewerStatus {
    fn on_mood_changed(&mut self, mood: Mood) {
        self.mood = mood;
    }

    fn on_fps_sample(&mut self, fps: u32) {
        self.fps = fps;
    }
}

pub struct ViewerApp {
    config: AppConfig,
    sim: Simulation,
    inputs: ControlInputs,
    pointer: Arc<PointerState>,
    camera: OrbitCamera,
    status: ViewerStatus,
    player: Option<AudioPlayer>,
    track: Option<TrackSource>,
    track_name: Option<String>,
    manual_enabled: bool,
    manual_rgb: [f32; 3],
    show_controls: bool,
    last_update: Instant,
}

impl ViewerApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        config: AppConfig,
        mut sim: Simulation,
        inputs: ControlInputs,
        audio_path: Option<String>,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.panel_fill = egui::Color32::from_rgba_unmultiplied(10, 10, 18, 235);
        cc.egui_ctx.set_visuals(visuals);

        let player = match AudioPlayer::new() {
            Ok(player) => {
                player.set_volume(config.audio.volume);
                Some(player)
            }
            Err(e) => {
                log::warn!("No audio output device, visuals only: {}", e);
                None
            }
        };

        let camera = OrbitCamera::from_position(Vec3::from(config.viewer.camera_position), config.viewer.fov);
        let manual_rgb = inputs.manual_color.map(|c| c.to_array()).unwrap_or([1.0, 1.0, 1.0]);
        sim.start();

        let mut app = Self {
            pointer: sim.pointer(),
            sim,
            manual_enabled: inputs.manual_color.is_some(),
            manual_rgb,
            inputs,
            camera,
            status: ViewerStatus::default(),
            player,
            track: None,
            track_name: None,
            show_controls: true,
            last_update: Instant::now(),
            config,
        };
        if let Some(path) = audio_path {
            app.load_audio(path);
        }
        app
    }

    fn load_audio(&mut self, path: String) {
        match TrackSource::load(&path, &self.config.audio) {
            Ok(track) => {
                self.track = Some(track);
                self.track_name = std::path::Path::new(&path)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string());
                if let Some(ref mut player) = self.player {
                    match player.load(&path) {
                        Ok(()) => player.play(),
                        Err(e) => log::error!("Error starting playback: {}", e),
                    }
                }
            }
            Err(e) => {
                log::error!("Error loading audio: {}", e);
            }
        }
    }

    fn is_playing(&self) -> bool {
        match self.player {
            Some(ref player) => player.is_playing(),
            // Without an output device the track still drives the visuals
            None => self.track.is_some(),
        }
    }

    fn save_settings(&mut self, path: &str) {
        self.config.controls.shape = self.inputs.shape;
        self.config.controls.effect = self.inputs.effect;
        self.config.controls.manual_color = self.inputs.manual_color.map(to_hex_color);
        self.config.viewer.particle_size = self.inputs.particle_size;
        match self.config.save(path) {
            Ok(()) => log::info!("Settings saved to {}", path),
            Err(e) => log::error!("Error saving settings: {}", e),
        }
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        // Playhead follows the audible position
        let playing = self.is_playing();
        if let Some(ref mut track) = self.track {
            match self.player {
                Some(ref player) => track.set_position(player.position()),
                None => track.advance(dt),
            }
        }

        self.inputs.is_playing = playing;
        self.inputs.manual_color = self.manual_enabled.then(|| Vec3::from(self.manual_rgb));

        let mut silent = SilentSource;
        let source: &mut dyn FrequencySource = match self.track.as_mut() {
            Some(track) => track,
            None => &mut silent,
        };
        self.sim.tick_at(now, &self.inputs, source, &mut self.status);

        if self.config.viewer.auto_rotate {
            self.camera.auto_rotate(self.config.viewer.auto_rotate_speed, dt);
        }

        self.render_top_bar(ctx);
        if self.show_controls {
            self.render_controls(ctx);
        }
        self.render_canvas(ctx);

        ctx.request_repaint();
    }
}

impl Drop for ViewerApp {
    fn drop(&mut self) {
        self.sim.stop();
        if let Some(ref mut player) = self.player {
            player.stop();
        }
    }
}

impl ViewerApp {
    fn render_top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("Particle VJ");
                ui.separator();

                if ui.button("📂 Load Audio").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Audio", &["mp3", "wav", "ogg", "flac"])
                        .pick_file()
                    {
                        self.load_audio(path.to_string_lossy().to_string());
                    }
                }

                if let Some(ref mut player) = self.player {
                    if player.is_loaded() {
                        if player.is_playing() {
                            if ui.button("⏸ Pause").clicked() {
                                player.pause();
                            }
                        } else if ui.button("▶ Play").clicked() {
                            player.play();
                        }
                        if ui.button("⏹ Stop").clicked() {
                            player.stop();
                        }
                    }
                }

                if let (Some(name), Some(track)) = (&self.track_name, &self.track) {
                    ui.label(format!("{}  {:.1}s / {:.1}s", name, track.position(), track.duration()));
                }

                ui.separator();
                ui.toggle_value(&mut self.show_controls, "⚙ Controls");

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.label(format!("FPS: {}", self.status.fps));
                    ui.separator();
                    let mood_color = match self.status.mood {
                        Mood::Neutral => egui::Color32::from_rgb(120, 180, 255),
                        Mood::High => egui::Color32::from_rgb(255, 200, 80),
                        Mood::Chaos => egui::Color32::from_rgb(255, 70, 70),
                    };
                    ui.colored_label(mood_color, self.status.mood.label());
                    ui.separator();
                    let state = self.sim.state();
                    ui.label(format!("{} / {}", state.shape, state.effect));
                });
            });
        });
    }

    fn render_controls(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("controls_panel")
            .min_width(260.0)
            .show(ctx, |ui| {
                ui.heading("Controls");
                ui.separator();

                ui.label("Core geometry:");
                egui::ComboBox::from_id_source("shape_combo")
                    .selected_text(self.inputs.shape().name())
                    .show_ui(ui, |ui| {
                        for shape in CoreShape::ALL {
                            ui.selectable_value(&mut self.inputs.shape, shape.index(), shape.name());
                        }
                    });

                ui.label("Atmosphere:");
                egui::ComboBox::from_id_source("effect_combo")
                    .selected_text(self.inputs.effect().name())
                    .show_ui(ui, |ui| {
                        for effect in AtmosphereEffect::ALL {
                            ui.selectable_value(&mut self.inputs.effect, effect.index(), effect.name());
                        }
                    });

                ui.separator();

                ui.horizontal(|ui| {
                    ui.checkbox(&mut self.manual_enabled, "Manual color");
                    ui.color_edit_button_rgb(&mut self.manual_rgb);
                });
                ui.checkbox(&mut self.inputs.image_mode, "Image mode")
                    .on_hover_text("Core particles join the atmosphere");

                ui.label("Particle size:");
                ui.add(egui::Slider::new(&mut self.inputs.particle_size, 0.5..=10.0));

                ui.separator();

                ui.checkbox(&mut self.config.viewer.auto_rotate, "Auto-rotate");
                if self.config.viewer.auto_rotate {
                    ui.add(egui::Slider::new(&mut self.config.viewer.auto_rotate_speed, 0.1..=10.0).text("Speed"));
                }

                if let Some(ref player) = self.player {
                    ui.label("Volume:");
                    if ui.add(egui::Slider::new(&mut self.config.audio.volume, 0.0..=1.0)).changed() {
                        player.set_volume(self.config.audio.volume);
                    }
                }

                ui.separator();

                if ui.button("💾 Save Settings").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("JSON", &["json"])
                        .set_file_name("particle-vj.json")
                        .save_file()
                    {
                        self.save_settings(&path.to_string_lossy());
                    }
                }
            });
    }

    fn render_canvas(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::none())
            .show(ctx, |ui| {
                let (rect, response) =
                    ui.allocate_exact_size(ui.available_size(), egui::Sense::click_and_drag());

                if response.dragged() {
                    let delta = response.drag_delta();
                    self.camera.orbit(delta.x, delta.y);
                }
                if let Some(pos) = response.hover_pos() {
                    let x = (pos.x - rect.center().x) / (rect.width() * 0.5);
                    let y = -(pos.y - rect.center().y) / (rect.height() * 0.5);
                    self.pointer.set(x, y);
                }

                let (zoom_in, zoom_out) = ctx.input(|i| {
                    (i.key_pressed(egui::Key::ArrowUp), i.key_pressed(egui::Key::ArrowDown))
                });
                if zoom_in {
                    self.camera.zoom(1.0);
                }
                if zoom_out {
                    self.camera.zoom(-1.0);
                }

                let painter = ui.painter_at(rect);
                let bg = self.config.viewer.background;
                painter.rect_filled(rect, 0.0, egui::Color32::from_rgb(bg[0], bg[1], bg[2]));

                let mesh = build_particle_mesh(
                    &self.sim,
                    &self.camera,
                    rect,
                    self.inputs.particle_size,
                );
                painter.add(egui::Shape::mesh(mesh));
            });
    }
}

/// Opacity of the additive particle sprites
const SPRITE_OPACITY: f32 = 0.8;

/// One screen-aligned quad per visible particle, sized with distance
/// attenuation and blended additively.
fn build_particle_mesh(
    sim: &Simulation,
    camera: &OrbitCamera,
    rect: egui::Rect,
    particle_size: f32,
) -> egui::Mesh {
    let view_proj = camera.view_projection(rect.width() / rect.height().max(1.0));
    let scale = rect.height() * 0.5;
    let buffers = sim.buffers();
    let mut mesh = egui::Mesh::default();

    for (position, color) in buffers.positions().iter().zip(buffers.colors()) {
        let Some((center, w)) = project(&view_proj, *position, rect) else {
            continue;
        };
        let half = (particle_size * scale / w).clamp(0.5, 32.0) * 0.5;
        let rgb = (*color * SPRITE_OPACITY * 255.0).clamp(Vec3::ZERO, Vec3::splat(255.0));
        // Zero alpha on a premultiplied color adds onto the framebuffer
        let fill = egui::Color32::from_rgba_premultiplied(rgb.x as u8, rgb.y as u8, rgb.z as u8, 0);
        mesh.add_colored_rect(
            egui::Rect::from_center_size(center, egui::vec2(half * 2.0, half * 2.0)),
            fill,
        );
    }
    mesh
}

/// Open the viewer window and run until it is closed
pub fn run(
    config: AppConfig,
    sim: Simulation,
    inputs: ControlInputs,
    audio_path: Option<String>,
) -> anyhow::Result<()> {
    let window_size = config.viewer.window_size;
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size(window_size)
            .with_title("Particle VJ")
            .with_min_inner_size([800.0, 600.0]),
        vsync: true,
        ..Default::default()
    };

    eframe::run_native(
        "Particle VJ",
        options,
        Box::new(move |cc| Box::new(ViewerApp::new(cc, config, sim, inputs, audio_path))),
    )
    .map_err(|e| anyhow::anyhow!("Viewer failed: {}", e))
}
