use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

use eframe::egui;
use log::debug;

use crate::ops::controller::StreamController;
use crate::ops::store::SubscriptionId;
use crate::renderer::media::{EngineFactory, MediaElement};
use crate::renderer::poster::Poster;
use crate::types::config::PlayerConfig;
use crate::types::playback_state::{PlaybackState, QualitySelection};
use crate::types::stream::PlayerMount;

const SHORTCUT_KEYS: [egui::Key; 8] = [
    egui::Key::Space,
    egui::Key::K,
    egui::Key::ArrowLeft,
    egui::Key::ArrowRight,
    egui::Key::ArrowUp,
    egui::Key::ArrowDown,
    egui::Key::M,
    egui::Key::F,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shortcut {
    TogglePlay,
    SeekBack,
    SeekForward,
    VolumeUp,
    VolumeDown,
    ToggleMute,
    ToggleFullscreen,
}

pub fn shortcut_for(key: egui::Key) -> Option<Shortcut> {
    match key {
        egui::Key::Space | egui::Key::K => Some(Shortcut::TogglePlay),
        egui::Key::ArrowLeft => Some(Shortcut::SeekBack),
        egui::Key::ArrowRight => Some(Shortcut::SeekForward),
        egui::Key::ArrowUp => Some(Shortcut::VolumeUp),
        egui::Key::ArrowDown => Some(Shortcut::VolumeDown),
        egui::Key::M => Some(Shortcut::ToggleMute),
        egui::Key::F => Some(Shortcut::ToggleFullscreen),
        _ => None,
    }
}

// Helper function to format time as M:SS
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Text of the quality button: the pinned level, or "Auto" with the active rendition.
pub fn quality_button_label(state: &PlaybackState) -> String {
    match state.current_quality {
        QualitySelection::Manual(index) => state
            .level(index)
            .map(|l| l.label.clone())
            .unwrap_or_else(|| "Auto".to_string()),
        QualitySelection::Automatic => match state.active_level.and_then(|i| state.level(i)) {
            Some(level) => format!("Auto ({})", level.label),
            None => "Auto".to_string(),
        },
    }
}

/// Auto-hide timing for the control overlay.
#[derive(Debug, Clone)]
pub struct ControlsVisibility {
    hide_after: Duration,
    shown: bool,
    deadline: Option<Instant>,
}

impl ControlsVisibility {
    pub fn new(hide_after: Duration) -> Self {
        Self {
            hide_after,
            shown: true,
            deadline: None,
        }
    }

    /// Pointer movement or a handled key.
    pub fn on_activity(&mut self, now: Instant) {
        self.shown = true;
        self.deadline = Some(now + self.hide_after);
    }

    pub fn on_pointer_left(&mut self, is_playing: bool) {
        if is_playing {
            self.shown = false;
            self.deadline = None;
        }
    }

    /// Visibility at `now`. Paused players always show their controls.
    pub fn update(&mut self, now: Instant, is_playing: bool) -> bool {
        if !is_playing {
            self.shown = true;
            self.deadline = None;
            return true;
        }
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.shown = false;
                self.deadline = None;
            }
            None if self.shown => self.deadline = Some(now + self.hide_after),
            _ => {}
        }
        self.shown
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// A mounted player: one controller plus the surface state drawn around it.
pub struct Player {
    controller: StreamController,
    snapshot: Rc<RefCell<PlaybackState>>,
    changed: Rc<Cell<bool>>,
    subscription: SubscriptionId,
    controls: ControlsVisibility,
    pointer_inside: bool,
    seek_step: f64,
    volume_step: f64,
    mount: Option<PlayerMount>,
    video_texture: Option<egui::TextureHandle>,
    poster_texture: Option<egui::TextureHandle>,
}

impl Player {
    pub fn new(
        config: &PlayerConfig,
        factory: Box<dyn EngineFactory>,
        media: Box<dyn MediaElement>,
    ) -> Self {
        let mut controller = StreamController::new(config.clone(), factory);
        controller.bind_media(media);

        let snapshot = Rc::new(RefCell::new(controller.state().clone()));
        let changed = Rc::new(Cell::new(false));
        let (sink, flag) = (snapshot.clone(), changed.clone());
        let subscription = controller.subscribe(move |state| {
            *sink.borrow_mut() = state.clone();
            flag.set(true);
        });

        Self {
            controller,
            snapshot,
            changed,
            subscription,
            controls: ControlsVisibility::new(Duration::from_millis(config.controls_hide_ms)),
            pointer_inside: false,
            seek_step: config.seek_step_secs,
            volume_step: config.volume_step,
            mount: None,
            video_texture: None,
            poster_texture: None,
        }
    }

    pub fn mount(&mut self, mount: PlayerMount) {
        debug!("Mounting player on {}", mount.source_url);
        self.video_texture = None;
        self.poster_texture = None;
        self.mount = Some(mount.clone());
        self.controller.attach(mount);
    }

    pub fn unmount(&mut self) {
        self.mount = None;
        self.video_texture = None;
        self.controller.detach();
    }

    pub fn mounted(&self) -> Option<&PlayerMount> {
        self.mount.as_ref()
    }

    pub fn set_on_ended(&mut self, callback: impl FnMut() + 'static) {
        self.controller.set_on_ended(callback);
    }

    /// Snapshot as last delivered to the surface's subscription.
    pub fn state(&self) -> PlaybackState {
        self.snapshot.borrow().clone()
    }

    /// Drains pending events and runs the stall watchdog. Returns whether the
    /// state changed since the last call.
    pub fn pump(&mut self, now: Instant) -> bool {
        self.controller.pump();
        self.controller.tick(now);
        self.changed.replace(false)
    }

    /// Applies a shortcut; returns the fullscreen state to request, if any.
    pub fn handle_shortcut(&mut self, shortcut: Shortcut, now: Instant) -> Option<bool> {
        let state = self.controller.state();
        let (time, volume, fullscreen) = (state.current_time, state.volume, state.is_fullscreen);
        let mut request = None;
        match shortcut {
            Shortcut::TogglePlay => self.controller.toggle(),
            Shortcut::SeekBack => self.controller.seek((time - self.seek_step).max(0.0)),
            Shortcut::SeekForward => self.controller.seek(time + self.seek_step),
            Shortcut::VolumeUp => self.controller.set_volume((volume + self.volume_step).min(1.0)),
            Shortcut::VolumeDown => self.controller.set_volume((volume - self.volume_step).max(0.0)),
            Shortcut::ToggleMute => self.controller.toggle_mute(),
            Shortcut::ToggleFullscreen => request = Some(!fullscreen),
        }
        self.controls.on_activity(now);
        request
    }

    /// Seeks to fraction `p` of the known duration.
    pub fn seek_fraction(&mut self, p: f32) {
        let duration = self.controller.state().duration;
        // Unknown or unbounded duration has no position to map onto.
        if !duration.is_finite() || duration <= 0.0 {
            return;
        }
        self.controller.seek(p.clamp(0.0, 1.0) as f64 * duration);
    }

    pub fn select_quality(&mut self, selection: QualitySelection) {
        self.controller.set_current_quality(selection);
    }

    pub fn retry(&mut self) {
        self.video_texture = None;
        self.controller.retry();
    }

    pub fn on_pointer_moved(&mut self, now: Instant) {
        self.controls.on_activity(now);
    }

    pub fn on_pointer_left(&mut self) {
        let playing = self.controller.state().is_playing;
        self.controls.on_pointer_left(playing);
    }

    /// Resolves control visibility at `now` and mirrors it into the store.
    pub fn update_controls(&mut self, now: Instant) -> bool {
        let playing = self.controller.state().is_playing;
        let visible = self.controls.update(now, playing);
        self.controller.set_show_controls(visible);
        visible
    }

    pub fn set_poster(&mut self, ctx: &egui::Context, poster: &Poster) {
        let image = egui::ColorImage::from_rgba_unmultiplied(
            [poster.width as usize, poster.height as usize],
            &poster.rgba,
        );
        self.poster_texture = Some(ctx.load_texture("player_poster", image, egui::TextureOptions::LINEAR));
    }

    pub fn has_poster(&self) -> bool {
        self.poster_texture.is_some()
    }

    fn update_texture(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.controller.take_frame() {
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [frame.width as usize, frame.height as usize],
                &frame.data,
            );
            match self.video_texture.as_mut() {
                Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
                None => {
                    self.video_texture =
                        Some(ctx.load_texture("player_video_frame", image, egui::TextureOptions::LINEAR));
                }
            }
        }
    }

    /// Per-frame work that needs the egui context: events, fullscreen mirror, video texture.
    pub fn frame(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        self.pump(now);
        if let Some(fullscreen) = ctx.input(|i| i.viewport().fullscreen) {
            self.controller.set_fullscreen(fullscreen);
        }
        self.update_texture(ctx);

        let state = self.controller.state();
        if state.is_playing || state.is_loading {
            ctx.request_repaint_after(Duration::from_millis(16));
        } else if let Some(deadline) = self.controls.next_deadline() {
            ctx.request_repaint_after(deadline.saturating_duration_since(now));
        }
    }

    /// Draws the player into the available width at 16:9.
    pub fn show(&mut self, ui: &mut egui::Ui) {
        let now = Instant::now();
        let width = ui.available_width();
        let (rect, response) = ui.allocate_exact_size(
            egui::vec2(width, width * 9.0 / 16.0),
            egui::Sense::click(),
        );
        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 8.0, egui::Color32::BLACK);

        if let Some(texture) = self.video_texture.as_ref().or(self.poster_texture.as_ref()) {
            let fitted = fit_rect(rect, texture.size_vec2());
            painter.image(
                texture.id(),
                fitted,
                egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                egui::Color32::WHITE,
            );
        }

        // Keyboard shortcuts only reach a focused player (or one with nothing else focused).
        if response.clicked() {
            response.request_focus();
            self.controller.toggle();
        }
        let focused = response.has_focus() || ui.memory(|m| m.focused().is_none());
        if focused {
            let pressed: Vec<egui::Key> = ui.input_mut(|i| {
                SHORTCUT_KEYS
                    .iter()
                    .copied()
                    .filter(|key| i.consume_key(egui::Modifiers::NONE, *key))
                    .collect()
            });
            for key in pressed {
                if let Some(shortcut) = shortcut_for(key) {
                    if let Some(fullscreen) = self.handle_shortcut(shortcut, now) {
                        ui.ctx().send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
                    }
                }
            }
        }

        let inside = ui.rect_contains_pointer(rect);
        if inside && ui.input(|i| i.pointer.is_moving()) {
            self.on_pointer_moved(now);
        }
        if self.pointer_inside && !inside {
            self.on_pointer_left();
        }
        self.pointer_inside = inside;
        let controls_visible = self.update_controls(now);

        let state = self.controller.state().clone();
        if state.is_loading && state.error.is_none() {
            ui.put(
                egui::Rect::from_center_size(rect.center(), egui::vec2(48.0, 48.0)),
                egui::Spinner::new().size(48.0).color(egui::Color32::WHITE),
            );
        }

        if let Some(error) = &state.error {
            self.show_error(ui, rect, &error.to_string());
        } else if controls_visible {
            self.show_controls(ui, rect, &state);
        }
    }

    fn show_error(&mut self, ui: &mut egui::Ui, rect: egui::Rect, message: &str) {
        ui.painter()
            .rect_filled(rect, 8.0, egui::Color32::from_black_alpha(204));
        let panel = egui::Rect::from_center_size(rect.center(), egui::vec2(280.0, 110.0));
        let mut child = ui.new_child(
            egui::UiBuilder::new()
                .max_rect(panel)
                .layout(egui::Layout::top_down(egui::Align::Center)),
        );
        child.label(
            egui::RichText::new("Playback Error")
                .color(egui::Color32::from_rgb(239, 68, 68))
                .strong(),
        );
        child.label(egui::RichText::new(message).color(egui::Color32::GRAY).size(12.0));
        child.add_space(8.0);
        if child.button("Retry").clicked() {
            self.retry();
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui, rect: egui::Rect, state: &PlaybackState) {
        const BAR_HEIGHT: f32 = 56.0;
        let white = egui::Color32::WHITE;

        let center = egui::Rect::from_center_size(rect.center(), egui::vec2(64.0, 64.0));
        let center_icon = if state.is_playing { "⏸" } else { "▶" };
        let center_button = egui::Button::new(egui::RichText::new(center_icon).size(28.0).color(white))
            .fill(egui::Color32::from_white_alpha(26))
            .corner_radius(32.0);
        if ui.put(center, center_button).clicked() {
            self.controller.toggle();
        }

        let bar = egui::Rect::from_min_max(
            egui::pos2(rect.left() + 16.0, rect.bottom() - BAR_HEIGHT - 8.0),
            egui::pos2(rect.right() - 16.0, rect.bottom() - 8.0),
        );
        ui.painter().rect_filled(
            egui::Rect::from_min_max(egui::pos2(rect.left(), bar.top() - 12.0), rect.right_bottom()),
            0.0,
            egui::Color32::from_black_alpha(150),
        );

        let mut child = ui.new_child(
            egui::UiBuilder::new()
                .max_rect(bar)
                .layout(egui::Layout::top_down(egui::Align::Min)),
        );
        self.show_progress_bar(&mut child, state);
        child.add_space(8.0);
        child.horizontal(|ui| {
            let play_label = if state.is_playing { "⏸" } else { "▶" };
            if ui.button(egui::RichText::new(play_label).color(white)).clicked() {
                self.controller.toggle();
            }

            let mute_label = if state.is_muted || state.volume == 0.0 { "🔇" } else { "🔊" };
            if ui.button(egui::RichText::new(mute_label).color(white)).clicked() {
                self.controller.toggle_mute();
            }
            let mut volume = if state.is_muted { 0.0 } else { state.volume };
            let slider = egui::Slider::new(&mut volume, 0.0..=1.0)
                .step_by(0.05)
                .show_value(false);
            if ui.add_sized([80.0, 16.0], slider).changed() {
                self.controller.set_volume(volume);
            }

            ui.label(
                egui::RichText::new(format!(
                    "{} / {}",
                    format_time(state.current_time),
                    format_time(state.duration)
                ))
                .color(egui::Color32::from_white_alpha(204))
                .monospace(),
            );

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let fullscreen_label = if state.is_fullscreen { "🗗" } else { "⛶" };
                if ui.button(egui::RichText::new(fullscreen_label).color(white)).clicked() {
                    ui.ctx()
                        .send_viewport_cmd(egui::ViewportCommand::Fullscreen(!state.is_fullscreen));
                }
                if !state.qualities.is_empty() {
                    ui.menu_button(quality_button_label(state), |ui| {
                        if ui.selectable_label(state.is_auto_quality(), "Auto").clicked() {
                            self.select_quality(QualitySelection::Automatic);
                            ui.close_menu();
                        }
                        for level in &state.qualities {
                            let selected = state.current_quality == QualitySelection::Manual(level.index);
                            if ui.selectable_label(selected, level.label.as_str()).clicked() {
                                self.select_quality(QualitySelection::Manual(level.index));
                                ui.close_menu();
                            }
                        }
                    });
                }
            });
        });
    }

    fn show_progress_bar(&mut self, ui: &mut egui::Ui, state: &PlaybackState) {
        let width = ui.available_width();
        let (rect, response) =
            ui.allocate_exact_size(egui::vec2(width, 12.0), egui::Sense::click_and_drag());
        let track = egui::Rect::from_center_size(rect.center(), egui::vec2(rect.width(), 4.0));
        let painter = ui.painter();
        painter.rect_filled(track, 2.0, egui::Color32::from_white_alpha(51));

        let buffered = track.with_max_x(track.left() + track.width() * state.buffered_fraction());
        painter.rect_filled(buffered, 2.0, egui::Color32::from_white_alpha(77));
        let played_x = track.left() + track.width() * state.progress_fraction();
        painter.rect_filled(track.with_max_x(played_x), 2.0, egui::Color32::from_rgb(34, 197, 94));
        if response.hovered() || response.dragged() {
            painter.circle_filled(
                egui::pos2(played_x, track.center().y),
                6.0,
                egui::Color32::from_rgb(34, 197, 94),
            );
        }

        if response.clicked() || response.dragged() {
            if let Some(pos) = response.interact_pointer_pos() {
                let p = (pos.x - track.left()) / track.width().max(1.0);
                self.seek_fraction(p);
            }
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.controller.unsubscribe(self.subscription);
    }
}

/// Largest rect with the texture's aspect ratio centered inside `outer`.
fn fit_rect(outer: egui::Rect, size: egui::Vec2) -> egui::Rect {
    if size.x <= 0.0 || size.y <= 0.0 {
        return outer;
    }
    let scale = (outer.width() / size.x).min(outer.height() / size.y);
    egui::Rect::from_center_size(outer.center(), size * scale)
}
