use log::{debug, warn};

use crate::types::error::PlaybackError;
use crate::types::playback_state::{PlaybackState, QualityLevel, QualitySelection};

pub type Observer = Box<dyn FnMut(&PlaybackState)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Owns the playback state of one mounted player and notifies observers on change.
pub struct PlayerStore {
    state: PlaybackState,
    observers: Vec<(SubscriptionId, Observer)>,
    next_id: u64,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::new(),
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn snapshot(&self) -> PlaybackState {
        self.state.clone()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&PlaybackState) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        before != self.observers.len()
    }

    #[cfg(test)]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn notify(&mut self) {
        for (_, observer) in self.observers.iter_mut() {
            observer(&self.state);
        }
    }

    /// Applies `change` and notifies only if the state actually changed.
    fn update(&mut self, change: impl FnOnce(&mut PlaybackState)) {
        let before = self.state.clone();
        change(&mut self.state);
        if self.state != before {
            self.notify();
        }
    }

    pub fn reset(&mut self) {
        self.state = PlaybackState::new();
        self.notify();
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.update(|s| s.is_playing = playing);
    }

    pub fn set_current_time(&mut self, time: f64) {
        if !time.is_finite() {
            return;
        }
        self.update(|s| s.current_time = time.max(0.0));
    }

    pub fn set_duration(&mut self, duration: f64) {
        // Live streams report an infinite duration; keep it unknown.
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.update(|s| {
            s.duration = duration;
            if duration > 0.0 && s.buffered_edge > duration {
                s.buffered_edge = duration;
            }
        });
    }

    /// Clamped to the duration once it is known.
    pub fn set_buffered(&mut self, edge: f64) {
        if !edge.is_finite() {
            return;
        }
        self.update(|s| {
            let edge = edge.max(0.0);
            s.buffered_edge = if s.duration > 0.0 { edge.min(s.duration) } else { edge };
        });
    }

    /// Clamps into `[0, 1]`; zero mutes, anything above unmutes.
    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_nan() {
            warn!("Ignoring NaN volume");
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.update(|s| {
            s.volume = volume;
            s.is_muted = volume == 0.0;
        });
    }

    pub fn toggle_mute(&mut self) {
        self.update(|s| {
            if s.is_muted {
                s.is_muted = false;
                if s.volume == 0.0 {
                    s.volume = 1.0;
                }
            } else {
                s.is_muted = true;
            }
        });
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.update(|s| s.is_fullscreen = fullscreen);
    }

    pub fn set_show_controls(&mut self, show: bool) {
        self.update(|s| s.show_controls = show);
    }

    pub fn set_qualities(&mut self, qualities: Vec<QualityLevel>) {
        self.update(|s| s.qualities = qualities);
    }

    /// A manual pin must name a known level; unknown pins are ignored.
    pub fn set_current_quality(&mut self, selection: QualitySelection) {
        if let QualitySelection::Manual(index) = selection {
            if self.state.level(index).is_none() {
                warn!("Ignoring unknown quality level {}", index);
                return;
            }
        }
        self.update(|s| s.current_quality = selection);
    }

    pub fn set_active_level(&mut self, level: Option<usize>) {
        self.update(|s| s.active_level = level);
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.update(|s| s.is_loading = loading);
    }

    pub fn set_error(&mut self, error: Option<PlaybackError>) {
        if let Some(err) = &error {
            debug!("Store error set: {}", err);
        }
        self.update(|s| s.error = error);
    }
}

impl Default for PlayerStore {
    fn default() -> Self {
        Self::new()
    }
}
