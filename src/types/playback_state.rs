use serde::{Deserialize, Serialize};

use crate::types::error::PlaybackError;

/// One selectable rendition of the stream, in the order the engine reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityLevel {
    pub index: usize,
    pub height: u32,
    pub width: u32,
    pub bitrate: u64,
    pub label: String,
}

impl QualityLevel {
    pub fn new(index: usize, width: u32, height: u32, bitrate: u64) -> Self {
        Self {
            index,
            height,
            width,
            bitrate,
            label: quality_label(height, bitrate),
        }
    }
}

/// `"720p"` when the height is known, otherwise the bitrate in kbps.
pub fn quality_label(height: u32, bitrate: u64) -> String {
    if height > 0 {
        format!("{}p", height)
    } else {
        format!("{} kbps", bitrate / 1000)
    }
}

/// Which rendition the engine is asked to play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualitySelection {
    #[default]
    Automatic,
    Manual(usize),
}

impl QualitySelection {
    pub fn is_automatic(&self) -> bool {
        matches!(self, QualitySelection::Automatic)
    }

    /// Legacy integer view: `-1` for automatic selection.
    pub fn as_index(&self) -> i64 {
        match self {
            QualitySelection::Automatic => -1,
            QualitySelection::Manual(index) => *index as i64,
        }
    }
}

/// Everything the player surface renders for one play session.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    /// 0.0 while unknown.
    pub duration: f64,
    pub buffered_edge: f64,

    pub volume: f64,
    pub is_muted: bool,
    pub is_fullscreen: bool,
    pub show_controls: bool,

    pub qualities: Vec<QualityLevel>,
    /// Confirmed by the engine, never set optimistically.
    pub current_quality: QualitySelection,
    /// Rendition the engine last reported as playing.
    pub active_level: Option<usize>,

    pub is_loading: bool,
    pub error: Option<PlaybackError>,
}

impl PlaybackState {
    pub fn new() -> Self {
        Self {
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            buffered_edge: 0.0,
            volume: 1.0,
            is_muted: false,
            is_fullscreen: false,
            show_controls: true,
            qualities: Vec::new(),
            current_quality: QualitySelection::Automatic,
            active_level: None,
            is_loading: true,
            error: None,
        }
    }

    pub fn current_quality_index(&self) -> i64 {
        self.current_quality.as_index()
    }

    pub fn is_auto_quality(&self) -> bool {
        self.current_quality.is_automatic()
    }

    /// Gain actually applied to the media element.
    pub fn effective_gain(&self) -> f64 {
        if self.is_muted { 0.0 } else { self.volume }
    }

    pub fn progress_fraction(&self) -> f32 {
        if self.duration > 0.0 {
            (self.current_time / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }

    pub fn buffered_fraction(&self) -> f32 {
        if self.duration > 0.0 {
            (self.buffered_edge / self.duration).clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }

    pub fn level(&self, index: usize) -> Option<&QualityLevel> {
        self.qualities.iter().find(|q| q.index == index)
    }
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new()
    }
}
