use crate::types::error::{EngineError, MediaError};
use crate::types::playback_state::QualitySelection;

pub const HLS_MIME: &str = "application/vnd.apple.mpegurl";

#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>, // Tightly packed RGBA
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
}

/// Events a media element reports to its listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    Play,
    Pause,
    TimeUpdate(f64),
    DurationChange(f64),
    /// End of the last buffered range, in seconds.
    Progress(f64),
    Waiting,
    CanPlay,
    Ended,
    Error(String),
}

/// Level as reported by the engine when the manifest is parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineLevel {
    pub width: u32,
    pub height: u32,
    pub bitrate: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ManifestParsed(Vec<EngineLevel>),
    LevelSwitched(usize),
    Error { fatal: bool, details: String },
}

/// The playback sink a controller binds to.
pub trait MediaElement {
    /// Whether the element can play `mime` without a client-side engine.
    fn can_play_type(&self, mime: &str) -> bool;
    fn set_source(&mut self, url: &str) -> Result<(), MediaError>;
    fn clear_source(&mut self);
    /// May be rejected, e.g. when the element refuses to start on its own.
    fn play(&mut self) -> Result<(), MediaError>;
    fn pause(&mut self);
    fn is_paused(&self) -> bool;
    /// True once duration and seekable range are known.
    fn has_metadata(&self) -> bool;
    fn current_time(&self) -> f64;
    fn seek(&mut self, seconds: f64);
    fn set_gain(&mut self, gain: f64);
    fn attach_listeners(&mut self);
    /// Stops event delivery and drops anything still queued.
    fn detach_listeners(&mut self);
    fn poll_event(&mut self) -> Option<MediaEvent>;
    fn take_frame(&mut self) -> Option<VideoFrame> {
        None
    }
}

/// Client-side adaptive streaming engine.
pub trait StreamEngine {
    /// Rendition to begin on once the manifest is parsed; set before `load_source`.
    fn set_start_level(&mut self, selection: QualitySelection);
    fn load_source(&mut self, url: &str);
    fn attach_media(&mut self, media: &mut dyn MediaElement);
    /// `Automatic` lets the engine pick renditions itself.
    fn set_level(&mut self, selection: QualitySelection, media: &mut dyn MediaElement);
    fn on_media_event(&mut self, _event: &MediaEvent, _media: &mut dyn MediaElement) {}
    fn poll_event(&mut self, media: &mut dyn MediaElement) -> Option<EngineEvent>;
    /// Frees workers and buffers; no events are produced afterwards.
    fn destroy(&mut self);
}

pub trait EngineFactory {
    fn is_supported(&self) -> bool;
    fn create(&self) -> Result<Box<dyn StreamEngine>, EngineError>;
}
