use thiserror::Error;

/// Terminal failure of a play session, shown in place of the controls.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("HLS is not supported on this platform")]
    UnsupportedFormat,
    #[error("{details}")]
    Engine { details: String },
    #[error("Video playback error")]
    Media,
    #[error("Failed to start streaming engine: {0}")]
    EngineInit(String),
    #[error("Playback stalled")]
    Stalled,
}

/// Failures inside the adaptive engine before they become engine events.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("networkError: {0}")]
    Network(#[from] reqwest::Error),
    #[error("manifestParsingError: {0}")]
    ManifestParse(String),
    #[error("manifestIncompatibleCodecsError")]
    NoVariants,
    #[error("invalidSourceUrl: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("manifestLoadError: {0}")]
    Io(#[from] std::io::Error),
    #[error("mediaAttachError: {0}")]
    Media(#[from] MediaError),
}

impl EngineError {
    /// Short code reported through the engine error event.
    pub fn details(&self) -> String {
        match self {
            EngineError::Network(_) => "networkError".to_string(),
            EngineError::ManifestParse(_) => "manifestParsingError".to_string(),
            EngineError::NoVariants => "manifestIncompatibleCodecsError".to_string(),
            EngineError::InvalidUrl(_) => "invalidSourceUrl".to_string(),
            EngineError::Io(_) => "manifestLoadError".to_string(),
            EngineError::Media(_) => "mediaAttachError".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("GStreamer error: {0}")]
    Gstreamer(String),
    #[error("Missing element: {0}")]
    MissingElement(String),
    #[error("State change failed: {0}")]
    StateChange(String),
    #[error("No source attached")]
    NoSource,
}

impl From<gstreamer::glib::BoolError> for MediaError {
    fn from(err: gstreamer::glib::BoolError) -> Self {
        MediaError::Gstreamer(err.to_string())
    }
}

impl From<gstreamer::glib::Error> for MediaError {
    fn from(err: gstreamer::glib::Error) -> Self {
        MediaError::Gstreamer(err.to_string())
    }
}

impl From<gstreamer::StateChangeError> for MediaError {
    fn from(err: gstreamer::StateChangeError) -> Self {
        MediaError::StateChange(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Duplicate stream id: {id}")]
    DuplicateId { id: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum PosterError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
