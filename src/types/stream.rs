use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SportCategory {
    Football,
    Basketball,
    Tennis,
    Motorsport,
    Mma,
    Hockey,
    Baseball,
    Other,
}

impl SportCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SportCategory::Football => "football",
            SportCategory::Basketball => "basketball",
            SportCategory::Tennis => "tennis",
            SportCategory::Motorsport => "motorsport",
            SportCategory::Mma => "mma",
            SportCategory::Hockey => "hockey",
            SportCategory::Baseball => "baseball",
            SportCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamBadge {
    pub name: String,
    pub logo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teams {
    pub home: TeamBadge,
    pub away: TeamBadge,
}

/// A playable entry of the stream directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDescriptor {
    pub id: String,
    pub title: String,
    pub category: SportCategory,
    #[serde(default)]
    pub description: Option<String>,
    /// Poster image location.
    pub thumbnail: String,
    pub date: String,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub viewer_count: u64,
    /// Adaptive manifest location.
    pub stream_url: String,
    #[serde(default)]
    pub teams: Option<Teams>,
}

impl StreamDescriptor {
    /// `"1240.5K"` style viewer count.
    pub fn viewers_label(&self) -> String {
        format!("{:.1}K", self.viewer_count as f64 / 1000.0)
    }
}

/// What a page hands to the player when mounting it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMount {
    pub source_url: String,
    pub poster_url: Option<String>,
    pub auto_play: bool,
}

impl PlayerMount {
    pub fn from_stream(stream: &StreamDescriptor, auto_play: bool) -> Self {
        Self {
            source_url: stream.stream_url.clone(),
            poster_url: Some(stream.thumbnail.clone()).filter(|t| !t.is_empty()),
            auto_play,
        }
    }
}
