use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::types::error::DirectoryError;
use crate::types::stream::{SportCategory, StreamDescriptor, TeamBadge, Teams};

const DEMO_STREAM_URL: &str = "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8";

/// Where pages look up what to play.
pub trait StreamDirectory {
    fn list_streams(&self) -> Vec<StreamDescriptor>;
    fn get_stream_by_id(&self, id: &str) -> Option<StreamDescriptor>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDirectory {
    streams: Vec<StreamDescriptor>,
}

impl CatalogDirectory {
    /// Rejects catalogs that reuse an id.
    pub fn new(streams: Vec<StreamDescriptor>) -> Result<Self, DirectoryError> {
        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.id.as_str()) {
                return Err(DirectoryError::DuplicateId {
                    id: stream.id.clone(),
                });
            }
        }
        Ok(CatalogDirectory { streams })
    }

    /// Load a catalog from a JSON array of streams.
    pub fn from_file(path: &Path) -> Result<Self, DirectoryError> {
        let mut file = File::open(path)?;
        let mut json = String::new();
        file.read_to_string(&mut json)?;
        let streams: Vec<StreamDescriptor> = serde_json::from_str(&json)?;
        info!("Loaded {} streams from {}", streams.len(), path.display());
        CatalogDirectory::new(streams)
    }

    /// The four demo live events bundled with the app.
    pub fn builtin() -> Self {
        let demo = |id: &str,
                    title: &str,
                    category: SportCategory,
                    description: &str,
                    thumbnail: &str,
                    viewer_count: u64,
                    home: (&str, &str),
                    away: (&str, &str)| StreamDescriptor {
            id: id.to_string(),
            title: title.to_string(),
            category,
            description: Some(description.to_string()),
            thumbnail: thumbnail.to_string(),
            date: "2025-03-01T20:00:00Z".to_string(),
            is_live: true,
            viewer_count,
            stream_url: DEMO_STREAM_URL.to_string(),
            teams: Some(Teams {
                home: TeamBadge {
                    name: home.0.to_string(),
                    logo: home.1.to_string(),
                },
                away: TeamBadge {
                    name: away.0.to_string(),
                    logo: away.1.to_string(),
                },
            }),
        };

        CatalogDirectory {
            streams: vec![
                demo(
                    "stream-1",
                    "Real Madrid vs Barcelona",
                    SportCategory::Football,
                    "The Classic - La Liga Matchday 26",
                    "https://images.unsplash.com/photo-1574629810360-7efbbe195018?auto=format&fit=crop&q=80&w=800",
                    1_240_500,
                    ("Real Madrid", "RM"),
                    ("Barcelona", "BAR"),
                ),
                demo(
                    "stream-2",
                    "Lakers vs Warriors",
                    SportCategory::Basketball,
                    "NBA Regular Season",
                    "https://images.unsplash.com/photo-1504450758481-7338eba7524a?auto=format&fit=crop&q=80&w=800",
                    850_200,
                    ("Lakers", "LAL"),
                    ("Warriors", "GSW"),
                ),
                demo(
                    "stream-3",
                    "Monaco Grand Prix",
                    SportCategory::Motorsport,
                    "Formula 1 - Main Race",
                    "https://images.unsplash.com/photo-1596727147705-61a532a655bd?auto=format&fit=crop&q=80&w=800",
                    4_200_000,
                    ("F1 TV", "F1"),
                    ("Sky Sports", "SKY"),
                ),
                demo(
                    "stream-4",
                    "Djokovic vs Alcaraz",
                    SportCategory::Tennis,
                    "Wimbledon Finals",
                    "https://images.unsplash.com/photo-1592492152431-0f4c9443e49e?auto=format&fit=crop&q=80&w=800",
                    320_400,
                    ("Djokovic", "ND"),
                    ("Alcaraz", "CA"),
                ),
            ],
        }
    }
}

impl StreamDirectory for CatalogDirectory {
    fn list_streams(&self) -> Vec<StreamDescriptor> {
        self.streams.clone()
    }

    fn get_stream_by_id(&self, id: &str) -> Option<StreamDescriptor> {
        let found = self.streams.iter().find(|s| s.id == id).cloned();
        if found.is_none() {
            debug!("No stream with id {}", id);
        }
        found
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub stream_id: String,
    pub title: String,
    pub watched_at: SystemTime,
    pub completed: bool,
}

pub trait WatchHistory {
    fn record(&mut self, stream: &StreamDescriptor);
    /// Most recent first.
    fn recent(&self, limit: usize) -> Vec<HistoryEntry>;
    fn mark_completed(&mut self, stream_id: &str);
}

/// Bounded, most-recent-first history with one entry per stream.
#[derive(Debug, Clone)]
pub struct InMemoryHistory {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl InMemoryHistory {
    pub fn new(capacity: usize) -> Self {
        InMemoryHistory {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }
}

impl WatchHistory for InMemoryHistory {
    fn record(&mut self, stream: &StreamDescriptor) {
        self.entries.retain(|e| e.stream_id != stream.id);
        self.entries.push_front(HistoryEntry {
            stream_id: stream.id.clone(),
            title: stream.title.clone(),
            watched_at: SystemTime::now(),
            completed: false,
        });
        self.entries.truncate(self.capacity);
    }

    fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.entries.iter().take(limit).cloned().collect()
    }

    fn mark_completed(&mut self, stream_id: &str) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.stream_id == stream_id) {
            entry.completed = true;
        }
    }
}
