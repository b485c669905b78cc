use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::types::error::ConfigError;
use crate::types::playback_state::QualitySelection;

pub const CONFIG_ENV: &str = "PITCHSIDE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "pitchside.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub auto_play: bool,
    pub start_level: QualitySelection,
    pub seek_step_secs: f64,
    pub volume_step: f64,
    pub controls_hide_ms: u64,
    /// `None` keeps a stalled load waiting forever.
    pub stall_timeout_ms: Option<u64>,
    /// Use the client-side manifest engine when available.
    pub prefer_engine: bool,
    pub abr_safety_factor: f64,
    pub abr_default_estimate_bps: u64,
    /// Seconds of buffer ahead required before stepping up a rendition.
    pub abr_up_switch_buffer_secs: f64,
    /// Seconds a rendition must play before buffering can move it down.
    pub abr_min_switch_interval_secs: f64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            auto_play: true,
            start_level: QualitySelection::Automatic,
            seek_step_secs: 10.0,
            volume_step: 0.1,
            controls_hide_ms: 3000,
            stall_timeout_ms: None,
            prefer_engine: true,
            abr_safety_factor: 0.8,
            abr_default_estimate_bps: 500_000,
            abr_up_switch_buffer_secs: 10.0,
            abr_min_switch_interval_secs: 4.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub player: PlayerConfig,
    /// JSON stream catalog; the built-in demo catalog is used when absent.
    pub catalog_path: Option<String>,
    pub history_limit: usize,
    pub poster_cache_size: usize,
    pub window_size: (f32, f32),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            player: PlayerConfig::default(),
            catalog_path: None,
            history_limit: 20,
            poster_cache_size: 32,
            window_size: (1280.0, 800.0),
        }
    }
}

impl AppConfig {
    /// Save the config as pretty JSON at the given path.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load a config from a JSON file at the given path.
    pub fn load_from_file(path: &Path) -> Result<AppConfig, ConfigError> {
        let mut file = File::open(path)?;
        let mut json = String::new();
        file.read_to_string(&mut json)?;
        let config: AppConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Config from `PITCHSIDE_CONFIG` (or `pitchside.json`); defaults when the file is missing.
    pub fn load_or_default() -> AppConfig {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let path = Path::new(&path);
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return AppConfig::default();
        }
        match AppConfig::load_from_file(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                AppConfig::default()
            }
        }
    }
}
