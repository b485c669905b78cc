//! Client-side adaptive engine: fetches the multivariant manifest, reports its
//! levels and picks the rendition handed to the media element.
//!
//! Segment fetching stays inside the media element; the engine only decides
//! which variant playlist the element plays.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use m3u8_rs::{Playlist, parse_playlist_res};
use url::Url;

use crate::renderer::media::{
    EngineEvent, EngineFactory, EngineLevel, MediaElement, MediaEvent, StreamEngine,
};
use crate::types::config::PlayerConfig;
use crate::types::error::EngineError;
use crate::types::playback_state::QualitySelection;

/// Weight of the newest throughput sample.
const ESTIMATE_ALPHA: f64 = 0.3;

#[derive(Debug, Clone, PartialEq)]
pub struct AbrSettings {
    pub safety_factor: f64,
    pub default_estimate_bps: f64,
    pub up_switch_buffer_secs: f64,
    /// Minimum play time on a rendition before the next automatic switch.
    pub min_switch_interval: Duration,
}

impl AbrSettings {
    pub fn from_config(config: &PlayerConfig) -> Self {
        AbrSettings {
            safety_factor: config.abr_safety_factor.clamp(0.1, 1.0),
            default_estimate_bps: config.abr_default_estimate_bps as f64,
            up_switch_buffer_secs: config.abr_up_switch_buffer_secs.max(0.0),
            min_switch_interval: Duration::from_secs_f64(
                config.abr_min_switch_interval_secs.max(0.0),
            ),
        }
    }
}

impl Default for AbrSettings {
    fn default() -> Self {
        AbrSettings::from_config(&PlayerConfig::default())
    }
}

/// One playable rendition. `level` is `None` for a bare media playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub level: Option<EngineLevel>,
    pub uri: String,
}

impl Variant {
    fn bitrate(&self) -> u64 {
        self.level.as_ref().map(|l| l.bitrate).unwrap_or(0)
    }
}

#[derive(Debug)]
struct ManifestLoad {
    variants: Vec<Variant>,
    bytes: usize,
    elapsed_secs: f64,
}

/// Highest bitrate that fits `estimate_bps * safety`, else the lowest bitrate.
pub fn choose_level(bitrates: &[u64], estimate_bps: f64, safety: f64) -> Option<usize> {
    let budget = estimate_bps * safety;
    let fitting = bitrates
        .iter()
        .enumerate()
        .filter(|(_, b)| (**b as f64) <= budget)
        .max_by_key(|(_, b)| **b)
        .map(|(i, _)| i);
    fitting.or_else(|| {
        bitrates
            .iter()
            .enumerate()
            .min_by_key(|(_, b)| **b)
            .map(|(i, _)| i)
    })
}

/// Resolves a playlist-relative URI against the manifest location.
pub fn resolve_uri(base: &str, uri: &str) -> Result<String, EngineError> {
    if let Ok(absolute) = Url::parse(uri) {
        if absolute.scheme().len() > 1 {
            return Ok(uri.to_string());
        }
    }
    match Url::parse(base) {
        Ok(base_url) if base_url.scheme().len() > 1 => Ok(base_url.join(uri)?.to_string()),
        _ => {
            let joined = Path::new(base)
                .parent()
                .map(|dir| dir.join(uri))
                .unwrap_or_else(|| PathBuf::from(uri));
            Ok(joined.to_string_lossy().to_string())
        }
    }
}

/// Variants of a manifest, in manifest order. I-frame variants are skipped.
pub fn parse_variants(source: &str, content: &[u8]) -> Result<Vec<Variant>, EngineError> {
    match parse_playlist_res(content) {
        Ok(Playlist::MasterPlaylist(master)) => {
            let mut variants = Vec::new();
            for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
                let (width, height) = variant
                    .resolution
                    .as_ref()
                    .map(|r| (r.width as u32, r.height as u32))
                    .unwrap_or((0, 0));
                variants.push(Variant {
                    level: Some(EngineLevel {
                        width,
                        height,
                        bitrate: variant.bandwidth,
                    }),
                    uri: resolve_uri(source, &variant.uri)?,
                });
            }
            if variants.is_empty() {
                return Err(EngineError::NoVariants);
            }
            Ok(variants)
        }
        Ok(Playlist::MediaPlaylist(_)) => Ok(vec![Variant {
            level: None,
            uri: source.to_string(),
        }]),
        Err(e) => Err(EngineError::ManifestParse(format!("{:?}", e))),
    }
}

fn read_manifest(source: &str) -> Result<Vec<u8>, EngineError> {
    match Url::parse(source) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {
            let response = reqwest::blocking::get(url)?.error_for_status()?;
            Ok(response.bytes()?.to_vec())
        }
        Ok(url) if url.scheme() == "file" => {
            let path = url.to_file_path().map_err(|_| {
                EngineError::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("not a local path: {}", source),
                ))
            })?;
            Ok(std::fs::read(path)?)
        }
        _ => Ok(std::fs::read(source)?),
    }
}

fn load_manifest(source: &str) -> Result<ManifestLoad, EngineError> {
    let started = Instant::now();
    let content = read_manifest(source)?;
    let elapsed_secs = started.elapsed().as_secs_f64();
    let variants = parse_variants(source, &content)?;
    Ok(ManifestLoad {
        variants,
        bytes: content.len(),
        elapsed_secs,
    })
}

pub struct ManifestEngine {
    abr: AbrSettings,
    source: Option<String>,
    manifest_rx: Option<Receiver<Result<ManifestLoad, EngineError>>>,
    cancel: Arc<AtomicBool>,
    variants: Vec<Variant>,
    current: Option<usize>,
    selection: QualitySelection,
    estimate_bps: f64,
    /// Buffered edge and wall clock of the last progress sample.
    last_progress: Option<(f64, Instant)>,
    /// When the current rendition was handed to the media element, and at what position.
    switched_at: Option<(Instant, f64)>,
    /// Playback has advanced past the switch position.
    played_since_switch: bool,
    attached: bool,
    events: VecDeque<EngineEvent>,
    destroyed: bool,
}

impl ManifestEngine {
    pub fn new(abr: AbrSettings) -> Self {
        let estimate_bps = abr.default_estimate_bps;
        ManifestEngine {
            abr,
            source: None,
            manifest_rx: None,
            cancel: Arc::new(AtomicBool::new(false)),
            variants: Vec::new(),
            current: None,
            selection: QualitySelection::Automatic,
            estimate_bps,
            last_progress: None,
            switched_at: None,
            played_since_switch: false,
            attached: false,
            events: VecDeque::new(),
            destroyed: false,
        }
    }

    pub fn estimate_bps(&self) -> f64 {
        self.estimate_bps
    }

    pub fn current_level(&self) -> Option<usize> {
        self.current
    }

    /// Folds a throughput sample into the running estimate.
    pub fn record_sample(&mut self, bits: f64, secs: f64) {
        if secs <= 0.0 || !bits.is_finite() || bits <= 0.0 {
            return;
        }
        let sample = bits / secs;
        self.estimate_bps = ESTIMATE_ALPHA * sample + (1.0 - ESTIMATE_ALPHA) * self.estimate_bps;
    }

    /// The current rendition has played for at least the minimum interval.
    /// Buffering before that is the rendition's own startup, not a bandwidth signal.
    fn settled(&self, now: Instant) -> bool {
        self.played_since_switch
            && self
                .switched_at
                .is_none_or(|(at, _)| now.saturating_duration_since(at) >= self.abr.min_switch_interval)
    }

    fn bitrates(&self) -> Vec<u64> {
        self.variants.iter().map(Variant::bitrate).collect()
    }

    fn emit_error(&mut self, error: &EngineError, fatal: bool) {
        warn!("Engine error ({}): {}", if fatal { "fatal" } else { "recoverable" }, error);
        self.events.push_back(EngineEvent::Error {
            fatal,
            details: error.details(),
        });
    }

    fn on_manifest(&mut self, load: ManifestLoad, media: &mut dyn MediaElement) {
        self.record_sample(load.bytes as f64 * 8.0, load.elapsed_secs);
        self.variants = load.variants;
        let levels: Vec<EngineLevel> = self.variants.iter().filter_map(|v| v.level.clone()).collect();
        info!(
            "Manifest ready: {} variants, estimate {:.0} bps",
            self.variants.len(),
            self.estimate_bps
        );

        let start = match self.selection {
            QualitySelection::Manual(i) if i < self.variants.len() => Some(i),
            QualitySelection::Manual(i) => {
                warn!("Start level {} not in manifest, adapting automatically", i);
                self.selection = QualitySelection::Automatic;
                choose_level(&self.bitrates(), self.estimate_bps, self.abr.safety_factor)
            }
            QualitySelection::Automatic => {
                choose_level(&self.bitrates(), self.estimate_bps, self.abr.safety_factor)
            }
        };
        self.events.push_back(EngineEvent::ManifestParsed(levels));
        if let Some(index) = start {
            self.switch_to(index, media);
        }
    }

    /// Points the media element at variant `index`, keeping position and play state.
    fn switch_to(&mut self, index: usize, media: &mut dyn MediaElement) {
        let Some(variant) = self.variants.get(index) else {
            return;
        };
        let uri = variant.uri.clone();
        let reports_level = variant.level.is_some();
        let resume = self.current.is_some() && !media.is_paused();
        let position = if self.current.is_some() { media.current_time() } else { 0.0 };

        debug!("Switching to variant {} ({})", index, uri);
        if let Err(e) = media.set_source(&uri) {
            self.emit_error(&EngineError::Media(e), true);
            return;
        }
        if position > 0.0 {
            media.seek(position);
        }
        if resume {
            if let Err(e) = media.play() {
                debug!("Resume after switch rejected: {}", e);
            }
        }
        self.current = Some(index);
        self.last_progress = None;
        self.switched_at = Some((Instant::now(), position));
        self.played_since_switch = false;
        if reports_level {
            self.events.push_back(EngineEvent::LevelSwitched(index));
        }
    }

    fn index_by_bitrate_step(&self, down: bool) -> Option<usize> {
        let current = self.variants.get(self.current?)?.bitrate();
        let candidates = self.variants.iter().enumerate().map(|(i, v)| (i, v.bitrate()));
        if down {
            candidates.filter(|(_, b)| *b < current).max_by_key(|(_, b)| *b).map(|(i, _)| i)
        } else {
            candidates.filter(|(_, b)| *b > current).min_by_key(|(_, b)| *b).map(|(i, _)| i)
        }
    }

    fn adapt_at(&mut self, event: &MediaEvent, media: &mut dyn MediaElement, now: Instant) {
        if let MediaEvent::TimeUpdate(time) = event {
            if self.switched_at.is_none_or(|(_, position)| *time > position) {
                self.played_since_switch = true;
            }
        }
        if !self.selection.is_automatic() || self.variants.len() < 2 {
            return;
        }
        match event {
            MediaEvent::Waiting => {
                if !self.settled(now) {
                    debug!("Ignoring startup buffering of variant {:?}", self.current);
                    return;
                }
                if let Some(lower) = self.index_by_bitrate_step(true) {
                    let bitrate = self.variants[lower].bitrate() as f64;
                    self.estimate_bps = self.estimate_bps.min(bitrate / self.abr.safety_factor);
                    info!("Rebuffering, stepping down to variant {}", lower);
                    self.switch_to(lower, media);
                }
            }
            MediaEvent::Progress(edge) => {
                let Some(current) = self.current else {
                    return;
                };
                if let Some((last_edge, at)) = self.last_progress {
                    let gained = edge - last_edge;
                    let bitrate = self.variants[current].bitrate() as f64;
                    if gained > 0.0 {
                        self.record_sample(gained * bitrate, now.duration_since(at).as_secs_f64());
                    }
                }
                self.last_progress = Some((*edge, now));

                let ahead = edge - media.current_time();
                if ahead < self.abr.up_switch_buffer_secs || !self.settled(now) {
                    return;
                }
                let Some(best) =
                    choose_level(&self.bitrates(), self.estimate_bps, self.abr.safety_factor)
                else {
                    return;
                };
                if self.variants[best].bitrate() > self.variants[current].bitrate() {
                    if let Some(higher) = self.index_by_bitrate_step(false) {
                        info!("Buffer healthy ({:.1}s ahead), stepping up to variant {}", ahead, higher);
                        self.switch_to(higher, media);
                    }
                }
            }
            _ => {}
        }
    }
}

impl StreamEngine for ManifestEngine {
    fn load_source(&mut self, url: &str) {
        if self.destroyed {
            return;
        }
        self.source = Some(url.to_string());
        let (tx, rx) = mpsc::channel();
        let cancel = self.cancel.clone();
        let source = url.to_string();
        info!("Loading manifest {}", source);
        std::thread::spawn(move || {
            let result = load_manifest(&source);
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            let _ = tx.send(result);
        });
        self.manifest_rx = Some(rx);
    }

    fn attach_media(&mut self, _media: &mut dyn MediaElement) {
        self.attached = true;
    }

    fn set_level(&mut self, selection: QualitySelection, media: &mut dyn MediaElement) {
        self.selection = selection;
        if self.variants.is_empty() {
            return;
        }
        let target = match selection {
            QualitySelection::Manual(index) => Some(index),
            QualitySelection::Automatic => {
                choose_level(&self.bitrates(), self.estimate_bps, self.abr.safety_factor)
            }
        };
        match target {
            Some(index) if Some(index) != self.current => self.switch_to(index, media),
            Some(index) => self.events.push_back(EngineEvent::LevelSwitched(index)),
            None => {}
        }
    }

    fn set_start_level(&mut self, selection: QualitySelection) {
        if self.variants.is_empty() {
            self.selection = selection;
        }
    }

    fn on_media_event(&mut self, event: &MediaEvent, media: &mut dyn MediaElement) {
        if self.destroyed {
            return;
        }
        self.adapt_at(event, media, Instant::now());
    }

    fn poll_event(&mut self, media: &mut dyn MediaElement) -> Option<EngineEvent> {
        if self.destroyed {
            return None;
        }
        if self.attached {
            let received = match self.manifest_rx.as_ref() {
                Some(rx) => match rx.try_recv() {
                    Ok(result) => Some(result),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => {
                        Some(Err(EngineError::ManifestParse("manifest loader exited".to_string())))
                    }
                },
                None => None,
            };
            if let Some(result) = received {
                self.manifest_rx = None;
                match result {
                    Ok(load) => self.on_manifest(load, media),
                    Err(e) => self.emit_error(&e, true),
                }
            }
        }
        self.events.pop_front()
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        debug!("Destroying engine for {:?}", self.source);
        self.cancel.store(true, Ordering::SeqCst);
        self.manifest_rx = None;
        self.variants.clear();
        self.events.clear();
        self.current = None;
        self.destroyed = true;
    }
}

impl Drop for ManifestEngine {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
    }
}

pub struct ManifestEngineFactory {
    abr: AbrSettings,
}

impl ManifestEngineFactory {
    pub fn new(config: &PlayerConfig) -> Self {
        ManifestEngineFactory {
            abr: AbrSettings::from_config(config),
        }
    }
}

impl EngineFactory for ManifestEngineFactory {
    fn is_supported(&self) -> bool {
        true
    }

    fn create(&self) -> Result<Box<dyn StreamEngine>, EngineError> {
        Ok(Box::new(ManifestEngine::new(self.abr.clone())))
    }
}
