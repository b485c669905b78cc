use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::ops::store::{PlayerStore, SubscriptionId};
use crate::renderer::media::{
    EngineEvent, EngineFactory, HLS_MIME, MediaElement, MediaEvent, StreamEngine, VideoFrame,
};
use crate::types::config::PlayerConfig;
use crate::types::error::PlaybackError;
use crate::types::playback_state::{PlaybackState, QualityLevel, QualitySelection};
use crate::types::session::{PhaseInput, PlaybackSession, SessionPhase};
use crate::types::stream::PlayerMount;

/// Binds one adaptive engine lifecycle to one media element and one source,
/// and keeps the store in step with engine and media events.
pub struct StreamController {
    config: PlayerConfig,
    store: PlayerStore,
    factory: Box<dyn EngineFactory>,
    media: Option<Box<dyn MediaElement>>,
    engine: Option<Box<dyn StreamEngine>>,
    session: Option<PlaybackSession>,
    /// Source requested before a media element was bound.
    pending: Option<PlayerMount>,
    phase: SessionPhase,
    epoch: u64,
    manifest_parsed: bool,
    /// Last selection forwarded to the engine.
    requested_quality: QualitySelection,
    loading_since: Option<Instant>,
    on_ended: Option<Box<dyn FnMut()>>,
}

impl StreamController {
    pub fn new(config: PlayerConfig, factory: Box<dyn EngineFactory>) -> Self {
        Self {
            config,
            store: PlayerStore::new(),
            factory,
            media: None,
            engine: None,
            session: None,
            pending: None,
            phase: SessionPhase::Unbound,
            epoch: 0,
            manifest_parsed: false,
            requested_quality: QualitySelection::Automatic,
            loading_since: None,
            on_ended: None,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        self.store.state()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&PlaybackState) + 'static) -> SubscriptionId {
        self.store.subscribe(observer)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.store.unsubscribe(id)
    }

    pub fn set_on_ended(&mut self, callback: impl FnMut() + 'static) {
        self.on_ended = Some(Box::new(callback));
    }

    /// Binds the playback sink, releasing any previous one first.
    pub fn bind_media(&mut self, media: Box<dyn MediaElement>) {
        if self.media.is_some() {
            self.teardown();
        }
        self.media = Some(media);
        if let Some(mount) = self.pending.take() {
            self.attach(mount);
        }
    }

    fn transition(&mut self, input: PhaseInput) -> bool {
        match self.phase.next(input) {
            Some(next) => {
                debug!("Session phase {:?} -> {:?} on {:?}", self.phase, next, input);
                self.phase = next;
                true
            }
            None => {
                debug!("Ignoring {:?} in phase {:?}", input, self.phase);
                false
            }
        }
    }

    /// Attaches a new source. Any previous session is fully torn down before
    /// the store is reset.
    pub fn attach(&mut self, mount: PlayerMount) {
        if self.media.is_none() {
            debug!("No media element bound yet, deferring {}", mount.source_url);
            self.pending = Some(mount);
            return;
        }

        self.teardown();
        self.epoch += 1;
        let session = PlaybackSession::new(
            &mount.source_url,
            mount.auto_play,
            self.config.start_level,
            self.epoch,
        );
        self.transition(PhaseInput::Attach);
        self.store.reset();
        self.requested_quality = session.start_level;
        self.loading_since = Some(Instant::now());
        info!(
            "Attaching {} (session {}, epoch {})",
            session.source_url, session.id, session.epoch
        );

        let gain = self.store.state().effective_gain();
        let Some(media) = self.media.as_deref_mut() else {
            return;
        };
        media.attach_listeners();
        media.set_gain(gain);

        let native = media.can_play_type(HLS_MIME);
        let use_engine = self.factory.is_supported() && (self.config.prefer_engine || !native);

        if use_engine {
            match self.factory.create() {
                Ok(mut engine) => {
                    engine.set_start_level(session.start_level);
                    engine.load_source(&session.source_url);
                    engine.attach_media(media);
                    self.engine = Some(engine);
                    self.session = Some(session);
                    self.transition(PhaseInput::Load);
                }
                Err(e) => {
                    warn!("Engine construction failed: {}", e);
                    self.session = Some(session);
                    self.fail(PlaybackError::EngineInit(e.to_string()));
                }
            }
        } else if native {
            let result = media.set_source(&session.source_url);
            let auto_play = session.auto_play;
            self.session = Some(session);
            match result {
                Ok(()) => {
                    self.transition(PhaseInput::SourceReady);
                    self.store.set_loading(false);
                    self.loading_since = None;
                    if auto_play {
                        self.request_play();
                    }
                }
                Err(e) => {
                    warn!("Native source rejected: {}", e);
                    self.fail(PlaybackError::Media);
                }
            }
        } else {
            warn!("Neither engine nor native HLS playback available");
            self.session = Some(session);
            self.fail(PlaybackError::UnsupportedFormat);
        }
    }

    /// Unmounts the current source; the controller can be attached again later.
    pub fn detach(&mut self) {
        self.pending = None;
        self.teardown();
    }

    /// Destroys the engine and silences the media element.
    fn teardown(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        if let Some(media) = self.media.as_deref_mut() {
            media.detach_listeners();
            media.clear_source();
        }
        self.manifest_parsed = false;
        self.loading_since = None;
        self.requested_quality = QualitySelection::Automatic;
        if let Some(session) = self.session.take() {
            debug!("Tore down session {} (epoch {})", session.id, session.epoch);
            self.transition(PhaseInput::Teardown);
        }
    }

    /// Re-attaches the current source after a failure.
    pub fn retry(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let mount = PlayerMount {
            source_url: session.source_url.clone(),
            poster_url: None,
            auto_play: true,
        };
        info!("Retrying {}", mount.source_url);
        self.attach(mount);
    }

    fn fail(&mut self, error: PlaybackError) {
        if !self.transition(PhaseInput::Fatal) {
            return;
        }
        warn!("Playback failed: {}", error);
        // Failed sessions neither fetch nor play.
        if let Some(mut engine) = self.engine.take() {
            engine.destroy();
        }
        if let Some(media) = self.media.as_deref_mut() {
            media.pause();
        }
        self.store.set_error(Some(error));
        self.store.set_playing(false);
        self.store.set_loading(false);
        self.loading_since = None;
    }

    /// Applies all queued engine events, then all queued media events.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let event = match (self.engine.as_deref_mut(), self.media.as_deref_mut()) {
                (Some(engine), Some(media)) => engine.poll_event(media),
                _ => None,
            };
            let Some(event) = event else {
                break;
            };
            self.handle_engine_event(event);
            handled += 1;
        }
        loop {
            let event = match self.media.as_deref_mut() {
                Some(media) => media.poll_event(),
                None => None,
            };
            let Some(event) = event else {
                break;
            };
            if let (Some(engine), Some(media)) = (self.engine.as_deref_mut(), self.media.as_deref_mut())
            {
                engine.on_media_event(&event, media);
            }
            self.handle_media_event(event);
            handled += 1;
        }
        handled
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        if self.phase == SessionPhase::Failed {
            debug!("Dropping engine event after failure: {:?}", event);
            return;
        }
        match event {
            EngineEvent::ManifestParsed(levels) => {
                if self.phase != SessionPhase::Loading {
                    debug!("Manifest parsed outside of loading, ignoring");
                    return;
                }
                let qualities: Vec<QualityLevel> = levels
                    .iter()
                    .enumerate()
                    .map(|(i, l)| QualityLevel::new(i, l.width, l.height, l.bitrate))
                    .collect();
                info!("Manifest parsed with {} levels", qualities.len());
                self.store.set_qualities(qualities);
                self.store.set_loading(false);
                self.loading_since = None;
                self.manifest_parsed = true;
                self.transition(PhaseInput::SourceReady);

                // The engine already started on a configured level it knows.
                if let QualitySelection::Manual(index) = self.requested_quality {
                    if index >= levels.len() {
                        warn!("Start level {} not in manifest", index);
                        self.requested_quality = QualitySelection::Automatic;
                    }
                }
                if self.session.as_ref().is_some_and(|s| s.auto_play) {
                    self.request_play();
                }
            }
            EngineEvent::LevelSwitched(index) => {
                if !self.manifest_parsed {
                    debug!("Level switch before manifest, ignoring");
                    return;
                }
                self.store.set_active_level(Some(index));
                let confirmed = match self.requested_quality {
                    QualitySelection::Automatic => QualitySelection::Automatic,
                    QualitySelection::Manual(_) => QualitySelection::Manual(index),
                };
                self.store.set_current_quality(confirmed);
            }
            EngineEvent::Error { fatal: true, details } => {
                self.fail(PlaybackError::Engine { details });
            }
            EngineEvent::Error { fatal: false, details } => {
                debug!("Engine recovered from non-fatal error: {}", details);
            }
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        if !self.phase.accepts_transport() {
            debug!("Dropping media event in {:?}: {:?}", self.phase, event);
            return;
        }
        match event {
            MediaEvent::Play => self.store.set_playing(true),
            MediaEvent::Pause => self.store.set_playing(false),
            MediaEvent::TimeUpdate(time) => self.store.set_current_time(time),
            MediaEvent::DurationChange(duration) => self.store.set_duration(duration),
            MediaEvent::Progress(edge) => self.store.set_buffered(edge),
            MediaEvent::Waiting => {
                self.store.set_loading(true);
                if self.loading_since.is_none() {
                    self.loading_since = Some(Instant::now());
                }
            }
            MediaEvent::CanPlay => {
                self.store.set_loading(false);
                self.loading_since = None;
            }
            MediaEvent::Ended => {
                self.store.set_playing(false);
                if let Some(callback) = self.on_ended.as_mut() {
                    callback();
                }
            }
            MediaEvent::Error(message) => {
                warn!("Media element error: {}", message);
                self.fail(PlaybackError::Media);
            }
        }
    }

    /// Fails a load that has been waiting longer than the configured limit.
    pub fn tick(&mut self, now: Instant) {
        let (Some(limit), Some(since)) = (self.config.stall_timeout_ms, self.loading_since) else {
            return;
        };
        if !self.phase.accepts_transport() {
            return;
        }
        if now.saturating_duration_since(since) >= Duration::from_millis(limit) {
            self.fail(PlaybackError::Stalled);
        }
    }

    fn request_play(&mut self) {
        if let Some(media) = self.media.as_deref_mut() {
            if let Err(e) = media.play() {
                debug!("Play request rejected: {}", e);
            }
        }
    }

    pub fn play(&mut self) {
        if !self.phase.accepts_transport() {
            return;
        }
        self.request_play();
    }

    pub fn pause(&mut self) {
        if !self.phase.accepts_transport() {
            return;
        }
        if let Some(media) = self.media.as_deref_mut() {
            media.pause();
        }
    }

    pub fn toggle(&mut self) {
        let paused = match self.media.as_deref() {
            Some(media) => media.is_paused(),
            None => return,
        };
        if paused { self.play() } else { self.pause() }
    }

    /// Seeks within `[0, duration]`; a no-op until the element has metadata.
    pub fn seek(&mut self, time: f64) {
        if !self.phase.accepts_transport() || !time.is_finite() {
            return;
        }
        let duration = self.store.state().duration;
        let Some(media) = self.media.as_deref_mut() else {
            return;
        };
        if !media.has_metadata() {
            debug!("Seek to {} before metadata, ignoring", time);
            return;
        }
        let target = if duration > 0.0 {
            time.clamp(0.0, duration)
        } else {
            time.max(0.0)
        };
        media.seek(target);
    }

    /// Forwards a quality request to the engine. The store only changes when
    /// the engine confirms the switch.
    pub fn set_current_quality(&mut self, selection: QualitySelection) {
        if !self.manifest_parsed {
            debug!("Quality request {:?} before manifest, ignoring", selection);
            return;
        }
        if let QualitySelection::Manual(index) = selection {
            if self.store.state().level(index).is_none() {
                warn!("Unknown quality level {}", index);
                return;
            }
        }
        let (Some(engine), Some(media)) = (self.engine.as_deref_mut(), self.media.as_deref_mut())
        else {
            return;
        };
        self.requested_quality = selection;
        engine.set_level(selection, media);
    }

    pub fn set_volume(&mut self, volume: f64) {
        self.store.set_volume(volume);
        self.sync_gain();
    }

    pub fn toggle_mute(&mut self) {
        self.store.toggle_mute();
        self.sync_gain();
    }

    fn sync_gain(&mut self) {
        let gain = self.store.state().effective_gain();
        if let Some(media) = self.media.as_deref_mut() {
            media.set_gain(gain);
        }
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.store.set_fullscreen(fullscreen);
    }

    pub fn set_show_controls(&mut self, show: bool) {
        self.store.set_show_controls(show);
    }

    pub fn take_frame(&mut self) -> Option<VideoFrame> {
        self.media.as_deref_mut().and_then(|m| m.take_frame())
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::media::EngineLevel;
    use crate::renderer::mock::{MediaHandle, MockEngineFactory, MockMedia, NoEngine};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn mount(url: &str) -> PlayerMount {
        PlayerMount {
            source_url: url.to_string(),
            poster_url: None,
            auto_play: false,
        }
    }

    fn three_levels() -> Vec<EngineLevel> {
        vec![
            EngineLevel { width: 640, height: 360, bitrate: 800_000 },
            EngineLevel { width: 1280, height: 720, bitrate: 2_800_000 },
            EngineLevel { width: 1920, height: 1080, bitrate: 5_000_000 },
        ]
    }

    fn engine_player() -> (StreamController, MockEngineFactory, MediaHandle) {
        let _ = env_logger::builder().is_test(true).try_init();
        let factory = MockEngineFactory::default();
        let mut controller =
            StreamController::new(PlayerConfig::default(), Box::new(factory.clone()));
        let (media, handle) = MockMedia::new();
        controller.bind_media(media);
        (controller, factory, handle)
    }

    fn parsed_player() -> (StreamController, MockEngineFactory, MediaHandle) {
        let (mut controller, factory, media) = engine_player();
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();
        (controller, factory, media)
    }

    #[test]
    fn test_reset_state_is_observed_first_on_attach() {
        let (mut controller, factory, _media) = parsed_player();
        factory.last().emit(EngineEvent::Error {
            fatal: true,
            details: "networkError".to_string(),
        });
        controller.pump();
        assert!(controller.state().error.is_some());

        let snapshots = Rc::new(RefCell::new(Vec::new()));
        let sink = snapshots.clone();
        controller.subscribe(move |s| sink.borrow_mut().push(s.clone()));
        controller.attach(mount("https://cdn.example.com/b/master.m3u8"));

        let first = snapshots.borrow()[0].clone();
        assert!(first.is_loading);
        assert!(first.error.is_none());
        assert_eq!(first.current_quality_index(), -1);
        assert!(first.qualities.is_empty());
    }

    #[test]
    fn test_manifest_parsed_populates_levels_in_order() {
        let (controller, factory, media) = parsed_player();
        let state = controller.state();
        let labels: Vec<&str> = state.qualities.iter().map(|q| q.label.as_str()).collect();
        assert_eq!(labels, vec!["360p", "720p", "1080p"]);
        assert!(!state.is_loading);
        assert_eq!(controller.phase(), SessionPhase::Ready);
        assert!(factory.last().recorded().attached);
        assert_eq!(
            factory.last().recorded().source.as_deref(),
            Some("https://cdn.example.com/a/master.m3u8")
        );
        assert_eq!(media.recorded().play_calls, 0);
    }

    #[test]
    fn test_auto_play_issues_play_after_manifest() {
        let (mut controller, factory, media) = engine_player();
        controller.attach(PlayerMount {
            auto_play: true,
            ..mount("https://cdn.example.com/a/master.m3u8")
        });
        assert_eq!(media.recorded().play_calls, 0);
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();
        assert_eq!(media.recorded().play_calls, 1);
        assert!(controller.state().is_playing);
    }

    #[test]
    fn test_rejected_auto_play_is_not_an_error() {
        let (mut controller, factory, media) = engine_player();
        media.recorded_mut().reject_play = true;
        controller.attach(PlayerMount {
            auto_play: true,
            ..mount("https://cdn.example.com/a/master.m3u8")
        });
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();
        assert_eq!(media.recorded().play_calls, 1);
        assert!(!controller.state().is_playing);
        assert!(controller.state().error.is_none());
    }

    #[test]
    fn test_quality_changes_only_on_confirmation() {
        let (mut controller, factory, _media) = parsed_player();
        controller.set_current_quality(QualitySelection::Manual(2));
        assert_eq!(
            factory.last().recorded().level_requests,
            vec![QualitySelection::Manual(2)]
        );
        controller.pump();
        assert_eq!(controller.state().current_quality_index(), -1);

        factory.last().emit(EngineEvent::LevelSwitched(2));
        controller.pump();
        assert_eq!(controller.state().current_quality_index(), 2);
        assert_eq!(controller.state().active_level, Some(2));
    }

    #[test]
    fn test_automatic_switches_keep_auto_selected() {
        let (mut controller, factory, _media) = parsed_player();
        factory.last().emit(EngineEvent::LevelSwitched(1));
        controller.pump();
        assert!(controller.state().is_auto_quality());
        assert_eq!(controller.state().active_level, Some(1));

        controller.set_current_quality(QualitySelection::Manual(0));
        factory.last().emit(EngineEvent::LevelSwitched(0));
        controller.pump();
        assert_eq!(controller.state().current_quality_index(), 0);

        controller.set_current_quality(QualitySelection::Automatic);
        factory.last().emit(EngineEvent::LevelSwitched(2));
        controller.pump();
        assert!(controller.state().is_auto_quality());
        assert_eq!(controller.state().active_level, Some(2));
    }

    #[test]
    fn test_quality_request_before_manifest_is_ignored() {
        let (mut controller, factory, _media) = engine_player();
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        controller.set_current_quality(QualitySelection::Manual(1));
        assert!(factory.last().recorded().level_requests.is_empty());

        factory.last().emit(EngineEvent::LevelSwitched(1));
        controller.pump();
        assert!(controller.state().active_level.is_none());
    }

    #[test]
    fn test_unknown_quality_level_is_not_forwarded() {
        let (mut controller, factory, _media) = parsed_player();
        controller.set_current_quality(QualitySelection::Manual(7));
        assert!(factory.last().recorded().level_requests.is_empty());
    }

    #[test]
    fn test_configured_start_level_is_handed_to_engine_before_loading() {
        let factory = MockEngineFactory::default();
        let config = PlayerConfig {
            start_level: QualitySelection::Manual(1),
            ..PlayerConfig::default()
        };
        let mut controller = StreamController::new(config, Box::new(factory.clone()));
        let (media, _handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        assert_eq!(
            factory.last().recorded().start_level,
            Some(QualitySelection::Manual(1))
        );
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        factory.last().emit(EngineEvent::LevelSwitched(1));
        controller.pump();
        // No second switch request: the engine starts on the level itself.
        assert!(factory.last().recorded().level_requests.is_empty());
        assert_eq!(controller.state().current_quality, QualitySelection::Manual(1));
    }

    #[test]
    fn test_unknown_start_level_confirms_as_automatic() {
        let factory = MockEngineFactory::default();
        let config = PlayerConfig {
            start_level: QualitySelection::Manual(7),
            ..PlayerConfig::default()
        };
        let mut controller = StreamController::new(config, Box::new(factory.clone()));
        let (media, _handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        factory.last().emit(EngineEvent::LevelSwitched(0));
        controller.pump();
        assert!(controller.state().is_auto_quality());
        assert_eq!(controller.state().active_level, Some(0));
    }

    #[test]
    fn test_new_source_tears_down_previous_engine_first() {
        let (mut controller, factory, media) = engine_player();
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        let engine_a = factory.engine(0);
        media.emit(MediaEvent::TimeUpdate(42.0));
        assert_eq!(factory.live.get(), 1);

        controller.attach(mount("https://cdn.example.com/b/master.m3u8"));
        assert_eq!(factory.live.get(), 1);
        assert!(engine_a.recorded().destroyed);
        assert_eq!(media.recorded().detach_count, 2);

        engine_a.emit(EngineEvent::ManifestParsed(three_levels()));
        engine_a.emit(EngineEvent::Error {
            fatal: true,
            details: "staleError".to_string(),
        });
        controller.pump();
        assert!(controller.state().qualities.is_empty());
        assert!(controller.state().error.is_none());
        assert_eq!(controller.state().current_time, 0.0);

        factory.engine(1).emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();
        assert_eq!(controller.state().qualities.len(), 3);
        assert_eq!(controller.session.as_ref().unwrap().epoch, 2);
    }

    #[test]
    fn test_detach_destroys_engine() {
        let (mut controller, factory, media) = parsed_player();
        controller.detach();
        assert_eq!(factory.live.get(), 0);
        assert_eq!(controller.phase(), SessionPhase::TornDown);
        assert!(media.recorded().source.is_none());
        assert!(!media.recorded().listening);
    }

    #[test]
    fn test_dropping_controller_destroys_engine() {
        let (controller, factory, _media) = parsed_player();
        drop(controller);
        assert_eq!(factory.live.get(), 0);
    }

    #[test]
    fn test_fatal_engine_error_is_terminal() {
        let (mut controller, factory, media) = parsed_player();
        factory.last().emit(EngineEvent::Error {
            fatal: true,
            details: "networkError".to_string(),
        });
        controller.pump();
        let state = controller.state();
        assert_eq!(
            state.error.as_ref().map(|e| e.to_string()).as_deref(),
            Some("networkError")
        );
        assert!(!state.is_loading);
        assert_eq!(controller.phase(), SessionPhase::Failed);

        let calls = media.recorded().play_calls;
        controller.play();
        controller.toggle();
        controller.seek(10.0);
        assert_eq!(media.recorded().play_calls, calls);
        assert!(media.recorded().seeks.is_empty());
    }

    #[test]
    fn test_non_fatal_engine_errors_are_swallowed() {
        let (mut controller, factory, _media) = parsed_player();
        factory.last().emit(EngineEvent::Error {
            fatal: false,
            details: "fragLoadError".to_string(),
        });
        controller.pump();
        assert!(controller.state().error.is_none());
        assert_eq!(controller.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_media_error_uses_fixed_message() {
        let (mut controller, _factory, media) = parsed_player();
        media.emit(MediaEvent::Error("decoder crashed".to_string()));
        controller.pump();
        assert_eq!(controller.state().error, Some(PlaybackError::Media));
        assert!(!controller.state().is_loading);
    }

    #[test]
    fn test_waiting_then_canplay_only_touches_loading() {
        let (mut controller, _factory, media) = parsed_player();
        let before = controller.state().clone();
        assert!(!before.is_loading);

        media.emit(MediaEvent::Waiting);
        controller.pump();
        assert!(controller.state().is_loading);
        let waiting = PlaybackState {
            is_loading: true,
            ..before.clone()
        };
        assert_eq!(*controller.state(), waiting);

        media.emit(MediaEvent::CanPlay);
        controller.pump();
        assert_eq!(*controller.state(), before);
    }

    #[test]
    fn test_media_events_drive_state() {
        let (mut controller, _factory, media) = parsed_player();
        media.emit(MediaEvent::DurationChange(200.0));
        media.emit(MediaEvent::Play);
        media.emit(MediaEvent::TimeUpdate(12.5));
        media.emit(MediaEvent::Progress(250.0));
        controller.pump();
        let state = controller.state();
        assert!(state.is_playing);
        assert_eq!(state.duration, 200.0);
        assert_eq!(state.current_time, 12.5);
        assert_eq!(state.buffered_edge, 200.0);

        media.emit(MediaEvent::Pause);
        controller.pump();
        assert!(!controller.state().is_playing);
    }

    #[test]
    fn test_media_events_reach_engine() {
        let (mut controller, factory, media) = parsed_player();
        media.emit(MediaEvent::Waiting);
        controller.pump();
        assert_eq!(factory.last().recorded().media_events, vec![MediaEvent::Waiting]);
    }

    #[test]
    fn test_ended_notifies_callback() {
        let (mut controller, _factory, media) = parsed_player();
        let ended = Rc::new(Cell::new(0));
        let counter = ended.clone();
        controller.set_on_ended(move || counter.set(counter.get() + 1));
        media.emit(MediaEvent::Play);
        media.emit(MediaEvent::Ended);
        controller.pump();
        assert_eq!(ended.get(), 1);
        assert!(!controller.state().is_playing);
    }

    #[test]
    fn test_native_path_sets_source_directly() {
        let mut controller = StreamController::new(PlayerConfig::default(), Box::new(NoEngine));
        let (media, handle) = MockMedia::native();
        controller.bind_media(media);
        controller.attach(PlayerMount {
            auto_play: true,
            ..mount("https://cdn.example.com/a/master.m3u8")
        });
        assert!(!controller.has_engine());
        assert_eq!(
            handle.recorded().source.as_deref(),
            Some("https://cdn.example.com/a/master.m3u8")
        );
        assert!(!controller.state().is_loading);
        assert_eq!(handle.recorded().play_calls, 1);
        assert_eq!(controller.phase(), SessionPhase::Ready);
    }

    #[test]
    fn test_native_preferred_when_engine_not_preferred() {
        let factory = MockEngineFactory::default();
        let config = PlayerConfig {
            prefer_engine: false,
            ..PlayerConfig::default()
        };
        let mut controller = StreamController::new(config, Box::new(factory.clone()));
        let (media, _handle) = MockMedia::native();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        assert!(!controller.has_engine());
        assert_eq!(factory.live.get(), 0);
    }

    #[test]
    fn test_unsupported_format_fails_session() {
        let mut controller = StreamController::new(PlayerConfig::default(), Box::new(NoEngine));
        let (media, _handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        assert_eq!(controller.state().error, Some(PlaybackError::UnsupportedFormat));
        assert!(!controller.state().is_loading);
        assert_eq!(controller.phase(), SessionPhase::Failed);
    }

    #[test]
    fn test_engine_construction_failure_is_surfaced() {
        let factory = MockEngineFactory {
            fail: true,
            ..MockEngineFactory::default()
        };
        let mut controller = StreamController::new(PlayerConfig::default(), Box::new(factory));
        let (media, _handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        assert!(matches!(
            controller.state().error,
            Some(PlaybackError::EngineInit(_))
        ));
    }

    #[test]
    fn test_transport_before_media_is_a_no_op() {
        let factory = MockEngineFactory::default();
        let mut controller =
            StreamController::new(PlayerConfig::default(), Box::new(factory.clone()));
        controller.play();
        controller.pause();
        controller.toggle();
        controller.seek(5.0);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        assert_eq!(controller.phase(), SessionPhase::Unbound);
        assert_eq!(factory.live.get(), 0);

        let (media, _handle) = MockMedia::new();
        controller.bind_media(media);
        assert_eq!(controller.phase(), SessionPhase::Loading);
        assert_eq!(factory.live.get(), 1);
    }

    #[test]
    fn test_seek_is_clamped_and_needs_metadata() {
        let (mut controller, _factory, media) = parsed_player();
        media.emit(MediaEvent::DurationChange(200.0));
        controller.pump();

        controller.seek(250.0);
        controller.seek(-4.0);
        assert_eq!(media.recorded().seeks, vec![200.0, 0.0]);

        media.recorded_mut().has_metadata = false;
        controller.seek(20.0);
        assert_eq!(media.recorded().seeks.len(), 2);
    }

    #[test]
    fn test_toggle_flips_between_play_and_pause() {
        let (mut controller, _factory, media) = parsed_player();
        controller.toggle();
        controller.pump();
        assert!(controller.state().is_playing);
        controller.toggle();
        controller.pump();
        assert!(!controller.state().is_playing);
        assert!(media.recorded().paused);
    }

    #[test]
    fn test_volume_and_mute_reach_media_gain() {
        let (mut controller, _factory, media) = parsed_player();
        controller.set_volume(0.6);
        assert_eq!(media.recorded().gain, 0.6);
        controller.toggle_mute();
        assert_eq!(media.recorded().gain, 0.0);
        assert!(controller.state().is_muted);
        controller.toggle_mute();
        assert_eq!(media.recorded().gain, 0.6);
        assert_eq!(controller.state().volume, 0.6);
    }

    #[test]
    fn test_retry_reattaches_same_source() {
        let (mut controller, factory, _media) = parsed_player();
        factory.last().emit(EngineEvent::Error {
            fatal: true,
            details: "networkError".to_string(),
        });
        controller.pump();
        controller.retry();
        assert!(controller.state().error.is_none());
        assert!(controller.state().is_loading);
        assert_eq!(factory.created.borrow().len(), 2);
        assert_eq!(factory.live.get(), 1);
        assert_eq!(
            factory.last().recorded().source.as_deref(),
            Some("https://cdn.example.com/a/master.m3u8")
        );
    }

    #[test]
    fn test_stall_watchdog() {
        let factory = MockEngineFactory::default();
        let config = PlayerConfig {
            stall_timeout_ms: Some(5_000),
            ..PlayerConfig::default()
        };
        let mut controller = StreamController::new(config, Box::new(factory.clone()));
        let (media, handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();

        handle.emit(MediaEvent::Waiting);
        controller.pump();
        controller.tick(Instant::now() + Duration::from_millis(100));
        assert!(controller.state().error.is_none());

        controller.tick(Instant::now() + Duration::from_millis(5_001));
        assert_eq!(controller.state().error, Some(PlaybackError::Stalled));
    }

    #[test]
    fn test_stalled_session_stops_media_and_engine() {
        let factory = MockEngineFactory::default();
        let config = PlayerConfig {
            stall_timeout_ms: Some(5_000),
            ..PlayerConfig::default()
        };
        let mut controller = StreamController::new(config, Box::new(factory.clone()));
        let (media, handle) = MockMedia::new();
        controller.bind_media(media);
        controller.attach(mount("https://cdn.example.com/a/master.m3u8"));
        factory.last().emit(EngineEvent::ManifestParsed(three_levels()));
        controller.pump();
        controller.play();
        controller.pump();
        assert!(!handle.recorded().paused);

        handle.emit(MediaEvent::Waiting);
        controller.pump();
        controller.tick(Instant::now() + Duration::from_millis(5_001));
        assert_eq!(controller.state().error, Some(PlaybackError::Stalled));
        assert!(handle.recorded().paused);
        assert_eq!(factory.live.get(), 0);
        assert!(factory.last().recorded().destroyed);

        // Late events from the stopped element do not reach the store.
        handle.emit(MediaEvent::Play);
        controller.pump();
        assert!(!controller.state().is_playing);
    }

    #[test]
    fn test_media_error_stops_engine_and_playback() {
        let (mut controller, factory, media) = parsed_player();
        controller.play();
        controller.pump();
        media.emit(MediaEvent::Error("decoder crashed".to_string()));
        controller.pump();
        assert_eq!(controller.state().error, Some(PlaybackError::Media));
        assert!(media.recorded().paused);
        assert_eq!(factory.live.get(), 0);
    }

    #[test]
    fn test_no_watchdog_by_default() {
        let (mut controller, _factory, media) = parsed_player();
        media.emit(MediaEvent::Waiting);
        controller.pump();
        controller.tick(Instant::now() + Duration::from_secs(3600));
        assert!(controller.state().error.is_none());
        assert!(controller.state().is_loading);
    }
}
