use std::collections::VecDeque;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use log::{debug, info, warn};

use crate::renderer::media::{HLS_MIME, MediaElement, MediaEvent, VideoFrame};
use crate::types::error::MediaError;

/// How often a playing element reports its position.
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

// Helper function to convert a path to a file URI for GStreamer
#[cfg(windows)]
fn path_to_file_uri(path: &str) -> String {
    // Remove UNC prefix if present
    let mut path = path.replace("\\", "/");
    if let Some(stripped) = path.strip_prefix("//?/") {
        path = stripped.to_string();
    }
    format!("file:///{}", path)
}

#[cfg(not(windows))]
fn path_to_file_uri(path: &str) -> String {
    format!("file://{}", path)
}

/// Playbin URIs need a scheme; bare paths become `file://` URIs.
pub fn source_to_uri(source: &str) -> String {
    if source.contains("://") {
        return source.to_string();
    }
    let path = std::fs::canonicalize(source)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| source.to_string());
    path_to_file_uri(&path)
}

fn clock_to_secs(time: gst::ClockTime) -> f64 {
    time.nseconds() as f64 / 1_000_000_000.0
}

/// Play/Pause to report for a playbin state change. Transitions the element
/// makes on its own (rebuffering pauses, source restarts) report nothing:
/// a pause counts only when playback is no longer wanted, and a start only
/// when the last report was a pause.
fn transport_event(
    old: gst::State,
    current: gst::State,
    want_playing: bool,
    reported_playing: bool,
) -> Option<MediaEvent> {
    match (old, current) {
        (_, gst::State::Playing) if !reported_playing => Some(MediaEvent::Play),
        (gst::State::Playing, _) if reported_playing && !want_playing => Some(MediaEvent::Pause),
        _ => None,
    }
}

/// Media element backed by a `playbin` whose video ends in an RGBA appsink.
pub struct GstMediaElement {
    playbin: gst::Element,
    sink: gst_app::AppSink,
    bus: gst::Bus,
    uri: Option<String>,
    listening: bool,
    events: VecDeque<MediaEvent>,
    /// What the last play/pause call asked for.
    want_playing: bool,
    /// Whether the last transport event reported was `Play`.
    reported_playing: bool,
    prerolled: bool,
    pending_seek: Option<f64>,
    last_time: f64,
    last_time_update: Option<Instant>,
    last_buffered: f64,
    buffering: bool,
}

impl GstMediaElement {
    pub fn new() -> Result<Self, MediaError> {
        gst::init()?;
        let playbin = gst::ElementFactory::make("playbin")
            .name("pitchside-player")
            .build()
            .map_err(|_| MediaError::MissingElement("playbin".to_string()))?;

        let caps = gst_video::VideoCapsBuilder::new()
            .format(gst_video::VideoFormat::Rgba)
            .build();
        let sink = gst_app::AppSink::builder()
            .caps(&caps)
            .max_buffers(1)
            .drop(true)
            .build();
        playbin.set_property("video-sink", &sink);

        let bus = playbin.bus().ok_or(MediaError::MissingElement("bus".to_string()))?;
        info!("GStreamer media element ready ({})", gst::version_string());

        Ok(Self {
            playbin,
            sink,
            bus,
            uri: None,
            listening: false,
            events: VecDeque::new(),
            want_playing: false,
            reported_playing: false,
            prerolled: false,
            pending_seek: None,
            last_time: 0.0,
            last_time_update: None,
            last_buffered: 0.0,
            buffering: false,
        })
    }

    fn push(&mut self, event: MediaEvent) {
        if self.listening {
            self.events.push_back(event);
        }
    }

    fn report_transport(&mut self, event: MediaEvent) {
        self.reported_playing = event == MediaEvent::Play;
        self.push(event);
    }

    fn is_own_message(&self, msg: &gst::Message) -> bool {
        msg.src() == Some(self.playbin.upcast_ref::<gst::Object>())
    }

    fn apply_seek(&mut self, seconds: f64) {
        let target = gst::ClockTime::from_nseconds((seconds.max(0.0) * 1_000_000_000.0) as u64);
        match self
            .playbin
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::KEY_UNIT, target)
        {
            Ok(()) => {
                self.last_time = seconds;
                self.push(MediaEvent::TimeUpdate(seconds));
            }
            Err(e) => warn!("Seek to {} failed: {}", seconds, e),
        }
    }

    fn drain_bus(&mut self) {
        while let Some(msg) = self.bus.pop() {
            use gst::MessageView;
            match msg.view() {
                MessageView::StateChanged(changed) if self.is_own_message(&msg) => {
                    if let Some(event) = transport_event(
                        changed.old(),
                        changed.current(),
                        self.want_playing,
                        self.reported_playing,
                    ) {
                        self.report_transport(event);
                    }
                }
                MessageView::AsyncDone(_) => {
                    if !self.prerolled {
                        self.prerolled = true;
                        if let Some(duration) = self.playbin.query_duration::<gst::ClockTime>() {
                            self.push(MediaEvent::DurationChange(clock_to_secs(duration)));
                        }
                        if let Some(seconds) = self.pending_seek.take() {
                            self.apply_seek(seconds);
                        }
                    }
                    self.push(MediaEvent::CanPlay);
                }
                MessageView::DurationChanged(_) => {
                    if let Some(duration) = self.playbin.query_duration::<gst::ClockTime>() {
                        self.push(MediaEvent::DurationChange(clock_to_secs(duration)));
                    }
                }
                MessageView::Buffering(buffering) => {
                    let percent = buffering.percent();
                    if percent < 100 && !self.buffering {
                        self.buffering = true;
                        // Buffering streams must not run dry while refilling.
                        let _ = self.playbin.set_state(gst::State::Paused);
                        self.push(MediaEvent::Waiting);
                    } else if percent >= 100 && self.buffering {
                        self.buffering = false;
                        if self.want_playing {
                            let _ = self.playbin.set_state(gst::State::Playing);
                        }
                        self.push(MediaEvent::CanPlay);
                    }
                }
                MessageView::Eos(_) => {
                    self.want_playing = false;
                    self.reported_playing = false;
                    self.push(MediaEvent::Ended);
                }
                MessageView::Error(err) => {
                    warn!(
                        "GStreamer error from {:?}: {} ({:?})",
                        err.src().map(|s| s.path_string()),
                        err.error(),
                        err.debug()
                    );
                    self.push(MediaEvent::Error(err.error().to_string()));
                }
                MessageView::Warning(warning) => {
                    debug!("GStreamer warning: {}", warning.error());
                }
                _ => {}
            }
        }
    }

    fn sample_position(&mut self) {
        if !self.want_playing || !self.prerolled {
            return;
        }
        let due = self
            .last_time_update
            .is_none_or(|at| at.elapsed() >= TIME_UPDATE_INTERVAL);
        if !due {
            return;
        }
        self.last_time_update = Some(Instant::now());
        if let Some(position) = self.playbin.query_position::<gst::ClockTime>() {
            let seconds = clock_to_secs(position);
            if seconds != self.last_time {
                self.last_time = seconds;
                self.push(MediaEvent::TimeUpdate(seconds));
            }
        }

        let mut query = gst::query::Buffering::new(gst::Format::Time);
        if self.playbin.query(&mut query) {
            let (_, stop, _) = query.range();
            let stop = stop.value();
            if stop > 0 {
                let edge = stop as f64 / 1_000_000_000.0;
                if edge != self.last_buffered {
                    self.last_buffered = edge;
                    self.push(MediaEvent::Progress(edge));
                }
            }
        }
    }
}

impl MediaElement for GstMediaElement {
    fn can_play_type(&self, mime: &str) -> bool {
        mime == HLS_MIME
            && (gst::ElementFactory::find("hlsdemux").is_some()
                || gst::ElementFactory::find("hlsdemux2").is_some())
    }

    fn set_source(&mut self, url: &str) -> Result<(), MediaError> {
        self.playbin.set_state(gst::State::Null)?;
        let uri = source_to_uri(url);
        debug!("Media source {}", uri);
        self.playbin.set_property("uri", &uri);
        self.uri = Some(uri);
        self.prerolled = false;
        self.buffering = false;
        self.last_time = 0.0;
        self.last_buffered = 0.0;
        let target = if self.want_playing {
            gst::State::Playing
        } else {
            gst::State::Paused
        };
        self.playbin.set_state(target)?;
        Ok(())
    }

    fn clear_source(&mut self) {
        if let Err(e) = self.playbin.set_state(gst::State::Null) {
            warn!("Failed to stop pipeline: {}", e);
        }
        self.uri = None;
        self.want_playing = false;
        self.reported_playing = false;
        self.prerolled = false;
        self.pending_seek = None;
        // Flush whatever the stopped pipeline left on the bus.
        while self.bus.pop().is_some() {}
        while self.sink.try_pull_sample(gst::ClockTime::ZERO).is_some() {}
    }

    fn play(&mut self) -> Result<(), MediaError> {
        if self.uri.is_none() {
            return Err(MediaError::NoSource);
        }
        self.want_playing = true;
        if self.buffering {
            // The pipeline stays paused until the buffer refills; no state change will report this.
            if !self.reported_playing {
                self.report_transport(MediaEvent::Play);
            }
        } else {
            self.playbin.set_state(gst::State::Playing)?;
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.want_playing = false;
        if self.uri.is_none() {
            return;
        }
        let was_running = self.playbin.current_state() == gst::State::Playing;
        if let Err(e) = self.playbin.set_state(gst::State::Paused) {
            warn!("Failed to pause: {}", e);
        }
        // Already paused for buffering or a restart: no Playing -> Paused change will follow.
        if !was_running && self.reported_playing {
            self.report_transport(MediaEvent::Pause);
        }
    }

    fn is_paused(&self) -> bool {
        !self.want_playing
    }

    fn has_metadata(&self) -> bool {
        self.prerolled
    }

    fn current_time(&self) -> f64 {
        self.playbin
            .query_position::<gst::ClockTime>()
            .map(clock_to_secs)
            .unwrap_or(self.last_time)
    }

    fn seek(&mut self, seconds: f64) {
        if self.prerolled {
            self.apply_seek(seconds);
        } else {
            self.pending_seek = Some(seconds);
        }
    }

    fn set_gain(&mut self, gain: f64) {
        self.playbin.set_property("volume", gain.clamp(0.0, 1.0));
    }

    fn attach_listeners(&mut self) {
        self.listening = true;
    }

    fn detach_listeners(&mut self) {
        self.listening = false;
        self.events.clear();
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        if self.events.is_empty() {
            self.drain_bus();
            self.sample_position();
        }
        self.events.pop_front()
    }

    fn take_frame(&mut self) -> Option<VideoFrame> {
        let sample = self.sink.try_pull_sample(gst::ClockTime::ZERO)?;
        let caps = sample.caps()?;
        let info = gst_video::VideoInfo::from_caps(caps).ok()?;
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;

        let width = info.width() as usize;
        let height = info.height() as usize;
        let stride = info.stride()[0] as usize;
        let row = width * 4;
        let src = map.as_slice();
        let mut data = Vec::with_capacity(row * height);
        for y in 0..height {
            let start = y * stride;
            data.extend_from_slice(src.get(start..start + row)?);
        }

        Some(VideoFrame {
            data,
            width: width as u32,
            height: height as u32,
            timestamp: buffer.pts().map(clock_to_secs).unwrap_or(self.last_time),
        })
    }
}

impl Drop for GstMediaElement {
    fn drop(&mut self) {
        let _ = self.playbin.set_state(gst::State::Null);
    }
}
