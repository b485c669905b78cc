//! Scriptable media element and engine for controller and surface tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use crate::renderer::media::{
    EngineEvent, EngineFactory, HLS_MIME, MediaElement, MediaEvent, StreamEngine,
};
use crate::types::error::{EngineError, MediaError};
use crate::types::playback_state::QualitySelection;

#[derive(Debug)]
pub struct MediaRecord {
    pub native_hls: bool,
    pub source: Option<String>,
    pub queue: VecDeque<MediaEvent>,
    pub listening: bool,
    pub paused: bool,
    pub has_metadata: bool,
    pub current_time: f64,
    pub seeks: Vec<f64>,
    pub gain: f64,
    pub play_calls: usize,
    pub reject_play: bool,
    pub detach_count: usize,
}

impl Default for MediaRecord {
    fn default() -> Self {
        Self {
            native_hls: false,
            source: None,
            queue: VecDeque::new(),
            listening: false,
            paused: true,
            has_metadata: true,
            current_time: 0.0,
            seeks: Vec::new(),
            gain: 1.0,
            play_calls: 0,
            reject_play: false,
            detach_count: 0,
        }
    }
}

#[derive(Clone)]
pub struct MediaHandle(pub Rc<RefCell<MediaRecord>>);

impl MediaHandle {
    /// Queues `event` the way a real element fires it: only while listened to.
    pub fn emit(&self, event: MediaEvent) {
        let mut record = self.0.borrow_mut();
        if record.listening {
            record.queue.push_back(event);
        }
    }

    pub fn recorded(&self) -> std::cell::Ref<'_, MediaRecord> {
        self.0.borrow()
    }

    pub fn recorded_mut(&self) -> std::cell::RefMut<'_, MediaRecord> {
        self.0.borrow_mut()
    }
}

pub struct MockMedia {
    record: Rc<RefCell<MediaRecord>>,
}

impl MockMedia {
    pub fn new() -> (Box<dyn MediaElement>, MediaHandle) {
        let record = Rc::new(RefCell::new(MediaRecord::default()));
        (
            Box::new(MockMedia {
                record: record.clone(),
            }),
            MediaHandle(record),
        )
    }

    pub fn native() -> (Box<dyn MediaElement>, MediaHandle) {
        let (media, handle) = Self::new();
        handle.recorded_mut().native_hls = true;
        (media, handle)
    }

    fn emit(&self, event: MediaEvent) {
        MediaHandle(self.record.clone()).emit(event);
    }
}

impl MediaElement for MockMedia {
    fn can_play_type(&self, mime: &str) -> bool {
        mime == HLS_MIME && self.record.borrow().native_hls
    }

    fn set_source(&mut self, url: &str) -> Result<(), MediaError> {
        self.record.borrow_mut().source = Some(url.to_string());
        Ok(())
    }

    fn clear_source(&mut self) {
        let mut record = self.record.borrow_mut();
        record.source = None;
        record.paused = true;
    }

    fn play(&mut self) -> Result<(), MediaError> {
        {
            let mut record = self.record.borrow_mut();
            record.play_calls += 1;
            if record.reject_play {
                return Err(MediaError::StateChange("play rejected".to_string()));
            }
            record.paused = false;
        }
        self.emit(MediaEvent::Play);
        Ok(())
    }

    fn pause(&mut self) {
        self.record.borrow_mut().paused = true;
        self.emit(MediaEvent::Pause);
    }

    fn is_paused(&self) -> bool {
        self.record.borrow().paused
    }

    fn has_metadata(&self) -> bool {
        self.record.borrow().has_metadata
    }

    fn current_time(&self) -> f64 {
        self.record.borrow().current_time
    }

    fn seek(&mut self, seconds: f64) {
        {
            let mut record = self.record.borrow_mut();
            record.seeks.push(seconds);
            record.current_time = seconds;
        }
        self.emit(MediaEvent::TimeUpdate(seconds));
    }

    fn set_gain(&mut self, gain: f64) {
        self.record.borrow_mut().gain = gain;
    }

    fn attach_listeners(&mut self) {
        self.record.borrow_mut().listening = true;
    }

    fn detach_listeners(&mut self) {
        let mut record = self.record.borrow_mut();
        record.listening = false;
        record.queue.clear();
        record.detach_count += 1;
    }

    fn poll_event(&mut self) -> Option<MediaEvent> {
        self.record.borrow_mut().queue.pop_front()
    }
}

#[derive(Debug, Default)]
pub struct EngineRecord {
    pub source: Option<String>,
    pub attached: bool,
    pub start_level: Option<QualitySelection>,
    pub level_requests: Vec<QualitySelection>,
    pub queue: VecDeque<EngineEvent>,
    pub media_events: Vec<MediaEvent>,
    pub destroyed: bool,
}

#[derive(Clone)]
pub struct EngineHandle(pub Rc<RefCell<EngineRecord>>);

impl EngineHandle {
    pub fn emit(&self, event: EngineEvent) {
        self.0.borrow_mut().queue.push_back(event);
    }

    pub fn recorded(&self) -> std::cell::Ref<'_, EngineRecord> {
        self.0.borrow()
    }
}

pub struct MockEngine {
    record: Rc<RefCell<EngineRecord>>,
    live: Rc<Cell<usize>>,
}

impl MockEngine {
    fn release(&mut self) {
        let mut record = self.record.borrow_mut();
        if !record.destroyed {
            record.destroyed = true;
            self.live.set(self.live.get() - 1);
        }
    }
}

impl StreamEngine for MockEngine {
    fn set_start_level(&mut self, selection: QualitySelection) {
        self.record.borrow_mut().start_level = Some(selection);
    }

    fn load_source(&mut self, url: &str) {
        self.record.borrow_mut().source = Some(url.to_string());
    }

    fn attach_media(&mut self, _media: &mut dyn MediaElement) {
        self.record.borrow_mut().attached = true;
    }

    fn set_level(&mut self, selection: QualitySelection, _media: &mut dyn MediaElement) {
        self.record.borrow_mut().level_requests.push(selection);
    }

    fn on_media_event(&mut self, event: &MediaEvent, _media: &mut dyn MediaElement) {
        self.record.borrow_mut().media_events.push(event.clone());
    }

    fn poll_event(&mut self, _media: &mut dyn MediaElement) -> Option<EngineEvent> {
        let mut record = self.record.borrow_mut();
        if record.destroyed {
            return None;
        }
        record.queue.pop_front()
    }

    fn destroy(&mut self) {
        self.release();
    }
}

impl Drop for MockEngine {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone, Default)]
pub struct MockEngineFactory {
    pub unsupported: bool,
    pub fail: bool,
    /// Engines created and not yet destroyed.
    pub live: Rc<Cell<usize>>,
    pub created: Rc<RefCell<Vec<EngineHandle>>>,
}

impl MockEngineFactory {
    pub fn engine(&self, n: usize) -> EngineHandle {
        self.created.borrow()[n].clone()
    }

    pub fn last(&self) -> EngineHandle {
        let created = self.created.borrow();
        created[created.len() - 1].clone()
    }
}

impl EngineFactory for MockEngineFactory {
    fn is_supported(&self) -> bool {
        !self.unsupported
    }

    fn create(&self) -> Result<Box<dyn StreamEngine>, EngineError> {
        if self.fail {
            return Err(EngineError::ManifestParse("worker spawn failed".to_string()));
        }
        let record = Rc::new(RefCell::new(EngineRecord::default()));
        self.created.borrow_mut().push(EngineHandle(record.clone()));
        self.live.set(self.live.get() + 1);
        Ok(Box::new(MockEngine {
            record,
            live: self.live.clone(),
        }))
    }
}

/// Factory for a platform without a client-side engine.
pub struct NoEngine;

impl EngineFactory for NoEngine {
    fn is_supported(&self) -> bool {
        false
    }

    fn create(&self) -> Result<Box<dyn StreamEngine>, EngineError> {
        Err(EngineError::ManifestParse("no engine available".to_string()))
    }
}
