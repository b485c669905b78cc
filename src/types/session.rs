use uuid::Uuid;

use crate::types::playback_state::QualitySelection;

/// Lifecycle of one attached source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Unbound,
    Attaching,
    Loading,
    Ready,
    Failed,
    TornDown,
}

/// Inputs of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseInput {
    Attach,
    /// The engine accepted the source and is fetching the manifest.
    Load,
    /// Engine (or native element) has something playable.
    SourceReady,
    Fatal,
    Teardown,
}

impl SessionPhase {
    /// Next phase for `input`, or `None` when the input is not valid here.
    pub fn next(self, input: PhaseInput) -> Option<SessionPhase> {
        use PhaseInput::*;
        use SessionPhase::*;
        match (self, input) {
            (Unbound | TornDown, Attach) => Some(Attaching),
            (Attaching, Load) => Some(Loading),
            (Attaching, SourceReady) => Some(Ready),
            (Loading, SourceReady) => Some(Ready),
            (Attaching | Loading | Ready, Fatal) => Some(Failed),
            (Attaching | Loading | Ready | Failed, Teardown) => Some(TornDown),
            _ => None,
        }
    }

    /// Transport operations only reach the media element in these phases.
    pub fn accepts_transport(self) -> bool {
        matches!(self, SessionPhase::Loading | SessionPhase::Ready)
    }
}

/// The source currently bound to a controller.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub source_url: String,
    pub auto_play: bool,
    pub start_level: QualitySelection,
    /// Increments on every attach of the owning controller.
    pub epoch: u64,
}

impl PlaybackSession {
    pub fn new(source_url: &str, auto_play: bool, start_level: QualitySelection, epoch: u64) -> Self {
        PlaybackSession {
            id: Uuid::new_v4(),
            source_url: source_url.to_string(),
            auto_play,
            start_level,
            epoch,
        }
    }
}
