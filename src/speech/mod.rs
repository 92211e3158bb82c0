pub mod system;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::sync::mpsc;

/// Voice as reported by a speech backend, before language filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawVoice {
    pub id: String,
    pub name: String,
    pub language: String,
}

/// Opaque handle for one utterance handed to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(u64);

impl UtteranceId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utt-{}", self.0)
    }
}

/// Hands out increasing utterance ids, one allocator per backend instance
#[derive(Debug, Default)]
pub struct UtteranceIds {
    next: AtomicU64,
}

impl UtteranceIds {
    pub fn next(&self) -> UtteranceId {
        UtteranceId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Progress reported for a single utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceEvent {
    /// Speech reached this offset, counted in chars of the spoken text
    Boundary { char_offset: usize },
    End,
    Error(String),
}

/// Message delivered from a backend to whoever registered an [`EventSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechEvent {
    Utterance {
        utterance: UtteranceId,
        kind: UtteranceEvent,
    },
    VoicesChanged,
}

impl SpeechEvent {
    pub fn boundary(utterance: UtteranceId, char_offset: usize) -> Self {
        Self::Utterance { utterance, kind: UtteranceEvent::Boundary { char_offset } }
    }

    pub fn end(utterance: UtteranceId) -> Self {
        Self::Utterance { utterance, kind: UtteranceEvent::End }
    }

    pub fn error(utterance: UtteranceId, message: impl Into<String>) -> Self {
        Self::Utterance { utterance, kind: UtteranceEvent::Error(message.into()) }
    }
}

pub type EventSink = mpsc::UnboundedSender<SpeechEvent>;
pub type EventStream = mpsc::UnboundedReceiver<SpeechEvent>;

/// Capability set the narration core needs from a speech synthesizer.
///
/// All control calls are fire-and-forget: their effect is observed through
/// events sent to the registered sink. `cancel_all` must be safe with nothing
/// active.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechBackend: Send + Sync {
    fn name(&self) -> &'static str;
    fn list_voices(&self) -> Vec<RawVoice>;
    /// `voice_id` of `None` means the backend's own default voice
    fn speak(&self, text: &str, voice_id: Option<String>) -> Result<UtteranceId>;
    fn pause(&self, utterance: UtteranceId);
    fn resume(&self, utterance: UtteranceId);
    fn cancel_all(&self);
    /// Replaces the event subscriber; `None` deregisters it
    fn set_event_sink(&self, sink: Option<EventSink>);
}

/// Which system speech program drives the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    EspeakNg,
    Say,
}

impl BackendKind {
    pub fn program(&self) -> &'static str {
        match self {
            BackendKind::EspeakNg => "espeak-ng",
            BackendKind::Say => "say",
        }
    }
}

/// Options shared by system backends
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub rate_wpm: u32,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self { rate_wpm: 175 }
    }
}

/// Find the first speech program installed on this machine
pub fn detect_backend() -> Option<BackendKind> {
    let candidates: &[BackendKind] = if cfg!(target_os = "macos") {
        &[BackendKind::Say, BackendKind::EspeakNg]
    } else {
        &[BackendKind::EspeakNg]
    };

    candidates
        .iter()
        .copied()
        .find(|kind| system::program_on_path(kind.program()).is_some())
}

/// Factory to create a backend for the given kind.
///
/// Fails when the program is not installed, which callers surface as
/// "speech unavailable".
pub fn create_backend(
    kind: BackendKind,
    options: BackendOptions,
    runtime: &tokio::runtime::Handle,
) -> Result<Box<dyn SpeechBackend>> {
    let program = system::program_on_path(kind.program())
        .ok_or_else(|| anyhow::anyhow!("Speech program not found on PATH: {}", kind.program()))?;
    Ok(Box::new(system::SystemSpeechBackend::new(kind, program, options, runtime)))
}
