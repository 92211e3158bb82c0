use std::sync::Arc;

use serde::Serialize;

use super::text::{word_index_at, word_tokens};
use super::voices::{CatalogConfig, Voice, VoiceCatalog};
use crate::error::NarrationError;
use crate::speech::{SpeechBackend, SpeechEvent, UtteranceEvent, UtteranceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayState {
    #[default]
    Idle,
    Speaking,
    Paused,
}

/// Read-only view handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrationSnapshot {
    pub available_voices: Vec<Voice>,
    pub selected_voice: Option<Voice>,
    pub play_state: PlayState,
    pub current_word_index: Option<usize>,
    pub word_tokens: Arc<Vec<String>>,
}

#[derive(Debug, Default)]
struct NarrationSession {
    source_text: String,
    word_tokens: Arc<Vec<String>>,
    play_state: PlayState,
    current_word_index: Option<usize>,
}

impl NarrationSession {
    fn new(source_text: String) -> Self {
        let word_tokens = Arc::new(word_tokens(&source_text));
        Self {
            source_text,
            word_tokens,
            play_state: PlayState::Idle,
            current_word_index: None,
        }
    }
}

/// Playback state machine over one loaded text.
///
/// Every backend event carries the utterance that produced it; events for
/// anything but the active utterance are dropped, so late callbacks from a
/// cancelled utterance can't move the cursor of the current one.
pub struct NarrationController {
    backend: Arc<dyn SpeechBackend>,
    catalog: VoiceCatalog,
    session: NarrationSession,
    active: Option<UtteranceId>,
}

impl NarrationController {
    pub fn new(backend: Arc<dyn SpeechBackend>, config: CatalogConfig) -> Self {
        Self {
            backend,
            catalog: VoiceCatalog::new(config),
            session: NarrationSession::default(),
            active: None,
        }
    }

    /// Replaces the session; anything in flight is cancelled first
    pub fn load(&mut self, text: impl Into<String>) {
        self.stop();
        self.replace_session(text.into());
    }

    fn replace_session(&mut self, text: String) {
        self.session = NarrationSession::new(text);
        tracing::info!("Loaded text: {} words", self.session.word_tokens.len());
    }

    /// Starts narrating `text`, or with `None` resumes a paused utterance
    /// (or starts the loaded text from the top when idle).
    pub fn play(&mut self, text: Option<String>) -> Result<(), NarrationError> {
        match text {
            Some(text) if text.trim().is_empty() => {
                tracing::debug!("Ignoring play request with empty text");
                Ok(())
            }
            Some(text) => {
                // start_utterance cancels whatever is in flight
                if text != self.session.source_text {
                    self.replace_session(text);
                }
                self.start_utterance()
            }
            None => match (self.session.play_state, self.active) {
                (PlayState::Paused, Some(utterance)) => {
                    self.backend.resume(utterance);
                    self.session.play_state = PlayState::Speaking;
                    tracing::info!("Resumed {}", utterance);
                    Ok(())
                }
                (PlayState::Speaking, _) => Ok(()),
                _ => self.start_utterance(),
            },
        }
    }

    fn start_utterance(&mut self) -> Result<(), NarrationError> {
        if self.session.word_tokens.is_empty() {
            tracing::debug!("Nothing to narrate");
            return Ok(());
        }

        // At most one utterance backend-wide
        self.backend.cancel_all();
        self.active = None;
        self.session.current_word_index = None;

        let voice_id = self.resolve_voice();
        match self.backend.speak(&self.session.source_text, voice_id) {
            Ok(utterance) => {
                tracing::info!("Narration started: {} via {}", utterance, self.backend.name());
                self.active = Some(utterance);
                self.session.play_state = PlayState::Speaking;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Speech backend refused utterance: {}", e);
                self.session.play_state = PlayState::Idle;
                Err(NarrationError::BackendUnavailable(e.to_string()))
            }
        }
    }

    // The selected voice's id is checked against the live backend list; a
    // stale id falls back to the backend default instead of failing.
    fn resolve_voice(&self) -> Option<String> {
        let selected = self.catalog.selected()?;
        let live = self.backend.list_voices();
        if live.iter().any(|v| v.id == selected.backend_id) {
            Some(selected.backend_id.clone())
        } else {
            tracing::warn!(
                "Voice '{}' not offered by {}; using its default voice",
                selected.name,
                self.backend.name()
            );
            None
        }
    }

    pub fn pause(&mut self) {
        if self.session.play_state != PlayState::Speaking {
            return;
        }
        if let Some(utterance) = self.active {
            self.backend.pause(utterance);
            self.session.play_state = PlayState::Paused;
            tracing::info!("Paused {}", utterance);
        }
    }

    /// Idempotent; always issues one cancel request
    pub fn stop(&mut self) {
        self.backend.cancel_all();
        if let Some(utterance) = self.active.take() {
            tracing::info!("Stopped {}", utterance);
        }
        self.session.play_state = PlayState::Idle;
        self.session.current_word_index = None;
    }

    /// Applies a backend event. Returns whether observable state changed.
    pub fn handle_event(&mut self, event: SpeechEvent) -> bool {
        let (utterance, kind) = match event {
            SpeechEvent::VoicesChanged => {
                self.refresh_voices();
                return true;
            }
            SpeechEvent::Utterance { utterance, kind } => (utterance, kind),
        };

        if self.active != Some(utterance) {
            tracing::debug!("Dropping {:?} from stale {}", kind, utterance);
            return false;
        }

        match kind {
            UtteranceEvent::Boundary { char_offset } => self.apply_boundary(char_offset),
            UtteranceEvent::End => {
                tracing::info!("Narration finished: {}", utterance);
                self.finish();
                true
            }
            UtteranceEvent::Error(message) => {
                tracing::warn!("Narration {} failed: {}", utterance, message);
                self.finish();
                true
            }
        }
    }

    fn apply_boundary(&mut self, char_offset: usize) -> bool {
        if self.session.play_state == PlayState::Idle {
            return false;
        }
        let Some(index) = word_index_at(&self.session.source_text, char_offset) else {
            return false;
        };
        // Never move backwards within one utterance
        let next = self.session.current_word_index.map_or(index, |current| current.max(index));
        let changed = self.session.current_word_index != Some(next);
        self.session.current_word_index = Some(next);
        changed
    }

    fn finish(&mut self) {
        self.active = None;
        self.session.play_state = PlayState::Idle;
        self.session.current_word_index = None;
    }

    pub fn refresh_voices(&mut self) {
        self.catalog.refresh(self.backend.as_ref());
    }

    pub fn select_voice(&mut self, backend_id: &str) -> Result<(), NarrationError> {
        self.catalog.select_by_id(backend_id)
    }

    pub fn snapshot(&self) -> NarrationSnapshot {
        NarrationSnapshot {
            available_voices: self.catalog.voices().to_vec(),
            selected_voice: self.catalog.selected().cloned(),
            play_state: self.session.play_state,
            current_word_index: self.session.current_word_index,
            word_tokens: Arc::clone(&self.session.word_tokens),
        }
    }

    pub fn play_state(&self) -> PlayState {
        self.session.play_state
    }

    pub fn current_word_index(&self) -> Option<usize> {
        self.session.current_word_index
    }

    pub fn word_tokens(&self) -> &[String] {
        &self.session.word_tokens
    }

    pub fn active_utterance(&self) -> Option<UtteranceId> {
        self.active
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::testing::{voice, Call, FakeBackend};
    use crate::speech::MockSpeechBackend;

    fn controller_with(backend: &Arc<FakeBackend>) -> NarrationController {
        let mut controller = NarrationController::new(backend.clone(), CatalogConfig::default());
        controller.refresh_voices();
        controller
    }

    fn speaks(backend: &FakeBackend) -> usize {
        backend.count(|c| matches!(c, Call::Speak { .. }))
    }

    fn cancels(backend: &FakeBackend) -> usize {
        backend.count(|c| matches!(c, Call::CancelAll))
    }

    #[test]
    fn boundary_offset_maps_to_word_index() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("Hello brave world".into())).unwrap();
        assert_eq!(controller.word_tokens(), ["Hello", "brave", "world"]);

        let id = controller.active_utterance().unwrap();
        assert!(controller.handle_event(SpeechEvent::boundary(id, 6)));
        assert_eq!(controller.current_word_index(), Some(1));
    }

    #[test]
    fn new_utterance_starts_without_a_cursor() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two three".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 4));

        controller.play(Some("four five".into())).unwrap();
        assert_eq!(controller.play_state(), PlayState::Speaking);
        assert_eq!(controller.current_word_index(), None);
    }

    #[test]
    fn switching_text_cancels_once() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two three".into())).unwrap();
        backend.clear_calls();

        controller.play(Some("four five".into())).unwrap();
        assert_eq!(cancels(&backend), 1);
        assert_eq!(speaks(&backend), 1);
        assert_eq!(controller.word_tokens(), ["four", "five"]);
    }

    #[test]
    fn replaying_same_text_restarts_from_the_top() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two three".into())).unwrap();
        let first = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(first, 8));

        controller.play(Some("one two three".into())).unwrap();
        assert_ne!(controller.active_utterance(), Some(first));
        assert_eq!(controller.current_word_index(), None);
        assert_eq!(speaks(&backend), 2);
    }

    #[test]
    fn stop_from_idle_issues_exactly_one_cancel() {
        let mut mock = MockSpeechBackend::new();
        mock.expect_cancel_all().times(1).return_const(());
        mock.expect_speak().never();

        let mut controller = NarrationController::new(Arc::new(mock), CatalogConfig::default());
        controller.stop();
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(controller.current_word_index(), None);
    }

    #[test]
    fn stop_while_speaking_resets_cursor() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two three".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 4));
        backend.clear_calls();

        controller.stop();
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(controller.current_word_index(), None);
        assert_eq!(backend.calls(), vec![Call::CancelAll]);
    }

    #[test]
    fn stop_while_paused_resets_state() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two".into())).unwrap();
        controller.pause();
        backend.clear_calls();

        controller.stop();
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(cancels(&backend), 1);
    }

    #[test]
    fn stale_boundary_is_ignored() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("alpha beta gamma".into())).unwrap();
        let stale = controller.active_utterance().unwrap();

        controller.play(Some("delta epsilon zeta eta".into())).unwrap();
        let current = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(current, 6));
        assert_eq!(controller.current_word_index(), Some(1));

        assert!(!controller.handle_event(SpeechEvent::boundary(stale, 17)));
        assert!(!controller.handle_event(SpeechEvent::end(stale)));
        assert_eq!(controller.current_word_index(), Some(1));
        assert_eq!(controller.play_state(), PlayState::Speaking);
    }

    #[test]
    fn events_after_stop_are_ignored() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("alpha beta".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.stop();

        assert!(!controller.handle_event(SpeechEvent::boundary(id, 6)));
        assert_eq!(controller.current_word_index(), None);
    }

    #[test]
    fn pause_then_play_resumes_same_utterance() {
        let mut mock = MockSpeechBackend::new();
        mock.expect_name().return_const("mock");
        mock.expect_list_voices().returning(Vec::new);
        mock.expect_cancel_all().return_const(());
        mock.expect_speak()
            .times(1)
            .returning(|_, _| Ok(UtteranceId::new(1)));
        mock.expect_pause()
            .withf(|id| *id == UtteranceId::new(1))
            .times(1)
            .return_const(());
        mock.expect_resume()
            .withf(|id| *id == UtteranceId::new(1))
            .times(1)
            .return_const(());

        let mut controller = NarrationController::new(Arc::new(mock), CatalogConfig::default());
        controller.play(Some("Some text".into())).unwrap();
        controller.pause();
        assert_eq!(controller.play_state(), PlayState::Paused);
        controller.play(None).unwrap();
        assert_eq!(controller.play_state(), PlayState::Speaking);
        assert_eq!(controller.active_utterance(), Some(UtteranceId::new(1)));
    }

    #[test]
    fn resume_keeps_cursor_position() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("alpha beta gamma".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 6));
        controller.pause();
        controller.play(None).unwrap();
        assert_eq!(controller.current_word_index(), Some(1));
        assert_eq!(backend.count(|c| *c == Call::Resume(id)), 1);
    }

    #[test]
    fn pause_is_noop_unless_speaking() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.pause();
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn play_without_voices_uses_backend_default() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("Some text".into())).unwrap();
        assert!(backend.calls().contains(&Call::Speak {
            text: "Some text".into(),
            voice_id: None,
        }));
    }

    #[test]
    fn play_uses_selected_voice_when_live() {
        let backend = Arc::new(FakeBackend::with_voices(vec![
            voice("a", "Alex", "en-US"),
            voice("t", "Thomas", "fr-FR"),
        ]));
        let mut controller = controller_with(&backend);
        controller.select_voice("t").unwrap();
        controller.play(Some("Bonjour".into())).unwrap();
        assert!(backend.calls().contains(&Call::Speak {
            text: "Bonjour".into(),
            voice_id: Some("t".into()),
        }));
    }

    #[test]
    fn stale_voice_id_falls_back_to_default() {
        let backend = Arc::new(FakeBackend::with_voices(vec![voice("a", "Alex", "en-US")]));
        let mut controller = controller_with(&backend);
        assert_eq!(controller.catalog().selected().unwrap().backend_id, "a");

        // Backend re-enumerated with new ids, no refresh yet
        backend.set_voices(vec![voice("a2", "Alex", "en-US")]);
        controller.play(Some("Hello".into())).unwrap();
        assert!(backend.calls().contains(&Call::Speak {
            text: "Hello".into(),
            voice_id: None,
        }));
        assert_eq!(controller.play_state(), PlayState::Speaking);
    }

    #[test]
    fn empty_text_is_noop() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("   \n ".into())).unwrap();
        controller.play(Some(String::new())).unwrap();
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn play_without_text_starts_loaded_text() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.load("from the document");
        controller.play(None).unwrap();
        assert_eq!(controller.play_state(), PlayState::Speaking);
        assert_eq!(speaks(&backend), 1);
    }

    #[test]
    fn play_while_speaking_without_text_does_nothing() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two".into())).unwrap();
        backend.clear_calls();
        controller.play(None).unwrap();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn new_text_cancels_before_speaking() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("first".into())).unwrap();
        backend.clear_calls();
        controller.play(Some("second".into())).unwrap();

        let calls = backend.calls();
        let speak_at = calls.iter().position(|c| matches!(c, Call::Speak { .. })).unwrap();
        assert!(calls[..speak_at].contains(&Call::CancelAll));
    }

    #[test]
    fn end_returns_to_idle() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 4));
        assert!(controller.handle_event(SpeechEvent::end(id)));
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(controller.current_word_index(), None);
        assert_eq!(controller.active_utterance(), None);
    }

    #[test]
    fn runtime_error_is_terminal() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("one two".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        assert!(controller.handle_event(SpeechEvent::error(id, "device lost")));
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(controller.current_word_index(), None);
        // No retry
        assert_eq!(speaks(&backend), 1);
    }

    #[test]
    fn boundaries_never_move_backwards() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("a bb ccc dddd".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 5));
        assert_eq!(controller.current_word_index(), Some(2));
        assert!(!controller.handle_event(SpeechEvent::boundary(id, 2)));
        assert_eq!(controller.current_word_index(), Some(2));
    }

    #[test]
    fn speak_failure_surfaces_backend_unavailable() {
        let backend = Arc::new(FakeBackend::default());
        backend.fail_speak(true);
        let mut controller = controller_with(&backend);
        let err = controller.play(Some("hello".into())).unwrap_err();
        assert!(matches!(err, NarrationError::BackendUnavailable(_)));
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert_eq!(controller.active_utterance(), None);
    }

    #[test]
    fn load_cancels_and_rebuilds_tokens() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        controller.play(Some("old text here".into())).unwrap();
        let old = controller.active_utterance().unwrap();
        backend.clear_calls();

        controller.load("brand new");
        assert_eq!(backend.calls(), vec![Call::CancelAll]);
        assert_eq!(controller.word_tokens(), ["brand", "new"]);
        assert_eq!(controller.play_state(), PlayState::Idle);
        assert!(!controller.handle_event(SpeechEvent::boundary(old, 4)));

        let before = controller.word_tokens().to_vec();
        controller.load("brand new");
        assert_eq!(controller.word_tokens(), before.as_slice());
    }

    #[test]
    fn voices_changed_refreshes_catalog() {
        let backend = Arc::new(FakeBackend::default());
        let mut controller = controller_with(&backend);
        assert!(controller.catalog().voices().is_empty());

        backend.set_voices(vec![voice("a", "Alex", "en-US"), voice("k", "Kyoko", "ja-JP")]);
        assert!(controller.handle_event(SpeechEvent::VoicesChanged));
        assert_eq!(controller.catalog().voices().len(), 1);
        assert_eq!(controller.snapshot().selected_voice.unwrap().backend_id, "a");
    }

    #[test]
    fn snapshot_reflects_session() {
        let backend = Arc::new(FakeBackend::with_voices(vec![voice("a", "Alex", "en-US")]));
        let mut controller = controller_with(&backend);
        controller.play(Some("Hello brave world".into())).unwrap();
        let id = controller.active_utterance().unwrap();
        controller.handle_event(SpeechEvent::boundary(id, 12));

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.play_state, PlayState::Speaking);
        assert_eq!(snapshot.current_word_index, Some(2));
        assert_eq!(snapshot.word_tokens.len(), 3);
        assert_eq!(snapshot.available_voices.len(), 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["play_state"], "speaking");
        assert_eq!(json["current_word_index"], 2);
    }
}
