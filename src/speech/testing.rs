use std::sync::Mutex;

use anyhow::Result;

use super::{EventSink, RawVoice, SpeechBackend, SpeechEvent, UtteranceId, UtteranceIds};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Speak { text: String, voice_id: Option<String> },
    Pause(UtteranceId),
    Resume(UtteranceId),
    CancelAll,
}

/// Backend that records requests and lets tests inject events
#[derive(Default)]
pub struct FakeBackend {
    voices: Mutex<Vec<RawVoice>>,
    calls: Mutex<Vec<Call>>,
    sink: Mutex<Option<EventSink>>,
    ids: UtteranceIds,
    fail_speak: Mutex<bool>,
}

impl FakeBackend {
    pub fn with_voices(voices: Vec<RawVoice>) -> Self {
        let backend = Self::default();
        backend.set_voices(voices);
        backend
    }

    pub fn set_voices(&self, voices: Vec<RawVoice>) {
        *self.voices.lock().unwrap() = voices;
    }

    pub fn fail_speak(&self, fail: bool) {
        *self.fail_speak.lock().unwrap() = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Delivers an event the way a live backend would
    pub fn emit(&self, event: SpeechEvent) {
        if let Some(tx) = self.sink.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }
}

pub fn voice(id: &str, name: &str, language: &str) -> RawVoice {
    RawVoice {
        id: id.into(),
        name: name.into(),
        language: language.into(),
    }
}

impl SpeechBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn list_voices(&self) -> Vec<RawVoice> {
        self.voices.lock().unwrap().clone()
    }

    fn speak(&self, text: &str, voice_id: Option<String>) -> Result<UtteranceId> {
        if *self.fail_speak.lock().unwrap() {
            anyhow::bail!("audio device missing");
        }
        self.calls.lock().unwrap().push(Call::Speak {
            text: text.to_string(),
            voice_id,
        });
        Ok(self.ids.next())
    }

    fn pause(&self, utterance: UtteranceId) {
        self.calls.lock().unwrap().push(Call::Pause(utterance));
    }

    fn resume(&self, utterance: UtteranceId) {
        self.calls.lock().unwrap().push(Call::Resume(utterance));
    }

    fn cancel_all(&self) {
        self.calls.lock().unwrap().push(Call::CancelAll);
    }

    fn set_event_sink(&self, sink: Option<EventSink>) {
        *self.sink.lock().unwrap() = sink;
    }
}
