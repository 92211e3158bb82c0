use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::NarrationError;
use crate::speech::{RawVoice, SpeechBackend};

/// A synthesis voice offered by the backend.
///
/// `backend_id` is the only stable key back to the backend; `name` and
/// `language_tag` are for display and may repeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub name: String,
    pub language_tag: String,
    pub backend_id: String,
}

impl From<RawVoice> for Voice {
    fn from(raw: RawVoice) -> Self {
        Self {
            name: raw.name,
            language_tag: raw.language,
            backend_id: raw.id,
        }
    }
}

/// Allow-list of language families, matched on the primary subtag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageFilter {
    prefixes: Vec<String>,
}

impl LanguageFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| normalize_tag(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// `en` keeps `en`, `en-US` and `en_GB`, but not `eng`
    pub fn allows(&self, language_tag: &str) -> bool {
        let tag = normalize_tag(language_tag);
        self.prefixes.iter().any(|prefix| {
            tag == *prefix
                || tag
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('-'))
        })
    }
}

impl Default for LanguageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_LANGUAGE_PREFIXES)
    }
}

pub const DEFAULT_LANGUAGE_PREFIXES: [&str; 4] = ["en", "es", "fr", "de"];
pub const DEFAULT_PRIMARY_LOCALE: &str = "en-US";
pub const DEFAULT_PREFERRED_MARKER: &str = "Google";

fn normalize_tag(tag: &str) -> String {
    tag.trim().replace('_', "-").to_ascii_lowercase()
}

/// Named predicate picking the default voice when the user hasn't chosen one
#[derive(Clone)]
pub struct VoicePreference {
    name: String,
    predicate: Arc<dyn Fn(&Voice) -> bool + Send + Sync>,
}

impl VoicePreference {
    pub fn new(name: impl Into<String>, predicate: impl Fn(&Voice) -> bool + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Voice whose name mentions `marker` and whose language is `primary_locale`
    pub fn preferred_engine(marker: &str, primary_locale: &str) -> Self {
        let marker = marker.to_lowercase();
        let locale = normalize_tag(primary_locale);
        Self::new(format!("preferred engine '{}' in {}", marker, primary_locale), move |voice| {
            voice.name.to_lowercase().contains(&marker) && normalize_tag(&voice.language_tag) == locale
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, voice: &Voice) -> bool {
        (self.predicate)(voice)
    }
}

impl Default for VoicePreference {
    fn default() -> Self {
        Self::preferred_engine(DEFAULT_PREFERRED_MARKER, DEFAULT_PRIMARY_LOCALE)
    }
}

impl fmt::Debug for VoicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoicePreference").field("name", &self.name).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub filter: LanguageFilter,
    pub preference: VoicePreference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SelectionOrigin {
    Default,
    User,
}

/// Voices discovered from the backend plus the current selection
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    config: CatalogConfig,
    voices: Vec<Voice>,
    selected: Option<(Voice, SelectionOrigin)>,
}

impl VoiceCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            voices: Vec::new(),
            selected: None,
        }
    }

    /// Re-reads the backend voice list. The list may still be empty while
    /// the backend initializes; call again on every voices-changed signal.
    pub fn refresh(&mut self, backend: &dyn SpeechBackend) {
        self.apply_voices(backend.list_voices());
    }

    pub fn apply_voices(&mut self, raw: Vec<RawVoice>) {
        self.voices = raw
            .into_iter()
            .map(Voice::from)
            .filter(|v| self.config.filter.allows(&v.language_tag))
            .collect();

        // A default pick that vanished is re-chosen; a user pick never is
        if let Some((voice, SelectionOrigin::Default)) = &self.selected {
            if !self.voices.iter().any(|v| v.backend_id == voice.backend_id) {
                tracing::debug!("Default voice '{}' disappeared", voice.name);
                self.selected = None;
            }
        }

        if self.selected.is_none() {
            if let Some(voice) = self.default_voice() {
                tracing::info!("Default voice: {} ({})", voice.name, voice.language_tag);
                self.selected = Some((voice, SelectionOrigin::Default));
            }
        }
    }

    fn default_voice(&self) -> Option<Voice> {
        self.voices
            .iter()
            .find(|v| self.config.preference.matches(v))
            .or_else(|| self.voices.first())
            .cloned()
    }

    /// Caller is expected to pass a member of [`Self::voices`]
    pub fn select(&mut self, voice: Voice) {
        tracing::info!("Voice selected: {} ({})", voice.name, voice.language_tag);
        self.selected = Some((voice, SelectionOrigin::User));
    }

    pub fn select_by_id(&mut self, backend_id: &str) -> Result<(), NarrationError> {
        let voice = self
            .voices
            .iter()
            .find(|v| v.backend_id == backend_id)
            .cloned()
            .ok_or_else(|| NarrationError::UnknownVoice(backend_id.to_string()))?;
        self.select(voice);
        Ok(())
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn selected(&self) -> Option<&Voice> {
        self.selected.as_ref().map(|(voice, _)| voice)
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }
}
