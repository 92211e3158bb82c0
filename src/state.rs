use serde::{Deserialize, Serialize};

use crate::narration::voices::{
    DEFAULT_LANGUAGE_PREFIXES, DEFAULT_PREFERRED_MARKER, DEFAULT_PRIMARY_LOCALE,
};
use crate::narration::{CatalogConfig, LanguageFilter, VoicePreference};
use crate::speech::BackendOptions;

#[cfg(feature = "desktop")]
pub struct AppState {
    /// `None` when no speech program is installed
    pub narrator: std::sync::Mutex<Option<crate::service::Narrator>>,
    pub settings: std::sync::Mutex<Settings>,
}

#[cfg(feature = "desktop")]
impl AppState {
    pub fn new() -> Self {
        Self {
            narrator: std::sync::Mutex::new(None),
            settings: std::sync::Mutex::new(Settings::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub narration: NarrationSettings,
    #[serde(default)]
    pub shortcuts: ShortcutSettings,
}

impl Settings {
    /// Rebuilds settings from a stored JSON value. Missing or unreadable
    /// values give the defaults; missing sections inside a readable value
    /// give that section's defaults.
    pub fn from_stored(value: Option<serde_json::Value>) -> Self {
        match value.map(serde_json::from_value::<Settings>) {
            Some(Ok(settings)) => settings,
            Some(Err(e)) => {
                tracing::warn!("Stored settings are unreadable: {}. Using defaults.", e);
                Self::default()
            }
            None => {
                tracing::info!("No stored settings found. Using defaults.");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrationSettings {
    /// Voices outside these language families are hidden
    pub language_prefixes: Vec<String>,
    pub primary_locale: String,
    /// Substring of the voice name that marks the preferred engine
    pub preferred_voice_marker: String,
    #[serde(default = "default_rate_wpm")]
    pub rate_wpm: u32,
}

fn default_rate_wpm() -> u32 {
    BackendOptions::default().rate_wpm
}

impl Default for NarrationSettings {
    fn default() -> Self {
        Self {
            language_prefixes: DEFAULT_LANGUAGE_PREFIXES.iter().map(|p| p.to_string()).collect(),
            primary_locale: DEFAULT_PRIMARY_LOCALE.to_string(),
            preferred_voice_marker: DEFAULT_PREFERRED_MARKER.to_string(),
            rate_wpm: default_rate_wpm(),
        }
    }
}

impl NarrationSettings {
    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            filter: LanguageFilter::new(&self.language_prefixes),
            preference: VoicePreference::preferred_engine(&self.preferred_voice_marker, &self.primary_locale),
        }
    }

    pub fn backend_options(&self) -> BackendOptions {
        BackendOptions { rate_wpm: self.rate_wpm.clamp(80, 450) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortcutSettings {
    pub toggle: String,
    pub stop: String,
}

impl Default for ShortcutSettings {
    fn default() -> Self {
        Self {
            toggle: "Alt+Shift+Space".to_string(),
            stop: "Alt+Shift+Escape".to_string(),
        }
    }
}
