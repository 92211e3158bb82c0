pub mod controller;
pub mod text;
pub mod voices;

pub use controller::{NarrationController, NarrationSnapshot, PlayState};
pub use voices::{CatalogConfig, LanguageFilter, Voice, VoiceCatalog, VoicePreference};
