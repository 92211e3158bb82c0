use thiserror::Error;

use crate::document::DecodeError;

/// Errors surfaced to callers of the narration core.
///
/// An unresolvable voice is not an error: narration falls back to the
/// backend's default voice.
#[derive(Debug, Error)]
pub enum NarrationError {
    /// Speech or decoding capability missing at call time
    #[error("Speech backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Unknown voice: {0}")]
    UnknownVoice(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
}
