pub mod narration;
pub mod settings;
pub mod voices;

use tauri::{AppHandle, Manager};

use crate::error::NarrationError;
use crate::service::Narrator;
use crate::state::AppState;

/// Runs `f` against the live narrator, mapping errors to the UI message
pub(crate) fn with_narrator<T>(
    app_handle: &AppHandle,
    f: impl FnOnce(&Narrator) -> Result<T, NarrationError>,
) -> Result<T, String> {
    let state = app_handle.state::<AppState>();
    let guard = state.narrator.lock().unwrap();
    let narrator = guard.as_ref().ok_or_else(|| {
        NarrationError::BackendUnavailable("no speech program is installed".into()).to_string()
    })?;
    f(narrator).map_err(|e| e.to_string())
}
