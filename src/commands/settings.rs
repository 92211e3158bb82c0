use tauri::{AppHandle, Manager};

use crate::state::{AppState, Settings};

#[tauri::command]
pub fn get_settings(app_handle: AppHandle) -> Result<Settings, String> {
    let state = app_handle.state::<AppState>();
    let settings = state.settings.lock().unwrap().clone();
    Ok(settings)
}

/// Stores new settings and restarts narration so voice filtering and speech
/// rate take effect. The loaded text is dropped.
#[tauri::command]
pub fn update_settings(app_handle: AppHandle, settings: Settings) -> Result<(), String> {
    if let Err(e) = crate::persistence::save_settings(&app_handle, &settings) {
        tracing::error!("{:#}", e);
    }
    let shortcuts_changed = {
        let state = app_handle.state::<AppState>();
        let mut current = state.settings.lock().unwrap();
        let changed = current.shortcuts != settings.shortcuts;
        *current = settings;
        changed
    };

    if shortcuts_changed {
        crate::hotkey::reregister_shortcuts(&app_handle).map_err(|e| e.to_string())?;
    }
    crate::start_narrator(&app_handle);
    Ok(())
}

#[tauri::command]
pub fn get_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
