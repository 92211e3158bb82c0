use anyhow::Context;
use tauri::AppHandle;
use tauri_plugin_store::StoreExt;

use crate::state::Settings;

const STORE_FILE: &str = "settings.json";
const SETTINGS_KEY: &str = "settings";

/// Settings from the app store. A store that cannot be opened counts as
/// empty, so startup never fails on it.
pub fn load_settings(app_handle: &AppHandle) -> Settings {
    let stored = match app_handle.store(STORE_FILE) {
        Ok(store) => store.get(SETTINGS_KEY),
        Err(e) => {
            tracing::warn!("Settings store unavailable: {}", e);
            None
        }
    };
    Settings::from_stored(stored)
}

pub fn save_settings(app_handle: &AppHandle, settings: &Settings) -> anyhow::Result<()> {
    let store = app_handle.store(STORE_FILE).context("Failed to open settings store")?;
    let value = serde_json::to_value(settings).context("Failed to serialize settings")?;
    store.set(SETTINGS_KEY, value);
    store.save().context("Failed to write settings store")?;
    tracing::debug!("Settings written to {}", STORE_FILE);
    Ok(())
}
