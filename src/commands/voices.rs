use tauri::AppHandle;

use super::with_narrator;
use crate::narration::Voice;

#[tauri::command]
pub fn list_voices(app_handle: AppHandle) -> Result<Vec<Voice>, String> {
    with_narrator(&app_handle, |n| Ok(n.snapshot().available_voices))
}

#[tauri::command]
pub fn select_voice(app_handle: AppHandle, voice_id: String) -> Result<(), String> {
    with_narrator(&app_handle, |n| n.select_voice(&voice_id))
}

#[tauri::command]
pub fn refresh_voices(app_handle: AppHandle) -> Result<Vec<Voice>, String> {
    with_narrator(&app_handle, |n| {
        n.refresh_voices();
        Ok(n.snapshot().available_voices)
    })
}
