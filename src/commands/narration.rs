use std::path::PathBuf;

use tauri::AppHandle;
use tauri_plugin_notification::NotificationExt;

use super::with_narrator;
use crate::narration::NarrationSnapshot;

#[tauri::command]
pub fn load_text(app_handle: AppHandle, text: String) -> Result<(), String> {
    with_narrator(&app_handle, |n| {
        n.load_text(text);
        Ok(())
    })
}

/// Opens a PDF, DOCX or text file by path
#[tauri::command]
pub fn open_document(app_handle: AppHandle, path: String) -> Result<(), String> {
    let path = PathBuf::from(path);
    let result = with_narrator(&app_handle, |n| n.open_file(&path));
    if let Err(ref message) = result {
        notify_failure(&app_handle, message);
    }
    result
}

/// Loads document bytes handed over by the UI (file picker or drop)
#[tauri::command]
pub fn load_document(app_handle: AppHandle, bytes: Vec<u8>, mime: String) -> Result<(), String> {
    let result = with_narrator(&app_handle, |n| n.load_document(&bytes, &mime));
    if let Err(ref message) = result {
        notify_failure(&app_handle, message);
    }
    result
}

#[tauri::command]
pub fn play(app_handle: AppHandle, text: Option<String>) -> Result<(), String> {
    with_narrator(&app_handle, |n| n.play(text))
}

#[tauri::command]
pub fn pause(app_handle: AppHandle) -> Result<(), String> {
    with_narrator(&app_handle, |n| {
        n.pause();
        Ok(())
    })
}

#[tauri::command]
pub fn stop(app_handle: AppHandle) -> Result<(), String> {
    with_narrator(&app_handle, |n| {
        n.stop();
        Ok(())
    })
}

#[tauri::command]
pub fn get_narration_state(app_handle: AppHandle) -> Result<NarrationSnapshot, String> {
    with_narrator(&app_handle, |n| Ok(n.snapshot()))
}

fn notify_failure(app_handle: &AppHandle, message: &str) {
    tracing::warn!("Document not loaded: {}", message);
    if let Err(e) = app_handle
        .notification()
        .builder()
        .title("Couldn't open document")
        .body(message)
        .show()
    {
        tracing::warn!("Failed to show notification: {}", e);
    }
}
