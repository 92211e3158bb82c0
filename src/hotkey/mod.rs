use anyhow::Result;
use tauri::{AppHandle, Manager};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, ShortcutState};

use crate::narration::PlayState;
use crate::state::{AppState, ShortcutSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    ToggleNarration,
    StopNarration,
}

pub fn handle_hotkey(app_handle: &AppHandle, action: HotkeyAction, shortcut_state: ShortcutState) -> Result<()> {
    // Only act on key press, ignore release
    if shortcut_state == ShortcutState::Released {
        return Ok(());
    }

    let state = app_handle.state::<AppState>();
    let guard = state.narrator.lock().unwrap();
    let Some(narrator) = guard.as_ref() else {
        tracing::warn!("Narration hotkey ignored: no speech backend");
        return Ok(());
    };

    match action {
        HotkeyAction::ToggleNarration => match narrator.snapshot().play_state {
            PlayState::Speaking => narrator.pause(),
            PlayState::Idle | PlayState::Paused => narrator.play(None)?,
        },
        HotkeyAction::StopNarration => narrator.stop(),
    }
    Ok(())
}

fn register(app_handle: &AppHandle, shortcut: &str, action: HotkeyAction) -> Result<()> {
    app_handle
        .global_shortcut()
        .on_shortcut(shortcut, move |app, _shortcut, event| {
            if let Err(e) = handle_hotkey(app, action, event.state) {
                tracing::error!("Hotkey {:?} failed: {}", action, e);
            }
        })?;
    tracing::info!("Registered {:?} on {}", action, shortcut);
    Ok(())
}

/// Registers both narration shortcuts, falling back to the defaults when a
/// saved shortcut can't be claimed
pub fn register_shortcuts(app_handle: &AppHandle, shortcuts: &ShortcutSettings) {
    let defaults = ShortcutSettings::default();
    let bindings = [
        (shortcuts.toggle.as_str(), defaults.toggle.as_str(), HotkeyAction::ToggleNarration),
        (shortcuts.stop.as_str(), defaults.stop.as_str(), HotkeyAction::StopNarration),
    ];

    for (shortcut, fallback, action) in bindings {
        if let Err(e) = register(app_handle, shortcut, action) {
            tracing::warn!("Failed to register '{}': {}. Falling back to {}.", shortcut, e, fallback);
            if shortcut != fallback {
                if let Err(e2) = register(app_handle, fallback, action) {
                    tracing::error!("Failed to register fallback shortcut {}: {}", fallback, e2);
                }
            }
        }
    }
}

pub fn reregister_shortcuts(app_handle: &AppHandle) -> Result<()> {
    app_handle.global_shortcut().unregister_all()?;
    let shortcuts = app_handle.state::<AppState>().settings.lock().unwrap().shortcuts.clone();
    register_shortcuts(app_handle, &shortcuts);
    Ok(())
}
