pub mod document;
pub mod error;
pub mod narration;
pub mod service;
pub mod speech;
pub mod state;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod hotkey;
#[cfg(feature = "desktop")]
mod persistence;

pub use error::NarrationError;
pub use service::Narrator;

/// Installs the fmt subscriber; `RUST_LOG` overrides the default `info` level
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use state::AppState;
    use tauri::Manager;

    init_tracing();

    tracing::info!("Starting Read to Me v{}", env!("CARGO_PKG_VERSION"));

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_global_shortcut::Builder::new().build())
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_notification::init())
        .manage(AppState::new())
        .invoke_handler(tauri::generate_handler![
            commands::narration::load_text,
            commands::narration::open_document,
            commands::narration::load_document,
            commands::narration::play,
            commands::narration::pause,
            commands::narration::stop,
            commands::narration::get_narration_state,
            commands::voices::list_voices,
            commands::voices::select_voice,
            commands::voices::refresh_voices,
            commands::settings::get_settings,
            commands::settings::update_settings,
            commands::settings::get_app_version,
        ])
        .setup(|app| {
            let loaded = persistence::load_settings(app.handle());
            let shortcuts = loaded.shortcuts.clone();
            {
                let state = app.state::<AppState>();
                *state.settings.lock().unwrap() = loaded;
                tracing::info!("Settings loaded from store");
            }

            start_narrator(app.handle());
            hotkey::register_shortcuts(app.handle(), &shortcuts);

            tracing::info!("App setup complete");
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application");

    app.run(|app_handle, event| {
        if let tauri::RunEvent::Exit = event {
            let state = app_handle.state::<AppState>();
            let narrator = state.narrator.lock().unwrap().take();
            if let Some(mut narrator) = narrator {
                narrator.shutdown();
            }
        }
    });
}

/// (Re)creates the narrator from current settings and forwards its state to
/// the UI as `narration-state` events. Without a speech program the app
/// keeps running with narration disabled.
#[cfg(feature = "desktop")]
pub(crate) fn start_narrator(app_handle: &tauri::AppHandle) {
    use std::sync::Arc;

    use state::AppState;
    use tauri::{Emitter, Manager};

    let state = app_handle.state::<AppState>();
    let settings = state.settings.lock().unwrap().narration.clone();
    let runtime = tauri::async_runtime::block_on(async { tokio::runtime::Handle::current() });

    let backend = match speech::detect_backend() {
        Some(kind) => match speech::create_backend(kind, settings.backend_options(), &runtime) {
            Ok(backend) => Some(backend),
            Err(e) => {
                tracing::warn!("Failed to start {} backend: {}", kind.program(), e);
                None
            }
        },
        None => {
            tracing::warn!("No speech program found (tried say, espeak-ng). Narration disabled.");
            None
        }
    };

    let narrator = backend.map(|backend| {
        Narrator::start(
            &runtime,
            Arc::from(backend),
            Arc::new(document::StandardDecoder),
            settings.catalog_config(),
        )
    });

    if let Some(narrator) = &narrator {
        let mut updates = narrator.subscribe();
        let app = app_handle.clone();
        runtime.spawn(async move {
            while updates.changed().await.is_ok() {
                let snapshot = updates.borrow_and_update().clone();
                if let Err(e) = app.emit("narration-state", &snapshot) {
                    tracing::warn!("Failed to emit narration state: {}", e);
                }
            }
        });
    }

    let previous = std::mem::replace(&mut *state.narrator.lock().unwrap(), narrator);
    if previous.is_some() {
        tracing::info!("Narrator restarted with new settings");
    }
}
